use glam::Affine3A;

use crate::acceleration::GeometryDescription;

/// One drawable object as handed over by scene compilation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneObject {
    pub geometry: GeometryDescription,
    pub transform: Affine3A,
}

impl SceneObject {
    pub fn new(geometry: GeometryDescription) -> Self {
        Self {
            geometry,
            transform: Affine3A::IDENTITY,
        }
    }

    pub fn with_transform(mut self, transform: Affine3A) -> Self {
        self.transform = transform;
        self
    }
}

/// Compiled scene, objects keep the order they were pushed in
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scene {
    objects: Vec<SceneObject>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, object: SceneObject) -> usize {
        self.objects.push(object);
        self.objects.len() - 1
    }

    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl FromIterator<SceneObject> for Scene {
    fn from_iter<T: IntoIterator<Item = SceneObject>>(iter: T) -> Self {
        Self {
            objects: iter.into_iter().collect(),
        }
    }
}
