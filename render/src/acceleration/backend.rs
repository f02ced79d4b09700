use anyhow::Result;
use kestrel_gal::util::align;

/// Memory a single build needs, as reported by the device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildSizes {
    pub structure_size: u64,
    pub build_scratch_size: u64,
    pub update_scratch_size: u64,
}

impl BuildSizes {
    pub fn aligned(self, alignment: u64) -> Self {
        Self {
            structure_size: align(self.structure_size, alignment),
            build_scratch_size: align(self.build_scratch_size, alignment),
            update_scratch_size: align(self.update_scratch_size, alignment),
        }
    }

    /// Scratch needed to both build and later update the structure
    pub fn scratch_size(&self) -> u64 {
        self.build_scratch_size.max(self.update_scratch_size)
    }

    /// The device must report room for the structure and for building it
    pub fn is_valid(&self) -> bool {
        self.structure_size > 0 && self.build_scratch_size > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructureLevel {
    Bottom,
    Top,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildMode {
    /// Build from scratch into the destination
    Build,
    /// Refit an existing structure in place
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Backs one acceleration structure
    Storage,
    Scratch,
    /// Host-written instance records
    Instances,
}

/// Indexed triangle geometry of one object, referenced by device address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GeometryDescription {
    pub vertex_address: u64,
    pub vertex_stride: u64,
    pub vertex_count: u32,
    pub index_address: u64,
    pub index_count: u32,
    pub opaque: bool,
}

impl GeometryDescription {
    pub fn primitive_count(&self) -> u32 {
        self.index_count / 3
    }

    pub fn max_vertex(&self) -> u32 {
        self.vertex_count.saturating_sub(1)
    }
}

/// One command recorded into a build submission
pub enum BuildStep<'a, B: AccelerationBackend + ?Sized> {
    Bottom {
        structure: &'a B::Structure,
        geometry: &'a GeometryDescription,
        scratch: &'a B::Buffer,
    },
    Top {
        mode: BuildMode,
        structure: &'a B::Structure,
        instances: &'a B::Buffer,
        instance_count: u32,
        scratch: &'a B::Buffer,
    },
    /// Finishes the previous build before the next one touches the shared scratch buffer
    Barrier,
}

/// Device operations the [`AccelerationStructureBuilder`](super::AccelerationStructureBuilder)
/// is written against
pub trait AccelerationBackend {
    type Buffer;
    type Structure;

    fn supports_ray_tracing(&self) -> bool;

    fn bottom_level_sizes(&self, geometry: &GeometryDescription) -> Result<BuildSizes>;

    /// Sizes for a top-level structure built with updates allowed
    fn top_level_sizes(&self, instance_count: u32) -> Result<BuildSizes>;

    fn create_buffer(&mut self, size: u64, usage: BufferUsage) -> Result<Self::Buffer>;

    fn destroy_buffer(&mut self, buffer: Self::Buffer);

    fn write_buffer(&mut self, buffer: &mut Self::Buffer, bytes: &[u8]) -> Result<()>;

    fn create_structure(
        &mut self,
        level: StructureLevel,
        buffer: &Self::Buffer,
        size: u64,
    ) -> Result<Self::Structure>;

    fn destroy_structure(&mut self, structure: Self::Structure);

    fn structure_address(&self, structure: &Self::Structure) -> u64;

    /// Records `steps` into one command buffer, submits it and waits for completion
    fn execute(&self, steps: &[BuildStep<'_, Self>]) -> Result<()>;

    fn wait_idle(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes_align_up() {
        let sizes = BuildSizes {
            structure_size: 1000,
            build_scratch_size: 1,
            update_scratch_size: 0,
        }
        .aligned(256);
        assert_eq!(sizes.structure_size, 1024);
        assert_eq!(sizes.build_scratch_size, 256);
        assert_eq!(sizes.update_scratch_size, 0);
    }

    #[test]
    fn test_scratch_covers_update() {
        let sizes = BuildSizes {
            structure_size: 10,
            build_scratch_size: 20,
            update_scratch_size: 30,
        };
        assert_eq!(sizes.scratch_size(), 30);
        assert!(sizes.is_valid());
        assert!(!BuildSizes::default().is_valid());
    }

    #[test]
    fn test_geometry_counts() {
        let geometry = GeometryDescription {
            vertex_count: 8,
            index_count: 36,
            ..Default::default()
        };
        assert_eq!(geometry.primitive_count(), 12);
        assert_eq!(geometry.max_vertex(), 7);
        assert_eq!(GeometryDescription::default().max_vertex(), 0);
    }
}
