use std::ops::Range;

use anyhow::Result;
use glam::Affine3A;
use kestrel_containers::{ContainerErrors, Slot, SlotMap};

use crate::RenderError;
use crate::acceleration::batch::partition;
use crate::acceleration::instance::{check_instance_count, encode_instances, pack_transform};
use crate::acceleration::{
    AccelerationBackend, BufferUsage, BuildMode, BuildSizes, BuildStep, BuilderConfig,
    GeometryDescription, InstanceRecord, ScratchBuffer, StructureLevel,
};
use crate::scene::Scene;

struct BottomLevel<B: AccelerationBackend> {
    structure: B::Structure,
    /// Arena buffer the structure lives in
    storage: Slot<B::Buffer>,
    geometry: GeometryDescription,
    sizes: BuildSizes,
}

struct TopLevel<B: AccelerationBackend> {
    structure: B::Structure,
    storage: Slot<B::Buffer>,
    instances: Slot<B::Buffer>,
    sizes: BuildSizes,
    address: u64,
}

/// Builds one bottom-level structure per scene object and a single top-level structure over
/// them.
///
/// Every buffer backing a structure lives in an arena owned by the builder, and every structure
/// records which arena slot backs it. All builds share one scratch buffer, so they never run
/// concurrently: builds inside a batch are separated by barriers and each batch is waited on
/// before the next is submitted.
pub struct AccelerationStructureBuilder<B: AccelerationBackend> {
    config: BuilderConfig,
    bottom_levels: Vec<BottomLevel<B>>,
    top_level: Option<TopLevel<B>>,
    instances: Vec<InstanceRecord>,
    batches: Vec<Range<usize>>,
    scratch: ScratchBuffer<B::Buffer>,
    arena: SlotMap<B::Buffer>,
    backend: B,
}

impl<B: AccelerationBackend> AccelerationStructureBuilder<B> {
    /// Builds every structure for `scene` before returning.
    ///
    /// Fails without leaving anything allocated if the scene is empty, the device cannot build
    /// acceleration structures or it reports unusable build sizes.
    pub fn new(backend: B, scene: &Scene, config: BuilderConfig) -> Result<Self> {
        if scene.is_empty() {
            tracing::error!("Refusing to build acceleration structures for an empty scene");
            return Err(RenderError::EmptyScene.into());
        }
        if let Err(error) = check_instance_count(scene.len()) {
            tracing::error!("{}", error);
            return Err(error.into());
        }
        if !backend.supports_ray_tracing() {
            tracing::error!("Acceleration structures requested on a device without support");
            return Err(RenderError::RayTracingUnsupported.into());
        }

        let mut builder = Self {
            config,
            bottom_levels: Vec::with_capacity(scene.len()),
            top_level: None,
            instances: Vec::with_capacity(scene.len()),
            batches: Vec::new(),
            scratch: ScratchBuffer::new(),
            arena: SlotMap::default(),
            backend,
        };
        // on error the partially built state is torn down by Drop
        builder.build_bottom_levels(scene)?;
        builder.build_top_level(scene)?;
        tracing::debug!(
            "Built {} bottom-level structures in {} batches, scratch is {} bytes",
            builder.bottom_levels.len(),
            builder.batches.len(),
            builder.scratch.capacity()
        );
        Ok(builder)
    }

    fn build_bottom_levels(&mut self, scene: &Scene) -> Result<()> {
        let mut sizes = Vec::with_capacity(scene.len());
        let mut max_scratch = 0;
        for (index, object) in scene.objects().iter().enumerate() {
            let object_sizes = self.backend.bottom_level_sizes(&object.geometry)?;
            if !object_sizes.is_valid() {
                tracing::error!(
                    "Device reported {:?} for bottom-level structure {}",
                    object_sizes,
                    index
                );
                return Err(RenderError::InvalidBuildSizes {
                    what: "bottom-level",
                }
                .into());
            }
            let object_sizes = object_sizes.aligned(self.config.size_alignment);
            max_scratch = max_scratch.max(object_sizes.build_scratch_size);
            sizes.push(object_sizes);
        }

        for (object, sizes) in scene.objects().iter().zip(sizes) {
            let buffer = self
                .backend
                .create_buffer(sizes.structure_size, BufferUsage::Storage)?;
            let storage = self.arena.insert(buffer);
            let structure = self.backend.create_structure(
                StructureLevel::Bottom,
                self.arena.try_get(storage)?,
                sizes.structure_size,
            )?;
            self.bottom_levels.push(BottomLevel {
                structure,
                storage,
                geometry: object.geometry,
                sizes,
            });
        }

        let structure_sizes: Vec<u64> = self
            .bottom_levels
            .iter()
            .map(|blas| blas.sizes.structure_size)
            .collect();
        self.batches = partition(&structure_sizes, self.config.batch_ceiling);

        let scratch = self.scratch.ensure(&mut self.backend, max_scratch)?;
        for (index, batch) in self.batches.iter().enumerate() {
            let mut steps = Vec::with_capacity(batch.len() * 2);
            for blas in &self.bottom_levels[batch.clone()] {
                steps.push(BuildStep::Bottom {
                    structure: &blas.structure,
                    geometry: &blas.geometry,
                    scratch,
                });
                steps.push(BuildStep::Barrier);
            }
            self.backend.execute(&steps)?;
            tracing::trace!(
                "Bottom-level batch {} built structures {:?}",
                index,
                batch
            );
        }
        Ok(())
    }

    fn build_top_level(&mut self, scene: &Scene) -> Result<()> {
        self.instances = self
            .bottom_levels
            .iter()
            .zip(scene.objects())
            .enumerate()
            .map(|(index, (blas, object))| InstanceRecord {
                transform: pack_transform(&object.transform),
                custom_index: index as u32,
                mask: self.config.instance_mask,
                flags: self.config.instance_flags,
                structure_address: self.backend.structure_address(&blas.structure),
            })
            .collect();

        let sizes = self.backend.top_level_sizes(self.instances.len() as u32)?;
        if !sizes.is_valid() {
            tracing::error!("Device reported {:?} for the top-level structure", sizes);
            return Err(RenderError::InvalidBuildSizes { what: "top-level" }.into());
        }
        let sizes = sizes.aligned(self.config.size_alignment);

        let bytes = encode_instances(&self.instances);
        let mut instance_buffer = self
            .backend
            .create_buffer(bytes.len() as u64, BufferUsage::Instances)?;
        let written = self.backend.write_buffer(&mut instance_buffer, &bytes);
        let instances = self.arena.insert(instance_buffer);
        written?;

        let storage_buffer = self
            .backend
            .create_buffer(sizes.structure_size, BufferUsage::Storage)?;
        let storage = self.arena.insert(storage_buffer);
        let structure = self.backend.create_structure(
            StructureLevel::Top,
            self.arena.try_get(storage)?,
            sizes.structure_size,
        )?;
        let address = self.backend.structure_address(&structure);
        self.top_level = Some(TopLevel {
            structure,
            storage,
            instances,
            sizes,
            address,
        });
        self.execute_top_level(BuildMode::Build)
    }

    fn execute_top_level(&mut self, mode: BuildMode) -> Result<()> {
        let top = self
            .top_level
            .as_ref()
            .ok_or(RenderError::MissingResource(
                ContainerErrors::NonexistentSlot,
            ))?;
        let scratch = self
            .scratch
            .ensure(&mut self.backend, top.sizes.scratch_size())?;
        let instances = self.arena.try_get(top.instances)?;
        self.backend.execute(&[BuildStep::Top {
            mode,
            structure: &top.structure,
            instances,
            instance_count: self.instances.len() as u32,
            scratch,
        }])
    }

    fn upload_instances(&mut self) -> Result<()> {
        let instances = self
            .top_level
            .as_ref()
            .map(|top| top.instances)
            .ok_or(RenderError::MissingResource(
                ContainerErrors::NonexistentSlot,
            ))?;
        let bytes = encode_instances(&self.instances);
        let buffer = self
            .arena
            .get_mut(instances)
            .ok_or(RenderError::MissingResource(
                ContainerErrors::NonexistentSlot,
            ))?;
        self.backend.write_buffer(buffer, &bytes)
    }

    /// Updates the transform of instance `index`; takes effect on the next
    /// [`Self::rebuild`] or [`Self::refit`]
    pub fn set_transform(&mut self, index: usize, transform: Affine3A) -> Result<()> {
        let count = self.instances.len();
        let instance = self
            .instances
            .get_mut(index)
            .ok_or(RenderError::InstanceOutOfRange { index, count })?;
        instance.transform = pack_transform(&transform);
        Ok(())
    }

    /// Rewrites the instance buffer and builds the top-level structure again from scratch.
    ///
    /// Waits for the device first, since the structure and its instances are written in place.
    pub fn rebuild(&mut self) -> Result<()> {
        self.backend.wait_idle()?;
        self.upload_instances()?;
        self.execute_top_level(BuildMode::Build)
    }

    /// Rewrites the instance buffer and updates the top-level structure in place, which is
    /// cheaper than [`Self::rebuild`] when only transforms moved.
    ///
    /// Waits for the device first, same as [`Self::rebuild`].
    pub fn refit(&mut self) -> Result<()> {
        self.backend.wait_idle()?;
        self.upload_instances()?;
        self.execute_top_level(BuildMode::Update)
    }

    /// Frees the scratch buffer; the next build allocates exactly what it needs
    pub fn release_scratch(&mut self) {
        self.scratch.release(&mut self.backend);
    }

    pub fn top_level(&self) -> Option<&B::Structure> {
        self.top_level.as_ref().map(|top| &top.structure)
    }

    pub fn top_level_address(&self) -> u64 {
        self.top_level.as_ref().map(|top| top.address).unwrap_or(0)
    }

    pub fn bottom_level(&self, index: usize) -> Option<&B::Structure> {
        self.bottom_levels.get(index).map(|blas| &blas.structure)
    }

    /// Arena slot of the buffer backing bottom-level structure `index`
    pub fn bottom_level_storage(&self, index: usize) -> Option<Slot<B::Buffer>> {
        self.bottom_levels.get(index).map(|blas| blas.storage)
    }

    pub fn blas_count(&self) -> usize {
        self.bottom_levels.len()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn instances(&self) -> &[InstanceRecord] {
        &self.instances
    }

    /// Index shaders see for hits against instance `index`, correlating back to the scene object
    pub fn instance_custom_index(&self, index: usize) -> Option<u32> {
        self.instances.get(index).map(|instance| instance.custom_index)
    }

    /// Ranges of bottom-level structures that were submitted together
    pub fn batches(&self) -> &[Range<usize>] {
        &self.batches
    }

    pub fn scratch_size(&self) -> u64 {
        self.scratch.capacity()
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: AccelerationBackend> Drop for AccelerationStructureBuilder<B> {
    fn drop(&mut self) {
        if let Err(error) = self.backend.wait_idle() {
            tracing::error!("Failed to wait for device idle on teardown: {}", error);
        }
        if let Some(top) = self.top_level.take() {
            self.backend.destroy_structure(top.structure);
            for slot in [top.storage, top.instances] {
                if let Ok(buffer) = self.arena.remove(slot) {
                    self.backend.destroy_buffer(buffer);
                }
            }
        }
        for blas in self.bottom_levels.drain(..) {
            self.backend.destroy_structure(blas.structure);
        }
        self.scratch.release(&mut self.backend);
        for buffer in self.arena.drain() {
            self.backend.destroy_buffer(buffer);
        }
    }
}
