use std::sync::Arc;

use anyhow::Result;
use glam::{Affine3A, Quat, Vec3};
use kestrel_gal::allocators::MemoryLocation;
use kestrel_gal::ash::vk;
use kestrel_gal::device::DeviceContext;
use kestrel_gal::resource::{Buffer, BufferCreateInfo};
use kestrel_render::acceleration::GeometryDescription;
use kestrel_render::{
    AccelerationStructureBuilder, BuilderConfig, Scene, SceneObject, VulkanAccelerationBackend,
};

const SPACING: f32 = 3.0;

#[rustfmt::skip]
const CUBE_VERTICES: [[f32; 3]; 8] = [
    [-0.5, -0.5, -0.5], [0.5, -0.5, -0.5], [0.5, 0.5, -0.5], [-0.5, 0.5, -0.5],
    [-0.5, -0.5, 0.5], [0.5, -0.5, 0.5], [0.5, 0.5, 0.5], [-0.5, 0.5, 0.5],
];

#[rustfmt::skip]
const CUBE_INDICES: [u32; 36] = [
    0, 2, 1, 0, 3, 2,
    4, 5, 6, 4, 6, 7,
    0, 1, 5, 0, 5, 4,
    3, 7, 6, 3, 6, 2,
    0, 4, 7, 0, 7, 3,
    1, 2, 6, 1, 6, 5,
];

/// Grid of spinning cubes sharing one vertex and index buffer, with their acceleration structures
pub struct Cubes {
    // structures go before the geometry they were built from
    builder: AccelerationStructureBuilder<VulkanAccelerationBackend>,
    positions: Vec<Vec3>,
    _vertices: Buffer,
    _indices: Buffer,
}

fn geometry_buffer(context: &DeviceContext, name: &str, content: &[u8]) -> Result<Buffer> {
    let mut buffer = Buffer::new(BufferCreateInfo::NewEmptyBuffer {
        device: context.device().clone(),
        allocator: context.allocator(),
        size: content.len() as vk::DeviceSize,
        location: MemoryLocation::GpuOnly,
        usage_flags: vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR
            | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
            | vk::BufferUsageFlags::TRANSFER_DST,
        name: Some(name),
    })?;
    buffer.upload(context, content)?;
    Ok(buffer)
}

impl Cubes {
    pub fn new(context: &Arc<DeviceContext>, count: usize) -> Result<Self> {
        let vertices = geometry_buffer(
            context,
            "cube vertices",
            bytemuck::cast_slice(&CUBE_VERTICES),
        )?;
        let indices = geometry_buffer(context, "cube indices", bytemuck::cast_slice(&CUBE_INDICES))?;
        let geometry = GeometryDescription {
            vertex_address: vertices.address(),
            vertex_stride: size_of::<[f32; 3]>() as u64,
            vertex_count: CUBE_VERTICES.len() as u32,
            index_address: indices.address(),
            index_count: CUBE_INDICES.len() as u32,
            opaque: true,
        };

        let side = (count as f32).sqrt().ceil().max(1.0) as usize;
        let positions: Vec<Vec3> = (0..count)
            .map(|index| {
                Vec3::new(
                    (index % side) as f32 * SPACING,
                    0.0,
                    (index / side) as f32 * SPACING,
                )
            })
            .collect();
        let scene: Scene = positions
            .iter()
            .map(|position| {
                SceneObject::new(geometry).with_transform(Affine3A::from_translation(*position))
            })
            .collect();

        let builder = AccelerationStructureBuilder::new(
            VulkanAccelerationBackend::new(context.clone()),
            &scene,
            BuilderConfig::default(),
        )?;
        tracing::info!(
            "Built {} bottom-level structures in {} batches, top level at {:#x}",
            builder.blas_count(),
            builder.batches().len(),
            builder.top_level_address()
        );
        Ok(Self {
            builder,
            positions,
            _vertices: vertices,
            _indices: indices,
        })
    }

    /// Spins every cube to where it is `seconds` in, then refits the top level
    pub fn animate(&mut self, seconds: f32) -> Result<()> {
        for (index, position) in self.positions.iter().enumerate() {
            let rotation = Quat::from_rotation_y(seconds + index as f32 * 0.1);
            self.builder.set_transform(
                index,
                Affine3A::from_rotation_translation(rotation, *position),
            )?;
        }
        self.builder.refit()
    }
}
