use bytemuck::{Pod, Zeroable};
use glam::Affine3A;
use kestrel_gal::ash::vk;

use crate::RenderError;

/// Custom indices are 24 bits wide on the device, so instance `i` can only carry `i` below this
pub const MAX_INSTANCES: usize = 1 << 24;

/// Byte layout of `VkAccelerationStructureInstanceKHR`
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct RawInstance {
    transform: [f32; 12],
    custom_index_and_mask: u32,
    binding_offset_and_flags: u32,
    acceleration_structure_reference: u64,
}

/// CPU-side copy of one top-level instance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstanceRecord {
    /// Row-major 3x4 object-to-world transform
    pub transform: [f32; 12],
    /// Only the low 24 bits reach the device
    pub custom_index: u32,
    pub mask: u8,
    pub flags: vk::GeometryInstanceFlagsKHR,
    pub structure_address: u64,
}

impl InstanceRecord {
    pub const SIZE: usize = size_of::<RawInstance>();

    fn to_raw(self) -> RawInstance {
        RawInstance {
            transform: self.transform,
            custom_index_and_mask: (self.custom_index & 0x00FF_FFFF) | ((self.mask as u32) << 24),
            binding_offset_and_flags: (self.flags.as_raw() & 0xFF) << 24,
            acceleration_structure_reference: self.structure_address,
        }
    }
}

/// Converts glam's column-major affine into the row-major 3x4 matrix Vulkan expects
pub fn pack_transform(transform: &Affine3A) -> [f32; 12] {
    let columns = transform.to_cols_array_2d();
    let mut rows = [0.0; 12];
    for row in 0..3 {
        for column in 0..4 {
            rows[row * 4 + column] = columns[column][row];
        }
    }
    rows
}

/// Rejects scenes whose instance indices would not fit in the 24-bit custom index
pub fn check_instance_count(count: usize) -> Result<(), RenderError> {
    if count > MAX_INSTANCES {
        return Err(RenderError::TooManyInstances {
            count,
            max: MAX_INSTANCES,
        });
    }
    Ok(())
}

/// Tightly packed instance array ready for upload
pub fn encode_instances(records: &[InstanceRecord]) -> Vec<u8> {
    let raw: Vec<RawInstance> = records.iter().map(|record| record.to_raw()).collect();
    bytemuck::cast_slice(&raw).to_vec()
}
