use kestrel_gal::ash::vk;

/// 256 MiB of structure memory per submitted batch
pub const DEFAULT_BATCH_CEILING: u64 = 256 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuilderConfig {
    /// Upper bound on the summed structure size of one bottom-level batch
    pub batch_ceiling: u64,
    /// Structure and scratch sizes are rounded up to this
    pub size_alignment: u64,
    pub instance_mask: u8,
    pub instance_flags: vk::GeometryInstanceFlagsKHR,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            batch_ceiling: DEFAULT_BATCH_CEILING,
            size_alignment: 256,
            instance_mask: 0xFF,
            instance_flags: vk::GeometryInstanceFlagsKHR::TRIANGLE_FACING_CULL_DISABLE,
        }
    }
}
