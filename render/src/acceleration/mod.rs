//! Two-level acceleration structures for ray queries against a compiled scene
pub mod backend;
pub mod batch;
pub mod builder;
pub mod config;
pub mod instance;
pub mod scratch;
pub mod vulkan;

pub use backend::{
    AccelerationBackend, BufferUsage, BuildMode, BuildSizes, BuildStep, GeometryDescription,
    StructureLevel,
};
pub use builder::AccelerationStructureBuilder;
pub use config::BuilderConfig;
pub use instance::InstanceRecord;
pub use scratch::ScratchBuffer;
pub use vulkan::{AccelerationBuffer, VulkanAccelerationBackend};
