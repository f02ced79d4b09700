pub mod acceleration;
pub mod error;
pub mod frame;
pub mod scene;
#[cfg(test)]
pub(crate) mod testing;

pub use acceleration::{AccelerationStructureBuilder, BuilderConfig, VulkanAccelerationBackend};
pub use error::RenderError;
pub use frame::{FrameScheduler, FrameTarget, SchedulerConfig, VulkanPresentBackend};
pub use scene::{Scene, SceneObject};

// Re-exports
pub use {glam, kestrel_gal};
