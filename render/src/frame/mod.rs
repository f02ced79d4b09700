//! Multi-buffered presentation: frame slots, swapchain rebuilds and staleness
pub mod backend;
pub mod config;
pub mod scheduler;
pub mod surface;
pub mod vulkan;

pub use backend::{AcquireOutcome, PresentBackend, PresentOutcome};
pub use config::SchedulerConfig;
pub use scheduler::{FrameScheduler, FrameTarget, SlotPhase};
pub use surface::SurfaceDescription;
pub use vulkan::{VulkanFrameCommand, VulkanFrameSlot, VulkanPresentBackend, VulkanSwapchain};
