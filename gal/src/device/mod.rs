pub mod context;
pub mod logical_device;
pub mod physical_device;
pub mod queue;

pub use context::{ContextConfig, DeviceContext};
pub use logical_device::{LogicalDevice, LogicalDeviceCreateInfo};
pub use physical_device::PhysicalDevice;
pub use queue::Queue;
