pub mod debug_messenger;
pub mod instance;

pub use debug_messenger::DebugMessenger;
pub use instance::{Instance, InstanceCreateInfo};
