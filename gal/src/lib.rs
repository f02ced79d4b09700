pub mod allocators;
pub mod command;
pub mod core;
pub mod device;
pub mod error;
pub mod resource;
pub mod sync;
pub mod traits;
pub mod util;
pub mod wsi;

pub use error::GalError;

// Re-exports
pub use gpu_allocator;
#[cfg(feature = "winit")]
pub use winit;
pub use {ash, ash_window, raw_window_handle};
