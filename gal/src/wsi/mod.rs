/// Utilities relating to wsi and swapchain
pub mod surface;
pub mod swapchain;

pub use surface::{Surface, SurfaceDetails};
pub use swapchain::Swapchain;
