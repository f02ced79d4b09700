use anyhow::Result;
use kestrel_gal::wsi::SurfaceDetails;

use crate::frame::SurfaceDescription;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired { image_index: u32, suboptimal: bool },
    OutOfDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

/// What the [`FrameScheduler`](crate::frame::FrameScheduler) needs from a presentation engine.
///
/// Out of date and suboptimal results are reported as outcomes, anything else that fails is an
/// error and treated as fatal.
pub trait PresentBackend {
    /// Per-slot command buffer, semaphores and fence
    type Slot;
    /// The swapchain and its images
    type Surface;
    /// Command recording target handed to the caller for one frame
    type Command;

    fn query_surface(&self) -> Result<SurfaceDetails>;

    fn create_surface(&mut self, description: &SurfaceDescription) -> Result<Self::Surface>;

    fn destroy_surface(&mut self, surface: Self::Surface);

    fn image_count(&self, surface: &Self::Surface) -> usize;

    /// New slots start with their fence signaled
    fn create_slot(&mut self, index: usize) -> Result<Self::Slot>;

    fn destroy_slot(&mut self, slot: Self::Slot);

    /// Blocks until the last submission from `slot` has finished
    fn wait_for_slot(&self, slot: &Self::Slot) -> Result<()>;

    fn acquire_image(&self, surface: &Self::Surface, slot: &Self::Slot) -> Result<AcquireOutcome>;

    fn begin_recording(
        &self,
        surface: &Self::Surface,
        slot: &mut Self::Slot,
        image_index: u32,
    ) -> Result<Self::Command>;

    /// Submits `command`, waiting on the slot's acquire semaphore and signalling its submit
    /// semaphore and fence
    fn submit(&self, slot: &mut Self::Slot, command: Self::Command) -> Result<()>;

    fn present(
        &self,
        surface: &Self::Surface,
        slot: &Self::Slot,
        image_index: u32,
    ) -> Result<PresentOutcome>;

    fn wait_idle(&self) -> Result<()>;
}
