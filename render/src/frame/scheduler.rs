use anyhow::Result;
use kestrel_gal::ash::vk;

use crate::RenderError;
use crate::frame::surface::describe;
use crate::frame::{AcquireOutcome, PresentBackend, PresentOutcome, SchedulerConfig, SurfaceDescription};

/// Where a frame slot is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotPhase {
    Idle,
    Acquiring,
    Recording,
    Submitted,
    Presenting,
}

/// A frame handed out by [`FrameScheduler::acquire_frame`], to be given back through
/// [`FrameScheduler::submit_and_present`]
#[derive(Debug)]
pub struct FrameTarget<C> {
    pub command: C,
    pub image_index: u32,
    pub slot_index: usize,
    pub extent: vk::Extent2D,
}

/// Drives N frames in flight against a presentable surface.
///
/// Each slot's fence is waited on before the slot is reused, so the CPU is never more than N
/// frames ahead. Out of date and suboptimal surfaces are rebuilt internally and only show up to
/// the caller through [`FrameScheduler::is_stale`].
pub struct FrameScheduler<B: PresentBackend> {
    config: SchedulerConfig,
    slots: Vec<B::Slot>,
    phases: Vec<SlotPhase>,
    surface: Option<B::Surface>,
    description: Option<SurfaceDescription>,
    frame_index: usize,
    /// Image index of the frame currently being recorded
    acquired: Option<u32>,
    stale: bool,
    rebuild_pending: bool,
    window_extent: Option<vk::Extent2D>,
    backend: B,
}

impl<B: PresentBackend> FrameScheduler<B> {
    /// Creates the scheduler and its first surface.
    ///
    /// A minimized window is not an error here, the surface is created on the first
    /// [`FrameScheduler::acquire_frame`] that finds a usable extent.
    pub fn new(
        backend: B,
        config: SchedulerConfig,
        window_extent: Option<vk::Extent2D>,
    ) -> Result<Self> {
        let mut scheduler = Self {
            config,
            slots: Vec::new(),
            phases: Vec::new(),
            surface: None,
            description: None,
            frame_index: 0,
            acquired: None,
            stale: false,
            rebuild_pending: true,
            window_extent,
            backend,
        };
        match scheduler.rebuild_surface() {
            Ok(()) => {}
            Err(error) if is_transient(&error) => {}
            Err(error) => return Err(error),
        }
        // the first surface is not a change anyone has to react to
        scheduler.stale = false;
        Ok(scheduler)
    }

    /// Waits for the current slot to retire, then acquires the next presentable image.
    ///
    /// An out of date surface is rebuilt and acquisition retried once; failing again is fatal.
    pub fn acquire_frame(&mut self) -> Result<FrameTarget<B::Command>> {
        if self.acquired.is_some() {
            return Err(RenderError::FrameAlreadyAcquired.into());
        }
        if self.rebuild_pending || self.surface.is_none() {
            self.rebuild_surface()?;
        }

        let slot_index = self.frame_index;
        let mut outcome = self.wait_and_acquire(slot_index)?;
        if outcome == AcquireOutcome::OutOfDate {
            tracing::trace!("Surface out of date on acquire, rebuilding");
            self.phases[slot_index] = SlotPhase::Idle;
            self.rebuild_surface()?;
            outcome = self.wait_and_acquire(slot_index)?;
        }
        let image_index = match outcome {
            AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            } => {
                if suboptimal {
                    tracing::trace!("Surface suboptimal on acquire, rebuilding after present");
                    self.rebuild_pending = true;
                }
                image_index
            }
            AcquireOutcome::OutOfDate => {
                self.phases[slot_index] = SlotPhase::Idle;
                tracing::error!("Surface is still out of date after a rebuild");
                return Err(RenderError::SurfaceOutOfDate.into());
            }
        };

        let command = match self.surface.as_ref() {
            Some(surface) => {
                self.backend
                    .begin_recording(surface, &mut self.slots[slot_index], image_index)
            }
            None => Err(RenderError::FrameNotAcquired.into()),
        };
        let command = match command {
            Ok(command) => command,
            Err(error) => {
                self.phases[slot_index] = SlotPhase::Idle;
                return Err(error);
            }
        };
        self.phases[slot_index] = SlotPhase::Recording;
        self.acquired = Some(image_index);
        Ok(FrameTarget {
            command,
            image_index,
            slot_index,
            extent: self.current_extent(),
        })
    }

    /// Waits for `slot_index` to retire and acquires an image on it. A failure leaves the slot
    /// idle.
    fn wait_and_acquire(&mut self, slot_index: usize) -> Result<AcquireOutcome> {
        self.phases[slot_index] = SlotPhase::Acquiring;
        let outcome = self
            .backend
            .wait_for_slot(&self.slots[slot_index])
            .and_then(|()| {
                let surface = self.surface.as_ref().ok_or(RenderError::FrameNotAcquired)?;
                self.backend.acquire_image(surface, &self.slots[slot_index])
            });
        if outcome.is_err() {
            self.phases[slot_index] = SlotPhase::Idle;
        }
        outcome
    }

    /// Submits the recorded frame and presents it, then moves on to the next slot.
    ///
    /// The slot index advances even when presentation reports the surface as stale.
    pub fn submit_and_present(&mut self, target: FrameTarget<B::Command>) -> Result<()> {
        let slot_index = self.frame_index;
        match self.acquired {
            Some(image_index)
                if image_index == target.image_index && target.slot_index == slot_index => {}
            _ => return Err(RenderError::FrameNotAcquired.into()),
        }
        self.acquired = None;
        let surface = self.surface.as_ref().ok_or(RenderError::FrameNotAcquired)?;

        self.backend
            .submit(&mut self.slots[slot_index], target.command)?;
        self.phases[slot_index] = SlotPhase::Submitted;
        self.phases[slot_index] = SlotPhase::Presenting;
        let outcome = self
            .backend
            .present(surface, &self.slots[slot_index], target.image_index);
        self.phases[slot_index] = SlotPhase::Idle;
        self.frame_index = (self.frame_index + 1) % self.slots.len();

        match outcome? {
            PresentOutcome::Presented => {}
            PresentOutcome::Suboptimal => {
                tracing::trace!("Surface suboptimal on present");
                self.rebuild_pending = true;
            }
            PresentOutcome::OutOfDate => {
                tracing::trace!("Surface out of date on present");
                self.rebuild_pending = true;
            }
        }
        if self.rebuild_pending {
            match self.rebuild_surface() {
                Ok(()) => {}
                // retried by the next acquire
                Err(error) if is_transient(&error) => {}
                Err(error) => return Err(error),
            }
        }
        Ok(())
    }

    /// Drains the device, then recreates the surface and every frame slot.
    ///
    /// When the window is minimized nothing is destroyed, the rebuild stays pending and
    /// [`RenderError::SurfaceMinimized`] is returned.
    pub fn rebuild_surface(&mut self) -> Result<()> {
        if self.acquired.is_some() {
            return Err(RenderError::FrameAlreadyAcquired.into());
        }
        self.rebuild_pending = true;
        self.backend.wait_idle()?;

        let details = self.backend.query_surface()?;
        let description = match describe(&details, &self.config, self.window_extent) {
            Ok(description) => description,
            Err(RenderError::SurfaceMinimized) => {
                tracing::debug!("Surface has a zero extent, postponing rebuild");
                return Err(RenderError::SurfaceMinimized.into());
            }
            Err(error) => {
                tracing::error!("Surface cannot be used: {}", error);
                return Err(error.into());
            }
        };

        for slot in self.slots.drain(..) {
            self.backend.destroy_slot(slot);
        }
        if let Some(surface) = self.surface.take() {
            self.backend.destroy_surface(surface);
        }
        self.description = None;

        let surface = self.backend.create_surface(&description)?;
        let frames_in_flight = self.config.frames_in_flight();
        let mut slots = Vec::with_capacity(frames_in_flight);
        for index in 0..frames_in_flight {
            match self.backend.create_slot(index) {
                Ok(slot) => slots.push(slot),
                Err(error) => {
                    for slot in slots {
                        self.backend.destroy_slot(slot);
                    }
                    self.backend.destroy_surface(surface);
                    return Err(error);
                }
            }
        }

        tracing::debug!(
            "Rebuilt surface at {}x{} with {} images and {} frames in flight",
            description.extent.width,
            description.extent.height,
            self.backend.image_count(&surface),
            frames_in_flight
        );
        self.slots = slots;
        self.phases = vec![SlotPhase::Idle; frames_in_flight];
        self.surface = Some(surface);
        self.description = Some(description);
        // a shrunk slot count must not leave the index dangling
        self.frame_index %= frames_in_flight;
        self.stale = true;
        self.rebuild_pending = false;
        Ok(())
    }

    /// True once after every surface rebuild; reading it clears it
    pub fn is_stale(&mut self) -> bool {
        std::mem::take(&mut self.stale)
    }

    /// Extent of the current surface, zero while none exists
    pub fn current_extent(&self) -> vk::Extent2D {
        self.description
            .map(|description| description.extent)
            .unwrap_or_default()
    }

    /// Ask for the surface to be rebuilt before the next frame
    pub fn request_rebuild(&mut self) {
        self.rebuild_pending = true;
    }

    /// Records the window's new size and schedules a rebuild
    pub fn set_window_extent(&mut self, extent: vk::Extent2D) {
        self.window_extent = Some(extent);
        self.rebuild_pending = true;
    }

    pub fn frames_in_flight(&self) -> usize {
        self.config.frames_in_flight()
    }

    /// Slot the next acquired frame will use
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    pub fn previous_frame_index(&self) -> usize {
        let frames_in_flight = self.frames_in_flight();
        (self.frame_index + frames_in_flight - 1) % frames_in_flight
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn slot_phase(&self, index: usize) -> Option<SlotPhase> {
        self.phases.get(index).copied()
    }

    pub fn surface_format(&self) -> Option<vk::SurfaceFormatKHR> {
        self.description.map(|description| description.format)
    }

    pub fn surface_description(&self) -> Option<&SurfaceDescription> {
        self.description.as_ref()
    }

    pub fn image_count(&self) -> usize {
        self.surface
            .as_ref()
            .map(|surface| self.backend.image_count(surface))
            .unwrap_or(0)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

fn is_transient(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<RenderError>()
        .is_some_and(RenderError::is_transient)
}

impl<B: PresentBackend> Drop for FrameScheduler<B> {
    fn drop(&mut self) {
        if let Err(error) = self.backend.wait_idle() {
            tracing::error!("Failed to wait for device idle on teardown: {}", error);
        }
        for slot in self.slots.drain(..) {
            self.backend.destroy_slot(slot);
        }
        if let Some(surface) = self.surface.take() {
            self.backend.destroy_surface(surface);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakePresentBackend, PresentEvent};

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    fn scheduler(frames_in_flight: usize) -> (FrameScheduler<FakePresentBackend>, FakePresentBackend) {
        let backend = FakePresentBackend::new();
        let handle = backend.clone();
        let scheduler = FrameScheduler::new(
            backend,
            SchedulerConfig {
                frames_in_flight,
                ..Default::default()
            },
            None,
        )
        .unwrap();
        (scheduler, handle)
    }

    fn run_frame(scheduler: &mut FrameScheduler<FakePresentBackend>) {
        let target = scheduler.acquire_frame().unwrap();
        scheduler.submit_and_present(target).unwrap();
    }

    #[test]
    fn test_construction_is_not_stale() {
        let (mut scheduler, backend) = scheduler(2);
        assert!(!scheduler.is_stale());
        assert_eq!(scheduler.slot_count(), 2);
        assert_eq!(scheduler.current_extent(), extent(800, 600));
        assert_eq!(scheduler.image_count(), 3);
        assert_eq!(backend.state().surfaces_created, 1);
    }

    #[test]
    fn test_frame_index_is_round_robin() {
        for frames_in_flight in 2..5 {
            let (mut scheduler, _) = scheduler(frames_in_flight);
            for frame in 0..(frames_in_flight * 3) {
                assert_eq!(scheduler.frame_index(), frame % frames_in_flight);
                let target = scheduler.acquire_frame().unwrap();
                assert_eq!(target.slot_index, frame % frames_in_flight);
                scheduler.submit_and_present(target).unwrap();
            }
        }
    }

    #[test]
    fn test_at_most_n_frames_pending() {
        for frames_in_flight in 2..5 {
            let (mut scheduler, backend) = scheduler(frames_in_flight);
            for _ in 0..20 {
                run_frame(&mut scheduler);
            }
            let state = backend.state();
            assert!(state.max_pending <= frames_in_flight);
            assert_eq!(state.max_pending, frames_in_flight);
            assert_eq!(state.reused_unsignaled, 0);
        }
    }

    #[test]
    fn test_acquire_waits_on_slot_before_acquiring() {
        let (mut scheduler, backend) = scheduler(2);
        backend.clear_events();
        run_frame(&mut scheduler);
        let events = backend.events();
        assert_eq!(
            &events[..4],
            &[
                PresentEvent::WaitSlot(0),
                PresentEvent::Acquire(0),
                PresentEvent::Begin(0),
                PresentEvent::Submit(0),
            ]
        );
        assert!(matches!(events[4], PresentEvent::Present(0, _)));
    }

    #[test]
    fn test_out_of_date_acquire_rebuilds_and_retries_once() {
        let (mut scheduler, backend) = scheduler(2);
        run_frame(&mut scheduler);
        backend.push_acquire(AcquireOutcome::OutOfDate);
        let target = scheduler.acquire_frame().unwrap();
        assert_eq!(target.slot_index, 1);
        scheduler.submit_and_present(target).unwrap();
        assert!(scheduler.is_stale());
        assert_eq!(backend.state().surfaces_created, 2);
        assert_eq!(scheduler.frame_index(), 0);
    }

    #[test]
    fn test_out_of_date_twice_is_fatal() {
        let (mut scheduler, backend) = scheduler(2);
        backend.push_acquire(AcquireOutcome::OutOfDate);
        backend.push_acquire(AcquireOutcome::OutOfDate);
        let error = scheduler.acquire_frame().unwrap_err();
        match error.downcast_ref::<RenderError>() {
            Some(RenderError::SurfaceOutOfDate) => {}
            other => panic!("Expected SurfaceOutOfDate, got {:?}", other),
        }
        // nothing is left acquired, a later frame can still go through
        run_frame(&mut scheduler);
    }

    #[test]
    fn test_suboptimal_acquire_rebuilds_after_present() {
        let (mut scheduler, backend) = scheduler(2);
        backend.push_acquire(AcquireOutcome::Acquired {
            image_index: 0,
            suboptimal: true,
        });
        let target = scheduler.acquire_frame().unwrap();
        assert!(!scheduler.is_stale());
        assert_eq!(backend.state().surfaces_created, 1);
        scheduler.submit_and_present(target).unwrap();
        assert_eq!(backend.state().surfaces_created, 2);
        assert!(scheduler.is_stale());
    }

    #[test]
    fn test_present_outcomes_trigger_rebuild() {
        for outcome in [PresentOutcome::OutOfDate, PresentOutcome::Suboptimal] {
            let (mut scheduler, backend) = scheduler(2);
            backend.push_present(outcome);
            run_frame(&mut scheduler);
            assert!(scheduler.is_stale());
            assert_eq!(scheduler.frame_index(), 1);
            assert_eq!(scheduler.slot_count(), 2);
        }
    }

    #[test]
    fn test_fatal_present_error_propagates() {
        let (mut scheduler, backend) = scheduler(2);
        backend.fail_present(vk::Result::ERROR_DEVICE_LOST);
        let target = scheduler.acquire_frame().unwrap();
        let error = scheduler.submit_and_present(target).unwrap_err();
        match error.downcast_ref::<kestrel_gal::GalError>() {
            Some(kestrel_gal::GalError::VkError(vk::Result::ERROR_DEVICE_LOST)) => {}
            other => panic!("Expected device lost, got {:?}", other),
        }
        assert_eq!(scheduler.frame_index(), 1);
    }

    #[test]
    fn test_resize_is_stale_exactly_once() {
        let (mut scheduler, backend) = scheduler(2);
        run_frame(&mut scheduler);
        backend.set_current_extent(extent(1024, 768));
        backend.push_present(PresentOutcome::OutOfDate);
        run_frame(&mut scheduler);
        assert!(scheduler.is_stale());
        assert!(!scheduler.is_stale());
        let target = scheduler.acquire_frame().unwrap();
        assert_eq!(target.extent, extent(1024, 768));
        scheduler.submit_and_present(target).unwrap();
        assert!(!scheduler.is_stale());
    }

    #[test]
    fn test_rebuild_keeps_slot_count_and_clamps_extent() {
        let (mut scheduler, backend) = scheduler(3);
        backend.set_current_extent(extent(u32::MAX, u32::MAX));
        scheduler.set_window_extent(extent(9000, 2));
        run_frame(&mut scheduler);
        assert_eq!(scheduler.slot_count(), 3);
        assert_eq!(scheduler.current_extent(), extent(4096, 16));
        let state = backend.state();
        assert_eq!(state.live_slots, 3);
        assert_eq!(state.live_surfaces, 1);
    }

    #[test]
    fn test_rebuild_destroys_old_slots_before_surface() {
        let (mut scheduler, backend) = scheduler(2);
        backend.clear_events();
        scheduler.rebuild_surface().unwrap();
        let events = backend.events();
        let position = |wanted: &PresentEvent| events.iter().position(|event| event == wanted);
        assert_eq!(backend.state().live_views, 3);
        let wait_idle = position(&PresentEvent::WaitIdle).unwrap();
        let destroy_slot = position(&PresentEvent::DestroySlot(0)).unwrap();
        let destroy_surface = position(&PresentEvent::DestroySurface(0)).unwrap();
        let create_slot = position(&PresentEvent::CreateSlot(0)).unwrap();
        assert!(wait_idle < destroy_slot);
        assert!(destroy_slot < destroy_surface);
        assert!(destroy_surface < create_slot);

        // views go with their surface
        drop(scheduler);
        let state = backend.state();
        assert_eq!(state.live_surfaces, 0);
        assert_eq!(state.live_views, 0);
    }

    #[test]
    fn test_minimized_after_out_of_date_present() {
        let (mut scheduler, backend) = scheduler(2);
        backend.set_current_extent(extent(0, 0));
        backend.push_present(PresentOutcome::OutOfDate);
        let target = scheduler.acquire_frame().unwrap();
        // the failed rebuild is not the caller's problem yet
        scheduler.submit_and_present(target).unwrap();
        assert_eq!(scheduler.frame_index(), 1);
        assert_eq!(backend.state().live_surfaces, 1);
        assert_eq!(backend.state().surfaces_created, 1);

        match scheduler.acquire_frame().unwrap_err().downcast_ref::<RenderError>() {
            Some(RenderError::SurfaceMinimized) => {}
            other => panic!("Expected SurfaceMinimized, got {:?}", other),
        }

        backend.set_current_extent(extent(300, 200));
        let target = scheduler.acquire_frame().unwrap();
        assert_eq!(target.extent, extent(300, 200));
        assert!(scheduler.is_stale());
        assert!(!scheduler.is_stale());
        scheduler.submit_and_present(target).unwrap();
        assert_eq!(backend.state().live_surfaces, 1);
    }

    #[test]
    fn test_failed_acquire_leaves_slot_idle() {
        let (mut scheduler, backend) = scheduler(2);
        backend.fail_acquire(vk::Result::ERROR_DEVICE_LOST);
        let error = scheduler.acquire_frame().unwrap_err();
        match error.downcast_ref::<kestrel_gal::GalError>() {
            Some(kestrel_gal::GalError::VkError(vk::Result::ERROR_DEVICE_LOST)) => {}
            other => panic!("Expected device lost, got {:?}", other),
        }
        assert_eq!(scheduler.slot_phase(0), Some(SlotPhase::Idle));
        assert_eq!(scheduler.frame_index(), 0);
        run_frame(&mut scheduler);
    }

    #[test]
    fn test_minimized_window_skips_frames() {
        let (mut scheduler, backend) = scheduler(2);
        run_frame(&mut scheduler);
        backend.set_current_extent(extent(0, 0));
        scheduler.request_rebuild();
        let error = scheduler.acquire_frame().unwrap_err();
        match error.downcast_ref::<RenderError>() {
            Some(error) if error.is_transient() => {}
            other => panic!("Expected SurfaceMinimized, got {:?}", other),
        }
        // the old surface survives until a usable extent comes back
        assert_eq!(backend.state().live_surfaces, 1);
        assert_eq!(backend.state().surfaces_created, 1);

        backend.set_current_extent(extent(640, 480));
        let target = scheduler.acquire_frame().unwrap();
        assert_eq!(target.extent, extent(640, 480));
        assert!(scheduler.is_stale());
        scheduler.submit_and_present(target).unwrap();
    }

    #[test]
    fn test_minimized_at_startup() {
        let backend = FakePresentBackend::new();
        backend.set_current_extent(extent(0, 0));
        let handle = backend.clone();
        let mut scheduler = FrameScheduler::new(backend, SchedulerConfig::default(), None).unwrap();
        assert_eq!(scheduler.current_extent(), extent(0, 0));
        assert_eq!(handle.state().surfaces_created, 0);
        handle.set_current_extent(extent(320, 200));
        run_frame(&mut scheduler);
        assert_eq!(scheduler.current_extent(), extent(320, 200));
    }

    #[test]
    fn test_misuse_is_rejected() {
        let (mut scheduler, _) = scheduler(2);
        let target = scheduler.acquire_frame().unwrap();
        match scheduler.acquire_frame().unwrap_err().downcast_ref::<RenderError>() {
            Some(RenderError::FrameAlreadyAcquired) => {}
            other => panic!("Expected FrameAlreadyAcquired, got {:?}", other),
        }
        scheduler.submit_and_present(target).unwrap();

        let (mut other, _) = self::scheduler(2);
        let stray = other.acquire_frame().unwrap();
        let stray = FrameTarget {
            command: stray.command,
            image_index: stray.image_index,
            slot_index: 0,
            extent: stray.extent,
        };
        match scheduler.submit_and_present(stray).unwrap_err().downcast_ref::<RenderError>() {
            Some(RenderError::FrameNotAcquired) => {}
            other => panic!("Expected FrameNotAcquired, got {:?}", other),
        }
    }

    #[test]
    fn test_phases_follow_the_cycle() {
        let (mut scheduler, _) = scheduler(2);
        assert_eq!(scheduler.slot_phase(0), Some(SlotPhase::Idle));
        let target = scheduler.acquire_frame().unwrap();
        assert_eq!(scheduler.slot_phase(0), Some(SlotPhase::Recording));
        scheduler.submit_and_present(target).unwrap();
        assert_eq!(scheduler.slot_phase(0), Some(SlotPhase::Idle));
        assert_eq!(scheduler.previous_frame_index(), 0);
    }

    #[test]
    fn test_drop_releases_everything() {
        let (mut scheduler, backend) = scheduler(2);
        run_frame(&mut scheduler);
        drop(scheduler);
        let state = backend.state();
        assert_eq!(state.live_slots, 0);
        assert_eq!(state.live_surfaces, 0);
        assert_eq!(state.pending.len(), 0);
    }
}
