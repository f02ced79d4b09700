//! In-memory backends that record what the schedulers and builders ask of the device
use std::cell::{Ref, RefCell, RefMut};
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use anyhow::Result;
use kestrel_gal::GalError;
use kestrel_gal::ash::vk;
use kestrel_gal::wsi::SurfaceDetails;

use crate::acceleration::{
    AccelerationBackend, BufferUsage, BuildMode, BuildSizes, BuildStep, GeometryDescription,
    StructureLevel,
};
use crate::frame::{AcquireOutcome, PresentBackend, PresentOutcome, SurfaceDescription};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresentEvent {
    QuerySurface,
    CreateSurface(usize),
    DestroySurface(usize),
    CreateSlot(usize),
    DestroySlot(usize),
    WaitSlot(usize),
    Acquire(usize),
    Begin(usize),
    Submit(usize),
    /// Slot, image
    Present(usize, u32),
    WaitIdle,
}

#[derive(Debug)]
pub struct FakePresentState {
    pub details: SurfaceDetails,
    pub acquire_script: VecDeque<std::result::Result<AcquireOutcome, vk::Result>>,
    pub present_script: VecDeque<std::result::Result<PresentOutcome, vk::Result>>,
    pub events: Vec<PresentEvent>,
    /// Slots submitted and not yet waited on
    pub pending: HashSet<usize>,
    pub max_pending: usize,
    /// Acquires or submits on a slot whose previous submission was never waited on
    pub reused_unsignaled: usize,
    pub surfaces_created: usize,
    pub live_surfaces: usize,
    pub live_slots: usize,
    /// Image views of every live surface
    pub live_views: usize,
    pub next_image: u32,
}

impl Default for FakePresentState {
    fn default() -> Self {
        Self {
            details: SurfaceDetails {
                capabilities: vk::SurfaceCapabilitiesKHR {
                    min_image_count: 2,
                    max_image_count: 8,
                    current_extent: vk::Extent2D {
                        width: 800,
                        height: 600,
                    },
                    min_image_extent: vk::Extent2D {
                        width: 16,
                        height: 16,
                    },
                    max_image_extent: vk::Extent2D {
                        width: 4096,
                        height: 4096,
                    },
                    max_image_array_layers: 1,
                    supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
                    current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                    supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
                    supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT
                        | vk::ImageUsageFlags::STORAGE
                        | vk::ImageUsageFlags::TRANSFER_SRC
                        | vk::ImageUsageFlags::TRANSFER_DST,
                },
                formats: vec![vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_UNORM,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                }],
                present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
            },
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
            events: Vec::new(),
            pending: HashSet::new(),
            max_pending: 0,
            reused_unsignaled: 0,
            surfaces_created: 0,
            live_surfaces: 0,
            live_slots: 0,
            live_views: 0,
            next_image: 0,
        }
    }
}

#[derive(Debug)]
pub struct FakeSurface {
    id: usize,
    image_count: usize,
    view_count: usize,
}

#[derive(Debug)]
pub struct FakeSlot {
    index: usize,
}

#[derive(Debug)]
pub struct FakeCommand {
    pub slot: usize,
    pub image_index: u32,
}

/// Presentation engine that never touches a device; clones share state
#[derive(Debug, Clone, Default)]
pub struct FakePresentBackend {
    state: Rc<RefCell<FakePresentState>>,
}

impl FakePresentBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Ref<'_, FakePresentState> {
        self.state.borrow()
    }

    pub fn events(&self) -> Vec<PresentEvent> {
        self.state.borrow().events.clone()
    }

    pub fn clear_events(&self) {
        self.state.borrow_mut().events.clear();
    }

    /// Next acquire reports `outcome` instead of handing out an image
    pub fn push_acquire(&self, outcome: AcquireOutcome) {
        self.state.borrow_mut().acquire_script.push_back(Ok(outcome));
    }

    pub fn fail_acquire(&self, result: vk::Result) {
        self.state.borrow_mut().acquire_script.push_back(Err(result));
    }

    pub fn push_present(&self, outcome: PresentOutcome) {
        self.state.borrow_mut().present_script.push_back(Ok(outcome));
    }

    pub fn fail_present(&self, result: vk::Result) {
        self.state.borrow_mut().present_script.push_back(Err(result));
    }

    pub fn set_current_extent(&self, extent: vk::Extent2D) {
        self.state.borrow_mut().details.capabilities.current_extent = extent;
    }

    fn record(&self, event: PresentEvent) {
        self.state.borrow_mut().events.push(event);
    }
}

impl PresentBackend for FakePresentBackend {
    type Slot = FakeSlot;
    type Surface = FakeSurface;
    type Command = FakeCommand;

    fn query_surface(&self) -> Result<SurfaceDetails> {
        self.record(PresentEvent::QuerySurface);
        Ok(self.state.borrow().details.clone())
    }

    fn create_surface(&mut self, description: &SurfaceDescription) -> Result<FakeSurface> {
        let mut state = self.state.borrow_mut();
        let id = state.surfaces_created;
        state.surfaces_created += 1;
        state.live_surfaces += 1;
        // one view per image, like the swapchain
        let image_count = description.image_count as usize;
        state.live_views += image_count;
        state.events.push(PresentEvent::CreateSurface(id));
        Ok(FakeSurface {
            id,
            image_count,
            view_count: image_count,
        })
    }

    fn destroy_surface(&mut self, surface: FakeSurface) {
        let mut state = self.state.borrow_mut();
        state.live_surfaces -= 1;
        state.live_views -= surface.view_count;
        state.events.push(PresentEvent::DestroySurface(surface.id));
    }

    fn image_count(&self, surface: &FakeSurface) -> usize {
        surface.image_count
    }

    fn create_slot(&mut self, index: usize) -> Result<FakeSlot> {
        let mut state = self.state.borrow_mut();
        state.live_slots += 1;
        state.events.push(PresentEvent::CreateSlot(index));
        Ok(FakeSlot { index })
    }

    fn destroy_slot(&mut self, slot: FakeSlot) {
        let mut state = self.state.borrow_mut();
        state.live_slots -= 1;
        state.pending.remove(&slot.index);
        state.events.push(PresentEvent::DestroySlot(slot.index));
    }

    fn wait_for_slot(&self, slot: &FakeSlot) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.pending.remove(&slot.index);
        state.events.push(PresentEvent::WaitSlot(slot.index));
        Ok(())
    }

    fn acquire_image(&self, surface: &FakeSurface, slot: &FakeSlot) -> Result<AcquireOutcome> {
        let mut state = self.state.borrow_mut();
        if state.pending.contains(&slot.index) {
            state.reused_unsignaled += 1;
        }
        state.events.push(PresentEvent::Acquire(slot.index));
        match state.acquire_script.pop_front() {
            Some(Ok(outcome)) => return Ok(outcome),
            Some(Err(result)) => return Err(GalError::VkError(result).into()),
            None => {}
        }
        let image_index = state.next_image % surface.image_count.max(1) as u32;
        state.next_image += 1;
        Ok(AcquireOutcome::Acquired {
            image_index,
            suboptimal: false,
        })
    }

    fn begin_recording(
        &self,
        _surface: &FakeSurface,
        slot: &mut FakeSlot,
        image_index: u32,
    ) -> Result<FakeCommand> {
        self.record(PresentEvent::Begin(slot.index));
        Ok(FakeCommand {
            slot: slot.index,
            image_index,
        })
    }

    fn submit(&self, slot: &mut FakeSlot, _command: FakeCommand) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if !state.pending.insert(slot.index) {
            state.reused_unsignaled += 1;
        }
        state.max_pending = state.max_pending.max(state.pending.len());
        state.events.push(PresentEvent::Submit(slot.index));
        Ok(())
    }

    fn present(
        &self,
        _surface: &FakeSurface,
        slot: &FakeSlot,
        image_index: u32,
    ) -> Result<PresentOutcome> {
        let mut state = self.state.borrow_mut();
        state
            .events
            .push(PresentEvent::Present(slot.index, image_index));
        match state.present_script.pop_front() {
            None => Ok(PresentOutcome::Presented),
            Some(Ok(outcome)) => Ok(outcome),
            Some(Err(result)) => Err(GalError::VkError(result).into()),
        }
    }

    fn wait_idle(&self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.pending.clear();
        state.events.push(PresentEvent::WaitIdle);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepRecord {
    Bottom {
        structure: u64,
        scratch: u64,
    },
    Top {
        mode: BuildMode,
        structure: u64,
        instance_count: u32,
        scratch: u64,
    },
    Barrier,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    CreateBuffer {
        id: u64,
        size: u64,
        usage: BufferUsage,
    },
    DestroyBuffer(u64),
    Write {
        id: u64,
        len: usize,
    },
    CreateStructure {
        id: u64,
        level: StructureLevel,
        size: u64,
    },
    DestroyStructure(u64),
    Execute(Vec<StepRecord>),
    WaitIdle,
}

#[derive(Debug)]
pub struct FakeAccelerationState {
    pub supports_ray_tracing: bool,
    pub bottom_sizes: BuildSizes,
    /// Report 64 bytes of storage and 100 bytes of scratch per vertex instead of `bottom_sizes`
    pub bottom_sizes_by_vertex_count: bool,
    pub top_sizes: BuildSizes,
    /// Id to (size, usage)
    pub live_buffers: HashMap<u64, (u64, BufferUsage)>,
    pub live_structures: HashMap<u64, StructureLevel>,
    pub writes: Vec<(u64, Vec<u8>)>,
    pub events: Vec<BuildEvent>,
    next_id: u64,
}

impl Default for FakeAccelerationState {
    fn default() -> Self {
        Self {
            supports_ray_tracing: true,
            bottom_sizes: BuildSizes {
                structure_size: 2048,
                build_scratch_size: 1024,
                update_scratch_size: 0,
            },
            bottom_sizes_by_vertex_count: false,
            top_sizes: BuildSizes {
                structure_size: 4096,
                build_scratch_size: 2048,
                update_scratch_size: 1024,
            },
            live_buffers: HashMap::new(),
            live_structures: HashMap::new(),
            writes: Vec::new(),
            events: Vec::new(),
            next_id: 1,
        }
    }
}

impl FakeAccelerationState {
    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

#[derive(Debug)]
pub struct FakeBuffer {
    pub id: u64,
    pub size: u64,
    pub usage: BufferUsage,
}

#[derive(Debug)]
pub struct FakeStructure {
    pub id: u64,
    pub level: StructureLevel,
    pub size: u64,
    pub address: u64,
}

/// Acceleration structure device that only keeps books; clones share state
#[derive(Debug, Clone, Default)]
pub struct FakeAccelerationBackend {
    state: Rc<RefCell<FakeAccelerationState>>,
}

impl FakeAccelerationBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Ref<'_, FakeAccelerationState> {
        self.state.borrow()
    }

    pub fn state_mut(&self) -> RefMut<'_, FakeAccelerationState> {
        self.state.borrow_mut()
    }

    pub fn events(&self) -> Vec<BuildEvent> {
        self.state.borrow().events.clone()
    }

    pub fn clear_events(&self) {
        self.state.borrow_mut().events.clear();
    }

    /// Bytes of the most recent buffer write
    pub fn last_write(&self) -> Option<Vec<u8>> {
        self.state
            .borrow()
            .writes
            .last()
            .map(|(_, bytes)| bytes.clone())
    }
}

impl AccelerationBackend for FakeAccelerationBackend {
    type Buffer = FakeBuffer;
    type Structure = FakeStructure;

    fn supports_ray_tracing(&self) -> bool {
        self.state.borrow().supports_ray_tracing
    }

    fn bottom_level_sizes(&self, geometry: &GeometryDescription) -> Result<BuildSizes> {
        let state = self.state.borrow();
        if state.bottom_sizes_by_vertex_count {
            let vertices = geometry.vertex_count as u64;
            return Ok(BuildSizes {
                structure_size: 64 * vertices,
                build_scratch_size: 100 * vertices,
                update_scratch_size: 0,
            });
        }
        Ok(state.bottom_sizes)
    }

    fn top_level_sizes(&self, _instance_count: u32) -> Result<BuildSizes> {
        Ok(self.state.borrow().top_sizes)
    }

    fn create_buffer(&mut self, size: u64, usage: BufferUsage) -> Result<FakeBuffer> {
        let mut state = self.state.borrow_mut();
        let id = state.next_id();
        state.live_buffers.insert(id, (size, usage));
        state
            .events
            .push(BuildEvent::CreateBuffer { id, size, usage });
        Ok(FakeBuffer { id, size, usage })
    }

    fn destroy_buffer(&mut self, buffer: FakeBuffer) {
        let mut state = self.state.borrow_mut();
        state.live_buffers.remove(&buffer.id);
        state.events.push(BuildEvent::DestroyBuffer(buffer.id));
    }

    fn write_buffer(&mut self, buffer: &mut FakeBuffer, bytes: &[u8]) -> Result<()> {
        if bytes.len() as u64 > buffer.size {
            return Err(GalError::InsufficientSpace.into());
        }
        let mut state = self.state.borrow_mut();
        state.writes.push((buffer.id, bytes.to_vec()));
        state.events.push(BuildEvent::Write {
            id: buffer.id,
            len: bytes.len(),
        });
        Ok(())
    }

    fn create_structure(
        &mut self,
        level: StructureLevel,
        buffer: &FakeBuffer,
        size: u64,
    ) -> Result<FakeStructure> {
        if size > buffer.size {
            return Err(GalError::InsufficientSpace.into());
        }
        let mut state = self.state.borrow_mut();
        let id = state.next_id();
        state.live_structures.insert(id, level);
        state
            .events
            .push(BuildEvent::CreateStructure { id, level, size });
        Ok(FakeStructure {
            id,
            level,
            size,
            address: 0x1_0000_0000 + id * 0x1000,
        })
    }

    fn destroy_structure(&mut self, structure: FakeStructure) {
        let mut state = self.state.borrow_mut();
        state.live_structures.remove(&structure.id);
        state.events.push(BuildEvent::DestroyStructure(structure.id));
    }

    fn structure_address(&self, structure: &FakeStructure) -> u64 {
        structure.address
    }

    fn execute(&self, steps: &[BuildStep<'_, Self>]) -> Result<()> {
        let records = steps
            .iter()
            .map(|step| match step {
                BuildStep::Bottom {
                    structure, scratch, ..
                } => StepRecord::Bottom {
                    structure: structure.id,
                    scratch: scratch.id,
                },
                BuildStep::Top {
                    mode,
                    structure,
                    instance_count,
                    scratch,
                    ..
                } => StepRecord::Top {
                    mode: *mode,
                    structure: structure.id,
                    instance_count: *instance_count,
                    scratch: scratch.id,
                },
                BuildStep::Barrier => StepRecord::Barrier,
            })
            .collect();
        self.state
            .borrow_mut()
            .events
            .push(BuildEvent::Execute(records));
        Ok(())
    }

    fn wait_idle(&self) -> Result<()> {
        self.state.borrow_mut().events.push(BuildEvent::WaitIdle);
        Ok(())
    }
}
