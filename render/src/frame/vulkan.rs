use std::ptr;
use std::sync::Arc;

use anyhow::Result;
use derivative::Derivative;
use kestrel_gal::ash::vk;
use kestrel_gal::command::{CommandBuffer, CommandBufferExecutable, CommandBufferRecording, CommandPool};
use kestrel_gal::device::DeviceContext;
use kestrel_gal::resource::image;
use kestrel_gal::sync::{BinarySemaphore, Fence};
use kestrel_gal::traits::Destructible;
use kestrel_gal::wsi::{Surface, SurfaceDetails, Swapchain};
use kestrel_gal::GalError;

use crate::RenderError;
use crate::frame::{AcquireOutcome, PresentBackend, PresentOutcome, SurfaceDescription};

/// Per frame in flight: its own command pool, the acquire and render semaphores and the fence
/// the CPU waits on before reusing any of it
#[derive(Debug)]
pub struct VulkanFrameSlot {
    index: usize,
    command_buffer: CommandBuffer,
    command_pool: CommandPool,
    render_fence: Fence,
    /// Signalled when the acquired image may be written
    swapchain_semaphore: BinarySemaphore,
    /// Signalled when rendering is done and the image may be presented
    render_semaphore: BinarySemaphore,
}

impl VulkanFrameSlot {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn render_fence(&self) -> &Fence {
        &self.render_fence
    }
}

#[derive(Debug)]
pub struct VulkanSwapchain {
    swapchain: Swapchain,
    images: Vec<vk::Image>,
    /// One per image, destroyed before the swapchain
    views: Vec<vk::ImageView>,
}

impl VulkanSwapchain {
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    pub fn views(&self) -> &[vk::ImageView] {
        &self.views
    }
}

/// Recording command buffer for one frame plus the swapchain image it targets.
///
/// The image starts in an undefined layout and is moved to `PRESENT_SRC_KHR` on submit, whatever
/// was recorded in between.
#[derive(Debug)]
pub struct VulkanFrameCommand {
    cmd: CommandBufferRecording,
    image: vk::Image,
    view: vk::ImageView,
    layout: vk::ImageLayout,
    extent: vk::Extent2D,
    format: vk::Format,
}

impl VulkanFrameCommand {
    pub fn cmd(&self) -> &CommandBufferRecording {
        &self.cmd
    }

    pub fn image(&self) -> vk::Image {
        self.image
    }

    /// Color view of the swapchain image, for use as an attachment
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Layout the swapchain image is in at this point of the recording
    pub fn layout(&self) -> vk::ImageLayout {
        self.layout
    }

    pub fn transition(&mut self, new_layout: vk::ImageLayout) {
        if self.layout == new_layout {
            return;
        }
        image::transition(&self.cmd, self.image, self.layout, new_layout);
        self.layout = new_layout;
    }

    /// Fills the whole swapchain image with `color`
    pub fn clear(&mut self, color: [f32; 4]) {
        self.transition(vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        image::clear_color(&self.cmd, self.image, color);
    }

    /// Scales `src` onto the swapchain image. `src` must already be in `TRANSFER_SRC_OPTIMAL`.
    pub fn present_image(&mut self, src: vk::Image, src_extent: vk::Extent2D) {
        self.transition(vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        image::blit(&self.cmd, src, src_extent, self.image, self.extent);
    }

    fn finish(mut self) -> Result<CommandBufferExecutable> {
        self.transition(vk::ImageLayout::PRESENT_SRC_KHR);
        self.cmd.end()
    }
}

/// Presents to a window surface through a swapchain on the context's queue
#[derive(Derivative)]
#[derivative(Debug)]
pub struct VulkanPresentBackend {
    surface: Surface,
    #[derivative(Debug = "ignore")]
    context: Arc<DeviceContext>,
}

impl VulkanPresentBackend {
    /// `surface` must be the one `context` was created against
    pub fn new(surface: Surface, context: Arc<DeviceContext>) -> Self {
        Self { surface, context }
    }

    pub fn context(&self) -> &Arc<DeviceContext> {
        &self.context
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }
}

impl PresentBackend for VulkanPresentBackend {
    type Slot = VulkanFrameSlot;
    type Surface = VulkanSwapchain;
    type Command = VulkanFrameCommand;

    fn query_surface(&self) -> Result<SurfaceDetails> {
        self.surface
            .query_details(self.context.physical_device().handle())
    }

    fn create_surface(&mut self, description: &SurfaceDescription) -> Result<VulkanSwapchain> {
        let swapchain_ci = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            p_next: ptr::null(),
            flags: vk::SwapchainCreateFlagsKHR::empty(),
            surface: self.surface.handle(),
            min_image_count: description.image_count,
            image_format: description.format.format,
            image_color_space: description.format.color_space,
            image_extent: description.extent,
            image_array_layers: 1,
            image_usage: description.image_usage,
            image_sharing_mode: vk::SharingMode::EXCLUSIVE,
            queue_family_index_count: 0,
            p_queue_family_indices: ptr::null(),
            pre_transform: description.pre_transform,
            composite_alpha: description.composite_alpha,
            present_mode: description.present_mode,
            clipped: vk::TRUE,
            // the previous swapchain is always gone by the time a new one is made
            old_swapchain: vk::SwapchainKHR::null(),
            _marker: std::marker::PhantomData,
        };
        let mut swapchain = Swapchain::new(self.context.device().clone(), &swapchain_ci)?;
        let images_and_views = swapchain
            .images()
            .and_then(|images| Ok((swapchain.image_views(&images)?, images)));
        let (views, images) = match images_and_views {
            Ok(images_and_views) => images_and_views,
            Err(error) => {
                swapchain.destroy();
                return Err(error);
            }
        };
        Ok(VulkanSwapchain {
            swapchain,
            images,
            views,
        })
    }

    fn destroy_surface(&mut self, mut surface: VulkanSwapchain) {
        surface.swapchain.destroy_image_views(&mut surface.views);
        surface.swapchain.destroy();
    }

    fn image_count(&self, surface: &VulkanSwapchain) -> usize {
        surface.images.len()
    }

    fn create_slot(&mut self, index: usize) -> Result<VulkanFrameSlot> {
        let device = self.context.device().clone();
        let command_pool = CommandPool::new(
            device.clone(),
            self.context.queue(),
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )?;
        let command_buffer = command_pool.allocate_one()?;
        let render_fence = Fence::signaled(device.clone())?;
        let swapchain_semaphore = BinarySemaphore::new(device.clone())?;
        let render_semaphore = BinarySemaphore::new(device)?;
        Ok(VulkanFrameSlot {
            index,
            command_buffer,
            command_pool,
            render_fence,
            swapchain_semaphore,
            render_semaphore,
        })
    }

    fn destroy_slot(&mut self, mut slot: VulkanFrameSlot) {
        slot.render_fence.destroy();
        slot.swapchain_semaphore.destroy();
        slot.render_semaphore.destroy();
        slot.command_pool.destroy();
    }

    fn wait_for_slot(&self, slot: &VulkanFrameSlot) -> Result<()> {
        slot.render_fence.wait()
    }

    fn acquire_image(
        &self,
        surface: &VulkanSwapchain,
        slot: &VulkanFrameSlot,
    ) -> Result<AcquireOutcome> {
        match surface
            .swapchain
            .acquire_next_image(u64::MAX, slot.swapchain_semaphore.handle())
        {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(result) => {
                tracing::error!(?result, "Failed to acquire next swapchain image");
                Err(GalError::VkError(result).into())
            }
        }
    }

    fn begin_recording(
        &self,
        surface: &VulkanSwapchain,
        slot: &mut VulkanFrameSlot,
        image_index: u32,
    ) -> Result<VulkanFrameCommand> {
        let (image, view) = surface
            .images
            .get(image_index as usize)
            .zip(surface.views.get(image_index as usize))
            .map(|(image, view)| (*image, *view))
            .ok_or(RenderError::FrameNotAcquired)?;
        slot.command_buffer
            .reset(vk::CommandBufferResetFlags::empty())?;
        let cmd = slot
            .command_buffer
            .clone()
            .begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        Ok(VulkanFrameCommand {
            cmd,
            image,
            view,
            layout: vk::ImageLayout::UNDEFINED,
            extent: surface.swapchain.extent(),
            format: surface.swapchain.format(),
        })
    }

    fn submit(&self, slot: &mut VulkanFrameSlot, command: VulkanFrameCommand) -> Result<()> {
        let cmd = command.finish()?;
        let cmd_infos = [cmd.submit_info()];
        let wait_semaphores = [slot
            .swapchain_semaphore
            .submit_info(vk::PipelineStageFlags2::ALL_COMMANDS)];
        let signal_semaphores = [slot
            .render_semaphore
            .submit_info(vk::PipelineStageFlags2::ALL_COMMANDS)];
        let submit_info =
            CommandBufferExecutable::submit_info_sync(&cmd_infos, &wait_semaphores, &signal_semaphores);
        // only reset after we are sure work will be submitted
        slot.render_fence.reset()?;
        cmd.submit(
            self.context.queue().handle(),
            &[submit_info],
            slot.render_fence.handle(),
        )?;
        Ok(())
    }

    fn present(
        &self,
        surface: &VulkanSwapchain,
        slot: &VulkanFrameSlot,
        image_index: u32,
    ) -> Result<PresentOutcome> {
        let swapchains = [surface.swapchain.handle()];
        let wait_semaphores = [slot.render_semaphore.handle()];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            p_next: ptr::null(),
            wait_semaphore_count: wait_semaphores.len() as u32,
            p_wait_semaphores: wait_semaphores.as_ptr(),
            swapchain_count: swapchains.len() as u32,
            p_swapchains: swapchains.as_ptr(),
            p_image_indices: image_indices.as_ptr(),
            p_results: ptr::null_mut(),
            _marker: Default::default(),
        };
        match surface
            .swapchain
            .present(self.context.queue().handle(), &present_info)
        {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(result) => {
                tracing::error!(?result, "queue_present failed");
                Err(GalError::VkError(result).into())
            }
        }
    }

    fn wait_idle(&self) -> Result<()> {
        self.context.wait_idle()
    }
}

impl Drop for VulkanPresentBackend {
    fn drop(&mut self) {
        self.surface.destroy();
    }
}
