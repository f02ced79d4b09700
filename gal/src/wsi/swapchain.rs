use std::ptr;

use anyhow::Result;
use ash::prelude::VkResult;
use ash::vk;
use derivative::Derivative;

use crate::traits::Destructible;

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Swapchain {
    handle: vk::SwapchainKHR,
    #[derivative(Debug = "ignore")]
    device: crate::device::LogicalDevice,

    format: vk::Format,
    color_space: vk::ColorSpaceKHR,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
    usage_flags: vk::ImageUsageFlags,
}

impl Swapchain {
    pub fn new(
        device: crate::device::LogicalDevice,
        swapchain_ci: &vk::SwapchainCreateInfoKHR,
    ) -> Result<Self> {
        let handle = unsafe { device.get_swapchain().create_swapchain(swapchain_ci, None)? };

        #[cfg(feature = "log-lifetimes")]
        tracing::trace!("Creating VkSwapchainKHR {:p}", handle);

        Ok(Self {
            handle,
            device,
            format: swapchain_ci.image_format,
            color_space: swapchain_ci.image_color_space,
            extent: swapchain_ci.image_extent,
            present_mode: swapchain_ci.present_mode,
            usage_flags: swapchain_ci.image_usage,
        })
    }

    /// Get the underlying [`VkSwapchainKHR`](vk::SwapchainKHR)
    pub fn get_handle(&self) -> &vk::SwapchainKHR {
        &self.handle
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    /// Images owned by the swapchain, indexed by acquired image index
    pub fn images(&self) -> Result<Vec<vk::Image>> {
        Ok(unsafe {
            self.device
                .get_swapchain()
                .get_swapchain_images(self.handle)?
        })
    }

    /// One 2D color view per swapchain image, in the same order.
    ///
    /// Views made before a failure are destroyed again before the error is returned.
    pub fn image_views(&self, images: &[vk::Image]) -> Result<Vec<vk::ImageView>> {
        let mut views = Vec::with_capacity(images.len());
        for image in images {
            let view_ci = vk::ImageViewCreateInfo {
                s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
                p_next: ptr::null(),
                flags: vk::ImageViewCreateFlags::empty(),
                image: *image,
                view_type: vk::ImageViewType::TYPE_2D,
                format: self.format,
                components: vk::ComponentMapping::default(),
                subresource_range: vk::ImageSubresourceRange {
                    level_count: 1,
                    layer_count: 1,
                    ..crate::resource::image::color_subresource_range()
                },
                _marker: Default::default(),
            };
            match unsafe { self.device.get_handle().create_image_view(&view_ci, None) } {
                Ok(view) => {
                    #[cfg(feature = "log-lifetimes")]
                    tracing::trace!("Creating VkImageView {:p}", view);
                    views.push(view);
                }
                Err(error) => {
                    self.destroy_image_views(&mut views);
                    return Err(error.into());
                }
            }
        }
        Ok(views)
    }

    /// Destroys views made by [`Swapchain::image_views`] and empties `views`
    pub fn destroy_image_views(&self, views: &mut Vec<vk::ImageView>) {
        for view in views.drain(..) {
            #[cfg(feature = "log-lifetimes")]
            tracing::trace!("Destroying VkImageView {:p}", view);
            unsafe {
                self.device.get_handle().destroy_image_view(view, None);
            }
        }
    }

    /// Acquires the next presentable image, signalling `semaphore` once it is ready.
    ///
    /// The raw [`VkResult`] is returned so callers can tell `ERROR_OUT_OF_DATE_KHR` apart. The
    /// boolean is true when the swapchain is suboptimal.
    pub fn acquire_next_image(
        &self,
        timeout: u64,
        semaphore: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        unsafe {
            self.device.get_swapchain().acquire_next_image(
                self.handle,
                timeout,
                semaphore,
                vk::Fence::null(),
            )
        }
    }

    /// Queues presentation. The boolean is true when the swapchain is suboptimal.
    pub fn present(&self, queue: vk::Queue, present_info: &vk::PresentInfoKHR) -> VkResult<bool> {
        unsafe { self.device.get_swapchain().queue_present(queue, present_info) }
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn color_space(&self) -> vk::ColorSpaceKHR {
        self.color_space
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    pub fn usage_flags(&self) -> vk::ImageUsageFlags {
        self.usage_flags
    }
}

impl Destructible for Swapchain {
    fn destroy(&mut self) {
        if self.handle == vk::SwapchainKHR::null() {
            return;
        }

        #[cfg(feature = "log-lifetimes")]
        tracing::trace!("Destroying VkSwapchainKHR {:p}", self.handle);

        unsafe {
            self.device
                .get_swapchain()
                .destroy_swapchain(self.handle, None);
        }
        self.handle = vk::SwapchainKHR::null();
    }
}

#[cfg(feature = "raii")]
impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy();
    }
}
