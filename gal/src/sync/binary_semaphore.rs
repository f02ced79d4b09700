use std::ptr;

use anyhow::Result;
use ash::vk;
use derivative::Derivative;

use crate::traits::Destructible;

/// GPU-side ordering between an acquire, a submission and a present
#[derive(Derivative)]
#[derivative(Debug)]
pub struct BinarySemaphore {
    handle: vk::Semaphore,
    #[derivative(Debug = "ignore")]
    device: crate::device::LogicalDevice,
}

impl BinarySemaphore {
    pub fn new(device: crate::device::LogicalDevice) -> Result<Self> {
        let semaphore_ci = vk::SemaphoreCreateInfo {
            s_type: vk::StructureType::SEMAPHORE_CREATE_INFO,
            p_next: ptr::null(),
            flags: vk::SemaphoreCreateFlags::empty(),
            _marker: Default::default(),
        };
        let handle = unsafe { device.get_handle().create_semaphore(&semaphore_ci, None)? };

        #[cfg(feature = "log-lifetimes")]
        tracing::trace!("Creating binary VkSemaphore {:p}", handle);

        Ok(Self { handle, device })
    }

    pub fn handle(&self) -> vk::Semaphore {
        self.handle
    }

    /// Wait or signal entry for `vkQueueSubmit2` at `stage_mask`
    pub fn submit_info(
        &self,
        stage_mask: vk::PipelineStageFlags2,
    ) -> vk::SemaphoreSubmitInfo<'static> {
        vk::SemaphoreSubmitInfo {
            s_type: vk::StructureType::SEMAPHORE_SUBMIT_INFO,
            p_next: ptr::null(),
            semaphore: self.handle,
            value: 0,
            stage_mask,
            device_index: 0,
            _marker: Default::default(),
        }
    }
}

impl Destructible for BinarySemaphore {
    fn destroy(&mut self) {
        if self.handle == vk::Semaphore::null() {
            return;
        }

        #[cfg(feature = "log-lifetimes")]
        tracing::trace!("Destroying binary VkSemaphore {:p}", self.handle);

        unsafe {
            self.device
                .get_handle()
                .destroy_semaphore(self.handle, None);
        }
        self.handle = vk::Semaphore::null();
    }
}

#[cfg(feature = "raii")]
impl Drop for BinarySemaphore {
    fn drop(&mut self) {
        self.destroy();
    }
}
