use std::ptr;

use anyhow::Result;
use ash::vk;
use derivative::Derivative;

use crate::traits::Destructible;

/// CPU-visible completion signal for one queue submission
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Fence {
    handle: vk::Fence,
    #[derivative(Debug = "ignore")]
    device: crate::device::LogicalDevice,
}

impl Fence {
    /// Creates the fence already signaled, so the first wait on it returns at once
    pub fn signaled(device: crate::device::LogicalDevice) -> Result<Self> {
        let fence_ci = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            p_next: ptr::null(),
            flags: vk::FenceCreateFlags::SIGNALED,
            _marker: Default::default(),
        };
        let handle = unsafe { device.get_handle().create_fence(&fence_ci, None)? };

        #[cfg(feature = "log-lifetimes")]
        tracing::trace!("Creating VkFence {:p}", handle);

        Ok(Self { handle, device })
    }

    pub fn handle(&self) -> vk::Fence {
        self.handle
    }

    /// Blocks until the submission guarded by this fence has retired
    pub fn wait(&self) -> Result<()> {
        unsafe {
            self.device
                .get_handle()
                .wait_for_fences(&[self.handle], true, u64::MAX)?;
        }
        Ok(())
    }

    /// Unsignals the fence; only call right before the submission that signals it again
    pub fn reset(&self) -> Result<()> {
        unsafe { self.device.get_handle().reset_fences(&[self.handle])? };
        Ok(())
    }
}

impl Destructible for Fence {
    fn destroy(&mut self) {
        if self.handle == vk::Fence::null() {
            return;
        }

        #[cfg(feature = "log-lifetimes")]
        tracing::trace!("Destroying VkFence {:p}", self.handle);

        unsafe {
            self.device.get_handle().destroy_fence(self.handle, None);
        }
        self.handle = vk::Fence::null();
    }
}

#[cfg(feature = "raii")]
impl Drop for Fence {
    fn drop(&mut self) {
        self.destroy();
    }
}
