use crate::traits::Destructible;
use anyhow::Result;
use ash::vk;
use std::ptr;

#[derive(Debug)]
pub struct CommandPool {
    handle: vk::CommandPool,
    device: crate::device::LogicalDevice,
}

impl CommandPool {
    pub fn new(
        device: crate::device::LogicalDevice,
        queue: &crate::device::Queue,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<Self> {
        let command_pool_ci = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            p_next: ptr::null(),
            flags,
            queue_family_index: queue.get_family_index(),
            _marker: Default::default(),
        };
        let handle = unsafe {
            device
                .get_handle()
                .create_command_pool(&command_pool_ci, None)?
        };

        #[cfg(feature = "log-lifetimes")]
        tracing::trace!("Created VkCommandPool {:p}", handle);

        Ok(Self { handle, device })
    }

    pub fn handle(&self) -> vk::CommandPool {
        self.handle
    }

    pub fn get_handle(&self) -> &vk::CommandPool {
        &self.handle
    }

    pub fn get_device(&self) -> &crate::device::LogicalDevice {
        &self.device
    }

    /// Allocate `count` primary command buffers
    pub fn allocate(&self, count: u32) -> Result<Vec<crate::command::CommandBuffer>> {
        let allocation_info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            p_next: ptr::null(),
            command_pool: self.handle,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: count,
            _marker: Default::default(),
        };
        Ok(unsafe {
            self.device
                .get_handle()
                .allocate_command_buffers(&allocation_info)
        }?
        .into_iter()
        .map(|buffer| crate::command::CommandBuffer::new(buffer, self.device.clone()))
        .collect::<Vec<crate::command::CommandBuffer>>())
    }

    /// Allocate exactly one primary command buffer
    pub fn allocate_one(&self) -> Result<crate::command::CommandBuffer> {
        self.allocate(1)?
            .pop()
            .ok_or_else(|| anyhow::Error::from(crate::GalError::VkError(vk::Result::ERROR_UNKNOWN)))
    }
}

impl Destructible for CommandPool {
    fn destroy(&mut self) {
        if self.handle == vk::CommandPool::null() {
            return;
        }

        #[cfg(feature = "log-lifetimes")]
        tracing::trace!("Destroying VkCommandPool {:p}", self.handle);

        unsafe {
            self.device
                .get_handle()
                .destroy_command_pool(self.handle, None);
        }
        self.handle = vk::CommandPool::null();
    }
}

#[cfg(feature = "raii")]
impl Drop for CommandPool {
    fn drop(&mut self) {
        self.destroy();
    }
}
