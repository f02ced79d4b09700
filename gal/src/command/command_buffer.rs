//! Command buffers are divided into [`CommandBuffer`], [`CommandBufferRecording`] and
//! [`CommandBufferExecutable`].
//!
//! This type state ensures that no commands are submitted when they're not supposed to.
//! **Safety:** We do not make guarantees for Invalid command buffers. It is your responsibility to
//! deal with such.
use std::ptr;

use anyhow::Result;
use ash::vk;
use thiserror::Error;

/// Defines a command buffer in the failed state
#[derive(Debug, Error)]
#[error("Command buffer entered the invalid state: {reason}")]
pub struct CommandBufferInvalid {
    handle: vk::CommandBuffer,
    reason: crate::GalError,
}

impl CommandBufferInvalid {
    /// The command buffer left behind, only its pool can reclaim it now
    pub fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }

    pub fn error(&self) -> &crate::GalError {
        &self.reason
    }
}

#[derive(Debug, Clone)]
pub struct CommandBuffer {
    handle: vk::CommandBuffer,
    device: crate::device::LogicalDevice,
}

impl CommandBuffer {
    pub fn new(handle: vk::CommandBuffer, device: crate::device::LogicalDevice) -> Self {
        Self { handle, device }
    }

    /// If beginning fails for whatever reason, [`Err`] returns a [`CommandBufferInvalid`]
    /// containing the error details.
    pub fn begin(
        self,
        flags: vk::CommandBufferUsageFlags,
    ) -> Result<CommandBufferRecording, CommandBufferInvalid> {
        let cmd_begin = unsafe {
            self.device.get_handle().begin_command_buffer(
                self.handle,
                &vk::CommandBufferBeginInfo {
                    s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
                    p_next: ptr::null(),
                    flags,
                    p_inheritance_info: ptr::null(),
                    _marker: Default::default(),
                },
            )
        };
        match cmd_begin {
            Ok(()) => Ok(CommandBufferRecording {
                handle: self.handle,
                device: self.device,
            }),
            Err(result) => Err(CommandBufferInvalid {
                handle: self.handle,
                reason: crate::GalError::VkError(result),
            }),
        }
    }

    /// Resets the current command buffer
    pub fn reset(&self, flags: vk::CommandBufferResetFlags) -> Result<()> {
        unsafe {
            self.device
                .get_handle()
                .reset_command_buffer(self.handle, flags)?
        };
        Ok(())
    }

    pub fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }
}

#[derive(Debug)]
pub struct CommandBufferRecording {
    handle: vk::CommandBuffer,
    device: crate::device::LogicalDevice,
}

impl CommandBufferRecording {
    /// Ends recording into the command buffer
    pub fn end(self) -> Result<CommandBufferExecutable> {
        unsafe { self.device.get_handle().end_command_buffer(self.handle)? }
        Ok(CommandBufferExecutable {
            handle: self.handle,
            device: self.device,
        })
    }

    pub fn get_device(&self) -> &crate::device::LogicalDevice {
        &self.device
    }

    pub fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }
}

/// Command buffer is in its executable state and can now be executed via queue submission
#[derive(Debug)]
pub struct CommandBufferExecutable {
    handle: vk::CommandBuffer,
    device: crate::device::LogicalDevice,
}

impl CommandBufferExecutable {
    /// Quickly acquire a [`VkCommandBufferSubmitInfo`](vk::CommandBufferSubmitInfo) for
    /// this [`VkCommandBuffer`](vk::CommandBuffer).
    pub fn submit_info(&self) -> vk::CommandBufferSubmitInfo<'static> {
        vk::CommandBufferSubmitInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_SUBMIT_INFO,
            p_next: ptr::null(),
            command_buffer: self.handle,
            device_mask: 0,
            _marker: Default::default(),
        }
    }

    /// Submit with synchronization primitives
    pub fn submit_info_sync<'a>(
        cmd_submit_info: &'a [vk::CommandBufferSubmitInfo<'a>],
        wait_semaphores: &'a [vk::SemaphoreSubmitInfo<'a>],
        signal_semaphore: &'a [vk::SemaphoreSubmitInfo<'a>],
    ) -> vk::SubmitInfo2<'a> {
        vk::SubmitInfo2 {
            s_type: vk::StructureType::SUBMIT_INFO_2,
            p_next: ptr::null(),
            flags: vk::SubmitFlags::empty(),
            wait_semaphore_info_count: wait_semaphores.len() as u32,
            p_wait_semaphore_infos: wait_semaphores.as_ptr(),
            command_buffer_info_count: cmd_submit_info.len() as u32,
            p_command_buffer_infos: cmd_submit_info.as_ptr(),
            signal_semaphore_info_count: signal_semaphore.len() as u32,
            p_signal_semaphore_infos: signal_semaphore.as_ptr(),
            _marker: Default::default(),
        }
    }

    /// Submits the current command buffer to the queue
    pub fn submit(
        self,
        queue: vk::Queue,
        submit_infos: &[vk::SubmitInfo2],
        fence: vk::Fence,
    ) -> Result<CommandBuffer, CommandBufferInvalid> {
        let res = unsafe {
            self.device
                .get_handle()
                .queue_submit2(queue, submit_infos, fence)
        };
        match res {
            Ok(()) => Ok(CommandBuffer {
                handle: self.handle,
                device: self.device,
            }),
            Err(result) => Err(CommandBufferInvalid {
                handle: self.handle,
                reason: crate::GalError::VkError(result),
            }),
        }
    }

    pub fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }
}
