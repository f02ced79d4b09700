use anyhow::Result;
use ash::vk;

use crate::traits::Destructible;

/// Records a command buffer through a closure, submits it and blocks until the GPU is done
#[derive(Debug)]
pub struct ImmediateSubmit {
    fence: crate::sync::Fence,
    command_buffer: crate::command::CommandBuffer,
    command_pool: crate::command::CommandPool,
    device: crate::device::LogicalDevice,
    queue: crate::device::Queue,
}

#[derive(Debug)]
pub struct ImmediateSubmitContext<'a> {
    pub device: &'a crate::device::LogicalDevice,
    pub cmd: &'a crate::command::CommandBufferRecording,
    pub queue: &'a crate::device::Queue,
}

impl Destructible for ImmediateSubmit {
    fn destroy(&mut self) {
        self.fence.destroy();
        self.command_pool.destroy();
    }
}

impl ImmediateSubmit {
    pub fn new(device: crate::device::LogicalDevice, queue: crate::device::Queue) -> Result<Self> {
        let fence = crate::sync::Fence::signaled(device.clone())?;
        let command_pool = crate::command::CommandPool::new(
            device.clone(),
            &queue,
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )?;
        let command_buffer = command_pool.allocate_one()?;
        Ok(Self {
            fence,
            command_buffer,
            command_pool,
            device,
            queue,
        })
    }

    /// Immediately submit a function which fills out a command buffer.
    ///
    /// Returns once the submitted work has finished executing.
    pub fn submit<T: FnOnce(ImmediateSubmitContext)>(&self, function: T) -> Result<()> {
        self.fence.reset()?;
        self.command_buffer
            .reset(vk::CommandBufferResetFlags::empty())?;
        let cmd = self
            .command_buffer
            .clone()
            .begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        function(ImmediateSubmitContext {
            device: &self.device,
            cmd: &cmd,
            queue: &self.queue,
        });
        let cmd = cmd.end()?;
        let cmd_infos = [cmd.submit_info()];
        let submit_info =
            crate::command::CommandBufferExecutable::submit_info_sync(&cmd_infos, &[], &[]);
        cmd.submit(self.queue.handle(), &[submit_info], self.fence.handle())?;
        self.fence.wait()?;
        Ok(())
    }

    /// Get a reference to the underlying device
    pub fn get_device(&self) -> &crate::device::LogicalDevice {
        &self.device
    }

    pub fn get_queue(&self) -> &crate::device::Queue {
        &self.queue
    }
}

#[cfg(feature = "raii")]
impl Drop for ImmediateSubmit {
    fn drop(&mut self) {
        self.destroy();
    }
}
