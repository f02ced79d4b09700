use ash::vk;
use derivative::Derivative;

/// Represents a [`vk::Queue`] and its indices
#[derive(Clone, Derivative)]
#[derivative(Debug, PartialEq, Eq)]
pub struct Queue {
    handle: vk::Queue,
    family_index: u32,
    index: u32,
    #[derivative(Debug = "ignore", PartialEq = "ignore")]
    device: crate::device::LogicalDevice,
}

impl Queue {
    pub fn new(device: crate::device::LogicalDevice, family_index: u32, index: u32) -> Self {
        let handle = unsafe { device.get_handle().get_device_queue(family_index, index) };
        Self {
            handle,
            family_index,
            index,
            device,
        }
    }

    pub fn handle(&self) -> vk::Queue {
        self.handle
    }

    pub fn get_handle(&self) -> &vk::Queue {
        &self.handle
    }

    pub fn get_family_index(&self) -> u32 {
        self.family_index
    }

    pub fn get_index(&self) -> u32 {
        self.index
    }

    pub fn get_device(&self) -> &crate::device::LogicalDevice {
        &self.device
    }
}
