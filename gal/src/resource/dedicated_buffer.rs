use std::ptr;

use anyhow::Result;
use ash::vk;
use derivative::Derivative;

use crate::traits::Destructible;

/// A buffer bound to its own `vkAllocateMemory` block instead of a shared allocator block.
///
/// Always device-local and device-addressable.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct DedicatedBuffer {
    handle: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    address: vk::DeviceAddress,
    #[derivative(Debug = "ignore")]
    device: crate::device::LogicalDevice,
}

impl DedicatedBuffer {
    pub fn new(
        device: crate::device::LogicalDevice,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> Result<Self> {
        let handle = unsafe {
            device.get_handle().create_buffer(
                &vk::BufferCreateInfo {
                    s_type: vk::StructureType::BUFFER_CREATE_INFO,
                    p_next: ptr::null(),
                    flags: vk::BufferCreateFlags::empty(),
                    size,
                    usage: usage | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
                    sharing_mode: vk::SharingMode::EXCLUSIVE,
                    queue_family_index_count: 0,
                    p_queue_family_indices: ptr::null(),
                    _marker: Default::default(),
                },
                None,
            )?
        };

        #[cfg(feature = "log-lifetimes")]
        tracing::trace!("Creating dedicated VkBuffer {:p}", handle);

        // the buffer is torn down through destroy() if anything below fails
        let mut buffer = Self {
            handle,
            memory: vk::DeviceMemory::null(),
            size,
            address: 0,
            device,
        };
        let requirements = unsafe {
            buffer
                .device
                .get_handle()
                .get_buffer_memory_requirements(handle)
        };
        let memory_type_index = crate::allocators::find_memory_type(
            memory_properties,
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )
        .ok_or(crate::GalError::NoSuitableMemoryType)?;

        let mut flags_info = vk::MemoryAllocateFlagsInfo::default()
            .flags(vk::MemoryAllocateFlags::DEVICE_ADDRESS);
        let mut dedicated_info = vk::MemoryDedicatedAllocateInfo::default().buffer(handle);
        let allocate_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index)
            .push_next(&mut flags_info)
            .push_next(&mut dedicated_info);
        buffer.memory = unsafe {
            buffer
                .device
                .get_handle()
                .allocate_memory(&allocate_info, None)?
        };
        unsafe {
            buffer
                .device
                .get_handle()
                .bind_buffer_memory(handle, buffer.memory, 0)?;
        }
        buffer.address = unsafe {
            buffer
                .device
                .get_handle()
                .get_buffer_device_address(&vk::BufferDeviceAddressInfo {
                    s_type: vk::StructureType::BUFFER_DEVICE_ADDRESS_INFO,
                    p_next: ptr::null(),
                    buffer: handle,
                    _marker: Default::default(),
                })
        };
        Ok(buffer)
    }

    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    pub fn address(&self) -> vk::DeviceAddress {
        self.address
    }
}

impl Destructible for DedicatedBuffer {
    fn destroy(&mut self) {
        if self.handle != vk::Buffer::null() {
            #[cfg(feature = "log-lifetimes")]
            tracing::trace!("Destroying dedicated VkBuffer {:p}", self.handle);

            unsafe {
                self.device.get_handle().destroy_buffer(self.handle, None);
            }
            self.handle = vk::Buffer::null();
        }
        if self.memory != vk::DeviceMemory::null() {
            unsafe {
                self.device.get_handle().free_memory(self.memory, None);
            }
            self.memory = vk::DeviceMemory::null();
        }
    }
}

#[cfg(feature = "raii")]
impl Drop for DedicatedBuffer {
    fn drop(&mut self) {
        self.destroy();
    }
}
