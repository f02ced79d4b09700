use std::ptr;

use anyhow::Result;
use ash::vk;
use derivative::Derivative;

use crate::allocators::{GpuAllocation, GpuAllocator, MemoryLocation};
use crate::traits::Destructible;

/// A buffer backed by a [`GpuAllocator`] sub-allocation
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Buffer {
    handle: vk::Buffer,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    address: vk::DeviceAddress,
    allocation: Option<GpuAllocation>,
    #[derivative(Debug = "ignore")]
    device: crate::device::LogicalDevice,
}

pub enum BufferCreateInfo<'a> {
    /// Create a buffer with a new empty buffer with the requested size
    NewEmptyBuffer {
        device: crate::device::LogicalDevice,
        allocator: &'a GpuAllocator,
        size: vk::DeviceSize,
        location: MemoryLocation,
        usage_flags: vk::BufferUsageFlags,
        name: Option<&'a str>,
    },
}

impl Buffer {
    pub fn new(create_info: BufferCreateInfo) -> Result<Self> {
        match create_info {
            BufferCreateInfo::NewEmptyBuffer {
                device,
                allocator,
                size,
                location,
                usage_flags,
                name,
            } => {
                let handle = unsafe {
                    device.get_handle().create_buffer(
                        &vk::BufferCreateInfo {
                            s_type: vk::StructureType::BUFFER_CREATE_INFO,
                            p_next: ptr::null(),
                            flags: vk::BufferCreateFlags::empty(),
                            size,
                            usage: usage_flags,
                            sharing_mode: vk::SharingMode::EXCLUSIVE,
                            queue_family_index_count: 0,
                            p_queue_family_indices: ptr::null(),
                            _marker: Default::default(),
                        },
                        None,
                    )?
                };

                #[cfg(feature = "log-lifetimes")]
                tracing::trace!("Creating VkBuffer {:p}", handle);

                let mem_requirements =
                    unsafe { device.get_handle().get_buffer_memory_requirements(handle) };
                let allocation = match allocator.allocate(
                    name.unwrap_or("buffer"),
                    &mem_requirements,
                    location,
                ) {
                    Ok(allocation) => allocation,
                    Err(error) => {
                        unsafe { device.get_handle().destroy_buffer(handle, None) };
                        return Err(error);
                    }
                };
                let mut buffer = Self {
                    handle,
                    size,
                    usage: usage_flags,
                    address: 0,
                    allocation: Some(allocation),
                    device,
                };
                // from here on destroy() cleans up on the error paths
                let memory = buffer.allocation.as_ref().map(|allocation| {
                    allocation
                        .memory()
                        .map(|memory| (memory, allocation.offset()))
                });
                if let Some(memory) = memory {
                    let (memory, offset) = memory?;
                    unsafe {
                        buffer
                            .device
                            .get_handle()
                            .bind_buffer_memory(handle, memory, offset)?
                    };
                }
                if usage_flags.contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS) {
                    buffer.address = unsafe {
                        buffer.device.get_handle().get_buffer_device_address(
                            &vk::BufferDeviceAddressInfo {
                                s_type: vk::StructureType::BUFFER_DEVICE_ADDRESS_INFO,
                                p_next: ptr::null(),
                                buffer: handle,
                                _marker: Default::default(),
                            },
                        )
                    };
                }
                Ok(buffer)
            }
        }
    }

    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }

    pub fn get_handle(&self) -> &vk::Buffer {
        &self.handle
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    /// If the buffer was created with `SHADER_DEVICE_ADDRESS`, you are able to acquire the
    /// [`VkDeviceAddress`](vk::DeviceAddress) of the buffer, otherwise zero
    pub fn address(&self) -> vk::DeviceAddress {
        self.address
    }

    /// Writes `content` into a host-visible buffer at `offset`
    pub fn write(&mut self, offset: vk::DeviceSize, content: &[u8]) -> Result<()> {
        let end = offset
            .checked_add(content.len() as vk::DeviceSize)
            .ok_or(crate::GalError::InsufficientSpace)?;
        if end > self.size {
            return Err(crate::GalError::InsufficientSpace.into());
        }
        let mapped = self
            .allocation
            .as_mut()
            .and_then(|allocation| allocation.mapped_slice_mut())
            .ok_or(crate::GalError::NoMappedPointer)?;
        mapped[offset as usize..end as usize].copy_from_slice(content);
        Ok(())
    }

    /// Uploads `content` to the start of the buffer.
    ///
    /// Host-visible buffers are written directly, device-local ones go through a staging buffer
    /// and a one-shot copy. The buffer needs `TRANSFER_DST` for the latter.
    pub fn upload(
        &mut self,
        context: &crate::device::DeviceContext,
        content: &[u8],
    ) -> Result<()> {
        if content.len() as vk::DeviceSize > self.size {
            return Err(crate::GalError::InsufficientSpace.into());
        }
        let is_mapped = self
            .allocation
            .as_mut()
            .and_then(|allocation| allocation.mapped_slice_mut())
            .is_some();
        if is_mapped {
            return self.write(0, content);
        }

        let mut staging_buffer = Self::new(BufferCreateInfo::NewEmptyBuffer {
            device: self.device.clone(),
            allocator: context.allocator(),
            size: content.len() as vk::DeviceSize,
            location: MemoryLocation::CpuToGpu,
            usage_flags: vk::BufferUsageFlags::TRANSFER_SRC,
            name: Some("staging buffer"),
        })?;
        staging_buffer.write(0, content)?;
        let src_buffer = staging_buffer.handle();
        let dst_buffer = self.handle;
        let result = context.immediate_submit(|ctx| {
            let copy = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size: content.len() as vk::DeviceSize,
            };
            unsafe {
                ctx.device
                    .get_handle()
                    .cmd_copy_buffer(ctx.cmd.handle(), src_buffer, dst_buffer, &[copy]);
            }
        });
        staging_buffer.destroy();
        result
    }
}

impl Destructible for Buffer {
    fn destroy(&mut self) {
        if self.handle == vk::Buffer::null() {
            return;
        }

        #[cfg(feature = "log-lifetimes")]
        tracing::trace!("Destroying VkBuffer {:p}", self.handle);

        unsafe {
            self.device.get_handle().destroy_buffer(self.handle, None);
        }
        self.handle = vk::Buffer::null();
        if let Some(mut allocation) = self.allocation.take() {
            allocation.destroy();
        }
    }
}

#[cfg(feature = "raii")]
impl Drop for Buffer {
    fn drop(&mut self) {
        self.destroy();
    }
}
