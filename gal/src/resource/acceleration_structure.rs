use std::ptr;

use anyhow::Result;
use ash::vk;
use derivative::Derivative;

use crate::traits::Destructible;

/// A `VkAccelerationStructureKHR` placed inside a buffer the caller keeps alive
#[derive(Derivative)]
#[derivative(Debug)]
pub struct AccelerationStructure {
    handle: vk::AccelerationStructureKHR,
    ty: vk::AccelerationStructureTypeKHR,
    size: vk::DeviceSize,
    address: vk::DeviceAddress,
    #[derivative(Debug = "ignore")]
    device: crate::device::LogicalDevice,
}

pub enum AccelerationStructureCreateInfo {
    /// Places the structure at the start of `buffer`, which must be at least `size` bytes and
    /// created with `ACCELERATION_STRUCTURE_STORAGE_KHR`
    FromBuffer {
        device: crate::device::LogicalDevice,
        buffer: vk::Buffer,
        size: vk::DeviceSize,
        ty: vk::AccelerationStructureTypeKHR,
    },
}

impl AccelerationStructure {
    pub fn new(create_info: AccelerationStructureCreateInfo) -> Result<Self> {
        match create_info {
            AccelerationStructureCreateInfo::FromBuffer {
                device,
                buffer,
                size,
                ty,
            } => {
                let ext = device
                    .get_acceleration_structure()
                    .ok_or(crate::GalError::NoExtensionSupported)?;
                let handle = unsafe {
                    ext.create_acceleration_structure(
                        &vk::AccelerationStructureCreateInfoKHR {
                            s_type: vk::StructureType::ACCELERATION_STRUCTURE_CREATE_INFO_KHR,
                            p_next: ptr::null(),
                            create_flags: vk::AccelerationStructureCreateFlagsKHR::empty(),
                            buffer,
                            offset: 0,
                            size,
                            ty,
                            device_address: 0,
                            _marker: Default::default(),
                        },
                        None,
                    )?
                };

                #[cfg(feature = "log-lifetimes")]
                tracing::trace!("Created VkAccelerationStructure {:p}", handle);

                let address = unsafe {
                    ext.get_acceleration_structure_device_address(
                        &vk::AccelerationStructureDeviceAddressInfoKHR {
                            s_type:
                                vk::StructureType::ACCELERATION_STRUCTURE_DEVICE_ADDRESS_INFO_KHR,
                            p_next: ptr::null(),
                            acceleration_structure: handle,
                            _marker: Default::default(),
                        },
                    )
                };
                Ok(Self {
                    handle,
                    ty,
                    size,
                    address,
                    device,
                })
            }
        }
    }

    pub fn handle(&self) -> vk::AccelerationStructureKHR {
        self.handle
    }

    pub fn get_handle(&self) -> &vk::AccelerationStructureKHR {
        &self.handle
    }

    pub fn ty(&self) -> vk::AccelerationStructureTypeKHR {
        self.ty
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Address referenced by top-level instance records
    pub fn address(&self) -> vk::DeviceAddress {
        self.address
    }
}

impl Destructible for AccelerationStructure {
    fn destroy(&mut self) {
        if self.handle == vk::AccelerationStructureKHR::null() {
            return;
        }

        #[cfg(feature = "log-lifetimes")]
        tracing::trace!("Destroying VkAccelerationStructure {:p}", self.handle);

        if let Some(ext) = self.device.get_acceleration_structure() {
            unsafe {
                ext.destroy_acceleration_structure(self.handle, None);
            }
        }
        self.handle = vk::AccelerationStructureKHR::null();
    }
}

#[cfg(feature = "raii")]
impl Drop for AccelerationStructure {
    fn drop(&mut self) {
        self.destroy();
    }
}
