/// Wraps [`gpu_allocator`] so allocations can free themselves
use std::sync::{Arc, Mutex};

use anyhow::Result;
use ash::vk;
use derivative::Derivative;

use crate::traits::Destructible;

#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct GpuAllocator {
    // dropped before the device clone below
    #[derivative(Debug = "ignore")]
    handle: Arc<Mutex<gpu_allocator::vulkan::Allocator>>,
    device: crate::device::LogicalDevice,
}

impl GpuAllocator {
    pub fn new(
        instance: &crate::core::Instance,
        device: crate::device::LogicalDevice,
        physical_device: &crate::device::PhysicalDevice,
    ) -> Result<Self> {
        let allocator =
            gpu_allocator::vulkan::Allocator::new(&gpu_allocator::vulkan::AllocatorCreateDesc {
                instance: instance.get_handle().clone(),
                device: device.get_handle().clone(),
                physical_device: physical_device.handle(),
                debug_settings: Default::default(),
                buffer_device_address: true,
                allocation_sizes: Default::default(),
            })
            .map_err(crate::GalError::from)?;
        Ok(Self {
            handle: Arc::new(Mutex::new(allocator)),
            device,
        })
    }

    /// Create a new allocation
    pub fn allocate(
        &self,
        name: &str,
        requirements: &vk::MemoryRequirements,
        location: super::MemoryLocation,
    ) -> Result<GpuAllocation> {
        let allocation = self
            .handle
            .lock()
            .map_err(|_| crate::GalError::PoisonError)?
            .allocate(&gpu_allocator::vulkan::AllocationCreateDesc {
                name,
                requirements: *requirements,
                location: location.into(),
                linear: true,
                allocation_scheme: gpu_allocator::vulkan::AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(crate::GalError::from)?;

        #[cfg(feature = "log-lifetimes")]
        tracing::trace!("Allocated {} bytes for {}", allocation.size(), name);

        Ok(GpuAllocation {
            allocator: self.clone(),
            handle: Some(allocation),
        })
    }

    fn free(&self, allocation: gpu_allocator::vulkan::Allocation) -> Result<()> {
        self.handle
            .lock()
            .map_err(|_| crate::GalError::PoisonError)?
            .free(allocation)
            .map_err(crate::GalError::from)?;
        Ok(())
    }

    pub fn get_device(&self) -> &crate::device::LogicalDevice {
        &self.device
    }
}

/// A single sub-allocation, returned to the allocator on destroy
#[derive(Derivative)]
#[derivative(Debug)]
pub struct GpuAllocation {
    #[derivative(Debug = "ignore")]
    allocator: GpuAllocator,
    handle: Option<gpu_allocator::vulkan::Allocation>,
}

impl GpuAllocation {
    /// Get the underlying [`vk::DeviceMemory`]
    pub fn memory(&self) -> Result<vk::DeviceMemory> {
        self.handle
            .as_ref()
            .map(|allocation| unsafe { allocation.memory() })
            .ok_or_else(|| anyhow::Error::from(crate::GalError::NoMappedPointer))
    }

    /// Get the offset of the memory
    pub fn offset(&self) -> vk::DeviceSize {
        self.handle
            .as_ref()
            .map(|allocation| allocation.offset())
            .unwrap_or_default()
    }

    /// Host-visible view of the allocation, if it is mapped
    pub fn mapped_slice_mut(&mut self) -> Option<&mut [u8]> {
        self.handle
            .as_mut()
            .and_then(|allocation| allocation.mapped_slice_mut())
    }
}

impl Destructible for GpuAllocation {
    fn destroy(&mut self) {
        if let Some(allocation) = self.handle.take() {
            if let Err(error) = self.allocator.free(allocation) {
                tracing::error!("Failed to free allocation: {}", error);
            }
        }
    }
}

impl Drop for GpuAllocation {
    fn drop(&mut self) {
        self.destroy();
    }
}
