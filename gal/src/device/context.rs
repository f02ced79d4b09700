use anyhow::Result;
use ash::vk;
use derivative::Derivative;

use crate::traits::Destructible;

/// Knobs used when bringing up a [`DeviceContext`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextConfig {
    pub application_name: String,
    pub enable_validation: bool,
    /// Fail instead of falling back to a device without acceleration structures
    pub require_ray_tracing: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            application_name: String::from("kestrel"),
            enable_validation: cfg!(debug_assertions),
            require_ray_tracing: false,
        }
    }
}

/// Everything needed to record and submit work on one device.
///
/// Extension loaders live on the [`LogicalDevice`](crate::device::LogicalDevice) held in here;
/// components get them by being handed the context.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct DeviceContext {
    // fields drop top to bottom: submission objects, then allocations, then the device itself
    immediate: crate::util::ImmediateSubmit,
    #[derivative(Debug = "ignore")]
    allocator: crate::allocators::GpuAllocator,
    queue: crate::device::Queue,
    device: crate::device::LogicalDevice,
    physical_device: crate::device::PhysicalDevice,
    instance: crate::core::Instance,
}

impl DeviceContext {
    pub fn new(
        instance: crate::core::Instance,
        surface: &crate::wsi::Surface,
        config: &ContextConfig,
    ) -> Result<Self> {
        let physical_device = crate::device::PhysicalDevice::select(&instance, surface)?;
        let ray_tracing = physical_device.supports_ray_tracing();
        if !ray_tracing {
            if config.require_ray_tracing {
                tracing::error!("Ray tracing was required, but the selected device lacks it");
                return Err(crate::GalError::NoExtensionSupported.into());
            }
            tracing::info!("Device does not support acceleration structures");
        }

        let device = crate::device::LogicalDevice::new(crate::device::LogicalDeviceCreateInfo {
            instance: &instance,
            physical_device: &physical_device,
            ray_tracing,
        })?;
        let queue = crate::device::Queue::new(device.clone(), physical_device.queue_family(), 0);
        let allocator =
            crate::allocators::GpuAllocator::new(&instance, device.clone(), &physical_device)?;
        let immediate = crate::util::ImmediateSubmit::new(device.clone(), queue.clone())?;

        Ok(Self {
            immediate,
            allocator,
            queue,
            device,
            physical_device,
            instance,
        })
    }

    pub fn instance(&self) -> &crate::core::Instance {
        &self.instance
    }

    pub fn physical_device(&self) -> &crate::device::PhysicalDevice {
        &self.physical_device
    }

    pub fn device(&self) -> &crate::device::LogicalDevice {
        &self.device
    }

    pub fn queue(&self) -> &crate::device::Queue {
        &self.queue
    }

    pub fn allocator(&self) -> &crate::allocators::GpuAllocator {
        &self.allocator
    }

    /// Whether the acceleration structure loader was resolved at device creation
    pub fn supports_ray_tracing(&self) -> bool {
        self.device.get_acceleration_structure().is_some()
    }

    /// Record work through `function`, submit it and block until it has finished
    pub fn immediate_submit<F: FnOnce(crate::util::ImmediateSubmitContext)>(
        &self,
        function: F,
    ) -> Result<()> {
        self.immediate.submit(function)
    }

    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        self.physical_device.get_memory_properties()
    }

    /// Memory type index allowed by `type_bits` with all of `flags`
    pub fn find_memory_type(&self, type_bits: u32, flags: vk::MemoryPropertyFlags) -> Result<u32> {
        Ok(
            crate::allocators::find_memory_type(self.memory_properties(), type_bits, flags)
                .ok_or(crate::GalError::NoSuitableMemoryType)?,
        )
    }

    pub fn wait_idle(&self) -> Result<()> {
        self.device.wait_idle()
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        if let Err(error) = self.device.wait_idle() {
            tracing::error!("Failed to wait for device idle on teardown: {}", error);
        }
        self.immediate.destroy();
    }
}
