use std::ffi::{c_char, CStr};
use std::ptr;
use std::sync::Arc;

use anyhow::Result;
use ash::vk;
use derivative::Derivative;

#[derive(Derivative)]
#[derivative(Debug)]
struct LogicalDeviceInner {
    #[derivative(Debug = "ignore")]
    handle: ash::Device,
    /// Swapchain function pointers
    #[derivative(Debug = "ignore")]
    swapchain: ash::khr::swapchain::Device,
    /// Acceleration structure function pointers, only present when the extension was enabled
    #[derivative(Debug = "ignore")]
    acceleration_structure: Option<ash::khr::acceleration_structure::Device>,
    /// Enabled extensions
    enabled_extensions: Vec<String>,
    /// Keeps the instance alive until the device is gone
    instance: crate::core::Instance,
}

impl Drop for LogicalDeviceInner {
    fn drop(&mut self) {
        #[cfg(feature = "log-lifetimes")]
        tracing::trace!("Destroying VkDevice {:p}", self.handle.handle());

        unsafe {
            self.handle.destroy_device(None);
        }
    }
}

/// Effectively the same as [`ash::Device`] with its resolved extension loaders.
///
/// Extension function pointers live here instead of in globals, so anything that needs them is
/// handed the device explicitly.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct LogicalDevice {
    inner: Arc<LogicalDeviceInner>,
}

impl PartialEq for LogicalDevice {
    fn eq(&self, other: &Self) -> bool {
        self.inner.handle.handle() == other.inner.handle.handle()
    }
}

impl Eq for LogicalDevice {}

pub struct LogicalDeviceCreateInfo<'a> {
    pub instance: &'a crate::core::Instance,
    pub physical_device: &'a crate::device::PhysicalDevice,
    /// Enables the acceleration structure extensions and features
    pub ray_tracing: bool,
}

impl LogicalDevice {
    pub fn new(device_ci: LogicalDeviceCreateInfo) -> Result<Self> {
        let priorities = [1.0f32];
        let queue_ci = vk::DeviceQueueCreateInfo {
            s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
            p_next: ptr::null(),
            flags: vk::DeviceQueueCreateFlags::empty(),
            queue_family_index: device_ci.physical_device.queue_family(),
            queue_count: 1,
            p_queue_priorities: priorities.as_ptr(),
            _marker: Default::default(),
        };

        let mut extensions: Vec<&CStr> = vec![ash::khr::swapchain::NAME];
        if device_ci.ray_tracing {
            extensions.extend(crate::device::physical_device::RAY_TRACING_EXTENSIONS);
        }
        let extension_ptrs: Vec<*const c_char> =
            extensions.iter().map(|extension| extension.as_ptr()).collect();

        let mut features12 = vk::PhysicalDeviceVulkan12Features::default()
            .buffer_device_address(true);
        let mut features13 = vk::PhysicalDeviceVulkan13Features::default()
            .synchronization2(true);
        let mut acceleration_structure_features =
            vk::PhysicalDeviceAccelerationStructureFeaturesKHR::default()
                .acceleration_structure(true);

        let mut create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(std::slice::from_ref(&queue_ci))
            .enabled_extension_names(&extension_ptrs)
            .push_next(&mut features12)
            .push_next(&mut features13);
        if device_ci.ray_tracing {
            create_info = create_info.push_next(&mut acceleration_structure_features);
        }

        let handle = unsafe {
            device_ci.instance.get_handle().create_device(
                device_ci.physical_device.handle(),
                &create_info,
                None,
            )?
        };

        #[cfg(feature = "log-lifetimes")]
        tracing::trace!("Creating VkDevice {:p}", handle.handle());

        let swapchain = ash::khr::swapchain::Device::new(device_ci.instance.get_handle(), &handle);
        let acceleration_structure = if device_ci.ray_tracing {
            Some(ash::khr::acceleration_structure::Device::new(
                device_ci.instance.get_handle(),
                &handle,
            ))
        } else {
            None
        };

        Ok(Self {
            inner: Arc::new(LogicalDeviceInner {
                handle,
                swapchain,
                acceleration_structure,
                enabled_extensions: extensions
                    .iter()
                    .map(|extension| extension.to_string_lossy().into_owned())
                    .collect(),
                instance: device_ci.instance.clone(),
            }),
        })
    }

    pub fn has_extension(&self, ext: &CStr) -> bool {
        let ext = ext.to_string_lossy();
        self.inner
            .enabled_extensions
            .iter()
            .any(|enabled| *enabled == ext)
    }

    /// Get reference to the underlying [`ash::Device`]
    pub fn get_handle(&self) -> &ash::Device {
        &self.inner.handle
    }

    pub fn get_instance(&self) -> &crate::core::Instance {
        &self.inner.instance
    }

    /// Get the swapchain ext
    pub fn get_swapchain(&self) -> &ash::khr::swapchain::Device {
        &self.inner.swapchain
    }

    /// Get the acceleration structure ext
    pub fn get_acceleration_structure(&self) -> Option<&ash::khr::acceleration_structure::Device> {
        self.inner.acceleration_structure.as_ref()
    }

    /// Blocks until every queue on the device is idle
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.inner.handle.device_wait_idle()? };
        Ok(())
    }

    /// Get strong ref count
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}
