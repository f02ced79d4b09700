use std::ffi::CStr;

use anyhow::Result;
use ash::vk;

/// Extensions required before a device can trace rays against acceleration structures
pub const RAY_TRACING_EXTENSIONS: [&CStr; 2] = [
    ash::khr::acceleration_structure::NAME,
    ash::khr::deferred_host_operations::NAME,
];

/// A physical device along with what we queried from it
#[derive(Debug, Clone)]
pub struct PhysicalDevice {
    handle: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    extensions: Vec<String>,
    queue_family: u32,
}

impl PhysicalDevice {
    /// Picks a Vulkan 1.3 device with a graphics queue able to present to `surface`.
    ///
    /// Discrete GPUs win over integrated ones; devices without `VK_KHR_swapchain` are skipped.
    pub fn select(instance: &crate::core::Instance, surface: &crate::wsi::Surface) -> Result<Self> {
        let candidates = unsafe { instance.get_handle().enumerate_physical_devices()? };
        let mut best: Option<(u32, Self)> = None;

        for handle in candidates {
            let properties = unsafe { instance.get_handle().get_physical_device_properties(handle) };
            if properties.api_version < vk::API_VERSION_1_3 {
                continue;
            }
            let extensions: Vec<String> =
                unsafe { instance.get_handle().enumerate_device_extension_properties(handle)? }
                    .iter()
                    .filter_map(|extension| {
                        extension
                            .extension_name_as_c_str()
                            .ok()
                            .map(|name| name.to_string_lossy().into_owned())
                    })
                    .collect();
            if !extensions.contains(&ash::khr::swapchain::NAME.to_string_lossy().into_owned()) {
                continue;
            }

            let families = unsafe {
                instance
                    .get_handle()
                    .get_physical_device_queue_family_properties(handle)
            };
            let mut queue_family = None;
            for (index, family) in families.iter().enumerate() {
                if !family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                    continue;
                }
                let can_present = unsafe {
                    surface.get_extension().get_physical_device_surface_support(
                        handle,
                        index as u32,
                        surface.handle(),
                    )?
                };
                if can_present {
                    queue_family = Some(index as u32);
                    break;
                }
            }
            let Some(queue_family) = queue_family else {
                continue;
            };

            let score = match properties.device_type {
                vk::PhysicalDeviceType::DISCRETE_GPU => 2,
                vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
                _ => 0,
            };
            if best.as_ref().map_or(true, |(best_score, _)| score > *best_score) {
                let memory_properties = unsafe {
                    instance
                        .get_handle()
                        .get_physical_device_memory_properties(handle)
                };
                best = Some((
                    score,
                    Self {
                        handle,
                        properties,
                        memory_properties,
                        extensions,
                        queue_family,
                    },
                ));
            }
        }

        let (_, device) = best.ok_or(crate::GalError::NoPhysicalDevice)?;
        tracing::info!(
            "Selected physical device {}",
            device
                .properties
                .device_name_as_c_str()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default()
        );
        Ok(device)
    }

    pub fn handle(&self) -> vk::PhysicalDevice {
        self.handle
    }

    pub fn get_handle(&self) -> &vk::PhysicalDevice {
        &self.handle
    }

    pub fn get_properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    pub fn get_memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    pub fn get_extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Graphics queue family which can also present
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    pub fn supports_extension(&self, name: &CStr) -> bool {
        let name = name.to_string_lossy();
        self.extensions.iter().any(|extension| *extension == name)
    }

    pub fn supports_ray_tracing(&self) -> bool {
        RAY_TRACING_EXTENSIONS
            .iter()
            .all(|extension| self.supports_extension(extension))
    }
}
