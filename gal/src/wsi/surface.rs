use anyhow::Result;
use ash::vk;
use derivative::Derivative;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::traits::Destructible;

/// What a physical device reports it can do with a [`Surface`] right now
#[derive(Debug, Clone, Default)]
pub struct SurfaceDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Surface {
    handle: vk::SurfaceKHR,
    #[derivative(Debug = "ignore")]
    ext: ash::khr::surface::Instance,
    /// Surfaces must be destroyed before their instance
    #[derivative(Debug = "ignore")]
    instance: crate::core::Instance,
}

impl Surface {
    /// Creates a surface for any window exposing raw window handles.
    ///
    /// Capabilities change with the window, so they are not cached; use
    /// [`Surface::query_details`] whenever they are needed.
    pub fn new<T>(instance: &crate::core::Instance, window: &T) -> Result<Self>
    where
        T: HasWindowHandle + HasDisplayHandle,
    {
        let ext = ash::khr::surface::Instance::new(instance.get_entry(), instance.get_handle());
        let handle = unsafe {
            ash_window::create_surface(
                instance.get_entry(),
                instance.get_handle(),
                window.display_handle()?.as_raw(),
                window.window_handle()?.as_raw(),
                None,
            )?
        };

        #[cfg(feature = "log-lifetimes")]
        tracing::trace!("Creating VkSurface {:p}", handle);

        Ok(Self {
            handle,
            ext,
            instance: instance.clone(),
        })
    }

    /// Query the current capabilities, formats and present modes against `physical_device`
    pub fn query_details(&self, physical_device: vk::PhysicalDevice) -> Result<SurfaceDetails> {
        unsafe {
            Ok(SurfaceDetails {
                capabilities: self
                    .ext
                    .get_physical_device_surface_capabilities(physical_device, self.handle)?,
                formats: self
                    .ext
                    .get_physical_device_surface_formats(physical_device, self.handle)?,
                present_modes: self
                    .ext
                    .get_physical_device_surface_present_modes(physical_device, self.handle)?,
            })
        }
    }

    /// Get a reference to the underlying [SurfaceKHR](vk::SurfaceKHR)
    pub fn get_handle(&self) -> &vk::SurfaceKHR {
        &self.handle
    }

    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Surface extension function pointers
    pub fn get_extension(&self) -> &ash::khr::surface::Instance {
        &self.ext
    }

    pub fn get_instance(&self) -> &crate::core::Instance {
        &self.instance
    }
}

impl Destructible for Surface {
    fn destroy(&mut self) {
        if self.handle == vk::SurfaceKHR::null() {
            return;
        }

        #[cfg(feature = "log-lifetimes")]
        tracing::trace!("Destroying VkSurface {:p}", self.handle);

        unsafe {
            self.ext.destroy_surface(self.handle, None);
        }
        self.handle = vk::SurfaceKHR::null();
    }
}

#[cfg(feature = "raii")]
impl Drop for Surface {
    fn drop(&mut self) {
        self.destroy();
    }
}
