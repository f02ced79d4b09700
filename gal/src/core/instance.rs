use std::ffi::{c_char, CStr, CString};
use std::ops::Deref;
use std::ptr;
use std::sync::Arc;

use anyhow::Result;
use ash::vk;
use derivative::Derivative;
use raw_window_handle::RawDisplayHandle;

use crate::traits::Destructible;

const ENGINE_NAME: &CStr = c"kestrel";
const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

#[derive(Derivative)]
#[derivative(Debug)]
struct InstanceInner {
    #[derivative(Debug = "ignore")]
    entry: ash::Entry,
    #[derivative(Debug = "ignore")]
    handle: ash::Instance,
    debug_messenger: Option<crate::core::DebugMessenger>,
}

impl Drop for InstanceInner {
    fn drop(&mut self) {
        // messenger has to go before the instance it was created from
        if let Some(mut messenger) = self.debug_messenger.take() {
            messenger.destroy();
        }

        #[cfg(feature = "log-lifetimes")]
        tracing::trace!("Destroying VkInstance {:p}", self.handle.handle());

        unsafe {
            self.handle.destroy_instance(None);
        }
    }
}

/// Represents a Vulkan Instance
///
/// Shared through an [`Arc`]: surfaces and logical devices hold a clone, so the instance is
/// destroyed only after every object created from it.
#[derive(Clone, Debug)]
pub struct Instance {
    inner: Arc<InstanceInner>,
}

#[derive(Debug, Clone)]
pub struct InstanceCreateInfo<'a> {
    pub application_name: &'a str,
    /// Display the instance must be able to create surfaces for
    pub display_handle: RawDisplayHandle,
    pub enable_validation: bool,
}

impl Instance {
    pub fn new(instance_ci: InstanceCreateInfo) -> Result<Self> {
        let entry = unsafe { ash::Entry::load()? };
        let application_name = CString::new(instance_ci.application_name)
            .map_err(|_| crate::GalError::StringContainsNull)?;

        let mut extensions: Vec<*const c_char> =
            ash_window::enumerate_required_extensions(instance_ci.display_handle)?.to_vec();
        let mut layers: Vec<*const c_char> = Vec::new();

        let enable_validation =
            instance_ci.enable_validation && Self::has_validation_layer(&entry)?;
        if instance_ci.enable_validation && !enable_validation {
            tracing::warn!("Validation was requested, but the validation layer is not installed");
        }
        if enable_validation {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
            layers.push(VALIDATION_LAYER.as_ptr());
        }

        let app_info = vk::ApplicationInfo {
            s_type: vk::StructureType::APPLICATION_INFO,
            p_next: ptr::null(),
            p_application_name: application_name.as_ptr(),
            application_version: vk::make_api_version(0, 0, 1, 0),
            p_engine_name: ENGINE_NAME.as_ptr(),
            engine_version: vk::make_api_version(0, 0, 1, 0),
            api_version: vk::API_VERSION_1_3,
            _marker: Default::default(),
        };
        let instance_ci = vk::InstanceCreateInfo {
            s_type: vk::StructureType::INSTANCE_CREATE_INFO,
            p_next: ptr::null(),
            flags: vk::InstanceCreateFlags::empty(),
            p_application_info: &app_info,
            enabled_layer_count: layers.len() as u32,
            pp_enabled_layer_names: layers.as_ptr(),
            enabled_extension_count: extensions.len() as u32,
            pp_enabled_extension_names: extensions.as_ptr(),
            _marker: Default::default(),
        };
        let handle = unsafe { entry.create_instance(&instance_ci, None)? };

        #[cfg(feature = "log-lifetimes")]
        tracing::trace!("Creating VkInstance {:p}", handle.handle());

        let debug_messenger = if enable_validation {
            match crate::core::DebugMessenger::new(&entry, &handle) {
                Ok(messenger) => Some(messenger),
                Err(error) => {
                    unsafe { handle.destroy_instance(None) };
                    return Err(error);
                }
            }
        } else {
            None
        };

        Ok(Self {
            inner: Arc::new(InstanceInner {
                entry,
                handle,
                debug_messenger,
            }),
        })
    }

    fn has_validation_layer(entry: &ash::Entry) -> Result<bool> {
        let layers = unsafe { entry.enumerate_instance_layer_properties()? };
        Ok(layers.iter().any(|layer| {
            layer
                .layer_name_as_c_str()
                .map(|name| name == VALIDATION_LAYER)
                .unwrap_or(false)
        }))
    }

    /// Get the [`ash::Entry`]
    pub fn get_entry(&self) -> &ash::Entry {
        &self.inner.entry
    }

    /// Get the [`ash::Instance`]
    pub fn get_handle(&self) -> &ash::Instance {
        &self.inner.handle
    }

    /// Whether validation messages are being forwarded
    pub fn validation_enabled(&self) -> bool {
        self.inner.debug_messenger.is_some()
    }
}

impl Deref for Instance {
    type Target = ash::Instance;

    fn deref(&self) -> &Self::Target {
        &self.inner.handle
    }
}
