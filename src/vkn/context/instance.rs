use crate::gpu::GpuError;
use ash::{ext::debug_utils, vk, Entry};
use std::{
    ffi::{CStr, CString},
    os::raw::{c_char, c_void},
    sync::Arc,
};

struct DebugMessenger {
    loader: debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

struct InstanceInner {
    // the loader library must stay open for as long as the instance lives
    _entry: Entry,
    instance: ash::Instance,
    debug: Option<DebugMessenger>,
}

impl Drop for InstanceInner {
    fn drop(&mut self) {
        unsafe {
            if let Some(debug) = self.debug.take() {
                debug
                    .loader
                    .destroy_debug_utils_messenger(debug.messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

#[derive(Clone)]
pub struct Instance(Arc<InstanceInner>);

impl std::ops::Deref for Instance {
    type Target = ash::Instance;
    fn deref(&self) -> &Self::Target {
        &self.0.instance
    }
}

impl Instance {
    /// Opens the Vulkan loader and creates an instance without any surface extensions.
    pub fn new(app_name: &str, enable_validation: bool) -> Result<Self, GpuError> {
        let entry = unsafe { Entry::load() }
            .map_err(|err| GpuError::Backend(format!("failed to load vulkan: {}", err)))?;

        let app_name = CString::new(app_name)
            .map_err(|_| GpuError::Backend("application name contains a nul byte".into()))?;
        let app_info = vk::ApplicationInfo::default()
            .application_name(app_name.as_c_str())
            .engine_name(c"re-terra")
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::make_api_version(0, 1, 2, 0));

        let validation_available = enable_validation && has_validation_layer(&entry);
        if enable_validation && !validation_available {
            log::warn!("VK_LAYER_KHRONOS_validation is not installed, running without it");
        }

        let mut extension_names: Vec<*const c_char> = Vec::new();
        let mut layer_names: Vec<*const c_char> = Vec::new();
        if validation_available {
            extension_names.push(debug_utils::NAME.as_ptr());
            layer_names.push(c"VK_LAYER_KHRONOS_validation".as_ptr());
        }

        let instance_create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_layer_names(&layer_names)
            .enabled_extension_names(&extension_names);

        let instance = unsafe { entry.create_instance(&instance_create_info, None)? };

        let debug = if validation_available {
            let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
                .message_severity(
                    vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                        | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                        | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                        | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                )
                .message_type(
                    vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                        | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE
                        | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
                )
                .pfn_user_callback(Some(vulkan_debug_callback));
            let loader = debug_utils::Instance::new(&entry, &instance);
            match unsafe { loader.create_debug_utils_messenger(&create_info, None) } {
                Ok(messenger) => Some(DebugMessenger { loader, messenger }),
                Err(err) => {
                    log::warn!("failed to create the debug messenger: {}", err);
                    None
                }
            }
        } else {
            None
        };

        Ok(Self(Arc::new(InstanceInner {
            _entry: entry,
            instance,
            debug,
        })))
    }

    pub fn as_raw(&self) -> &ash::Instance {
        &self.0.instance
    }
}

fn has_validation_layer(entry: &Entry) -> bool {
    let Ok(layers) = (unsafe { entry.enumerate_instance_layer_properties() }) else {
        return false;
    };
    layers.iter().any(|layer| {
        let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
        name == c"VK_LAYER_KHRONOS_validation"
    })
}

/// Messages above this level are dropped before they reach the logger.
const VALIDATION_LOG_LEVEL: log::Level = log::Level::Warn;

unsafe extern "system" fn vulkan_debug_callback(
    flag: vk::DebugUtilsMessageSeverityFlagsEXT,
    ty: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _: *mut c_void,
) -> vk::Bool32 {
    use vk::DebugUtilsMessageSeverityFlagsEXT as Flag;

    let message_level = match flag {
        Flag::VERBOSE => log::Level::Debug,
        Flag::INFO => log::Level::Info,
        Flag::WARNING => log::Level::Warn,
        _ => log::Level::Error,
    };
    if message_level > VALIDATION_LOG_LEVEL {
        return vk::FALSE;
    }
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }

    let message = CStr::from_ptr((*p_callback_data).p_message).to_string_lossy();
    // drop the trailing documentation link
    let short_message = match message.split_once(" (https://") {
        Some((msg, _)) => msg,
        None => &message,
    };
    let formatted = short_message
        .split('|')
        .map(|s| s.trim())
        .collect::<Vec<_>>()
        .join("\n");

    log::log!(message_level, "\n* [Validation] {:?}\n{}\n", ty, formatted);
    vk::FALSE
}
