//! Vulkan instance creation, validation messages and device selection.

use crate::capabilities::{device_local_memory_mb, supports_vulkan_1_3};
use crate::error::{GpuError, Result};
use ash::vk;
use raw_window_handle::RawDisplayHandle;
use std::borrow::Cow;
use std::ffi::{c_char, c_void, CStr, CString};

/// Instance extensions: the window system's surface extensions plus the
/// ones this renderer needs on top.
///
/// `surface_extensions` comes from [`surface_extensions`] and is empty for
/// a context that never presents.
pub fn required_instance_extensions(
    surface_extensions: &[*const c_char],
    enable_validation: bool,
) -> Vec<*const c_char> {
    let mut extensions = surface_extensions.to_vec();

    // Required for MoltenVK on macOS
    #[cfg(target_os = "macos")]
    extensions.push(ash::khr::portability_enumeration::NAME.as_ptr());

    if enable_validation {
        extensions.push(ash::ext::debug_utils::NAME.as_ptr());
    }

    extensions
}

/// Surface extensions the display's window system needs, as reported by
/// ash-window.
pub fn surface_extensions(display: RawDisplayHandle) -> Result<&'static [*const c_char]> {
    ash_window::enumerate_required_extensions(display)
        .map_err(|e| GpuError::SurfaceCreation(format!("Unsupported window system: {e}")))
}

/// Validation layers to enable in debug builds.
pub fn validation_layers() -> Vec<&'static CStr> {
    vec![c"VK_LAYER_KHRONOS_validation"]
}

/// Keep the requested layers the loader actually offers.
///
/// Missing layers are logged and left out, so a machine without the Vulkan
/// SDK still starts, just without validation.
pub fn filter_available_layers<'a>(requested: &[&'a CStr], available: &[&CStr]) -> Vec<&'a CStr> {
    requested
        .iter()
        .copied()
        .filter(|layer| {
            let found = available.contains(layer);
            if !found {
                tracing::warn!(
                    "Validation layer {} not available, continuing without it",
                    layer.to_string_lossy()
                );
            }
            found
        })
        .collect()
}

/// Create a Vulkan 1.3 instance.
///
/// # Safety
/// The entry must be a valid Vulkan entry point and every pointer in
/// `surface_extensions` must point to a static extension name.
pub unsafe fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    surface_extensions: &[*const c_char],
    enable_validation: bool,
) -> Result<ash::Instance> {
    let app_name = CString::new(app_name)
        .map_err(|e| GpuError::Other(format!("Invalid application name: {e}")))?;

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(c"Ember")
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::API_VERSION_1_3);

    let extension_names = required_instance_extensions(surface_extensions, enable_validation);

    let layers = if enable_validation {
        let properties = unsafe { entry.enumerate_instance_layer_properties()? };
        let available: Vec<&CStr> = properties
            .iter()
            .filter_map(|props| props.layer_name_as_c_str().ok())
            .collect();
        filter_available_layers(&validation_layers(), &available)
    } else {
        vec![]
    };
    let layer_names: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();

    #[cfg(target_os = "macos")]
    let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    #[cfg(not(target_os = "macos"))]
    let create_flags = vk::InstanceCreateFlags::empty();

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_names)
        .enabled_layer_names(&layer_names)
        .flags(create_flags);

    let instance = unsafe { entry.create_instance(&create_info, None)? };

    Ok(instance)
}

/// Validation layer hook forwarding messages into `tracing`.
pub struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl DebugMessenger {
    /// Register the messenger with `instance`.
    ///
    /// # Safety
    /// The entry and instance must be valid and the instance must have been
    /// created with the debug utils extension.
    pub unsafe fn new(entry: &ash::Entry, instance: &ash::Instance) -> Result<Self> {
        let loader = ash::ext::debug_utils::Instance::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(vulkan_debug_callback));

        let messenger = unsafe { loader.create_debug_utils_messenger(&create_info, None)? };

        Ok(Self { loader, messenger })
    }

    /// Unregister the messenger.
    ///
    /// # Safety
    /// Must be called before the instance is destroyed.
    pub unsafe fn destroy(&self) {
        unsafe {
            self.loader
                .destroy_debug_utils_messenger(self.messenger, None);
        }
    }
}

unsafe extern "system" fn vulkan_debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    if callback_data.is_null() {
        return vk::FALSE;
    }

    let callback_data = unsafe { &*callback_data };
    let message = if callback_data.p_message.is_null() {
        Cow::Borrowed("(no message)")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message) }.to_string_lossy()
    };

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        tracing::error!(target: "vulkan", ?message_type, "{message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        tracing::warn!(target: "vulkan", ?message_type, "{message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        tracing::debug!(target: "vulkan", ?message_type, "{message}");
    } else {
        tracing::trace!(target: "vulkan", ?message_type, "{message}");
    }

    vk::FALSE
}

/// Select the highest scoring physical device.
///
/// # Safety
/// The instance must be valid.
pub unsafe fn select_physical_device(instance: &ash::Instance) -> Result<vk::PhysicalDevice> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    devices
        .into_iter()
        .filter_map(|device| {
            let properties = unsafe { instance.get_physical_device_properties(device) };
            let memory = unsafe { instance.get_physical_device_memory_properties(device) };
            score_device(
                properties.device_type,
                properties.api_version,
                device_local_memory_mb(&memory),
            )
            .map(|score| (score, device))
        })
        .max_by_key(|&(score, _)| score)
        .map(|(_, device)| device)
        .ok_or(GpuError::NoSuitableDevice)
}

/// Score a device for selection. `None` if it cannot run the renderer.
#[allow(clippy::cast_possible_truncation)]
pub fn score_device(
    device_type: vk::PhysicalDeviceType,
    api_version: u32,
    vram_mb: u64,
) -> Option<u32> {
    if !supports_vulkan_1_3(api_version) {
        return None;
    }

    let type_score = match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 50,
        _ => 0,
    };

    // +1 per GB of VRAM
    Some(type_score + (vram_mb / 1024) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discrete_beats_integrated() {
        let discrete = score_device(vk::PhysicalDeviceType::DISCRETE_GPU, vk::API_VERSION_1_3, 4096);
        let integrated =
            score_device(vk::PhysicalDeviceType::INTEGRATED_GPU, vk::API_VERSION_1_3, 16384);
        assert!(discrete > integrated);
        assert_eq!(discrete, Some(1004));
    }

    #[test]
    fn old_api_versions_are_rejected() {
        assert_eq!(
            score_device(vk::PhysicalDeviceType::DISCRETE_GPU, vk::API_VERSION_1_2, 8192),
            None
        );
    }

    fn names(extensions: &[*const c_char]) -> Vec<&CStr> {
        extensions
            .iter()
            .map(|&name| unsafe { CStr::from_ptr(name) })
            .collect()
    }

    #[test]
    fn validation_adds_debug_utils() {
        let with = required_instance_extensions(&[], true);
        let without = required_instance_extensions(&[], false);
        assert!(names(&with).contains(&ash::ext::debug_utils::NAME));
        assert!(!names(&without).contains(&ash::ext::debug_utils::NAME));
    }

    #[test]
    fn surface_extensions_are_passed_through() {
        let surface = [
            ash::khr::surface::NAME.as_ptr(),
            ash::khr::xcb_surface::NAME.as_ptr(),
        ];
        let extensions = required_instance_extensions(&surface, false);
        let extensions = names(&extensions);
        assert_eq!(extensions[0], ash::khr::surface::NAME);
        assert_eq!(extensions[1], ash::khr::xcb_surface::NAME);
    }

    #[test]
    fn missing_validation_layer_is_dropped() {
        let requested = validation_layers();
        assert!(filter_available_layers(&requested, &[]).is_empty());
        assert!(filter_available_layers(&requested, &[c"VK_LAYER_MESA_overlay"]).is_empty());
    }

    #[test]
    fn present_validation_layer_is_kept() {
        let requested = validation_layers();
        let available = [c"VK_LAYER_MESA_overlay", c"VK_LAYER_KHRONOS_validation"];
        assert_eq!(
            filter_available_layers(&requested, &available),
            vec![c"VK_LAYER_KHRONOS_validation"]
        );
    }
}
