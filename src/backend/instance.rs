// Vulkan instance - loader, validation, debug messenger and surface
//
// Responsibilities:
// - Instance creation with the platform surface extensions
// - Validation layers (downgraded to "off" when the layers are missing)
// - Debug messenger routing validation output into `log`
// - The one presentation surface this backend renders to

use super::device::VulkanDevice;
use super::driver::{DeviceApi, DeviceCreateDesc, InstanceApi};
use crate::error::{BackendError, Result};
use crate::platform::{self, PlatformSurface};
use ash::extensions::{ext::DebugUtils, khr};
use ash::prelude::VkResult;
use ash::{vk, Entry};
use std::ffi::{CStr, CString};
use std::sync::Arc;

pub struct VulkanInstance {
    surface: vk::SurfaceKHR,
    surface_loader: khr::Surface,
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    pub instance: ash::Instance,
    _entry: Entry,
    /// Layers actually enabled; mirrored on the logical device.
    enabled_layers: Vec<CString>,
}

impl VulkanInstance {
    /// Load Vulkan, create the instance and the surface for `platform`.
    ///
    /// `validation_layers` is only honoured when `enable_validation` is set
    /// and every requested layer is installed.
    pub fn new(
        app_name: &str,
        platform: &dyn PlatformSurface,
        enable_validation: bool,
        validation_layers: &[CString],
    ) -> Result<Arc<Self>> {
        log::info!("[Vulkan] Creating instance: {}", app_name);

        let entry = unsafe { Entry::load() }
            .map_err(|e| BackendError::LoaderUnavailable(e.to_string()))?;

        let enable_validation =
            enable_validation && Self::check_validation_layer_support(&entry, validation_layers);
        let enabled_layers = if enable_validation {
            validation_layers.to_vec()
        } else {
            Vec::new()
        };

        let display = platform.native_display_handle()?;
        let window = platform.native_window_handle()?;

        let instance = Self::create_instance(&entry, app_name, display, &enabled_layers)?;

        // debug_utils is only enabled alongside at least one layer
        let debug_utils = if !enabled_layers.is_empty() {
            Some(Self::setup_debug_messenger(&entry, &instance)?)
        } else {
            None
        };

        let surface = match unsafe { platform::create_surface(&entry, &instance, display, window) } {
            Ok(surface) => surface,
            Err(e) => {
                unsafe {
                    if let Some((loader, messenger)) = &debug_utils {
                        loader.destroy_debug_utils_messenger(*messenger, None);
                    }
                    instance.destroy_instance(None);
                }
                return Err(e);
            }
        };
        let surface_loader = khr::Surface::new(&entry, &instance);

        log::info!("[Vulkan] Instance and surface created");

        Ok(Arc::new(Self {
            surface,
            surface_loader,
            debug_utils,
            instance,
            _entry: entry,
            enabled_layers,
        }))
    }

    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    pub fn enabled_layers(&self) -> &[CString] {
        &self.enabled_layers
    }

    fn check_validation_layer_support(entry: &Entry, requested: &[CString]) -> bool {
        let available = match entry.enumerate_instance_layer_properties() {
            Ok(layers) => layers,
            Err(e) => {
                log::warn!("[Vulkan] Could not enumerate layers ({}), validation disabled", e);
                return false;
            }
        };
        let names: Vec<&CStr> = available
            .iter()
            .map(|props| unsafe { CStr::from_ptr(props.layer_name.as_ptr()) })
            .collect();

        layers_usable(requested, &names)
    }

    fn create_instance(
        entry: &Entry,
        app_name: &str,
        display: raw_window_handle::RawDisplayHandle,
        layers: &[CString],
    ) -> Result<ash::Instance> {
        let app_name_cstr = CString::new(app_name)
            .map_err(|_| BackendError::Platform(format!("invalid application name {:?}", app_name)))?;
        let engine_name = c"Skeleton Engine";

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);

        let mut extensions: Vec<*const std::os::raw::c_char> =
            platform::required_instance_extensions(display)?
                .iter()
                .map(|name| name.as_ptr())
                .collect();
        if !layers.is_empty() {
            extensions.push(DebugUtils::name().as_ptr());
        }

        let layer_names: Vec<_> = layers.iter().map(|name| name.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        unsafe { entry.create_instance(&create_info, None) }.map_err(BackendError::InstanceCreation)
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }?;

        Ok((debug_utils, messenger))
    }
}

impl InstanceApi for VulkanInstance {
    fn enumerate_physical_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>> {
        unsafe { self.instance.enumerate_physical_devices() }
    }

    fn physical_device_properties(&self, pdevice: vk::PhysicalDevice) -> vk::PhysicalDeviceProperties {
        unsafe { self.instance.get_physical_device_properties(pdevice) }
    }

    fn physical_device_features(&self, pdevice: vk::PhysicalDevice) -> vk::PhysicalDeviceFeatures {
        unsafe { self.instance.get_physical_device_features(pdevice) }
    }

    fn physical_device_memory_properties(
        &self,
        pdevice: vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceMemoryProperties {
        unsafe { self.instance.get_physical_device_memory_properties(pdevice) }
    }

    fn queue_family_properties(&self, pdevice: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties> {
        unsafe { self.instance.get_physical_device_queue_family_properties(pdevice) }
    }

    fn format_properties(&self, pdevice: vk::PhysicalDevice, format: vk::Format) -> vk::FormatProperties {
        unsafe { self.instance.get_physical_device_format_properties(pdevice, format) }
    }

    fn device_extension_names(&self, pdevice: vk::PhysicalDevice) -> VkResult<Vec<String>> {
        let properties = unsafe { self.instance.enumerate_device_extension_properties(pdevice) }?;
        Ok(properties
            .iter()
            .map(|ext| {
                unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) }
                    .to_string_lossy()
                    .into_owned()
            })
            .collect())
    }

    fn surface_support(&self, pdevice: vk::PhysicalDevice, queue_family: u32) -> VkResult<bool> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_support(pdevice, queue_family, self.surface)
        }
    }

    fn surface_capabilities(&self, pdevice: vk::PhysicalDevice) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(pdevice, self.surface)
        }
    }

    fn surface_formats(&self, pdevice: vk::PhysicalDevice) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(pdevice, self.surface)
        }
    }

    fn surface_present_modes(&self, pdevice: vk::PhysicalDevice) -> VkResult<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(pdevice, self.surface)
        }
    }

    fn create_device(
        self: Arc<Self>,
        pdevice: vk::PhysicalDevice,
        desc: &DeviceCreateDesc<'_>,
    ) -> VkResult<Arc<dyn DeviceApi>> {
        let device = VulkanDevice::new(self, pdevice, desc)?;
        Ok(device)
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        log::info!("[Vulkan] Destroying surface and instance...");

        unsafe {
            self.surface_loader.destroy_surface(self.surface, None);

            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

/// Whether every requested layer is installed. An empty request has nothing
/// to validate with and counts as "off".
fn layers_usable(requested: &[CString], available: &[&CStr]) -> bool {
    if requested.is_empty() {
        log::warn!("[Vulkan] Validation requested without layers, validation disabled");
        return false;
    }

    for layer in requested {
        if !available.contains(&layer.as_c_str()) {
            log::warn!(
                "[Vulkan] Validation layer {:?} not present, validation disabled",
                layer
            );
            return false;
        }
    }
    true
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}
