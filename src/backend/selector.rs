// Physical device selection
//
// Walks every physical device and takes the first one that passes all of:
// discrete-or-geometry-shader, complete queue families, required extensions,
// a usable swapchain, and anisotropic sampling. No ranking beyond that.

use super::driver::InstanceApi;
use crate::error::{BackendError, Result};
use ash::vk;
use std::collections::HashSet;
use std::ffi::{CStr, CString};

/// Queue family index per role. Complete only when all four are assigned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
    pub compute: Option<u32>,
    pub transfer: Option<u32>,
}

impl QueueFamilyIndices {
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some()
            && self.present.is_some()
            && self.compute.is_some()
            && self.transfer.is_some()
    }

    /// Resolve queue families for `pdevice`.
    ///
    /// Graphics, compute and present take the latest family seen with the
    /// capability. Transfer takes the family with the fewest other capability
    /// bits, so a dedicated transfer family beats a combined one. The scan
    /// stops as soon as every role is assigned.
    pub fn find(instance: &dyn InstanceApi, pdevice: vk::PhysicalDevice) -> Result<Self> {
        let families = instance.queue_family_properties(pdevice);
        let mut indices = Self::default();
        let mut min_transfer_score = u32::MAX;

        for (index, family) in families.iter().enumerate() {
            let index = index as u32;
            let mut transfer_score = 0;

            if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                indices.graphics = Some(index);
                transfer_score += 1;
            }

            if family.queue_flags.contains(vk::QueueFlags::COMPUTE) {
                indices.compute = Some(index);
                transfer_score += 1;
            }

            if family.queue_flags.contains(vk::QueueFlags::TRANSFER)
                && transfer_score < min_transfer_score
            {
                min_transfer_score = transfer_score;
                indices.transfer = Some(index);
            }

            if instance.surface_support(pdevice, index)? {
                indices.present = Some(index);
            }

            if indices.is_complete() {
                break;
            }
        }

        Ok(indices)
    }

    /// Distinct family indices across every assigned role, ascending.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families: Vec<u32> = [self.graphics, self.present, self.compute, self.transfer]
            .into_iter()
            .flatten()
            .collect();
        families.sort_unstable();
        families.dedup();
        families
    }
}

/// Surface support of a device, queried per candidate and again on every
/// swapchain rebuild.
#[derive(Debug, Clone, Default)]
pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    pub fn query(instance: &dyn InstanceApi, pdevice: vk::PhysicalDevice) -> Result<Self> {
        Ok(Self {
            capabilities: instance.surface_capabilities(pdevice)?,
            formats: instance.surface_formats(pdevice)?,
            present_modes: instance.surface_present_modes(pdevice)?,
        })
    }

    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryHeapInfo {
    pub size: u64,
    pub device_local: bool,
}

/// Read-only description of the selected device.
#[derive(Debug, Clone)]
pub struct DeviceCapabilities {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub driver_version: u32,
    pub api_version: u32,
    pub geometry_shader: bool,
    pub sampler_anisotropy: bool,
    pub memory_heaps: Vec<MemoryHeapInfo>,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl DeviceCapabilities {
    fn query(instance: &dyn InstanceApi, pdevice: vk::PhysicalDevice) -> Self {
        let properties = instance.physical_device_properties(pdevice);
        let features = instance.physical_device_features(pdevice);
        let memory_properties = instance.physical_device_memory_properties(pdevice);

        let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        let memory_heaps = memory_properties.memory_heaps
            [..memory_properties.memory_heap_count as usize]
            .iter()
            .map(|heap| MemoryHeapInfo {
                size: heap.size,
                device_local: heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL),
            })
            .collect();

        Self {
            name,
            device_type: properties.device_type,
            driver_version: properties.driver_version,
            api_version: properties.api_version,
            geometry_shader: features.geometry_shader == vk::TRUE,
            sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
            memory_heaps,
            memory_properties,
        }
    }

    fn log_summary(&self) {
        log::info!("[Vulkan] Selected device: '{}'", self.name);
        let kind = match self.device_type {
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated",
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Unknown",
        };
        log::info!("[Vulkan] GPU type is {}", kind);
        log::info!(
            "[Vulkan] GPU driver version: {}.{}.{}",
            vk::api_version_major(self.driver_version),
            vk::api_version_minor(self.driver_version),
            vk::api_version_patch(self.driver_version)
        );
        log::info!(
            "[Vulkan] API version: {}.{}.{}",
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version)
        );
        for heap in &self.memory_heaps {
            let gib = heap.size as f64 / (1024.0 * 1024.0 * 1024.0);
            if heap.device_local {
                log::info!("[Vulkan] Local GPU memory: {:.2} GiB", gib);
            } else {
                log::info!("[Vulkan] Shared system memory: {:.2} GiB", gib);
            }
        }
    }
}

/// Outcome of a successful selection.
#[derive(Debug, Clone)]
pub struct SelectedDevice {
    pub physical_device: vk::PhysicalDevice,
    pub capabilities: DeviceCapabilities,
    pub queue_families: QueueFamilyIndices,
    pub swapchain_support: SwapchainSupportDetails,
}

pub struct DeviceSelector<'a> {
    instance: &'a dyn InstanceApi,
    required_extensions: &'a [CString],
}

impl<'a> DeviceSelector<'a> {
    pub fn new(instance: &'a dyn InstanceApi, required_extensions: &'a [CString]) -> Self {
        Self {
            instance,
            required_extensions,
        }
    }

    /// Pick the first suitable device.
    pub fn select(&self) -> Result<SelectedDevice> {
        let devices = self.instance.enumerate_physical_devices()?;
        if devices.is_empty() {
            log::error!("[Vulkan] No GPUs with Vulkan support found");
            return Err(BackendError::NoSuitableDevice);
        }

        for pdevice in devices {
            if let Some(selected) = self.check_device(pdevice)? {
                selected.capabilities.log_summary();
                return Ok(selected);
            }
        }

        log::error!("[Vulkan] No suitable GPU found");
        Err(BackendError::NoSuitableDevice)
    }

    fn check_device(&self, pdevice: vk::PhysicalDevice) -> Result<Option<SelectedDevice>> {
        let capabilities = DeviceCapabilities::query(self.instance, pdevice);
        let name = capabilities.name.as_str();
        log::info!("[Vulkan] Device '{}' queried, checking requirements...", name);

        let queue_families = QueueFamilyIndices::find(self.instance, pdevice)?;
        log::info!(
            "[Vulkan] Queue families (graphics/present/compute/transfer): {:?}/{:?}/{:?}/{:?}",
            queue_families.graphics,
            queue_families.present,
            queue_families.compute,
            queue_families.transfer
        );

        let extensions_supported = self.check_extension_support(pdevice)?;

        let swapchain_support = if extensions_supported {
            Some(SwapchainSupportDetails::query(self.instance, pdevice)?)
        } else {
            None
        };

        if capabilities.device_type != vk::PhysicalDeviceType::DISCRETE_GPU
            && !capabilities.geometry_shader
        {
            log::info!(
                "[Vulkan] Device '{}' is not a discrete GPU and does not support geometry shaders",
                name
            );
            return Ok(None);
        }

        if !queue_families.is_complete() {
            log::info!("[Vulkan] Device '{}' lacks a required queue family", name);
            return Ok(None);
        }

        let Some(swapchain_support) = swapchain_support else {
            log::info!("[Vulkan] Device '{}' lacks a required extension", name);
            return Ok(None);
        };

        if !swapchain_support.is_adequate() {
            log::info!("[Vulkan] Device '{}' has no adequate swapchain support", name);
            return Ok(None);
        }

        if !capabilities.sampler_anisotropy {
            log::info!("[Vulkan] Device '{}' does not support anisotropic sampling", name);
            return Ok(None);
        }

        log::info!("[Vulkan] Device '{}' fulfills all requirements", name);
        Ok(Some(SelectedDevice {
            physical_device: pdevice,
            capabilities,
            queue_families,
            swapchain_support,
        }))
    }

    fn check_extension_support(&self, pdevice: vk::PhysicalDevice) -> Result<bool> {
        let available: HashSet<String> = self
            .instance
            .device_extension_names(pdevice)?
            .into_iter()
            .collect();

        let missing: Vec<_> = self
            .required_extensions
            .iter()
            .map(|name| name.to_string_lossy().into_owned())
            .filter(|name| !available.contains(name))
            .collect();

        if !missing.is_empty() {
            log::debug!("[Vulkan] Missing device extensions: {:?}", missing);
        }
        Ok(missing.is_empty())
    }
}
