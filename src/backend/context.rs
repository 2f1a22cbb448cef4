// Logical device context
//
// Owns the logical device, the four role queues, the depth format chosen for
// this device and the graphics command pool. Everything built on top (chain,
// render pass, command buffers) borrows the device from here.

use super::driver::{DeviceApi, DeviceCreateDesc, InstanceApi};
use super::selector::{DeviceCapabilities, QueueFamilyIndices, SelectedDevice, SwapchainSupportDetails};
use crate::error::{BackendError, Result};
use ash::vk;
use std::ffi::CString;
use std::sync::Arc;

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Resolved queue families, all four guaranteed present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
    pub compute: u32,
    pub transfer: u32,
}

impl TryFrom<QueueFamilyIndices> for QueueFamilies {
    type Error = BackendError;

    fn try_from(indices: QueueFamilyIndices) -> Result<Self> {
        match (indices.graphics, indices.present, indices.compute, indices.transfer) {
            (Some(graphics), Some(present), Some(compute), Some(transfer)) => Ok(Self {
                graphics,
                present,
                compute,
                transfer,
            }),
            _ => Err(BackendError::NoSuitableDevice),
        }
    }
}

pub struct LogicalDeviceContext {
    graphics_command_pool: vk::CommandPool,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub compute_queue: vk::Queue,
    pub transfer_queue: vk::Queue,
    pub queue_families: QueueFamilies,
    pub depth_format: vk::Format,
    pub capabilities: DeviceCapabilities,
    pub physical_device: vk::PhysicalDevice,
    device: Arc<dyn DeviceApi>,
    instance: Arc<dyn InstanceApi>,
}

impl LogicalDeviceContext {
    /// Create the logical device for `selected`.
    ///
    /// `layers` should be the layer list the instance was created with.
    pub fn create(
        instance: Arc<dyn InstanceApi>,
        selected: SelectedDevice,
        layers: &[CString],
        extensions: &[CString],
    ) -> Result<Self> {
        let physical_device = selected.physical_device;
        let queue_families = QueueFamilies::try_from(selected.queue_families)?;

        let depth_format = Self::find_depth_format(instance.as_ref(), physical_device)
            .ok_or_else(|| {
                log::error!("[Vulkan] No supported depth format on this device");
                BackendError::NoDepthFormat
            })?;

        let unique_families = selected.queue_families.unique_families();
        let features = vk::PhysicalDeviceFeatures {
            sampler_anisotropy: vk::TRUE,
            ..Default::default()
        };
        let desc = DeviceCreateDesc {
            queue_families: &unique_families,
            extensions,
            layers,
            features,
        };

        log::info!(
            "[Vulkan] Creating logical device with {} queue famil{}",
            unique_families.len(),
            if unique_families.len() == 1 { "y" } else { "ies" }
        );
        let device = instance
            .clone()
            .create_device(physical_device, &desc)
            .map_err(|e| {
                log::error!("[Vulkan] Logical device creation failed: {}", e);
                BackendError::DeviceCreation(e)
            })?;

        let graphics_queue = device.get_queue(queue_families.graphics, 0);
        let present_queue = device.get_queue(queue_families.present, 0);
        let compute_queue = device.get_queue(queue_families.compute, 0);
        let transfer_queue = device.get_queue(queue_families.transfer, 0);

        let graphics_command_pool = device.create_command_pool(
            queue_families.graphics,
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )?;

        log::info!("[Vulkan] Logical device created, depth format {:?}", depth_format);

        Ok(Self {
            graphics_command_pool,
            graphics_queue,
            present_queue,
            compute_queue,
            transfer_queue,
            queue_families,
            depth_format,
            capabilities: selected.capabilities,
            physical_device,
            device,
            instance,
        })
    }

    /// First candidate usable as an optimal-tiling depth attachment.
    pub fn find_depth_format(
        instance: &dyn InstanceApi,
        pdevice: vk::PhysicalDevice,
    ) -> Option<vk::Format> {
        DEPTH_FORMAT_CANDIDATES.iter().copied().find(|&format| {
            instance
                .format_properties(pdevice, format)
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
    }

    pub fn device(&self) -> &Arc<dyn DeviceApi> {
        &self.device
    }

    pub fn instance(&self) -> &Arc<dyn InstanceApi> {
        &self.instance
    }

    pub fn graphics_command_pool(&self) -> vk::CommandPool {
        self.graphics_command_pool
    }

    /// Re-query surface support, e.g. before rebuilding the presentation chain.
    pub fn query_swapchain_support(&self) -> Result<SwapchainSupportDetails> {
        SwapchainSupportDetails::query(self.instance.as_ref(), self.physical_device)
    }

    pub fn wait_idle(&self) -> Result<()> {
        self.device.wait_idle()?;
        Ok(())
    }
}

impl Drop for LogicalDeviceContext {
    fn drop(&mut self) {
        log::info!("[Vulkan] Destroying logical device...");
        if let Err(e) = self.device.wait_idle() {
            log::warn!("[Vulkan] wait_idle before device teardown failed: {}", e);
        }
        self.device.destroy_command_pool(self.graphics_command_pool);
    }
}
