// Presentation chain - window presentation
//
// Owns the swapchain, one color view per presentable image and the shared
// depth attachment. Format, present mode, extent and image count are
// negotiated against the surface on every build.

use super::context::LogicalDeviceContext;
use super::driver::DeviceApi;
use super::image::Image;
use crate::error::{BackendError, Result};
use ash::vk;
use std::sync::Arc;

pub struct PresentationChain {
    depth: Option<Image>,
    pub image_views: Vec<vk::ImageView>,
    pub images: Vec<vk::Image>,
    swapchain: vk::SwapchainKHR,
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    device: Arc<dyn DeviceApi>,
}

/// Prefer 8-bit BGRA sRGB with the sRGB nonlinear color space, else the
/// first format the surface offers.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

/// MAILBOX: no vsync, no tearing, triple buffered
/// FIFO: vsync, always available
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    modes
        .iter()
        .copied()
        .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// The surface's current extent wins unless it is the "undefined" sentinel,
/// in which case the requested size is clamped into the allowed range.
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One more than the minimum, capped by the maximum (0 means no cap).
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 && count > capabilities.max_image_count {
        capabilities.max_image_count
    } else {
        count
    }
}

impl PresentationChain {
    pub fn create(context: &LogicalDeviceContext, width: u32, height: u32) -> Result<Self> {
        let mut chain = Self {
            depth: None,
            image_views: Vec::new(),
            images: Vec::new(),
            swapchain: vk::SwapchainKHR::null(),
            surface_format: vk::SurfaceFormatKHR::default(),
            present_mode: vk::PresentModeKHR::FIFO,
            extent: vk::Extent2D::default(),
            device: context.device().clone(),
        };
        chain.build(context, width, height)?;
        Ok(chain)
    }

    /// Tear everything down and build again for the new size.
    ///
    /// The caller must make sure the device is idle.
    pub fn recreate(&mut self, context: &LogicalDeviceContext, width: u32, height: u32) -> Result<()> {
        log::info!("[Vulkan] Recreating swapchain: {}x{}", width, height);
        self.destroy();
        self.build(context, width, height)
    }

    fn build(&mut self, context: &LogicalDeviceContext, width: u32, height: u32) -> Result<()> {
        let support = context.query_swapchain_support()?;
        let capabilities = support.capabilities;

        let surface_format = choose_surface_format(&support.formats)
            .ok_or(BackendError::Vulkan(vk::Result::ERROR_FORMAT_NOT_SUPPORTED))?;
        let present_mode = choose_present_mode(&support.present_modes);
        let extent = choose_extent(&capabilities, width, height);
        let image_count = choose_image_count(&capabilities);

        log::info!(
            "[Vulkan] Creating swapchain: {}x{}, {:?}, {:?}, {} images",
            extent.width,
            extent.height,
            surface_format.format,
            present_mode,
            image_count
        );

        let families = context.queue_families;
        let family_indices = [families.graphics, families.present];

        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        create_info = if families.graphics != families.present {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&family_indices)
        } else {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        self.swapchain = self.device.create_swapchain(&create_info)?;
        self.surface_format = surface_format;
        self.present_mode = present_mode;
        self.extent = extent;

        self.images = self.device.swapchain_images(self.swapchain)?;
        for &image in &self.images {
            let view_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(surface_format.format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            let view = self.device.create_image_view(&view_info)?;
            self.image_views.push(view);
        }

        self.depth = Some(Image::depth_attachment(
            self.device.clone(),
            extent,
            context.depth_format,
        )?);

        log::info!("[Vulkan] Swapchain created with {} images", self.images.len());
        Ok(())
    }

    /// Views first, then the depth attachment, then the chain itself.
    fn destroy(&mut self) {
        for view in self.image_views.drain(..) {
            self.device.destroy_image_view(view);
        }
        self.depth = None;
        self.images.clear();
        if self.swapchain != vk::SwapchainKHR::null() {
            self.device.destroy_swapchain(self.swapchain);
            self.swapchain = vk::SwapchainKHR::null();
        }
    }

    pub fn depth_view(&self) -> Option<vk::ImageView> {
        self.depth.as_ref().map(|depth| depth.view)
    }

    pub fn depth_format(&self) -> Option<vk::Format> {
        self.depth.as_ref().map(|depth| depth.format)
    }

    /// Returns (image index, suboptimal). Out-of-date surfaces come back as
    /// `BackendError::SurfaceOutOfDate`.
    pub fn acquire_next_image(&self, timeout_ns: u64, semaphore: vk::Semaphore) -> Result<(u32, bool)> {
        let (index, suboptimal) = self
            .device
            .acquire_next_image(self.swapchain, timeout_ns, semaphore)?;
        Ok((index, suboptimal))
    }

    /// Present `image_index` once `wait_semaphore` is signaled. A suboptimal
    /// surface is reported as `SurfaceSuboptimal` even though the image was
    /// presented.
    pub fn present(&self, queue: vk::Queue, image_index: u32, wait_semaphore: vk::Semaphore) -> Result<()> {
        let suboptimal = self
            .device
            .queue_present(queue, self.swapchain, image_index, wait_semaphore)?;
        if suboptimal {
            return Err(BackendError::SurfaceSuboptimal);
        }
        Ok(())
    }
}

impl Drop for PresentationChain {
    fn drop(&mut self) {
        self.destroy();
    }
}
