// Device-local image with a single view
//
// Only the depth attachment uses this today. Memory comes from the device's
// gpu-allocator and is released together with the image.

use super::driver::DeviceApi;
use crate::error::Result;
use ash::vk;
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

pub struct Image {
    pub view: vk::ImageView,
    pub handle: vk::Image,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    device: Arc<dyn DeviceApi>,
}

impl Image {
    /// 2D, single-mip, optimal-tiling image in GPU-only memory plus a view
    /// covering `aspect`.
    pub fn new(
        device: Arc<dyn DeviceApi>,
        name: &str,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
    ) -> Result<Self> {
        let create_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(usage)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let handle = device.create_image(&create_info)?;

        if let Err(e) = device.allocate_image_memory(handle, MemoryLocation::GpuOnly, name) {
            device.destroy_image(handle);
            return Err(e.into());
        }

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(handle)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        let view = match device.create_image_view(&view_info) {
            Ok(view) => view,
            Err(e) => {
                device.destroy_image(handle);
                return Err(e.into());
            }
        };

        Ok(Self {
            view,
            handle,
            format,
            extent,
            device,
        })
    }

    pub fn depth_attachment(
        device: Arc<dyn DeviceApi>,
        extent: vk::Extent2D,
        format: vk::Format,
    ) -> Result<Self> {
        Self::new(
            device,
            "depth attachment",
            extent,
            format,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            vk::ImageAspectFlags::DEPTH,
        )
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        self.device.destroy_image_view(self.view);
        self.device.destroy_image(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockDevice;

    #[test]
    fn depth_image_lives_in_gpu_memory() {
        let (device, state) = MockDevice::standalone();
        let extent = vk::Extent2D { width: 640, height: 480 };
        let image = Image::depth_attachment(device.clone(), extent, vk::Format::D32_SFLOAT).unwrap();

        {
            let state = state.lock();
            assert_eq!(state.image_allocations, vec![MemoryLocation::GpuOnly]);
            let (extent3d, format, usage) = state.images_created[0];
            assert_eq!((extent3d.width, extent3d.height, extent3d.depth), (640, 480, 1));
            assert_eq!(format, vk::Format::D32_SFLOAT);
            assert_eq!(usage, vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT);
        }

        drop(image);
        let state = state.lock();
        assert_eq!(state.destroyed, vec!["image_view", "image"]);
    }
}
