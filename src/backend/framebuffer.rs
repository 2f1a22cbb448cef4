// Frame target: a framebuffer binding one swapchain image (plus the shared
// depth view) to the render pass.

use super::driver::DeviceApi;
use super::render_pass::RenderPass;
use crate::error::Result;
use ash::vk;
use std::sync::Arc;

pub struct FrameTarget {
    handle: vk::Framebuffer,
    /// In render-pass attachment order: color, then depth.
    pub attachments: Vec<vk::ImageView>,
    pub extent: vk::Extent2D,
    device: Arc<dyn DeviceApi>,
}

impl FrameTarget {
    pub fn new(
        device: Arc<dyn DeviceApi>,
        render_pass: &RenderPass,
        extent: vk::Extent2D,
        attachments: Vec<vk::ImageView>,
    ) -> Result<Self> {
        let create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass.handle())
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let handle = device.create_framebuffer(&create_info)?;

        Ok(Self {
            handle,
            attachments,
            extent,
            device,
        })
    }

    pub fn handle(&self) -> vk::Framebuffer {
        self.handle
    }

    /// Full-extent rectangle, used for render area and scissor.
    pub fn rect(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.extent,
        }
    }
}

impl Drop for FrameTarget {
    fn drop(&mut self) {
        self.device.destroy_framebuffer(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockDevice;
    use crate::backend::render_pass::ClearValues;

    #[test]
    fn binds_color_and_depth_at_full_extent() {
        let (device, state) = MockDevice::standalone();
        let extent = vk::Extent2D { width: 1280, height: 720 };
        let render_pass = RenderPass::new(
            device.clone(),
            vk::Format::B8G8R8A8_SRGB,
            vk::Format::D32_SFLOAT,
            vk::Rect2D { offset: vk::Offset2D::default(), extent },
            ClearValues::default(),
        )
        .unwrap();
        let target = FrameTarget::new(
            device,
            &render_pass,
            extent,
            vec![vk::ImageView::null(), vk::ImageView::null()],
        )
        .unwrap();

        assert_eq!(state.lock().framebuffers_created, vec![(2, 1280, 720)]);
        assert_eq!(target.rect().extent, extent);

        drop(target);
        drop(render_pass);
        let state = state.lock();
        assert_eq!(&state.destroyed[..2], &["framebuffer", "render_pass"]);
    }
}
