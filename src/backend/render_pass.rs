// Render pass: one color + one depth attachment, one subpass
//
// The color attachment is cleared and ends up ready for presentation; depth
// is cleared and discarded. One render pass lives as long as the
// presentation chain it was built for.

use super::command_buffer::CommandBuffer;
use super::driver::DeviceApi;
use super::framebuffer::FrameTarget;
use crate::config::GraphicsConfig;
use crate::error::Result;
use ash::vk;
use glam::Vec4;
use std::sync::Arc;

/// Values the attachments are cleared to at the start of the pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearValues {
    pub color: Vec4,
    pub depth: f32,
    pub stencil: u32,
}

impl Default for ClearValues {
    fn default() -> Self {
        Self {
            color: Vec4::new(0.0, 0.0, 0.2, 1.0),
            depth: 1.0,
            stencil: 0,
        }
    }
}

impl From<&GraphicsConfig> for ClearValues {
    fn from(config: &GraphicsConfig) -> Self {
        Self {
            color: Vec4::from_array(config.clear_color),
            depth: config.clear_depth,
            stencil: config.clear_stencil,
        }
    }
}

pub struct RenderPass {
    handle: vk::RenderPass,
    pub render_area: vk::Rect2D,
    pub clear: ClearValues,
    device: Arc<dyn DeviceApi>,
}

impl RenderPass {
    pub fn new(
        device: Arc<dyn DeviceApi>,
        color_format: vk::Format,
        depth_format: vk::Format,
        render_area: vk::Rect2D,
        clear: ClearValues,
    ) -> Result<Self> {
        let attachments = Self::attachment_descriptions(color_format, depth_format);

        let color_attachment_ref = vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        };
        let depth_attachment_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };

        let subpass = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(std::slice::from_ref(&color_attachment_ref))
            .depth_stencil_attachment(&depth_attachment_ref)
            .build();

        let subpasses = [subpass];
        let dependencies = [Self::subpass_dependency()];

        let create_info = vk::RenderPassCreateInfo::builder()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let handle = device.create_render_pass(&create_info)?;
        log::debug!("[Vulkan] Render pass created ({:?} + {:?})", color_format, depth_format);

        Ok(Self {
            handle,
            render_area,
            clear,
            device,
        })
    }

    pub fn attachment_descriptions(
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> [vk::AttachmentDescription; 2] {
        let color = vk::AttachmentDescription::builder()
            .format(color_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .build();

        let depth = vk::AttachmentDescription::builder()
            .format(depth_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .build();

        [color, depth]
    }

    /// No color output or depth test in subpass 0 before the image is
    /// actually available.
    pub fn subpass_dependency() -> vk::SubpassDependency {
        let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
        vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(stages)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(stages)
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            )
            .build()
    }

    pub fn handle(&self) -> vk::RenderPass {
        self.handle
    }

    pub fn clear_values(&self) -> [vk::ClearValue; 2] {
        [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear.color.to_array(),
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: self.clear.depth,
                    stencil: self.clear.stencil,
                },
            },
        ]
    }

    pub fn set_render_area(&mut self, render_area: vk::Rect2D) {
        self.render_area = render_area;
    }

    /// Begin the pass inline on `command_buffer`, which must be recording.
    pub fn begin(&self, command_buffer: &mut CommandBuffer, target: &FrameTarget) -> Result<()> {
        command_buffer.enter_render_pass()?;
        self.device.cmd_begin_render_pass(
            command_buffer.handle(),
            self.handle,
            target.handle(),
            self.render_area,
            &self.clear_values(),
        );
        Ok(())
    }

    pub fn end(&self, command_buffer: &mut CommandBuffer) -> Result<()> {
        command_buffer.leave_render_pass()?;
        self.device.cmd_end_render_pass(command_buffer.handle());
        Ok(())
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        self.device.destroy_render_pass(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockDevice;
    use crate::error::{BackendError, CommandBufferState};

    fn area(width: u32, height: u32) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: vk::Extent2D { width, height },
        }
    }

    #[test]
    fn attachments_clear_and_transition() {
        let [color, depth] =
            RenderPass::attachment_descriptions(vk::Format::B8G8R8A8_SRGB, vk::Format::D32_SFLOAT);

        assert_eq!(color.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(color.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(color.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(color.initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(color.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);

        assert_eq!(depth.format, vk::Format::D32_SFLOAT);
        assert_eq!(depth.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(depth.store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(depth.final_layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
    }

    #[test]
    fn dependency_gates_color_and_depth() {
        let dependency = RenderPass::subpass_dependency();
        assert_eq!(dependency.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(dependency.dst_subpass, 0);
        let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
        assert_eq!(dependency.src_stage_mask, stages);
        assert_eq!(dependency.dst_stage_mask, stages);
        assert!(dependency
            .dst_access_mask
            .contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE));
    }

    #[test]
    fn clear_values_come_from_config() {
        let config = GraphicsConfig {
            clear_color: [0.1, 0.2, 0.3, 1.0],
            clear_depth: 0.5,
            clear_stencil: 3,
            ..Default::default()
        };
        let clear = ClearValues::from(&config);
        assert_eq!(clear.color, Vec4::new(0.1, 0.2, 0.3, 1.0));
        assert_eq!(clear.depth, 0.5);
        assert_eq!(clear.stencil, 3);
    }

    #[test]
    fn begin_and_end_track_command_buffer_state() {
        let (device, state) = MockDevice::standalone();
        let render_pass = RenderPass::new(
            device.clone(),
            vk::Format::B8G8R8A8_SRGB,
            vk::Format::D32_SFLOAT,
            area(800, 600),
            ClearValues::default(),
        )
        .unwrap();
        let target = FrameTarget::new(
            device.clone(),
            &render_pass,
            vk::Extent2D { width: 800, height: 600 },
            vec![vk::ImageView::null(), vk::ImageView::null()],
        )
        .unwrap();
        let mut cb = CommandBuffer::allocate(device, vk::CommandPool::null(), true).unwrap();

        // Not recording yet
        assert!(matches!(
            render_pass.begin(&mut cb, &target),
            Err(BackendError::InvalidCommandBufferState { state: CommandBufferState::Ready, .. })
        ));

        cb.begin(false, false, false).unwrap();
        render_pass.begin(&mut cb, &target).unwrap();
        assert_eq!(cb.state(), CommandBufferState::InRenderPass);
        render_pass.end(&mut cb).unwrap();
        assert_eq!(cb.state(), CommandBufferState::Recording);

        let state = state.lock();
        assert_eq!(state.render_pass_attachments, vec![2]);
        assert_eq!(state.render_pass_begins, vec![(target.handle(), area(800, 600))]);
        assert_eq!(state.render_pass_ends, 1);
    }

    #[test]
    fn render_area_updates_without_rebuild() {
        let (device, state) = MockDevice::standalone();
        let mut render_pass = RenderPass::new(
            device,
            vk::Format::B8G8R8A8_SRGB,
            vk::Format::D32_SFLOAT,
            area(800, 600),
            ClearValues::default(),
        )
        .unwrap();
        render_pass.set_render_area(area(1024, 768));
        assert_eq!(render_pass.render_area, area(1024, 768));
        assert_eq!(state.lock().render_pass_attachments.len(), 1);
    }
}
