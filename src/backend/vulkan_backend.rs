// =============================================================================
// VULKAN BACKEND - Frame orchestration
// =============================================================================
//
// Sequences device, presentation chain, render pass, command buffers and
// sync objects into one rendered frame:
//
//   begin_frame: wait fence -> acquire image -> record (viewport, scissor,
//                render pass begin)
//   end_frame:   render pass end -> submit -> present -> advance ring slot
//
// IMPORTANT: field order is the teardown order. Sync objects go first, then
// the per-image targets, the chain, and finally the device context (which
// releases the device, then the surface and instance).

use super::command_buffer::CommandBuffer;
use super::context::LogicalDeviceContext;
use super::driver::InstanceApi;
use super::framebuffer::FrameTarget;
use super::instance::VulkanInstance;
use super::render_pass::{ClearValues, RenderPass};
use super::selector::DeviceSelector;
use super::swapchain::PresentationChain;
use super::sync::{FrameSync, FrameSynchronizer};
use crate::config::Config;
use crate::error::{BackendError, Result};
use crate::platform::PlatformSurface;
use crate::renderer::RendererBackend;
use ash::extensions::khr;
use ash::vk;
use std::ffi::CString;
use std::sync::Arc;

/// Everything the backend needs from configuration, in driver-ready form.
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub device_extensions: Vec<CString>,
    pub validation: bool,
    pub validation_layers: Vec<CString>,
    pub max_frames_in_flight: usize,
    pub frame_timeout_ns: u64,
    pub clear: ClearValues,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            device_extensions: vec![khr::Swapchain::name().to_owned()],
            validation: cfg!(debug_assertions),
            validation_layers: vec![c"VK_LAYER_KHRONOS_validation".to_owned()],
            max_frames_in_flight: 2,
            frame_timeout_ns: u64::MAX,
            clear: ClearValues::default(),
        }
    }
}

impl BackendSettings {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            device_extensions: config.device.extension_names()?,
            validation: config.debug.validation,
            validation_layers: config.debug.layer_names()?,
            max_frames_in_flight: config.graphics.max_frames_in_flight.max(1),
            frame_timeout_ns: config.graphics.frame_timeout_ns,
            clear: ClearValues::from(&config.graphics),
        })
    }
}

/// Y-flipped viewport: origin at the bottom-left, negative height.
pub fn flipped_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: extent.height as f32,
        width: extent.width as f32,
        height: -(extent.height as f32),
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Per-swapchain-image objects, rebuilt together with the chain.
struct FrameTargets {
    command_buffers: Vec<CommandBuffer>,
    framebuffers: Vec<FrameTarget>,
    render_pass: RenderPass,
}

impl FrameTargets {
    fn new(context: &LogicalDeviceContext, chain: &PresentationChain, clear: ClearValues) -> Result<Self> {
        let device = context.device().clone();
        let depth_view = chain
            .depth_view()
            .ok_or(BackendError::Vulkan(vk::Result::ERROR_INITIALIZATION_FAILED))?;
        let depth_format = chain.depth_format().unwrap_or(context.depth_format);
        let full_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: chain.extent,
        };

        let render_pass = RenderPass::new(
            device.clone(),
            chain.surface_format.format,
            depth_format,
            full_area,
            clear,
        )?;

        let framebuffers = chain
            .image_views
            .iter()
            .map(|&view| FrameTarget::new(device.clone(), &render_pass, chain.extent, vec![view, depth_view]))
            .collect::<Result<Vec<_>>>()?;

        let command_buffers = (0..chain.images.len())
            .map(|_| CommandBuffer::allocate(device.clone(), context.graphics_command_pool(), true))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            command_buffers,
            framebuffers,
            render_pass,
        })
    }

    /// Close the render pass and recording for `image_index`, then submit it
    /// against `frame`'s semaphores and fence.
    fn submit(&mut self, image_index: usize, queue: vk::Queue, frame: &FrameSync) -> Result<()> {
        let command_buffer = &mut self.command_buffers[image_index];
        self.render_pass.end(command_buffer)?;
        command_buffer.end()?;
        command_buffer.submit(
            queue,
            Some((
                frame.image_available.handle(),
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            )),
            Some(frame.render_finished.handle()),
            frame.in_flight.handle(),
        )
    }
}

pub struct VulkanBackend {
    // ─────────────────────────────────────────────────────────────────────────
    // GPU OBJECTS (declaration order = destruction order)
    // ─────────────────────────────────────────────────────────────────────────
    sync: FrameSynchronizer,
    targets: Option<FrameTargets>,
    chain: PresentationChain,
    context: LogicalDeviceContext,

    // ─────────────────────────────────────────────────────────────────────────
    // FRAME STATE
    // ─────────────────────────────────────────────────────────────────────────
    clear: ClearValues,
    frame_timeout_ns: u64,
    width: u32,
    height: u32,
    /// Set on resize or an out-of-date/suboptimal surface
    needs_rebuild: bool,
    /// Window minimised: zero-area, nothing to present to
    suspended: bool,
    /// Image acquired by begin_frame, consumed by end_frame
    image_index: Option<u32>,
}

impl VulkanBackend {
    /// Bring up instance, surface, device, chain and per-frame objects for
    /// the window behind `platform`.
    pub fn create(
        app_name: &str,
        platform: &dyn PlatformSurface,
        width: u32,
        height: u32,
        settings: BackendSettings,
    ) -> Result<Self> {
        let instance = VulkanInstance::new(
            app_name,
            platform,
            settings.validation,
            &settings.validation_layers,
        )?;
        let layers = instance.enabled_layers().to_vec();
        Self::with_instance(instance, &layers, width, height, settings)
    }

    /// Same as `create`, on an already created instance. `layers` are the
    /// layers enabled on that instance.
    pub fn with_instance(
        instance: Arc<dyn InstanceApi>,
        layers: &[CString],
        width: u32,
        height: u32,
        settings: BackendSettings,
    ) -> Result<Self> {
        let selected = DeviceSelector::new(instance.as_ref(), &settings.device_extensions).select()?;
        let context = LogicalDeviceContext::create(instance, selected, layers, &settings.device_extensions)?;
        let chain = PresentationChain::create(&context, width, height)?;
        let targets = FrameTargets::new(&context, &chain, settings.clear)?;
        let sync = FrameSynchronizer::new(
            context.device().clone(),
            settings.max_frames_in_flight,
            chain.images.len(),
        )?;

        log::info!("[Vulkan] Backend ready ({} frames in flight)", sync.max_frames_in_flight());

        Ok(Self {
            sync,
            targets: Some(targets),
            chain,
            context,
            clear: settings.clear,
            frame_timeout_ns: settings.frame_timeout_ns,
            width,
            height,
            needs_rebuild: false,
            suspended: width == 0 || height == 0,
            image_index: None,
        })
    }

    pub fn current_frame(&self) -> usize {
        self.sync.current_frame()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.chain.extent
    }

    pub fn context(&self) -> &LogicalDeviceContext {
        &self.context
    }

    /// Wait for the device, then tear down and rebuild everything sized by
    /// the swapchain.
    fn rebuild(&mut self) -> Result<()> {
        self.context.wait_idle()?;
        self.targets = None;
        self.chain.recreate(&self.context, self.width, self.height)?;
        self.targets = Some(FrameTargets::new(&self.context, &self.chain, self.clear)?);
        self.sync.reset_images(self.chain.images.len());
        self.needs_rebuild = false;
        Ok(())
    }

    fn try_begin_frame(&mut self) -> Result<bool> {
        if self.suspended {
            return Ok(false);
        }
        if self.image_index.is_some() {
            log::warn!("[Vulkan] begin_frame called again before end_frame");
            return Ok(false);
        }
        if self.needs_rebuild || self.targets.is_none() {
            self.rebuild()?;
        }

        let timeout = self.frame_timeout_ns;
        self.sync.current_mut().in_flight.wait(timeout)?;

        let image_available = self.sync.current().image_available.handle();
        let image_index = match self.chain.acquire_next_image(timeout, image_available) {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    self.needs_rebuild = true;
                }
                index
            }
            Err(BackendError::SurfaceOutOfDate) => {
                log::info!("[Vulkan] Swapchain out of date, rebuilding");
                self.rebuild()?;
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        let slot = image_index as usize;

        self.sync.wait_for_image(slot, timeout)?;

        if let Err(e) = self.record(slot) {
            self.abandon_frame()?;
            return Err(e);
        }

        self.sync.claim_image(slot);
        self.sync.current_mut().in_flight.reset()?;
        self.image_index = Some(image_index);
        Ok(true)
    }

    /// Reset and begin `slot`'s command buffer, set the dynamic state and
    /// open the render pass.
    fn record(&mut self, slot: usize) -> Result<()> {
        let Some(targets) = self.targets.as_mut() else {
            return Err(BackendError::Vulkan(vk::Result::ERROR_INITIALIZATION_FAILED));
        };
        let framebuffer = &targets.framebuffers[slot];
        let command_buffer = &mut targets.command_buffers[slot];

        command_buffer.reset()?;
        command_buffer.begin(false, false, false)?;
        command_buffer.set_viewport(flipped_viewport(framebuffer.extent))?;
        command_buffer.set_scissor(framebuffer.rect())?;
        targets.render_pass.set_render_area(framebuffer.rect());
        targets.render_pass.begin(command_buffer, framebuffer)
    }

    /// An acquired image will not be presented. Its image-available
    /// semaphore has no waiter, so the slot gets fresh sync objects, and the
    /// chain is rebuilt next frame to get the image back.
    fn abandon_frame(&mut self) -> Result<()> {
        self.needs_rebuild = true;
        self.context.wait_idle()?;
        self.sync.rebuild_current()
    }

    fn try_end_frame(&mut self) -> Result<bool> {
        let Some(image_index) = self.image_index.take() else {
            log::warn!("[Vulkan] end_frame called without a successful begin_frame");
            return Ok(false);
        };
        let slot = image_index as usize;
        let Some(targets) = self.targets.as_mut() else {
            return Ok(false);
        };

        let submitted = targets.submit(slot, self.context.graphics_queue, self.sync.current());
        if let Err(e) = submitted {
            // Nothing will signal this slot's fence now; start it over
            self.sync.release_image(slot);
            self.abandon_frame()?;
            return Err(e);
        }

        let render_finished = self.sync.current().render_finished.handle();
        let presented = self
            .chain
            .present(self.context.present_queue, image_index, render_finished);
        self.sync.advance();

        match presented {
            Ok(()) => Ok(true),
            Err(e) if e.needs_rebuild() => {
                log::debug!("[Vulkan] Present reported {}, rebuilding next frame", e);
                self.needs_rebuild = true;
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }
}

impl RendererBackend for VulkanBackend {
    fn resized(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;

        if width == 0 || height == 0 {
            if !self.suspended {
                log::info!("[Vulkan] Window minimised, rendering suspended");
            }
            self.suspended = true;
            return;
        }

        self.suspended = false;
        self.needs_rebuild = true;
    }

    fn begin_frame(&mut self, _delta_time: f32) -> bool {
        self.try_begin_frame().unwrap_or_else(|e| {
            log::error!("[Vulkan] begin_frame: {}", e);
            false
        })
    }

    fn end_frame(&mut self, _delta_time: f32) -> bool {
        self.try_end_frame().unwrap_or_else(|e| {
            log::error!("[Vulkan] end_frame: {}", e);
            false
        })
    }

    fn is_suspended(&self) -> bool {
        self.suspended
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        log::info!("[Vulkan] Shutting down backend...");
        if let Err(e) = self.context.wait_idle() {
            log::warn!("[Vulkan] wait_idle on shutdown failed: {}", e);
        }
    }
}
