// =============================================================================
// SKELETON RENDERER - demo application
// =============================================================================
//
// Opens a window, brings up the Vulkan backend and clears the screen every
// frame through the front-end Renderer.
//
// FRAME FLOW:
// 1. Wait for the ring slot's fence
// 2. Acquire swapchain image
// 3. Record: viewport, scissor, render pass (clear)
// 4. Submit, present, advance
//
// =============================================================================

use anyhow::{Context, Result};
use skeleton_renderer::{
    BackendSettings, Config, RenderPacket, Renderer, RendererBackend, VulkanBackend,
};
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let config = Config::load();

    init_logging(&config);
    log::info!("Starting skeleton renderer");
    log::info!(
        "Window: {}x{}, {} frames in flight, validation {}",
        config.window.width,
        config.window.height,
        config.graphics.max_frames_in_flight,
        if config.debug.validation { "on" } else { "off" }
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    Ok(())
}

/// Configured level first, `RUST_LOG` on top of it
fn init_logging(config: &Config) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(config.log_filter());
    builder.parse_default_env();
    builder.init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// IMPORTANT: the renderer is declared before the window so it is dropped
/// first; the surface must not outlive the window it was created for.
struct App {
    config: Config,
    renderer: Option<Renderer<VulkanBackend>>,
    window: Option<Arc<Window>>,
    last_frame_time: Instant,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
            last_frame_time: Instant::now(),
        }
    }

    fn init_renderer(&self, window: &Window) -> Result<Renderer<VulkanBackend>> {
        let settings = BackendSettings::from_config(&self.config)?;
        let size = window.inner_size();
        let backend = VulkanBackend::create(
            &self.config.window.title,
            window,
            size.width,
            size.height,
            settings,
        )
        .context("Failed to initialize Vulkan backend")?;
        Ok(Renderer::new(backend))
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        // Backend first, while the window still exists
        self.renderer = None;
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                event_loop.exit();
                return;
            }
        };

        match self.init_renderer(&window) {
            Ok(renderer) => self.renderer = Some(renderer),
            Err(e) => {
                log::error!("{:#}", e);
                event_loop.exit();
                return;
            }
        }

        self.last_frame_time = Instant::now();
        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.shutdown(event_loop);
            }

            WindowEvent::Resized(size) => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.on_resize(size.width, size.height);
                }
                // Restored from minimised: the redraw loop stopped, restart it
                if let Some(ref window) = self.window {
                    window.request_redraw();
                }
            }

            WindowEvent::RedrawRequested => {
                let now = Instant::now();
                let packet = RenderPacket {
                    delta_time: now.duration_since(self.last_frame_time).as_secs_f32(),
                };
                self.last_frame_time = now;

                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.draw_frame(&packet);
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed()
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                {
                    log::info!("ESC pressed, exiting...");
                    self.shutdown(event_loop);
                }
            }

            _ => {}
        }
    }

    /// Redraw continuously, except while minimised
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        let suspended = self
            .renderer
            .as_ref()
            .is_some_and(|renderer| renderer.backend().is_suspended());
        if suspended {
            return;
        }
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}
