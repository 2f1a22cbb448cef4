// Front-end renderer
//
// Owns a backend and drives one begin/end pair per frame. Frame failures are
// logged and swallowed; the application keeps running.

/// Per-frame input from the application.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderPacket {
    pub delta_time: f32,
}

/// The frame protocol every rendering backend implements.
pub trait RendererBackend {
    fn resized(&mut self, width: u32, height: u32);

    /// `false` means the frame was skipped and `end_frame` must not be called.
    fn begin_frame(&mut self, delta_time: f32) -> bool;

    /// `false` means submission or presentation failed.
    fn end_frame(&mut self, delta_time: f32) -> bool;

    /// Nothing to present to (e.g. a minimised window).
    fn is_suspended(&self) -> bool {
        false
    }
}

pub struct Renderer<B: RendererBackend> {
    backend: B,
    frame_number: u64,
}

impl<B: RendererBackend> Renderer<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            frame_number: 0,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Frames that made it through both begin and end.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn on_resize(&mut self, width: u32, height: u32) {
        log::debug!("Renderer resized to {}x{}", width, height);
        self.backend.resized(width, height);
    }

    /// Returns whether a frame was presented. A suspended backend skips the
    /// frame without a warning.
    pub fn draw_frame(&mut self, packet: &RenderPacket) -> bool {
        if self.backend.is_suspended() {
            return false;
        }

        if !self.backend.begin_frame(packet.delta_time) {
            log::warn!("Frame failed to start rendering");
            return false;
        }

        if !self.backend.end_frame(packet.delta_time) {
            log::warn!("Frame failed to finish rendering");
            return false;
        }

        self.frame_number += 1;
        true
    }
}
