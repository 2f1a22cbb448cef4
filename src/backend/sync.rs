// Synchronization primitives
//
// Fences for GPU -> CPU, semaphores for GPU -> GPU. The fence keeps a
// CPU-side copy of its signaled state: `true` only when the GPU is known to
// have signaled it, so redundant waits and resets never reach the driver.

use super::driver::DeviceApi;
use crate::error::{BackendError, Result};
use ash::vk;
use std::sync::Arc;

pub struct Semaphore {
    handle: vk::Semaphore,
    device: Arc<dyn DeviceApi>,
}

impl Semaphore {
    pub fn new(device: Arc<dyn DeviceApi>) -> Result<Self> {
        let handle = device.create_semaphore()?;
        Ok(Self { handle, device })
    }

    pub fn handle(&self) -> vk::Semaphore {
        self.handle
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        self.device.destroy_semaphore(self.handle);
    }
}

pub struct Fence {
    handle: vk::Fence,
    signaled: bool,
    device: Arc<dyn DeviceApi>,
}

impl Fence {
    pub fn new(device: Arc<dyn DeviceApi>, signaled: bool) -> Result<Self> {
        let handle = device.create_fence(signaled)?;
        Ok(Self {
            handle,
            signaled,
            device,
        })
    }

    pub fn handle(&self) -> vk::Fence {
        self.handle
    }

    pub fn is_signaled(&self) -> bool {
        self.signaled
    }

    /// Block until the fence is signaled or `timeout_ns` expires.
    ///
    /// Returns immediately, without a driver call, if it is already known
    /// to be signaled. A timeout is reported as `BackendError::Timeout`.
    pub fn wait(&mut self, timeout_ns: u64) -> Result<()> {
        if self.signaled {
            return Ok(());
        }

        match self.device.wait_for_fence(self.handle, timeout_ns) {
            Ok(()) => {
                self.signaled = true;
                Ok(())
            }
            Err(vk::Result::TIMEOUT) => {
                log::warn!("[Vulkan] Fence wait timed out after {} ns", timeout_ns);
                Err(BackendError::Timeout)
            }
            Err(e) => {
                let err = BackendError::from(e);
                log::error!("[Vulkan] Fence wait failed: {}", err);
                Err(err)
            }
        }
    }

    /// Return the fence to unsignaled. No-op if it is not known to be signaled.
    pub fn reset(&mut self) -> Result<()> {
        if self.signaled {
            self.device.reset_fence(self.handle)?;
            self.signaled = false;
        }
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        self.device.destroy_fence(self.handle);
    }
}

/// Frame synchronization - one per frame in flight
pub struct FrameSync {
    pub image_available: Semaphore,
    pub render_finished: Semaphore,
    pub in_flight: Fence,
}

impl FrameSync {
    pub fn new(device: &Arc<dyn DeviceApi>) -> Result<Self> {
        Ok(Self {
            image_available: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device.clone())?,
            // Start signaled so the first wait on this slot falls through
            in_flight: Fence::new(device.clone(), true)?,
        })
    }
}

/// Ring of `FrameSync`s plus the bookkeeping tying swapchain images to the
/// ring slot that last rendered into them.
pub struct FrameSynchronizer {
    frames: Vec<FrameSync>,
    current_frame: usize,
    images_in_flight: Vec<Option<usize>>,
    device: Arc<dyn DeviceApi>,
}

impl FrameSynchronizer {
    pub fn new(device: Arc<dyn DeviceApi>, max_frames_in_flight: usize, image_count: usize) -> Result<Self> {
        let frames = (0..max_frames_in_flight)
            .map(|_| FrameSync::new(&device))
            .collect::<Result<Vec<_>>>()?;
        log::debug!("[Vulkan] Created sync objects for {} frames in flight", frames.len());

        Ok(Self {
            frames,
            current_frame: 0,
            images_in_flight: vec![None; image_count],
            device,
        })
    }

    pub fn max_frames_in_flight(&self) -> usize {
        self.frames.len()
    }

    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    pub fn current(&self) -> &FrameSync {
        &self.frames[self.current_frame]
    }

    pub fn current_mut(&mut self) -> &mut FrameSync {
        &mut self.frames[self.current_frame]
    }

    pub fn advance(&mut self) {
        self.current_frame = (self.current_frame + 1) % self.frames.len();
    }

    /// Wait until no other ring slot still renders into `image_index`.
    pub fn wait_for_image(&mut self, image_index: usize, timeout_ns: u64) -> Result<()> {
        match self.images_in_flight.get(image_index).copied().flatten() {
            Some(slot) if slot != self.current_frame => self.frames[slot].in_flight.wait(timeout_ns),
            _ => Ok(()),
        }
    }

    /// Record that the current slot is about to render into `image_index`.
    pub fn claim_image(&mut self, image_index: usize) {
        if let Some(entry) = self.images_in_flight.get_mut(image_index) {
            *entry = Some(self.current_frame);
        }
    }

    pub fn release_image(&mut self, image_index: usize) {
        if let Some(entry) = self.images_in_flight.get_mut(image_index) {
            *entry = None;
        }
    }

    /// Forget image ownership, e.g. after the swapchain was rebuilt.
    pub fn reset_images(&mut self, image_count: usize) {
        self.images_in_flight = vec![None; image_count];
    }

    /// Replace the current slot's semaphores and fence after a failed
    /// submission left them in an unknown state. The device must be idle.
    pub fn rebuild_current(&mut self) -> Result<()> {
        let index = self.current_frame;
        self.frames[index] = FrameSync::new(&self.device)?;
        Ok(())
    }
}
