// Command buffers with an explicit recording state machine
//
//   Ready -begin-> Recording -end-> RecordingEnded -submit-> Submitted
//   Recording <-> InRenderPass (RenderPass::begin / RenderPass::end)
//   any -reset-> Ready,  any -free-> NotAllocated
//
// Illegal transitions return `InvalidCommandBufferState` instead of reaching
// the driver.

use super::driver::{DeviceApi, SubmitDesc};
use crate::error::{BackendError, CommandBufferState, Result};
use ash::vk;
use std::sync::Arc;

pub struct CommandBuffer {
    handle: vk::CommandBuffer,
    state: CommandBufferState,
    pool: vk::CommandPool,
    device: Arc<dyn DeviceApi>,
}

impl CommandBuffer {
    pub fn allocate(device: Arc<dyn DeviceApi>, pool: vk::CommandPool, primary: bool) -> Result<Self> {
        let level = if primary {
            vk::CommandBufferLevel::PRIMARY
        } else {
            vk::CommandBufferLevel::SECONDARY
        };
        let handle = device.allocate_command_buffer(pool, level)?;
        Ok(Self {
            handle,
            state: CommandBufferState::Ready,
            pool,
            device,
        })
    }

    pub fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }

    pub fn state(&self) -> CommandBufferState {
        self.state
    }

    fn expect_state(&self, operation: &'static str, expected: &[CommandBufferState]) -> Result<()> {
        if expected.contains(&self.state) {
            Ok(())
        } else {
            Err(BackendError::InvalidCommandBufferState {
                operation,
                state: self.state,
            })
        }
    }

    /// Start recording. Only legal from `Ready`.
    pub fn begin(&mut self, single_use: bool, continue_render_pass: bool, simultaneous_use: bool) -> Result<()> {
        self.expect_state("begin", &[CommandBufferState::Ready])?;

        let mut usage = vk::CommandBufferUsageFlags::empty();
        if single_use {
            usage |= vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT;
        }
        if continue_render_pass {
            usage |= vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE;
        }
        if simultaneous_use {
            usage |= vk::CommandBufferUsageFlags::SIMULTANEOUS_USE;
        }

        self.device.begin_command_buffer(self.handle, usage)?;
        self.state = CommandBufferState::Recording;
        Ok(())
    }

    /// Finish recording. Only legal from `Recording`, so an open render pass
    /// has to be ended first.
    pub fn end(&mut self) -> Result<()> {
        self.expect_state("end", &[CommandBufferState::Recording])?;
        self.device.end_command_buffer(self.handle)?;
        self.state = CommandBufferState::RecordingEnded;
        Ok(())
    }

    /// Submit to `queue`, optionally waiting on one semaphore at `wait_stage`
    /// and signaling another; `fence` may be null.
    pub fn submit(
        &mut self,
        queue: vk::Queue,
        wait: Option<(vk::Semaphore, vk::PipelineStageFlags)>,
        signal: Option<vk::Semaphore>,
        fence: vk::Fence,
    ) -> Result<()> {
        self.expect_state("submit", &[CommandBufferState::RecordingEnded])?;

        let submit = SubmitDesc {
            command_buffer: self.handle,
            wait_semaphore: wait.map(|(semaphore, _)| semaphore),
            wait_stage: wait.map_or(vk::PipelineStageFlags::empty(), |(_, stage)| stage),
            signal_semaphore: signal,
        };
        self.device.queue_submit(queue, &submit, fence)?;
        self.state = CommandBufferState::Submitted;
        Ok(())
    }

    /// Force the tracked state back to `Ready`, whatever it was.
    pub fn reset_state(&mut self) {
        self.state = CommandBufferState::Ready;
    }

    /// Reset the recorded commands on the device and return to `Ready`.
    pub fn reset(&mut self) -> Result<()> {
        self.expect_state(
            "reset",
            &[
                CommandBufferState::Ready,
                CommandBufferState::Recording,
                CommandBufferState::InRenderPass,
                CommandBufferState::RecordingEnded,
                CommandBufferState::Submitted,
            ],
        )?;
        self.device.reset_command_buffer(self.handle)?;
        self.reset_state();
        Ok(())
    }

    pub(crate) fn enter_render_pass(&mut self) -> Result<()> {
        self.expect_state("begin a render pass on", &[CommandBufferState::Recording])?;
        self.state = CommandBufferState::InRenderPass;
        Ok(())
    }

    pub(crate) fn leave_render_pass(&mut self) -> Result<()> {
        self.expect_state("end a render pass on", &[CommandBufferState::InRenderPass])?;
        self.state = CommandBufferState::Recording;
        Ok(())
    }

    pub fn set_viewport(&self, viewport: vk::Viewport) -> Result<()> {
        self.expect_state(
            "set the viewport of",
            &[CommandBufferState::Recording, CommandBufferState::InRenderPass],
        )?;
        self.device.cmd_set_viewport(self.handle, viewport);
        Ok(())
    }

    pub fn set_scissor(&self, scissor: vk::Rect2D) -> Result<()> {
        self.expect_state(
            "set the scissor of",
            &[CommandBufferState::Recording, CommandBufferState::InRenderPass],
        )?;
        self.device.cmd_set_scissor(self.handle, scissor);
        Ok(())
    }

    pub fn free(&mut self) {
        if self.state != CommandBufferState::NotAllocated {
            self.device.free_command_buffer(self.pool, self.handle);
            self.handle = vk::CommandBuffer::null();
            self.state = CommandBufferState::NotAllocated;
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // ONE-SHOT SUBMISSIONS
    // ─────────────────────────────────────────────────────────────────────

    /// Allocate a primary buffer and start single-use recording.
    pub fn begin_single_use(device: Arc<dyn DeviceApi>, pool: vk::CommandPool) -> Result<Self> {
        let mut command_buffer = Self::allocate(device, pool, true)?;
        command_buffer.begin(true, false, false)?;
        Ok(command_buffer)
    }

    /// End, submit, block until `queue` is idle, then free the buffer.
    pub fn end_single_use(mut self, queue: vk::Queue) -> Result<()> {
        self.end()?;
        self.submit(queue, None, None, vk::Fence::null())?;
        self.device.queue_wait_idle(queue)?;
        self.free();
        Ok(())
    }
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        self.free();
    }
}
