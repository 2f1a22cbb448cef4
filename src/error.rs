// Error taxonomy for the rendering backend
//
// Every driver call converts its vk::Result into one of these variants and
// propagates it. Callers decide between abort, rebuild and skip using the
// classification helpers at the bottom.

use ash::vk;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BackendError>;

/// Recording state of a command buffer, carried by state-transition errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandBufferState {
    Ready,
    Recording,
    InRenderPass,
    RecordingEnded,
    Submitted,
    NotAllocated,
}

#[derive(Debug, Error)]
pub enum BackendError {
    // ── Fatal: the renderer cannot exist ────────────────────────────────────
    #[error("failed to load the Vulkan library: {0}")]
    LoaderUnavailable(String),

    #[error("failed to create Vulkan instance: {0}")]
    InstanceCreation(vk::Result),

    #[error("no suitable GPU found")]
    NoSuitableDevice,

    #[error("failed to create logical device: {0}")]
    DeviceCreation(vk::Result),

    #[error("device exposes no usable depth format")]
    NoDepthFormat,

    #[error("failed to create presentation surface: {0}")]
    SurfaceCreation(vk::Result),

    #[error("platform error: {0}")]
    Platform(String),

    // ── Recoverable by rebuilding the presentation chain ───────────────────
    #[error("surface is out of date")]
    SurfaceOutOfDate,

    #[error("surface is suboptimal")]
    SurfaceSuboptimal,

    // ── Recoverable by skipping the frame ──────────────────────────────────
    #[error("timed out waiting for the GPU")]
    Timeout,

    #[error("device lost")]
    DeviceLost,

    #[error("out of host memory")]
    OutOfHostMemory,

    #[error("out of device memory")]
    OutOfDeviceMemory,

    #[error("extension not present")]
    ExtensionNotPresent,

    #[error("Vulkan call failed: {0}")]
    Vulkan(vk::Result),

    // ── Misuse of the recording state machine ──────────────────────────────
    #[error("cannot {operation} a command buffer in state {state:?}")]
    InvalidCommandBufferState {
        operation: &'static str,
        state: CommandBufferState,
    },
}

impl From<vk::Result> for BackendError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_DATE_KHR => Self::SurfaceOutOfDate,
            vk::Result::SUBOPTIMAL_KHR => Self::SurfaceSuboptimal,
            vk::Result::TIMEOUT => Self::Timeout,
            vk::Result::ERROR_DEVICE_LOST => Self::DeviceLost,
            vk::Result::ERROR_OUT_OF_HOST_MEMORY => Self::OutOfHostMemory,
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => Self::OutOfDeviceMemory,
            vk::Result::ERROR_EXTENSION_NOT_PRESENT => Self::ExtensionNotPresent,
            other => Self::Vulkan(other),
        }
    }
}

impl BackendError {
    /// Errors that prevent the renderer from being constructed at all.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::LoaderUnavailable(_)
                | Self::InstanceCreation(_)
                | Self::NoSuitableDevice
                | Self::DeviceCreation(_)
                | Self::NoDepthFormat
                | Self::SurfaceCreation(_)
                | Self::Platform(_)
        )
    }

    /// Errors that the presentation chain recovers from by being rebuilt.
    pub fn needs_rebuild(&self) -> bool {
        matches!(self, Self::SurfaceOutOfDate | Self::SurfaceSuboptimal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_codes_map_to_taxonomy() {
        assert!(matches!(
            BackendError::from(vk::Result::ERROR_OUT_OF_DATE_KHR),
            BackendError::SurfaceOutOfDate
        ));
        assert!(matches!(BackendError::from(vk::Result::TIMEOUT), BackendError::Timeout));
        assert!(matches!(
            BackendError::from(vk::Result::ERROR_DEVICE_LOST),
            BackendError::DeviceLost
        ));
        assert!(matches!(
            BackendError::from(vk::Result::ERROR_INITIALIZATION_FAILED),
            BackendError::Vulkan(vk::Result::ERROR_INITIALIZATION_FAILED)
        ));
    }

    #[test]
    fn classification() {
        assert!(BackendError::NoSuitableDevice.is_fatal());
        assert!(!BackendError::Timeout.is_fatal());
        assert!(BackendError::SurfaceSuboptimal.needs_rebuild());
        assert!(!BackendError::DeviceLost.needs_rebuild());
    }
}
