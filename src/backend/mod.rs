// Backend module - Vulkan abstraction layer
//
// driver.rs is the seam: instance.rs/device.rs implement it with ash, the
// test-only mock.rs implements it CPU-side. Everything else only sees
// `InstanceApi`/`DeviceApi`.

pub mod command_buffer;
pub mod context;
pub mod device;
pub mod driver;
pub mod framebuffer;
pub mod image;
pub mod instance;
pub mod render_pass;
pub mod selector;
pub mod swapchain;
pub mod sync;
pub mod vulkan_backend;

#[cfg(test)]
pub(crate) mod mock;

pub use command_buffer::CommandBuffer;
pub use context::LogicalDeviceContext;
pub use device::VulkanDevice;
pub use driver::{DeviceApi, InstanceApi};
pub use framebuffer::FrameTarget;
pub use instance::VulkanInstance;
pub use render_pass::{ClearValues, RenderPass};
pub use selector::{DeviceSelector, QueueFamilyIndices, SelectedDevice};
pub use swapchain::PresentationChain;
pub use sync::{Fence, FrameSynchronizer, Semaphore};
pub use vulkan_backend::{BackendSettings, VulkanBackend};
