// Driver seam
//
// The exact set of Vulkan calls this backend makes, split by the object that
// issues them. `instance.rs`/`device.rs` implement these on top of ash; unit
// tests implement them CPU-side. Everything above this module talks to the
// GPU only through these traits.

use ash::prelude::VkResult;
use ash::vk;
use gpu_allocator::MemoryLocation;
use std::ffi::CString;
use std::sync::Arc;

/// Parameters for logical device creation.
pub struct DeviceCreateDesc<'a> {
    /// Unique queue family indices; one queue is created per family.
    pub queue_families: &'a [u32],
    pub extensions: &'a [CString],
    /// Device-level layers, mirrored from the instance for older loaders.
    pub layers: &'a [CString],
    pub features: vk::PhysicalDeviceFeatures,
}

/// One queue submission: a single command buffer with optional
/// wait/signal semaphores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitDesc {
    pub command_buffer: vk::CommandBuffer,
    pub wait_semaphore: Option<vk::Semaphore>,
    pub wait_stage: vk::PipelineStageFlags,
    pub signal_semaphore: Option<vk::Semaphore>,
}

/// Instance-level calls. The instance also owns the presentation surface, so
/// surface queries only need the physical device.
pub trait InstanceApi: Send + Sync {
    fn enumerate_physical_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>>;

    fn physical_device_properties(&self, pdevice: vk::PhysicalDevice)
        -> vk::PhysicalDeviceProperties;

    fn physical_device_features(&self, pdevice: vk::PhysicalDevice) -> vk::PhysicalDeviceFeatures;

    fn physical_device_memory_properties(
        &self,
        pdevice: vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceMemoryProperties;

    fn queue_family_properties(&self, pdevice: vk::PhysicalDevice)
        -> Vec<vk::QueueFamilyProperties>;

    fn format_properties(&self, pdevice: vk::PhysicalDevice, format: vk::Format)
        -> vk::FormatProperties;

    fn device_extension_names(&self, pdevice: vk::PhysicalDevice) -> VkResult<Vec<String>>;

    fn surface_support(&self, pdevice: vk::PhysicalDevice, queue_family: u32) -> VkResult<bool>;

    fn surface_capabilities(&self, pdevice: vk::PhysicalDevice)
        -> VkResult<vk::SurfaceCapabilitiesKHR>;

    fn surface_formats(&self, pdevice: vk::PhysicalDevice) -> VkResult<Vec<vk::SurfaceFormatKHR>>;

    fn surface_present_modes(&self, pdevice: vk::PhysicalDevice)
        -> VkResult<Vec<vk::PresentModeKHR>>;

    /// Create the logical device. The returned device keeps the instance
    /// alive for as long as it exists.
    fn create_device(
        self: Arc<Self>,
        pdevice: vk::PhysicalDevice,
        desc: &DeviceCreateDesc<'_>,
    ) -> VkResult<Arc<dyn DeviceApi>>;
}

/// Device-level calls, including queue operations and command recording.
pub trait DeviceApi: Send + Sync {
    fn get_queue(&self, family: u32, index: u32) -> vk::Queue;
    fn wait_idle(&self) -> VkResult<()>;
    fn queue_wait_idle(&self, queue: vk::Queue) -> VkResult<()>;

    // Swapchain
    /// `info.surface` is ignored; the swapchain always targets the instance's surface.
    fn create_swapchain(&self, info: &vk::SwapchainCreateInfoKHR) -> VkResult<vk::SwapchainKHR>;
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>>;
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);
    /// Ok((index, suboptimal))
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        semaphore: vk::Semaphore,
    ) -> VkResult<(u32, bool)>;
    /// Ok(suboptimal)
    fn queue_present(
        &self,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> VkResult<bool>;

    // Images
    fn create_image(&self, info: &vk::ImageCreateInfo) -> VkResult<vk::Image>;
    /// Allocate and bind memory for `image`; freed again by `destroy_image`.
    fn allocate_image_memory(
        &self,
        image: vk::Image,
        location: MemoryLocation,
        name: &str,
    ) -> VkResult<()>;
    fn destroy_image(&self, image: vk::Image);
    fn create_image_view(&self, info: &vk::ImageViewCreateInfo) -> VkResult<vk::ImageView>;
    fn destroy_image_view(&self, view: vk::ImageView);

    // Render pass / framebuffer
    fn create_render_pass(&self, info: &vk::RenderPassCreateInfo) -> VkResult<vk::RenderPass>;
    fn destroy_render_pass(&self, render_pass: vk::RenderPass);
    fn create_framebuffer(&self, info: &vk::FramebufferCreateInfo) -> VkResult<vk::Framebuffer>;
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    // Commands
    fn create_command_pool(
        &self,
        queue_family: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> VkResult<vk::CommandPool>;
    fn destroy_command_pool(&self, pool: vk::CommandPool);
    fn allocate_command_buffer(
        &self,
        pool: vk::CommandPool,
        level: vk::CommandBufferLevel,
    ) -> VkResult<vk::CommandBuffer>;
    fn free_command_buffer(&self, pool: vk::CommandPool, command_buffer: vk::CommandBuffer);
    fn begin_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        usage: vk::CommandBufferUsageFlags,
    ) -> VkResult<()>;
    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()>;
    fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()>;
    fn cmd_begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
    );
    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer);
    fn cmd_set_viewport(&self, command_buffer: vk::CommandBuffer, viewport: vk::Viewport);
    fn cmd_set_scissor(&self, command_buffer: vk::CommandBuffer, scissor: vk::Rect2D);
    fn queue_submit(&self, queue: vk::Queue, submit: &SubmitDesc, fence: vk::Fence)
        -> VkResult<()>;

    // Synchronization
    fn create_semaphore(&self) -> VkResult<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);
    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence>;
    fn destroy_fence(&self, fence: vk::Fence);
    /// Err(vk::Result::TIMEOUT) when the timeout expires first.
    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VkResult<()>;
    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()>;
}
