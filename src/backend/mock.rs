// Fake driver for unit tests (no GPU required)
//
// Physical devices are plain descriptions; every device-level call is logged
// into a shared `MockState` that tests inspect. Submitted work "completes"
// instantly: a fence passed to queue_submit becomes signaled. Results of
// acquire/present/submit/wait and command buffer resets can be scripted.

use super::driver::{DeviceApi, DeviceCreateDesc, InstanceApi, SubmitDesc};
use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct MockPhysicalDevice {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub geometry_shader: bool,
    pub sampler_anisotropy: bool,
    pub queue_families: Vec<(vk::QueueFlags, bool)>,
    pub extensions: Vec<String>,
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
    pub depth_formats: Vec<vk::Format>,
}

impl MockPhysicalDevice {
    pub fn discrete(name: &str) -> Self {
        Self::new(name, vk::PhysicalDeviceType::DISCRETE_GPU)
    }

    pub fn integrated(name: &str) -> Self {
        Self::new(name, vk::PhysicalDeviceType::INTEGRATED_GPU)
    }

    fn new(name: &str, device_type: vk::PhysicalDeviceType) -> Self {
        Self {
            name: name.to_string(),
            device_type,
            geometry_shader: true,
            sampler_anisotropy: true,
            queue_families: vec![(
                vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
                true,
            )],
            extensions: vec!["VK_KHR_swapchain".to_string()],
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 3,
                current_extent: vk::Extent2D { width: 800, height: 600 },
                min_image_extent: vk::Extent2D { width: 1, height: 1 },
                max_image_extent: vk::Extent2D { width: 4096, height: 4096 },
                max_image_array_layers: 1,
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                ..Default::default()
            },
            formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
            depth_formats: vec![vk::Format::D32_SFLOAT],
        }
    }

    pub fn without_geometry_shader(mut self) -> Self {
        self.geometry_shader = false;
        self
    }

    pub fn without_anisotropy(mut self) -> Self {
        self.sampler_anisotropy = false;
        self
    }

    pub fn with_queue_families(mut self, families: Vec<(vk::QueueFlags, bool)>) -> Self {
        self.queue_families = families;
        self
    }

    pub fn with_extensions(mut self, extensions: Vec<&str>) -> Self {
        self.extensions = extensions.into_iter().map(str::to_string).collect();
        self
    }

    pub fn with_present_modes(mut self, modes: Vec<vk::PresentModeKHR>) -> Self {
        self.present_modes = modes;
        self
    }

    pub fn with_depth_formats(mut self, formats: Vec<vk::Format>) -> Self {
        self.depth_formats = formats;
        self
    }

    pub fn with_capabilities(mut self, capabilities: vk::SurfaceCapabilitiesKHR) -> Self {
        self.capabilities = capabilities;
        self
    }
}

/// Everything the fake driver observed, in call order where it matters.
#[derive(Default)]
pub struct MockState {
    next_handle: u64,
    live: HashMap<u64, &'static str>,
    /// Kinds of destroyed objects, in destruction order
    pub destroyed: Vec<&'static str>,

    pub surface_queries: usize,
    pub surface_extent: Option<vk::Extent2D>,
    pub device_queue_families: Vec<u32>,
    pub device_extensions: Vec<String>,
    pub device_layers: Vec<String>,
    pub fail_device_creation: bool,

    pub swapchains_created: usize,
    pub swapchain_extent: vk::Extent2D,
    pub swapchain_format: vk::Format,
    pub swapchain_present_mode: vk::PresentModeKHR,
    pub swapchain_min_images: u32,
    pub swapchain_sharing: vk::SharingMode,
    pub image_count: u32,
    next_image: u32,
    pub images_created: Vec<(vk::Extent3D, vk::Format, vk::ImageUsageFlags)>,
    pub image_allocations: Vec<MemoryLocation>,
    pub render_pass_attachments: Vec<u32>,
    pub framebuffers_created: Vec<(u32, u32, u32)>,

    pub acquire_script: VecDeque<VkResult<(u32, bool)>>,
    pub present_script: VecDeque<VkResult<bool>>,
    pub submit_script: VecDeque<VkResult<()>>,
    pub wait_script: VecDeque<VkResult<()>>,
    pub reset_script: VecDeque<VkResult<()>>,

    pub fences: HashMap<vk::Fence, bool>,
    pub fence_waits: usize,
    pub fence_resets: usize,
    pub device_wait_idles: usize,
    pub queue_wait_idles: usize,

    pub command_buffer_begins: Vec<(vk::CommandBuffer, vk::CommandBufferUsageFlags)>,
    pub command_buffer_ends: usize,
    pub command_buffer_resets: usize,
    pub render_pass_begins: Vec<(vk::Framebuffer, vk::Rect2D)>,
    pub render_pass_ends: usize,
    pub viewports: Vec<vk::Viewport>,
    pub scissors: Vec<vk::Rect2D>,
    pub submits: Vec<(vk::Queue, SubmitDesc, vk::Fence)>,
    pub presents: Vec<(vk::Queue, u32, vk::Semaphore)>,
}

impl MockState {
    fn create<T: Handle>(&mut self, kind: &'static str) -> T {
        self.next_handle += 1;
        self.live.insert(self.next_handle, kind);
        T::from_raw(self.next_handle)
    }

    fn destroy<T: Handle>(&mut self, handle: T) {
        if let Some(kind) = self.live.remove(&handle.as_raw()) {
            self.destroyed.push(kind);
        }
    }

    pub fn live_objects(&self) -> usize {
        self.live.len()
    }

    pub fn position(&self, kind: &str) -> Option<usize> {
        self.destroyed.iter().position(|k| *k == kind)
    }

    pub fn last_position(&self, kind: &str) -> Option<usize> {
        self.destroyed.iter().rposition(|k| *k == kind)
    }
}

pub type SharedState = Arc<Mutex<MockState>>;

pub struct MockInstance {
    devices: Vec<MockPhysicalDevice>,
    state: SharedState,
}

impl MockInstance {
    pub fn new(devices: Vec<MockPhysicalDevice>) -> Self {
        Self {
            devices,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    pub fn state(&self) -> SharedState {
        self.state.clone()
    }

    pub fn surface_queries(&self) -> usize {
        self.state.lock().surface_queries
    }

    fn device(&self, pdevice: vk::PhysicalDevice) -> &MockPhysicalDevice {
        &self.devices[pdevice.as_raw() as usize - 1]
    }
}

impl Drop for MockInstance {
    fn drop(&mut self) {
        self.state.lock().destroyed.push("instance");
    }
}

impl InstanceApi for MockInstance {
    fn enumerate_physical_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>> {
        Ok((1..=self.devices.len() as u64)
            .map(vk::PhysicalDevice::from_raw)
            .collect())
    }

    fn physical_device_properties(&self, pdevice: vk::PhysicalDevice) -> vk::PhysicalDeviceProperties {
        let device = self.device(pdevice);
        let mut properties = vk::PhysicalDeviceProperties {
            device_type: device.device_type,
            api_version: vk::make_api_version(0, 1, 3, 0),
            driver_version: vk::make_api_version(0, 1, 0, 0),
            ..Default::default()
        };
        for (dst, src) in properties.device_name.iter_mut().zip(device.name.bytes()) {
            *dst = src as std::os::raw::c_char;
        }
        properties
    }

    fn physical_device_features(&self, pdevice: vk::PhysicalDevice) -> vk::PhysicalDeviceFeatures {
        let device = self.device(pdevice);
        vk::PhysicalDeviceFeatures {
            geometry_shader: device.geometry_shader as vk::Bool32,
            sampler_anisotropy: device.sampler_anisotropy as vk::Bool32,
            ..Default::default()
        }
    }

    fn physical_device_memory_properties(
        &self,
        _pdevice: vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceMemoryProperties {
        let mut memory = vk::PhysicalDeviceMemoryProperties {
            memory_heap_count: 2,
            ..Default::default()
        };
        memory.memory_heaps[0] = vk::MemoryHeap {
            size: 8 << 30,
            flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
        };
        memory.memory_heaps[1] = vk::MemoryHeap {
            size: 16 << 30,
            flags: vk::MemoryHeapFlags::empty(),
        };
        memory
    }

    fn queue_family_properties(&self, pdevice: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties> {
        self.device(pdevice)
            .queue_families
            .iter()
            .map(|(flags, _)| vk::QueueFamilyProperties {
                queue_flags: *flags,
                queue_count: 1,
                ..Default::default()
            })
            .collect()
    }

    fn format_properties(&self, pdevice: vk::PhysicalDevice, format: vk::Format) -> vk::FormatProperties {
        let optimal = if self.device(pdevice).depth_formats.contains(&format) {
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
        } else {
            vk::FormatFeatureFlags::empty()
        };
        vk::FormatProperties {
            optimal_tiling_features: optimal,
            ..Default::default()
        }
    }

    fn device_extension_names(&self, pdevice: vk::PhysicalDevice) -> VkResult<Vec<String>> {
        Ok(self.device(pdevice).extensions.clone())
    }

    fn surface_support(&self, pdevice: vk::PhysicalDevice, queue_family: u32) -> VkResult<bool> {
        Ok(self
            .device(pdevice)
            .queue_families
            .get(queue_family as usize)
            .map_or(false, |(_, present)| *present))
    }

    fn surface_capabilities(&self, pdevice: vk::PhysicalDevice) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        let mut state = self.state.lock();
        state.surface_queries += 1;
        let mut capabilities = self.device(pdevice).capabilities;
        if let Some(extent) = state.surface_extent {
            capabilities.current_extent = extent;
        }
        Ok(capabilities)
    }

    fn surface_formats(&self, pdevice: vk::PhysicalDevice) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        Ok(self.device(pdevice).formats.clone())
    }

    fn surface_present_modes(&self, pdevice: vk::PhysicalDevice) -> VkResult<Vec<vk::PresentModeKHR>> {
        Ok(self.device(pdevice).present_modes.clone())
    }

    fn create_device(
        self: Arc<Self>,
        _pdevice: vk::PhysicalDevice,
        desc: &DeviceCreateDesc<'_>,
    ) -> VkResult<Arc<dyn DeviceApi>> {
        let mut state = self.state.lock();
        if state.fail_device_creation {
            return Err(vk::Result::ERROR_INITIALIZATION_FAILED);
        }
        state.device_queue_families = desc.queue_families.to_vec();
        state.device_extensions = desc
            .extensions
            .iter()
            .map(|name| name.to_string_lossy().into_owned())
            .collect();
        state.device_layers = desc
            .layers
            .iter()
            .map(|name| name.to_string_lossy().into_owned())
            .collect();
        drop(state);

        Ok(Arc::new(MockDevice {
            state: self.state.clone(),
            _instance: self,
        }))
    }
}

pub struct MockDevice {
    state: SharedState,
    _instance: Arc<MockInstance>,
}

impl MockDevice {
    /// A standalone device for tests that don't go through selection.
    pub fn standalone() -> (Arc<Self>, SharedState) {
        let instance = Arc::new(MockInstance::new(vec![MockPhysicalDevice::discrete("gpu")]));
        let state = instance.state();
        let device = Arc::new(MockDevice {
            state: state.clone(),
            _instance: instance,
        });
        (device, state)
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.state.lock().destroyed.push("device");
    }
}

impl DeviceApi for MockDevice {
    fn get_queue(&self, family: u32, index: u32) -> vk::Queue {
        vk::Queue::from_raw(0x1000 + ((family as u64) << 8) + index as u64)
    }

    fn wait_idle(&self) -> VkResult<()> {
        self.state.lock().device_wait_idles += 1;
        Ok(())
    }

    fn queue_wait_idle(&self, _queue: vk::Queue) -> VkResult<()> {
        self.state.lock().queue_wait_idles += 1;
        Ok(())
    }

    fn create_swapchain(&self, info: &vk::SwapchainCreateInfoKHR) -> VkResult<vk::SwapchainKHR> {
        let mut state = self.state.lock();
        state.swapchains_created += 1;
        state.swapchain_extent = info.image_extent;
        state.swapchain_format = info.image_format;
        state.swapchain_present_mode = info.present_mode;
        state.swapchain_min_images = info.min_image_count;
        state.swapchain_sharing = info.image_sharing_mode;
        state.image_count = info.min_image_count;
        state.next_image = 0;
        Ok(state.create("swapchain"))
    }

    fn swapchain_images(&self, _swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        let mut state = self.state.lock();
        let count = state.image_count;
        // Presentable images belong to the swapchain, not to the live set
        let images = (0..count)
            .map(|i| vk::Image::from_raw(0x10_0000 + state.swapchains_created as u64 * 16 + i as u64))
            .collect();
        state.next_image = 0;
        Ok(images)
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        self.state.lock().destroy(swapchain);
    }

    fn acquire_next_image(
        &self,
        _swapchain: vk::SwapchainKHR,
        _timeout_ns: u64,
        _semaphore: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        let mut state = self.state.lock();
        if let Some(result) = state.acquire_script.pop_front() {
            return result;
        }
        let index = state.next_image;
        state.next_image = (index + 1) % state.image_count.max(1);
        Ok((index, false))
    }

    fn queue_present(
        &self,
        queue: vk::Queue,
        _swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> VkResult<bool> {
        let mut state = self.state.lock();
        if let Some(result) = state.present_script.pop_front() {
            return result;
        }
        state.presents.push((queue, image_index, wait_semaphore));
        Ok(false)
    }

    fn create_image(&self, info: &vk::ImageCreateInfo) -> VkResult<vk::Image> {
        let mut state = self.state.lock();
        state.images_created.push((info.extent, info.format, info.usage));
        Ok(state.create("image"))
    }

    fn allocate_image_memory(
        &self,
        _image: vk::Image,
        location: MemoryLocation,
        _name: &str,
    ) -> VkResult<()> {
        self.state.lock().image_allocations.push(location);
        Ok(())
    }

    fn destroy_image(&self, image: vk::Image) {
        self.state.lock().destroy(image);
    }

    fn create_image_view(&self, _info: &vk::ImageViewCreateInfo) -> VkResult<vk::ImageView> {
        Ok(self.state.lock().create("image_view"))
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.state.lock().destroy(view);
    }

    fn create_render_pass(&self, info: &vk::RenderPassCreateInfo) -> VkResult<vk::RenderPass> {
        let mut state = self.state.lock();
        state.render_pass_attachments.push(info.attachment_count);
        Ok(state.create("render_pass"))
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.state.lock().destroy(render_pass);
    }

    fn create_framebuffer(&self, info: &vk::FramebufferCreateInfo) -> VkResult<vk::Framebuffer> {
        let mut state = self.state.lock();
        state
            .framebuffers_created
            .push((info.attachment_count, info.width, info.height));
        Ok(state.create("framebuffer"))
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.state.lock().destroy(framebuffer);
    }

    fn create_command_pool(
        &self,
        _queue_family: u32,
        _flags: vk::CommandPoolCreateFlags,
    ) -> VkResult<vk::CommandPool> {
        Ok(self.state.lock().create("command_pool"))
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        self.state.lock().destroy(pool);
    }

    fn allocate_command_buffer(
        &self,
        _pool: vk::CommandPool,
        _level: vk::CommandBufferLevel,
    ) -> VkResult<vk::CommandBuffer> {
        Ok(self.state.lock().create("command_buffer"))
    }

    fn free_command_buffer(&self, _pool: vk::CommandPool, command_buffer: vk::CommandBuffer) {
        self.state.lock().destroy(command_buffer);
    }

    fn begin_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        usage: vk::CommandBufferUsageFlags,
    ) -> VkResult<()> {
        self.state
            .lock()
            .command_buffer_begins
            .push((command_buffer, usage));
        Ok(())
    }

    fn end_command_buffer(&self, _command_buffer: vk::CommandBuffer) -> VkResult<()> {
        self.state.lock().command_buffer_ends += 1;
        Ok(())
    }

    fn reset_command_buffer(&self, _command_buffer: vk::CommandBuffer) -> VkResult<()> {
        let mut state = self.state.lock();
        if let Some(Err(e)) = state.reset_script.pop_front() {
            return Err(e);
        }
        state.command_buffer_resets += 1;
        Ok(())
    }

    fn cmd_begin_render_pass(
        &self,
        _command_buffer: vk::CommandBuffer,
        _render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        _clear_values: &[vk::ClearValue],
    ) {
        self.state
            .lock()
            .render_pass_begins
            .push((framebuffer, render_area));
    }

    fn cmd_end_render_pass(&self, _command_buffer: vk::CommandBuffer) {
        self.state.lock().render_pass_ends += 1;
    }

    fn cmd_set_viewport(&self, _command_buffer: vk::CommandBuffer, viewport: vk::Viewport) {
        self.state.lock().viewports.push(viewport);
    }

    fn cmd_set_scissor(&self, _command_buffer: vk::CommandBuffer, scissor: vk::Rect2D) {
        self.state.lock().scissors.push(scissor);
    }

    fn queue_submit(&self, queue: vk::Queue, submit: &SubmitDesc, fence: vk::Fence) -> VkResult<()> {
        let mut state = self.state.lock();
        if let Some(Err(e)) = state.submit_script.pop_front() {
            return Err(e);
        }
        state.submits.push((queue, *submit, fence));
        if fence != vk::Fence::null() {
            state.fences.insert(fence, true);
        }
        Ok(())
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        Ok(self.state.lock().create("semaphore"))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.state.lock().destroy(semaphore);
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let mut state = self.state.lock();
        let fence = state.create("fence");
        state.fences.insert(fence, signaled);
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.state.lock();
        state.fences.remove(&fence);
        state.destroy(fence);
    }

    fn wait_for_fence(&self, fence: vk::Fence, _timeout_ns: u64) -> VkResult<()> {
        let mut state = self.state.lock();
        state.fence_waits += 1;
        if let Some(result) = state.wait_script.pop_front() {
            return result;
        }
        match state.fences.get(&fence) {
            Some(true) => Ok(()),
            // Nothing submitted against it: a real wait would never return
            _ => Err(vk::Result::TIMEOUT),
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        let mut state = self.state.lock();
        state.fence_resets += 1;
        state.fences.insert(fence, false);
        Ok(())
    }
}
