// SPDX-License-Identifier: CEPL-1.0
use ash::khr::{surface, swapchain};
use ash::prelude::VkResult;
use ash::{ext::debug_utils, vk, Entry};
use std::ffi::{CStr, CString};
use tracing::trace;

use crate::gpu::Gpu;
use crate::handles::Resource;

/// Driver-backed [`Gpu`]. Holds the loaders; the handles they hand out are owned
/// by the renderer components, which destroy them through this type.
pub struct AshGpu {
    entry: Entry,
    instance: Option<ash::Instance>,
    surface_fn: Option<surface::Instance>,
    debug_fn: Option<debug_utils::Instance>,
    device: Option<ash::Device>,
    swapchain_fn: Option<swapchain::Device>,
}

fn log_destroy<H: Resource>(h: H) {
    trace!(kind = %H::KIND, raw = h.as_raw(), "destroy");
}

fn ext_names(props: &[vk::ExtensionProperties]) -> Vec<CString> {
    props
        .iter()
        .map(|e| unsafe { CStr::from_ptr(e.extension_name.as_ptr()) }.to_owned())
        .collect()
}

impl AshGpu {
    pub fn linked() -> Self {
        Self {
            entry: Entry::linked(),
            instance: None,
            surface_fn: None,
            debug_fn: None,
            device: None,
            swapchain_fn: None,
        }
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Loader for the live instance; needed by window-system surface creation.
    pub fn instance(&self) -> Option<&ash::Instance> {
        self.instance.as_ref()
    }

    fn inst(&self) -> VkResult<&ash::Instance> {
        self.instance.as_ref().ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)
    }

    fn surf(&self) -> VkResult<&surface::Instance> {
        self.surface_fn.as_ref().ok_or(vk::Result::ERROR_EXTENSION_NOT_PRESENT)
    }

    fn dev(&self) -> VkResult<&ash::Device> {
        self.device.as_ref().ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)
    }

    fn sc(&self) -> VkResult<&swapchain::Device> {
        self.swapchain_fn.as_ref().ok_or(vk::Result::ERROR_EXTENSION_NOT_PRESENT)
    }
}

// Every unsafe block below forwards handles that were created through this same
// AshGpu; destruction order is enforced by the renderer components.
impl Gpu for AshGpu {
    fn instance_extensions(&self) -> VkResult<Vec<CString>> {
        let props = unsafe { self.entry.enumerate_instance_extension_properties(None)? };
        Ok(ext_names(&props))
    }

    fn create_instance(&mut self, info: &vk::InstanceCreateInfo<'_>) -> VkResult<vk::Instance> {
        let instance = unsafe { self.entry.create_instance(info, None)? };
        self.surface_fn = Some(surface::Instance::new(&self.entry, &instance));
        self.debug_fn = Some(debug_utils::Instance::new(&self.entry, &instance));
        let handle = instance.handle();
        self.instance = Some(instance);
        Ok(handle)
    }

    fn destroy_instance(&mut self, instance: vk::Instance) {
        log_destroy(instance);
        self.surface_fn = None;
        self.debug_fn = None;
        if let Some(i) = self.instance.take() {
            unsafe { i.destroy_instance(None) };
        }
    }

    fn create_debug_messenger(
        &self,
        info: &vk::DebugUtilsMessengerCreateInfoEXT<'_>,
    ) -> VkResult<vk::DebugUtilsMessengerEXT> {
        let loader = self.debug_fn.as_ref().ok_or(vk::Result::ERROR_EXTENSION_NOT_PRESENT)?;
        unsafe { loader.create_debug_utils_messenger(info, None) }
    }

    fn destroy_debug_messenger(&self, messenger: vk::DebugUtilsMessengerEXT) {
        log_destroy(messenger);
        if let Some(loader) = &self.debug_fn {
            unsafe { loader.destroy_debug_utils_messenger(messenger, None) };
        }
    }

    fn destroy_surface(&self, surface: vk::SurfaceKHR) {
        log_destroy(surface);
        if let Some(loader) = &self.surface_fn {
            unsafe { loader.destroy_surface(surface, None) };
        }
    }

    fn physical_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>> {
        unsafe { self.inst()?.enumerate_physical_devices() }
    }

    fn device_extensions(&self, phys: vk::PhysicalDevice) -> VkResult<Vec<CString>> {
        let props = unsafe { self.inst()?.enumerate_device_extension_properties(phys)? };
        Ok(ext_names(&props))
    }

    fn memory_properties(&self, phys: vk::PhysicalDevice) -> vk::PhysicalDeviceMemoryProperties {
        match &self.instance {
            Some(i) => unsafe { i.get_physical_device_memory_properties(phys) },
            None => vk::PhysicalDeviceMemoryProperties::default(),
        }
    }

    fn surface_capabilities(
        &self,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        unsafe { self.surf()?.get_physical_device_surface_capabilities(phys, surface) }
    }

    fn surface_formats(
        &self,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe { self.surf()?.get_physical_device_surface_formats(phys, surface) }
    }

    fn create_device(
        &mut self,
        phys: vk::PhysicalDevice,
        info: &vk::DeviceCreateInfo<'_>,
    ) -> VkResult<vk::Device> {
        let instance = self.inst()?;
        let device = unsafe { instance.create_device(phys, info, None)? };
        self.swapchain_fn = Some(swapchain::Device::new(instance, &device));
        let handle = device.handle();
        self.device = Some(device);
        Ok(handle)
    }

    fn destroy_device(&mut self, device: vk::Device) {
        log_destroy(device);
        self.swapchain_fn = None;
        if let Some(d) = self.device.take() {
            unsafe { d.destroy_device(None) };
        }
    }

    fn device_queue(&self, family: u32, index: u32) -> vk::Queue {
        match &self.device {
            Some(d) => unsafe { d.get_device_queue(family, index) },
            None => vk::Queue::null(),
        }
    }

    fn device_wait_idle(&self) -> VkResult<()> {
        unsafe { self.dev()?.device_wait_idle() }
    }

    fn create_swapchain(&self, info: &vk::SwapchainCreateInfoKHR<'_>) -> VkResult<vk::SwapchainKHR> {
        unsafe { self.sc()?.create_swapchain(info, None) }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        unsafe { self.sc()?.get_swapchain_images(swapchain) }
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        log_destroy(swapchain);
        if let Some(loader) = &self.swapchain_fn {
            unsafe { loader.destroy_swapchain(swapchain, None) };
        }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        unsafe {
            self.sc()?
                .acquire_next_image(swapchain, timeout_ns, signal, vk::Fence::null())
        }
    }

    fn queue_present(&self, queue: vk::Queue, info: &vk::PresentInfoKHR<'_>) -> VkResult<bool> {
        unsafe { self.sc()?.queue_present(queue, info) }
    }

    fn create_image_view(&self, info: &vk::ImageViewCreateInfo<'_>) -> VkResult<vk::ImageView> {
        unsafe { self.dev()?.create_image_view(info, None) }
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        log_destroy(view);
        if let Some(d) = &self.device {
            unsafe { d.destroy_image_view(view, None) };
        }
    }

    fn create_render_pass(&self, info: &vk::RenderPassCreateInfo<'_>) -> VkResult<vk::RenderPass> {
        unsafe { self.dev()?.create_render_pass(info, None) }
    }

    fn destroy_render_pass(&self, pass: vk::RenderPass) {
        log_destroy(pass);
        if let Some(d) = &self.device {
            unsafe { d.destroy_render_pass(pass, None) };
        }
    }

    fn create_framebuffer(&self, info: &vk::FramebufferCreateInfo<'_>) -> VkResult<vk::Framebuffer> {
        unsafe { self.dev()?.create_framebuffer(info, None) }
    }

    fn destroy_framebuffer(&self, fb: vk::Framebuffer) {
        log_destroy(fb);
        if let Some(d) = &self.device {
            unsafe { d.destroy_framebuffer(fb, None) };
        }
    }

    fn create_buffer(&self, info: &vk::BufferCreateInfo<'_>) -> VkResult<vk::Buffer> {
        unsafe { self.dev()?.create_buffer(info, None) }
    }

    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        match &self.device {
            Some(d) => unsafe { d.get_buffer_memory_requirements(buffer) },
            None => vk::MemoryRequirements::default(),
        }
    }

    fn allocate_memory(&self, info: &vk::MemoryAllocateInfo<'_>) -> VkResult<vk::DeviceMemory> {
        unsafe { self.dev()?.allocate_memory(info, None) }
    }

    fn upload(&self, memory: vk::DeviceMemory, bytes: &[u8]) -> VkResult<usize> {
        let d = self.dev()?;
        unsafe {
            let ptr = d.map_memory(
                memory,
                0,
                bytes.len() as vk::DeviceSize,
                vk::MemoryMapFlags::empty(),
            )?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), bytes.len());
            d.unmap_memory(memory);
        }
        Ok(bytes.len())
    }

    fn bind_buffer_memory(&self, buffer: vk::Buffer, memory: vk::DeviceMemory) -> VkResult<()> {
        unsafe { self.dev()?.bind_buffer_memory(buffer, memory, 0) }
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        log_destroy(buffer);
        if let Some(d) = &self.device {
            unsafe { d.destroy_buffer(buffer, None) };
        }
    }

    fn free_memory(&self, memory: vk::DeviceMemory) {
        log_destroy(memory);
        if let Some(d) = &self.device {
            unsafe { d.free_memory(memory, None) };
        }
    }

    fn create_shader_module(&self, info: &vk::ShaderModuleCreateInfo<'_>) -> VkResult<vk::ShaderModule> {
        unsafe { self.dev()?.create_shader_module(info, None) }
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        log_destroy(module);
        if let Some(d) = &self.device {
            unsafe { d.destroy_shader_module(module, None) };
        }
    }

    fn create_pipeline_layout(
        &self,
        info: &vk::PipelineLayoutCreateInfo<'_>,
    ) -> VkResult<vk::PipelineLayout> {
        unsafe { self.dev()?.create_pipeline_layout(info, None) }
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        log_destroy(layout);
        if let Some(d) = &self.device {
            unsafe { d.destroy_pipeline_layout(layout, None) };
        }
    }

    fn create_pipeline_cache(&self, info: &vk::PipelineCacheCreateInfo<'_>) -> VkResult<vk::PipelineCache> {
        unsafe { self.dev()?.create_pipeline_cache(info, None) }
    }

    fn pipeline_cache_data(&self, cache: vk::PipelineCache) -> VkResult<Vec<u8>> {
        unsafe { self.dev()?.get_pipeline_cache_data(cache) }
    }

    fn destroy_pipeline_cache(&self, cache: vk::PipelineCache) {
        log_destroy(cache);
        if let Some(d) = &self.device {
            unsafe { d.destroy_pipeline_cache(cache, None) };
        }
    }

    fn create_graphics_pipeline(
        &self,
        cache: vk::PipelineCache,
        info: &vk::GraphicsPipelineCreateInfo<'_>,
    ) -> VkResult<vk::Pipeline> {
        let pipelines = unsafe {
            self.dev()?
                .create_graphics_pipelines(cache, std::slice::from_ref(info), None)
                .map_err(|(_, code)| code)?
        };
        pipelines
            .into_iter()
            .next()
            .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        log_destroy(pipeline);
        if let Some(d) = &self.device {
            unsafe { d.destroy_pipeline(pipeline, None) };
        }
    }

    fn create_command_pool(&self, info: &vk::CommandPoolCreateInfo<'_>) -> VkResult<vk::CommandPool> {
        unsafe { self.dev()?.create_command_pool(info, None) }
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        log_destroy(pool);
        if let Some(d) = &self.device {
            unsafe { d.destroy_command_pool(pool, None) };
        }
    }

    fn allocate_command_buffers(
        &self,
        info: &vk::CommandBufferAllocateInfo<'_>,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        unsafe { self.dev()?.allocate_command_buffers(info) }
    }

    fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        if let Some(d) = &self.device {
            unsafe { d.free_command_buffers(pool, buffers) };
        }
    }

    fn begin_command_buffer(
        &self,
        cmd: vk::CommandBuffer,
        info: &vk::CommandBufferBeginInfo<'_>,
    ) -> VkResult<()> {
        unsafe { self.dev()?.begin_command_buffer(cmd, info) }
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        unsafe { self.dev()?.end_command_buffer(cmd) }
    }

    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, info: &vk::RenderPassBeginInfo<'_>) {
        if let Some(d) = &self.device {
            unsafe { d.cmd_begin_render_pass(cmd, info, vk::SubpassContents::INLINE) };
        }
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        if let Some(d) = &self.device {
            unsafe { d.cmd_end_render_pass(cmd) };
        }
    }

    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        if let Some(d) = &self.device {
            unsafe { d.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline) };
        }
    }

    fn cmd_bind_vertex_buffers(
        &self,
        cmd: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    ) {
        if let Some(d) = &self.device {
            unsafe { d.cmd_bind_vertex_buffers(cmd, first_binding, buffers, offsets) };
        }
    }

    fn cmd_draw(
        &self,
        cmd: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        if let Some(d) = &self.device {
            unsafe { d.cmd_draw(cmd, vertex_count, instance_count, first_vertex, first_instance) };
        }
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let ci = vk::SemaphoreCreateInfo::default();
        unsafe { self.dev()?.create_semaphore(&ci, None) }
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        log_destroy(semaphore);
        if let Some(d) = &self.device {
            unsafe { d.destroy_semaphore(semaphore, None) };
        }
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let ci = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: if signaled {
                vk::FenceCreateFlags::SIGNALED
            } else {
                vk::FenceCreateFlags::empty()
            },
            ..Default::default()
        };
        unsafe { self.dev()?.create_fence(&ci, None) }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        log_destroy(fence);
        if let Some(d) = &self.device {
            unsafe { d.destroy_fence(fence, None) };
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.dev()?.reset_fences(&[fence]) }
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VkResult<()> {
        unsafe { self.dev()?.wait_for_fences(&[fence], true, timeout_ns) }
    }

    fn queue_submit(&self, queue: vk::Queue, submit: &vk::SubmitInfo<'_>, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.dev()?.queue_submit(queue, std::slice::from_ref(submit), fence) }
    }
}
