// SPDX-License-Identifier: CEPL-1.0
//! The Vulkan call surface the renderer uses, one method per entry point.
//!
//! [`crate::AshGpu`] forwards to the driver. Tests substitute a handle-tracking
//! fake. Handles passed in must have been produced by the same backend.

use ash::prelude::VkResult;
use ash::vk;
use std::ffi::CString;

pub trait Gpu {
    // --- instance scope ---
    fn instance_extensions(&self) -> VkResult<Vec<CString>>;
    fn create_instance(&mut self, info: &vk::InstanceCreateInfo<'_>) -> VkResult<vk::Instance>;
    fn destroy_instance(&mut self, instance: vk::Instance);
    fn create_debug_messenger(
        &self,
        info: &vk::DebugUtilsMessengerCreateInfoEXT<'_>,
    ) -> VkResult<vk::DebugUtilsMessengerEXT>;
    fn destroy_debug_messenger(&self, messenger: vk::DebugUtilsMessengerEXT);
    fn destroy_surface(&self, surface: vk::SurfaceKHR);

    fn physical_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>>;
    fn device_extensions(&self, phys: vk::PhysicalDevice) -> VkResult<Vec<CString>>;
    fn memory_properties(&self, phys: vk::PhysicalDevice) -> vk::PhysicalDeviceMemoryProperties;
    fn surface_capabilities(
        &self,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR>;
    fn surface_formats(
        &self,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::SurfaceFormatKHR>>;

    fn create_device(
        &mut self,
        phys: vk::PhysicalDevice,
        info: &vk::DeviceCreateInfo<'_>,
    ) -> VkResult<vk::Device>;
    fn destroy_device(&mut self, device: vk::Device);
    fn device_queue(&self, family: u32, index: u32) -> vk::Queue;
    fn device_wait_idle(&self) -> VkResult<()>;

    // --- presentation ---
    fn create_swapchain(&self, info: &vk::SwapchainCreateInfoKHR<'_>) -> VkResult<vk::SwapchainKHR>;
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>>;
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)>;
    fn queue_present(&self, queue: vk::Queue, info: &vk::PresentInfoKHR<'_>) -> VkResult<bool>;

    // --- images and passes ---
    fn create_image_view(&self, info: &vk::ImageViewCreateInfo<'_>) -> VkResult<vk::ImageView>;
    fn destroy_image_view(&self, view: vk::ImageView);
    fn create_render_pass(&self, info: &vk::RenderPassCreateInfo<'_>) -> VkResult<vk::RenderPass>;
    fn destroy_render_pass(&self, pass: vk::RenderPass);
    fn create_framebuffer(&self, info: &vk::FramebufferCreateInfo<'_>) -> VkResult<vk::Framebuffer>;
    fn destroy_framebuffer(&self, fb: vk::Framebuffer);

    // --- buffers and memory ---
    fn create_buffer(&self, info: &vk::BufferCreateInfo<'_>) -> VkResult<vk::Buffer>;
    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements;
    fn allocate_memory(&self, info: &vk::MemoryAllocateInfo<'_>) -> VkResult<vk::DeviceMemory>;
    /// Maps `memory`, copies `bytes` to offset 0, unmaps. Returns the bytes copied.
    fn upload(&self, memory: vk::DeviceMemory, bytes: &[u8]) -> VkResult<usize>;
    fn bind_buffer_memory(&self, buffer: vk::Buffer, memory: vk::DeviceMemory) -> VkResult<()>;
    fn destroy_buffer(&self, buffer: vk::Buffer);
    fn free_memory(&self, memory: vk::DeviceMemory);

    // --- pipeline ---
    fn create_shader_module(&self, info: &vk::ShaderModuleCreateInfo<'_>) -> VkResult<vk::ShaderModule>;
    fn destroy_shader_module(&self, module: vk::ShaderModule);
    fn create_pipeline_layout(
        &self,
        info: &vk::PipelineLayoutCreateInfo<'_>,
    ) -> VkResult<vk::PipelineLayout>;
    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);
    fn create_pipeline_cache(&self, info: &vk::PipelineCacheCreateInfo<'_>) -> VkResult<vk::PipelineCache>;
    fn pipeline_cache_data(&self, cache: vk::PipelineCache) -> VkResult<Vec<u8>>;
    fn destroy_pipeline_cache(&self, cache: vk::PipelineCache);
    fn create_graphics_pipeline(
        &self,
        cache: vk::PipelineCache,
        info: &vk::GraphicsPipelineCreateInfo<'_>,
    ) -> VkResult<vk::Pipeline>;
    fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    // --- commands ---
    fn create_command_pool(&self, info: &vk::CommandPoolCreateInfo<'_>) -> VkResult<vk::CommandPool>;
    fn destroy_command_pool(&self, pool: vk::CommandPool);
    fn allocate_command_buffers(
        &self,
        info: &vk::CommandBufferAllocateInfo<'_>,
    ) -> VkResult<Vec<vk::CommandBuffer>>;
    fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]);
    fn begin_command_buffer(
        &self,
        cmd: vk::CommandBuffer,
        info: &vk::CommandBufferBeginInfo<'_>,
    ) -> VkResult<()>;
    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()>;
    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, info: &vk::RenderPassBeginInfo<'_>);
    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer);
    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline);
    fn cmd_bind_vertex_buffers(
        &self,
        cmd: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    );
    fn cmd_draw(
        &self,
        cmd: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    );

    // --- synchronization ---
    fn create_semaphore(&self) -> VkResult<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);
    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence>;
    fn destroy_fence(&self, fence: vk::Fence);
    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()>;
    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VkResult<()>;
    fn queue_submit(&self, queue: vk::Queue, submit: &vk::SubmitInfo<'_>, fence: vk::Fence) -> VkResult<()>;
}
