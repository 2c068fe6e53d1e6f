// SPDX-License-Identifier: CEPL-1.0
//! Handle-tracking stand-ins for the driver and the window, used by the unit tests.

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::ffi::CString;
use std::rc::Rc;

use crate::gpu::Gpu;
use crate::handles::{Resource, ResourceKind};
use crate::host::WindowHost;
use crate::shader::{ShaderSource, ShaderStage};
use crate::{RenderError, RenderSize, Result};

#[derive(Clone, Debug, PartialEq)]
pub enum Cmd {
    Begin,
    BeginRenderPass {
        pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear: [f32; 4],
    },
    BindPipeline(vk::Pipeline),
    BindVertexBuffers {
        first: u32,
        buffers: Vec<vk::Buffer>,
        offsets: Vec<vk::DeviceSize>,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    EndRenderPass,
    End,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FenceState {
    Signaled,
    Unsignaled,
    /// In flight; reports TIMEOUT for this many more waits, then signals.
    Pending(u32),
}

#[derive(Clone, Debug, Default)]
pub struct SwapchainDesc {
    pub min_image_count: u32,
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
    pub clipped: bool,
    pub sharing_mode: vk::SharingMode,
    pub queue_families: Vec<u32>,
}

#[derive(Clone, Debug, Default)]
pub struct PipelineDesc {
    pub stage_count: usize,
    pub entry_points: Vec<String>,
    pub topology: vk::PrimitiveTopology,
    pub primitive_restart: bool,
    pub stride: u32,
    pub attribute_format: vk::Format,
    pub viewport: vk::Extent2D,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub line_width: f32,
    pub samples: vk::SampleCountFlags,
    pub blend_enable: bool,
    pub write_mask: vk::ColorComponentFlags,
    pub cache: vk::PipelineCache,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RenderPassDesc {
    pub format: vk::Format,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub initial_layout: vk::ImageLayout,
    pub final_layout: vk::ImageLayout,
}

struct State {
    next_raw: u64,
    live: HashMap<u64, ResourceKind>,
    destroyed: Vec<ResourceKind>,
    violations: Vec<String>,
    calls: Vec<&'static str>,

    fail_once: HashMap<&'static str, VecDeque<Option<vk::Result>>>,
    suboptimal: HashSet<&'static str>,
    stall_next: Option<u32>,
    short_upload: Option<usize>,

    instance_exts: Vec<CString>,
    device_exts: Vec<CString>,
    gpu_count: usize,
    caps: vk::SurfaceCapabilitiesKHR,
    formats: Vec<vk::SurfaceFormatKHR>,
    memory: vk::PhysicalDeviceMemoryProperties,
    queue: u64,

    swapchain_images: HashMap<u64, Vec<vk::Image>>,
    acquires: u32,
    semaphores: HashMap<u64, bool>,
    fences: HashMap<u64, FenceState>,
    pool_of: HashMap<u64, u64>,
    buffer_size: HashMap<u64, vk::DeviceSize>,
    commands: HashMap<u64, Vec<Cmd>>,

    swapchain_desc: SwapchainDesc,
    pipeline_desc: PipelineDesc,
    render_pass_desc: Option<RenderPassDesc>,
    framebuffer_attachments: Vec<u32>,
    memory_type: Option<u32>,
    cache_seed_len: usize,
    submitted: Vec<vk::CommandBuffer>,
    presented: Vec<u32>,
}

impl State {
    fn check(&mut self, op: &'static str) -> VkResult<()> {
        self.calls.push(op);
        match self.fail_once.get_mut(op).and_then(VecDeque::pop_front) {
            Some(Some(code)) => Err(code),
            _ => Ok(()),
        }
    }

    fn raw(&mut self) -> u64 {
        self.next_raw += 1;
        self.next_raw
    }

    fn mint<H: Resource>(&mut self) -> H {
        let raw = self.raw();
        self.live.insert(raw, H::KIND);
        H::from_raw(raw)
    }

    fn any_live(&self, pred: impl Fn(ResourceKind) -> bool) -> Vec<ResourceKind> {
        let mut kinds: Vec<_> = self.live.values().copied().filter(|&k| pred(k)).collect();
        kinds.sort();
        kinds
    }

    fn release<H: Resource>(&mut self, h: H) {
        let raw = h.as_raw();
        if raw == 0 {
            return;
        }
        let blockers = match H::KIND {
            ResourceKind::Device => self.any_live(ResourceKind::is_device_child),
            ResourceKind::Instance => self.any_live(|k| {
                matches!(
                    k,
                    ResourceKind::Device | ResourceKind::Surface | ResourceKind::DebugMessenger
                )
            }),
            ResourceKind::Swapchain => self.any_live(|k| k == ResourceKind::ImageView),
            ResourceKind::RenderPass => self.any_live(|k| k == ResourceKind::Framebuffer),
            ResourceKind::Memory => self.any_live(|k| k == ResourceKind::Buffer),
            _ => Vec::new(),
        };
        if !blockers.is_empty() {
            self.violations
                .push(format!("{} destroyed while {blockers:?} alive", H::KIND));
        }
        match self.live.remove(&raw) {
            Some(kind) if kind == H::KIND => self.destroyed.push(kind),
            Some(kind) => self.violations.push(format!("{kind} destroyed as {}", H::KIND)),
            None => self.violations.push(format!("{} {raw} destroyed twice", H::KIND)),
        }
    }
}

/// Cloneable so tests can keep a probe after the renderer takes ownership.
#[derive(Clone)]
pub struct FakeGpu {
    state: Rc<RefCell<State>>,
}

impl FakeGpu {
    /// One GPU, a 500x500 BGRA8 surface asking for two images.
    pub fn new() -> Self {
        let mut memory = vk::PhysicalDeviceMemoryProperties::default();
        memory.memory_type_count = 2;
        memory.memory_types[0] = vk::MemoryType {
            property_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            heap_index: 0,
        };
        memory.memory_types[1] = vk::MemoryType {
            property_flags: vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT,
            heap_index: 0,
        };
        let caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            current_extent: vk::Extent2D { width: 500, height: 500 },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D { width: 4096, height: 4096 },
            max_image_array_layers: 1,
            supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT,
        };
        let state = State {
            next_raw: 0x1000,
            live: HashMap::new(),
            destroyed: Vec::new(),
            violations: Vec::new(),
            calls: Vec::new(),
            fail_once: HashMap::new(),
            suboptimal: HashSet::new(),
            stall_next: None,
            short_upload: None,
            instance_exts: vec![
                ash::khr::surface::NAME.to_owned(),
                ash::ext::debug_utils::NAME.to_owned(),
            ],
            device_exts: vec![ash::khr::swapchain::NAME.to_owned()],
            gpu_count: 1,
            caps,
            formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            memory,
            queue: 0,
            swapchain_images: HashMap::new(),
            acquires: 0,
            semaphores: HashMap::new(),
            fences: HashMap::new(),
            pool_of: HashMap::new(),
            buffer_size: HashMap::new(),
            commands: HashMap::new(),
            swapchain_desc: SwapchainDesc::default(),
            pipeline_desc: PipelineDesc::default(),
            render_pass_desc: None,
            framebuffer_attachments: Vec::new(),
            memory_type: None,
            cache_seed_len: 0,
            submitted: Vec::new(),
            presented: Vec::new(),
        };
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    // --- configuration ---

    pub fn set_surface_extent(&self, width: u32, height: u32) {
        self.state.borrow_mut().caps.current_extent = vk::Extent2D { width, height };
    }

    pub fn set_min_image_count(&self, count: u32) {
        self.state.borrow_mut().caps.min_image_count = count;
    }

    pub fn set_formats(&self, formats: Vec<vk::SurfaceFormatKHR>) {
        self.state.borrow_mut().formats = formats;
    }

    pub fn set_gpu_count(&self, count: usize) {
        self.state.borrow_mut().gpu_count = count;
    }

    pub fn set_device_extensions(&self, exts: Vec<CString>) {
        self.state.borrow_mut().device_exts = exts;
    }

    pub fn set_memory_properties(&self, memory: vk::PhysicalDeviceMemoryProperties) {
        self.state.borrow_mut().memory = memory;
    }

    /// The next call to `op` fails with `code`; later calls succeed.
    pub fn fail_next(&self, op: &'static str, code: vk::Result) {
        let mut s = self.state.borrow_mut();
        s.fail_once.entry(op).or_default().push_back(Some(code));
    }

    /// Calls to `op` succeed `ok` more times, then one fails with `code`.
    pub fn fail_after(&self, op: &'static str, ok: usize, code: vk::Result) {
        let mut s = self.state.borrow_mut();
        let queue = s.fail_once.entry(op).or_default();
        queue.extend(std::iter::repeat(None).take(ok));
        queue.push_back(Some(code));
    }

    /// The next acquire or present reports SUBOPTIMAL_KHR.
    pub fn suboptimal_next(&self, op: &'static str) {
        self.state.borrow_mut().suboptimal.insert(op);
    }

    /// The next submitted fence times out `waits` times before signaling.
    pub fn stall_next_fence(&self, waits: u32) {
        self.state.borrow_mut().stall_next = Some(waits);
    }

    pub fn short_upload(&self, bytes: usize) {
        self.state.borrow_mut().short_upload = Some(bytes);
    }

    pub fn mint_surface(&self) -> VkResult<vk::SurfaceKHR> {
        let mut s = self.state.borrow_mut();
        s.check("vkCreateSurfaceKHR")?;
        Ok(s.mint())
    }

    // --- probes ---

    pub fn live(&self, kind: ResourceKind) -> usize {
        self.state.borrow().live.values().filter(|&&k| k == kind).count()
    }

    pub fn live_total(&self) -> usize {
        self.state.borrow().live.len()
    }

    pub fn violations(&self) -> Vec<String> {
        self.state.borrow().violations.clone()
    }

    pub fn destroyed(&self) -> Vec<ResourceKind> {
        self.state.borrow().destroyed.clone()
    }

    pub fn calls(&self, op: &str) -> usize {
        self.state.borrow().calls.iter().filter(|&&c| c == op).count()
    }

    /// Every call made so far, in order.
    pub fn call_log(&self) -> Vec<&'static str> {
        self.state.borrow().calls.clone()
    }

    pub fn commands(&self, cmd: vk::CommandBuffer) -> Vec<Cmd> {
        self.state
            .borrow()
            .commands
            .get(&cmd.as_raw())
            .cloned()
            .unwrap_or_default()
    }

    pub fn submitted(&self) -> Vec<vk::CommandBuffer> {
        self.state.borrow().submitted.clone()
    }

    pub fn presented(&self) -> Vec<u32> {
        self.state.borrow().presented.clone()
    }

    pub fn swapchain_desc(&self) -> SwapchainDesc {
        self.state.borrow().swapchain_desc.clone()
    }

    pub fn pipeline_desc(&self) -> PipelineDesc {
        self.state.borrow().pipeline_desc.clone()
    }

    pub fn render_pass_desc(&self) -> Option<RenderPassDesc> {
        self.state.borrow().render_pass_desc.clone()
    }

    pub fn framebuffer_attachments(&self) -> Vec<u32> {
        self.state.borrow().framebuffer_attachments.clone()
    }

    pub fn memory_type(&self) -> Option<u32> {
        self.state.borrow().memory_type
    }

    pub fn cache_seed_len(&self) -> usize {
        self.state.borrow().cache_seed_len
    }

    pub fn buffer_size(&self, buffer: vk::Buffer) -> Option<vk::DeviceSize> {
        self.state.borrow().buffer_size.get(&buffer.as_raw()).copied()
    }
}

/// Reads `count` items behind a driver-style pointer.
unsafe fn items<'a, T>(ptr: *const T, count: u32) -> &'a [T] {
    if ptr.is_null() || count == 0 {
        &[]
    } else {
        unsafe { std::slice::from_raw_parts(ptr, count as usize) }
    }
}

pub const FAKE_CACHE_BLOB: &[u8] = b"strata-test-pipeline-cache";

impl Gpu for FakeGpu {
    fn instance_extensions(&self) -> VkResult<Vec<CString>> {
        let mut s = self.state.borrow_mut();
        s.check("vkEnumerateInstanceExtensionProperties")?;
        Ok(s.instance_exts.clone())
    }

    fn create_instance(&mut self, _info: &vk::InstanceCreateInfo<'_>) -> VkResult<vk::Instance> {
        let mut s = self.state.borrow_mut();
        s.check("vkCreateInstance")?;
        Ok(s.mint())
    }

    fn destroy_instance(&mut self, instance: vk::Instance) {
        self.state.borrow_mut().release(instance);
    }

    fn create_debug_messenger(
        &self,
        _info: &vk::DebugUtilsMessengerCreateInfoEXT<'_>,
    ) -> VkResult<vk::DebugUtilsMessengerEXT> {
        let mut s = self.state.borrow_mut();
        s.check("vkCreateDebugUtilsMessengerEXT")?;
        Ok(s.mint())
    }

    fn destroy_debug_messenger(&self, messenger: vk::DebugUtilsMessengerEXT) {
        self.state.borrow_mut().release(messenger);
    }

    fn destroy_surface(&self, surface: vk::SurfaceKHR) {
        self.state.borrow_mut().release(surface);
    }

    fn physical_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>> {
        let mut s = self.state.borrow_mut();
        s.check("vkEnumeratePhysicalDevices")?;
        let n = s.gpu_count;
        Ok((0..n).map(|_| vk::PhysicalDevice::from_raw(s.raw())).collect())
    }

    fn device_extensions(&self, _phys: vk::PhysicalDevice) -> VkResult<Vec<CString>> {
        let mut s = self.state.borrow_mut();
        s.check("vkEnumerateDeviceExtensionProperties")?;
        Ok(s.device_exts.clone())
    }

    fn memory_properties(&self, _phys: vk::PhysicalDevice) -> vk::PhysicalDeviceMemoryProperties {
        self.state.borrow().memory
    }

    fn surface_capabilities(
        &self,
        _phys: vk::PhysicalDevice,
        _surface: vk::SurfaceKHR,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        let mut s = self.state.borrow_mut();
        s.check("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?;
        Ok(s.caps)
    }

    fn surface_formats(
        &self,
        _phys: vk::PhysicalDevice,
        _surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        let mut s = self.state.borrow_mut();
        s.check("vkGetPhysicalDeviceSurfaceFormatsKHR")?;
        Ok(s.formats.clone())
    }

    fn create_device(
        &mut self,
        _phys: vk::PhysicalDevice,
        _info: &vk::DeviceCreateInfo<'_>,
    ) -> VkResult<vk::Device> {
        let mut s = self.state.borrow_mut();
        s.check("vkCreateDevice")?;
        s.queue = s.raw();
        Ok(s.mint())
    }

    fn destroy_device(&mut self, device: vk::Device) {
        self.state.borrow_mut().release(device);
    }

    fn device_queue(&self, _family: u32, _index: u32) -> vk::Queue {
        vk::Queue::from_raw(self.state.borrow().queue)
    }

    fn device_wait_idle(&self) -> VkResult<()> {
        let mut s = self.state.borrow_mut();
        s.check("vkDeviceWaitIdle")?;
        for f in s.fences.values_mut() {
            if let FenceState::Pending(_) = f {
                *f = FenceState::Signaled;
            }
        }
        Ok(())
    }

    fn create_swapchain(&self, info: &vk::SwapchainCreateInfoKHR<'_>) -> VkResult<vk::SwapchainKHR> {
        let mut s = self.state.borrow_mut();
        s.check("vkCreateSwapchainKHR")?;
        let families = unsafe { items(info.p_queue_family_indices, info.queue_family_index_count) };
        s.swapchain_desc = SwapchainDesc {
            min_image_count: info.min_image_count,
            format: info.image_format,
            color_space: info.image_color_space,
            extent: info.image_extent,
            present_mode: info.present_mode,
            pre_transform: info.pre_transform,
            composite_alpha: info.composite_alpha,
            clipped: info.clipped == vk::TRUE,
            sharing_mode: info.image_sharing_mode,
            queue_families: families.to_vec(),
        };
        let sc: vk::SwapchainKHR = s.mint();
        let images = (0..info.min_image_count)
            .map(|_| vk::Image::from_raw(s.raw()))
            .collect();
        s.swapchain_images.insert(sc.as_raw(), images);
        s.acquires = 0;
        Ok(sc)
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        let mut s = self.state.borrow_mut();
        s.check("vkGetSwapchainImagesKHR")?;
        s.swapchain_images
            .get(&swapchain.as_raw())
            .cloned()
            .ok_or(vk::Result::ERROR_SURFACE_LOST_KHR)
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut s = self.state.borrow_mut();
        s.swapchain_images.remove(&swapchain.as_raw());
        s.release(swapchain);
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _timeout_ns: u64,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        let mut guard = self.state.borrow_mut();
        let s = &mut *guard;
        s.check("vkAcquireNextImageKHR")?;
        let count = s
            .swapchain_images
            .get(&swapchain.as_raw())
            .map(Vec::len)
            .ok_or(vk::Result::ERROR_SURFACE_LOST_KHR)? as u32;
        match s.semaphores.get_mut(&signal.as_raw()) {
            Some(signaled) if *signaled => {
                s.violations.push("acquire into a signaled semaphore".into());
            }
            Some(signaled) => *signaled = true,
            None => s.violations.push("acquire with unknown semaphore".into()),
        }
        let index = s.acquires % count.max(1);
        s.acquires += 1;
        let suboptimal = s.suboptimal.remove("vkAcquireNextImageKHR");
        Ok((index, suboptimal))
    }

    fn queue_present(&self, _queue: vk::Queue, info: &vk::PresentInfoKHR<'_>) -> VkResult<bool> {
        let mut s = self.state.borrow_mut();
        s.check("vkQueuePresentKHR")?;
        let indices = unsafe { items(info.p_image_indices, info.swapchain_count) };
        s.presented.extend_from_slice(indices);
        Ok(s.suboptimal.remove("vkQueuePresentKHR"))
    }

    fn create_image_view(&self, _info: &vk::ImageViewCreateInfo<'_>) -> VkResult<vk::ImageView> {
        let mut s = self.state.borrow_mut();
        s.check("vkCreateImageView")?;
        Ok(s.mint())
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.state.borrow_mut().release(view);
    }

    fn create_render_pass(&self, info: &vk::RenderPassCreateInfo<'_>) -> VkResult<vk::RenderPass> {
        let mut s = self.state.borrow_mut();
        s.check("vkCreateRenderPass")?;
        let attachments = unsafe { items(info.p_attachments, info.attachment_count) };
        s.render_pass_desc = attachments.first().map(|a| RenderPassDesc {
            format: a.format,
            load_op: a.load_op,
            store_op: a.store_op,
            initial_layout: a.initial_layout,
            final_layout: a.final_layout,
        });
        Ok(s.mint())
    }

    fn destroy_render_pass(&self, pass: vk::RenderPass) {
        self.state.borrow_mut().release(pass);
    }

    fn create_framebuffer(&self, info: &vk::FramebufferCreateInfo<'_>) -> VkResult<vk::Framebuffer> {
        let mut s = self.state.borrow_mut();
        s.check("vkCreateFramebuffer")?;
        s.framebuffer_attachments.push(info.attachment_count);
        Ok(s.mint())
    }

    fn destroy_framebuffer(&self, fb: vk::Framebuffer) {
        self.state.borrow_mut().release(fb);
    }

    fn create_buffer(&self, info: &vk::BufferCreateInfo<'_>) -> VkResult<vk::Buffer> {
        let mut s = self.state.borrow_mut();
        s.check("vkCreateBuffer")?;
        let buffer: vk::Buffer = s.mint();
        s.buffer_size.insert(buffer.as_raw(), info.size);
        Ok(buffer)
    }

    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        let size = self.state.borrow().buffer_size.get(&buffer.as_raw()).copied();
        vk::MemoryRequirements {
            size: size.unwrap_or(0).next_multiple_of(256),
            alignment: 256,
            memory_type_bits: 0b11,
        }
    }

    fn allocate_memory(&self, info: &vk::MemoryAllocateInfo<'_>) -> VkResult<vk::DeviceMemory> {
        let mut s = self.state.borrow_mut();
        s.check("vkAllocateMemory")?;
        s.memory_type = Some(info.memory_type_index);
        Ok(s.mint())
    }

    fn upload(&self, _memory: vk::DeviceMemory, bytes: &[u8]) -> VkResult<usize> {
        let mut s = self.state.borrow_mut();
        s.check("vkMapMemory")?;
        Ok(s.short_upload.take().map_or(bytes.len(), |n| n.min(bytes.len())))
    }

    fn bind_buffer_memory(&self, _buffer: vk::Buffer, _memory: vk::DeviceMemory) -> VkResult<()> {
        self.state.borrow_mut().check("vkBindBufferMemory")
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        let mut s = self.state.borrow_mut();
        s.buffer_size.remove(&buffer.as_raw());
        s.release(buffer);
    }

    fn free_memory(&self, memory: vk::DeviceMemory) {
        self.state.borrow_mut().release(memory);
    }

    fn create_shader_module(&self, info: &vk::ShaderModuleCreateInfo<'_>) -> VkResult<vk::ShaderModule> {
        let mut s = self.state.borrow_mut();
        s.check("vkCreateShaderModule")?;
        if info.code_size == 0 || info.code_size % 4 != 0 {
            return Err(vk::Result::ERROR_INVALID_SHADER_NV);
        }
        Ok(s.mint())
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        self.state.borrow_mut().release(module);
    }

    fn create_pipeline_layout(
        &self,
        _info: &vk::PipelineLayoutCreateInfo<'_>,
    ) -> VkResult<vk::PipelineLayout> {
        let mut s = self.state.borrow_mut();
        s.check("vkCreatePipelineLayout")?;
        Ok(s.mint())
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.state.borrow_mut().release(layout);
    }

    fn create_pipeline_cache(&self, info: &vk::PipelineCacheCreateInfo<'_>) -> VkResult<vk::PipelineCache> {
        let mut s = self.state.borrow_mut();
        s.check("vkCreatePipelineCache")?;
        s.cache_seed_len = info.initial_data_size;
        Ok(s.mint())
    }

    fn pipeline_cache_data(&self, _cache: vk::PipelineCache) -> VkResult<Vec<u8>> {
        self.state.borrow_mut().check("vkGetPipelineCacheData")?;
        Ok(FAKE_CACHE_BLOB.to_vec())
    }

    fn destroy_pipeline_cache(&self, cache: vk::PipelineCache) {
        self.state.borrow_mut().release(cache);
    }

    fn create_graphics_pipeline(
        &self,
        cache: vk::PipelineCache,
        info: &vk::GraphicsPipelineCreateInfo<'_>,
    ) -> VkResult<vk::Pipeline> {
        let mut s = self.state.borrow_mut();
        s.check("vkCreateGraphicsPipelines")?;
        // SAFETY: the renderer keeps every pointed-to state struct alive across the call.
        let desc = unsafe {
            let stages = items(info.p_stages, info.stage_count);
            let ia = &*info.p_input_assembly_state;
            let vi = &*info.p_vertex_input_state;
            let bindings = items(vi.p_vertex_binding_descriptions, vi.vertex_binding_description_count);
            let attrs = items(
                vi.p_vertex_attribute_descriptions,
                vi.vertex_attribute_description_count,
            );
            let vp = &*info.p_viewport_state;
            let viewports = items(vp.p_viewports, vp.viewport_count);
            let rs = &*info.p_rasterization_state;
            let ms = &*info.p_multisample_state;
            let cb = &*info.p_color_blend_state;
            let blend = items(cb.p_attachments, cb.attachment_count);
            PipelineDesc {
                stage_count: stages.len(),
                entry_points: stages
                    .iter()
                    .map(|st| std::ffi::CStr::from_ptr(st.p_name).to_string_lossy().into_owned())
                    .collect(),
                topology: ia.topology,
                primitive_restart: ia.primitive_restart_enable == vk::TRUE,
                stride: bindings.first().map_or(0, |b| b.stride),
                attribute_format: attrs.first().map_or(vk::Format::UNDEFINED, |a| a.format),
                viewport: viewports.first().map_or(vk::Extent2D::default(), |v| vk::Extent2D {
                    width: v.width as u32,
                    height: v.height as u32,
                }),
                polygon_mode: rs.polygon_mode,
                cull_mode: rs.cull_mode,
                front_face: rs.front_face,
                line_width: rs.line_width,
                samples: ms.rasterization_samples,
                blend_enable: blend.first().is_some_and(|b| b.blend_enable == vk::TRUE),
                write_mask: blend.first().map_or(vk::ColorComponentFlags::empty(), |b| b.color_write_mask),
                cache,
            }
        };
        s.pipeline_desc = desc;
        Ok(s.mint())
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.state.borrow_mut().release(pipeline);
    }

    fn create_command_pool(&self, _info: &vk::CommandPoolCreateInfo<'_>) -> VkResult<vk::CommandPool> {
        let mut s = self.state.borrow_mut();
        s.check("vkCreateCommandPool")?;
        Ok(s.mint())
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        let mut s = self.state.borrow_mut();
        // Buffers still allocated from the pool go with it.
        let owned: Vec<u64> = s
            .pool_of
            .iter()
            .filter(|&(_, &p)| p == pool.as_raw())
            .map(|(&cb, _)| cb)
            .collect();
        for cb in owned {
            s.pool_of.remove(&cb);
            s.live.remove(&cb);
        }
        s.release(pool);
    }

    fn allocate_command_buffers(
        &self,
        info: &vk::CommandBufferAllocateInfo<'_>,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        let mut s = self.state.borrow_mut();
        s.check("vkAllocateCommandBuffers")?;
        let pool = info.command_pool.as_raw();
        Ok((0..info.command_buffer_count)
            .map(|_| {
                let cb: vk::CommandBuffer = s.mint();
                s.pool_of.insert(cb.as_raw(), pool);
                cb
            })
            .collect())
    }

    fn free_command_buffers(&self, _pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        let mut s = self.state.borrow_mut();
        for &cb in buffers {
            s.pool_of.remove(&cb.as_raw());
            s.commands.remove(&cb.as_raw());
            s.release(cb);
        }
    }

    fn begin_command_buffer(
        &self,
        cmd: vk::CommandBuffer,
        _info: &vk::CommandBufferBeginInfo<'_>,
    ) -> VkResult<()> {
        let mut s = self.state.borrow_mut();
        s.check("vkBeginCommandBuffer")?;
        s.commands.insert(cmd.as_raw(), vec![Cmd::Begin]);
        Ok(())
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        let mut s = self.state.borrow_mut();
        s.check("vkEndCommandBuffer")?;
        s.commands.entry(cmd.as_raw()).or_default().push(Cmd::End);
        Ok(())
    }

    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, info: &vk::RenderPassBeginInfo<'_>) {
        let clears = unsafe { items(info.p_clear_values, info.clear_value_count) };
        let clear = clears
            .first()
            .map_or([0.0; 4], |c| unsafe { c.color.float32 });
        let mut s = self.state.borrow_mut();
        s.commands
            .entry(cmd.as_raw())
            .or_default()
            .push(Cmd::BeginRenderPass {
                pass: info.render_pass,
                framebuffer: info.framebuffer,
                extent: info.render_area.extent,
                clear,
            });
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        let mut s = self.state.borrow_mut();
        s.commands.entry(cmd.as_raw()).or_default().push(Cmd::EndRenderPass);
    }

    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        let mut s = self.state.borrow_mut();
        s.commands
            .entry(cmd.as_raw())
            .or_default()
            .push(Cmd::BindPipeline(pipeline));
    }

    fn cmd_bind_vertex_buffers(
        &self,
        cmd: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    ) {
        let mut s = self.state.borrow_mut();
        s.commands
            .entry(cmd.as_raw())
            .or_default()
            .push(Cmd::BindVertexBuffers {
                first: first_binding,
                buffers: buffers.to_vec(),
                offsets: offsets.to_vec(),
            });
    }

    fn cmd_draw(
        &self,
        cmd: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        let mut s = self.state.borrow_mut();
        s.commands.entry(cmd.as_raw()).or_default().push(Cmd::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        });
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let mut s = self.state.borrow_mut();
        s.check("vkCreateSemaphore")?;
        let sem: vk::Semaphore = s.mint();
        s.semaphores.insert(sem.as_raw(), false);
        Ok(sem)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        let mut s = self.state.borrow_mut();
        s.semaphores.remove(&semaphore.as_raw());
        s.release(semaphore);
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let mut s = self.state.borrow_mut();
        s.check("vkCreateFence")?;
        let fence: vk::Fence = s.mint();
        let state = if signaled {
            FenceState::Signaled
        } else {
            FenceState::Unsignaled
        };
        s.fences.insert(fence.as_raw(), state);
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut s = self.state.borrow_mut();
        if let Some(FenceState::Pending(_)) = s.fences.remove(&fence.as_raw()) {
            s.violations.push("fence destroyed while in flight".into());
        }
        s.release(fence);
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        let mut s = self.state.borrow_mut();
        s.check("vkResetFences")?;
        let in_flight = matches!(s.fences.get(&fence.as_raw()), Some(FenceState::Pending(_)));
        if in_flight {
            s.violations.push("fence reset while in flight".into());
        }
        s.fences.insert(fence.as_raw(), FenceState::Unsignaled);
        Ok(())
    }

    fn wait_for_fence(&self, fence: vk::Fence, _timeout_ns: u64) -> VkResult<()> {
        let mut s = self.state.borrow_mut();
        s.check("vkWaitForFences")?;
        let slot = s
            .fences
            .get_mut(&fence.as_raw())
            .ok_or(vk::Result::ERROR_UNKNOWN)?;
        match *slot {
            FenceState::Signaled | FenceState::Pending(0) => {
                *slot = FenceState::Signaled;
                Ok(())
            }
            FenceState::Pending(n) => {
                *slot = FenceState::Pending(n - 1);
                Err(vk::Result::TIMEOUT)
            }
            FenceState::Unsignaled => Err(vk::Result::TIMEOUT),
        }
    }

    fn queue_submit(&self, _queue: vk::Queue, submit: &vk::SubmitInfo<'_>, fence: vk::Fence) -> VkResult<()> {
        let mut guard = self.state.borrow_mut();
        let s = &mut *guard;
        s.check("vkQueueSubmit")?;
        let waits = unsafe { items(submit.p_wait_semaphores, submit.wait_semaphore_count) };
        for w in waits {
            match s.semaphores.get_mut(&w.as_raw()) {
                Some(signaled) if *signaled => *signaled = false,
                _ => s.violations.push("submit waits on an unsignaled semaphore".into()),
            }
        }
        let cmds = unsafe { items(submit.p_command_buffers, submit.command_buffer_count) };
        for &cb in cmds {
            if s.commands.get(&cb.as_raw()).and_then(|c| c.last()) != Some(&Cmd::End) {
                s.violations.push("submitted a command buffer that was not ended".into());
            }
            s.submitted.push(cb);
        }
        if fence != vk::Fence::null() {
            if s.fences.get(&fence.as_raw()) != Some(&FenceState::Unsignaled) {
                s.violations.push("submit with a fence that was not reset".into());
            }
            let stall = s.stall_next.take().unwrap_or(0);
            s.fences.insert(fence.as_raw(), FenceState::Pending(stall));
        }
        Ok(())
    }
}

/// Window stand-in: fixed size until told otherwise, closes after a set number of polls.
pub struct FakeHost {
    size: RenderSize,
    close_after: Option<usize>,
    polls: usize,
    closing: bool,
    resized: bool,
    destroyed: bool,
}

impl FakeHost {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: RenderSize { width, height },
            close_after: None,
            polls: 0,
            closing: false,
            resized: false,
            destroyed: false,
        }
    }

    pub fn close_after(mut self, polls: usize) -> Self {
        self.close_after = Some(polls);
        self
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.size = RenderSize { width, height };
        self.resized = true;
    }

    pub fn polls(&self) -> usize {
        self.polls
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

impl WindowHost<FakeGpu> for FakeHost {
    fn required_extensions(&self) -> Result<Vec<CString>> {
        Ok(vec![ash::khr::surface::NAME.to_owned()])
    }

    fn create_surface(&self, gpu: &FakeGpu, _instance: vk::Instance) -> Result<vk::SurfaceKHR> {
        gpu.mint_surface()
            .map_err(|code| RenderError::SurfaceCreationFailed {
                op: "vkCreateSurfaceKHR",
                code,
            })
    }

    fn should_close(&self) -> bool {
        self.closing
    }

    fn poll_events(&mut self) {
        self.polls += 1;
        if self.close_after.is_some_and(|n| self.polls >= n) {
            self.closing = true;
        }
    }

    fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.resized)
    }

    fn size(&self) -> RenderSize {
        self.size
    }

    fn destroy(&mut self) {
        self.destroyed = true;
    }
}

/// A minimal well-formed SPIR-V header per stage; the fake never parses it.
pub struct StubShaders;

impl ShaderSource for StubShaders {
    fn spirv(&self, _stage: ShaderStage) -> Result<Vec<u32>> {
        Ok(vec![0x0723_0203, 0x0001_0000, 0, 1, 0])
    }
}
