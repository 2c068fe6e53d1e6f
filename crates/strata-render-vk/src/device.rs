// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use std::ffi::{c_void, CStr, CString};
use tracing::{debug, error, info, warn};

use crate::error::{CallExt, RenderError, Result};
use crate::gpu::Gpu;
use crate::handles::take;

/// Queue family every queue, swapchain and command pool uses.
pub const QUEUE_FAMILY: u32 = 0;

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() {
        return vk::FALSE;
    }
    // SAFETY: the loader passes a valid callback-data struct for the duration of the call.
    let p_message = unsafe { (*data).p_message };
    if p_message.is_null() {
        return vk::FALSE;
    }
    let msg = unsafe { CStr::from_ptr(p_message) }.to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!(target: "vulkan", "{msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!(target: "vulkan", "{msg}");
    } else {
        debug!(target: "vulkan", "{msg}");
    }
    vk::FALSE
}

/// Instance, surface, the chosen GPU and its single logical device and queue.
///
/// Owns the [`Gpu`] backend; every other component borrows it from here.
pub struct DeviceContext<G: Gpu> {
    gpu: G,
    instance: vk::Instance,
    debug_messenger: vk::DebugUtilsMessengerEXT,
    surface: vk::SurfaceKHR,
    gpus: Vec<vk::PhysicalDevice>,
    phys: vk::PhysicalDevice,
    device: vk::Device,
    queue: vk::Queue,
    memory: vk::PhysicalDeviceMemoryProperties,
}

fn ensure_present(op: &'static str, available: &[CString], wanted: &CStr) -> Result<()> {
    if available.iter().any(|e| e.as_c_str() == wanted) {
        Ok(())
    } else {
        Err(RenderError::MissingExtension {
            op,
            name: wanted.to_string_lossy().into_owned(),
        })
    }
}

impl<G: Gpu> DeviceContext<G> {
    /// Builds everything up to the queue. `surface_factory` runs right after the
    /// instance exists. On failure, whatever was already created is released.
    pub fn create<F>(
        gpu: G,
        app_name: &str,
        required_extensions: &[CString],
        enable_debug: bool,
        surface_factory: F,
    ) -> Result<Self>
    where
        F: FnOnce(&G, vk::Instance) -> Result<vk::SurfaceKHR>,
    {
        let mut ctx = Self {
            gpu,
            instance: vk::Instance::null(),
            debug_messenger: vk::DebugUtilsMessengerEXT::null(),
            surface: vk::SurfaceKHR::null(),
            gpus: Vec::new(),
            phys: vk::PhysicalDevice::null(),
            device: vk::Device::null(),
            queue: vk::Queue::null(),
            memory: vk::PhysicalDeviceMemoryProperties::default(),
        };
        match ctx.init(app_name, required_extensions, enable_debug, surface_factory) {
            Ok(()) => Ok(ctx),
            Err(e) => {
                ctx.destroy();
                Err(e)
            }
        }
    }

    fn init<F>(
        &mut self,
        app_name: &str,
        required_extensions: &[CString],
        enable_debug: bool,
        surface_factory: F,
    ) -> Result<()>
    where
        F: FnOnce(&G, vk::Instance) -> Result<vk::SurfaceKHR>,
    {
        // --- Instance ---
        let available = self
            .gpu
            .instance_extensions()
            .call("vkEnumerateInstanceExtensionProperties")?;
        for ext in &available {
            debug!(extension = %ext.to_string_lossy(), "instance extension");
        }
        for ext in required_extensions {
            ensure_present("vkCreateInstance", &available, ext)?;
        }

        let debug_name = ash::ext::debug_utils::NAME;
        let with_debug = enable_debug && available.iter().any(|e| e.as_c_str() == debug_name);
        if enable_debug && !with_debug {
            warn!("debug messenger requested but VK_EXT_debug_utils is unavailable");
        }

        let mut ext_ptrs: Vec<*const std::ffi::c_char> =
            required_extensions.iter().map(|e| e.as_ptr()).collect();
        if with_debug {
            ext_ptrs.push(debug_name.as_ptr());
        }

        let app_name = CString::new(app_name).unwrap_or_default();
        let app_info = vk::ApplicationInfo {
            s_type: vk::StructureType::APPLICATION_INFO,
            p_application_name: app_name.as_ptr(),
            application_version: 0,
            p_engine_name: app_name.as_ptr(),
            engine_version: 0,
            api_version: vk::API_VERSION_1_0,
            ..Default::default()
        };
        let create_info = vk::InstanceCreateInfo {
            s_type: vk::StructureType::INSTANCE_CREATE_INFO,
            p_application_info: &app_info,
            enabled_extension_count: ext_ptrs.len() as u32,
            pp_enabled_extension_names: ext_ptrs.as_ptr(),
            ..Default::default()
        };
        self.instance = self
            .gpu
            .create_instance(&create_info)
            .map_err(|code| RenderError::InstanceCreationFailed {
                op: "vkCreateInstance",
                code,
            })?;

        if with_debug {
            let ci = vk::DebugUtilsMessengerCreateInfoEXT {
                s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
                message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                pfn_user_callback: Some(debug_callback),
                ..Default::default()
            };
            match self.gpu.create_debug_messenger(&ci) {
                Ok(messenger) => self.debug_messenger = messenger,
                Err(code) => warn!(
                    op = "vkCreateDebugUtilsMessengerEXT",
                    ?code,
                    "debug messenger unavailable; continuing without it"
                ),
            }
        }

        // --- Surface ---
        self.surface = surface_factory(&self.gpu, self.instance)?;

        // --- Physical device: first one found, never re-evaluated ---
        self.gpus = self
            .gpu
            .physical_devices()
            .call("vkEnumeratePhysicalDevices")?;
        self.phys = *self.gpus.first().ok_or(RenderError::NoGpuFound {
            op: "vkEnumeratePhysicalDevices",
        })?;
        info!(count = self.gpus.len(), "GPUs found; using the first");
        self.memory = self.gpu.memory_properties(self.phys);

        let device_exts = self
            .gpu
            .device_extensions(self.phys)
            .call("vkEnumerateDeviceExtensionProperties")?;
        for ext in &device_exts {
            debug!(extension = %ext.to_string_lossy(), "device extension");
        }
        let swapchain_name = ash::khr::swapchain::NAME;
        ensure_present("vkCreateDevice", &device_exts, swapchain_name)?;

        // --- Logical device + queue ---
        let priorities = [1.0f32];
        let queue_info = vk::DeviceQueueCreateInfo {
            s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
            queue_family_index: QUEUE_FAMILY,
            queue_count: 1,
            p_queue_priorities: priorities.as_ptr(),
            ..Default::default()
        };
        let dev_exts = [swapchain_name.as_ptr()];
        let device_info = vk::DeviceCreateInfo {
            s_type: vk::StructureType::DEVICE_CREATE_INFO,
            queue_create_info_count: 1,
            p_queue_create_infos: &queue_info,
            enabled_extension_count: dev_exts.len() as u32,
            pp_enabled_extension_names: dev_exts.as_ptr(),
            ..Default::default()
        };
        self.device = self
            .gpu
            .create_device(self.phys, &device_info)
            .call("vkCreateDevice")?;
        self.queue = self.gpu.device_queue(QUEUE_FAMILY, 0);
        info!("logical device ready");
        Ok(())
    }

    /// Device, debug messenger, surface, instance. Later calls do nothing.
    pub fn destroy(&mut self) {
        self.queue = vk::Queue::null();
        if let Some(device) = take(&mut self.device) {
            self.gpu.destroy_device(device);
        }
        if let Some(m) = take(&mut self.debug_messenger) {
            self.gpu.destroy_debug_messenger(m);
        }
        if let Some(surface) = take(&mut self.surface) {
            self.gpu.destroy_surface(surface);
        }
        if let Some(instance) = take(&mut self.instance) {
            self.gpu.destroy_instance(instance);
        }
        self.phys = vk::PhysicalDevice::null();
        self.gpus.clear();
    }

    pub fn gpu(&self) -> &G {
        &self.gpu
    }

    pub fn instance(&self) -> vk::Instance {
        self.instance
    }

    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.phys
    }

    pub fn available_gpus(&self) -> &[vk::PhysicalDevice] {
        &self.gpus
    }

    pub fn device(&self) -> vk::Device {
        self.device
    }

    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    pub fn has_debug_messenger(&self) -> bool {
        self.debug_messenger != vk::DebugUtilsMessengerEXT::null()
    }

    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory
    }

    pub fn is_alive(&self) -> bool {
        self.device != vk::Device::null()
    }
}
