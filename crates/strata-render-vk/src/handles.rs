// SPDX-License-Identifier: CEPL-1.0
//! Handle classification. The handles themselves are ash's typed `vk::*` handles;
//! this only tags each type with the kind of resource it names.

use ash::vk::{self, Handle};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Instance,
    DebugMessenger,
    Surface,
    PhysicalDevice,
    Device,
    Queue,
    Swapchain,
    Image,
    ImageView,
    RenderPass,
    Framebuffer,
    Buffer,
    Memory,
    ShaderModule,
    PipelineLayout,
    PipelineCache,
    Pipeline,
    CommandPool,
    CommandBuffer,
    Semaphore,
    Fence,
}

impl ResourceKind {
    /// Kinds that are children of the logical device and must be gone before it is.
    pub fn is_device_child(self) -> bool {
        !matches!(
            self,
            Self::Instance | Self::DebugMessenger | Self::Surface | Self::PhysicalDevice | Self::Device
        )
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

pub trait Resource: Handle + Copy {
    const KIND: ResourceKind;
}

macro_rules! resource {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(impl Resource for $ty {
            const KIND: ResourceKind = ResourceKind::$kind;
        })*
    };
}

resource! {
    vk::Instance => Instance,
    vk::DebugUtilsMessengerEXT => DebugMessenger,
    vk::SurfaceKHR => Surface,
    vk::PhysicalDevice => PhysicalDevice,
    vk::Device => Device,
    vk::Queue => Queue,
    vk::SwapchainKHR => Swapchain,
    vk::Image => Image,
    vk::ImageView => ImageView,
    vk::RenderPass => RenderPass,
    vk::Framebuffer => Framebuffer,
    vk::Buffer => Buffer,
    vk::DeviceMemory => Memory,
    vk::ShaderModule => ShaderModule,
    vk::PipelineLayout => PipelineLayout,
    vk::PipelineCache => PipelineCache,
    vk::Pipeline => Pipeline,
    vk::CommandPool => CommandPool,
    vk::CommandBuffer => CommandBuffer,
    vk::Semaphore => Semaphore,
    vk::Fence => Fence,
}

/// Null-checks and clears a handle slot, handing back what was there.
pub fn take<H: Resource>(slot: &mut H) -> Option<H> {
    let h = std::mem::replace(slot, H::from_raw(0));
    (h.as_raw() != 0).then_some(h)
}
