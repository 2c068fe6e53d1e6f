// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use tracing::info;

use crate::device::{DeviceContext, QUEUE_FAMILY};
use crate::error::{CallExt, RenderError, Result};
use crate::gpu::Gpu;
use crate::handles::take;
use crate::RenderSize;

/// Surface formats accepted, in no particular preference.
const FORMAT_ALLOWLIST: [vk::Format; 2] = [vk::Format::B8G8R8A8_UNORM, vk::Format::R8G8B8A8_UNORM];

/// First surface format that is on the allowlist.
fn pick_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| FORMAT_ALLOWLIST.contains(&f.format))
}

fn extent_from_caps(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: want
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

#[derive(Debug, Default)]
pub struct SwapchainManager {
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl SwapchainManager {
    pub fn create<G: Gpu>(ctx: &DeviceContext<G>, hint: RenderSize) -> Result<Self> {
        let gpu = ctx.gpu();
        let caps = gpu
            .surface_capabilities(ctx.physical_device(), ctx.surface())
            .call("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?;
        let formats = gpu
            .surface_formats(ctx.physical_device(), ctx.surface())
            .call("vkGetPhysicalDeviceSurfaceFormatsKHR")?;
        let surface_format = pick_surface_format(&formats).ok_or(RenderError::NoSuitableFormat {
            op: "vkGetPhysicalDeviceSurfaceFormatsKHR",
            available: formats.len(),
        })?;

        let extent = extent_from_caps(&caps, hint);
        if extent.width == 0 || extent.height == 0 {
            return Err(RenderError::SurfaceUnavailable {
                op: "vkGetPhysicalDeviceSurfaceCapabilitiesKHR",
                width: extent.width,
                height: extent.height,
            });
        }

        let families = [QUEUE_FAMILY];
        let ci = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: ctx.surface(),
            min_image_count: caps.min_image_count,
            image_format: surface_format.format,
            image_color_space: surface_format.color_space,
            image_extent: extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: vk::SharingMode::EXCLUSIVE,
            queue_family_index_count: families.len() as u32,
            p_queue_family_indices: families.as_ptr(),
            pre_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode: vk::PresentModeKHR::FIFO,
            clipped: vk::FALSE,
            ..Default::default()
        };
        let mut out = Self {
            swapchain: gpu.create_swapchain(&ci).call("vkCreateSwapchainKHR")?,
            images: Vec::new(),
            views: Vec::new(),
            format: surface_format.format,
            extent,
        };
        if let Err(e) = out.create_views(gpu) {
            out.destroy(gpu);
            return Err(e);
        }
        info!(
            images = out.views.len(),
            width = extent.width,
            height = extent.height,
            format = ?out.format,
            "swapchain created"
        );
        Ok(out)
    }

    fn create_views<G: Gpu>(&mut self, gpu: &G) -> Result<()> {
        self.images = gpu
            .swapchain_images(self.swapchain)
            .call("vkGetSwapchainImagesKHR")?;
        for &image in &self.images {
            let ci = vk::ImageViewCreateInfo {
                s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
                image,
                view_type: vk::ImageViewType::TYPE_2D,
                format: self.format,
                components: vk::ComponentMapping {
                    r: vk::ComponentSwizzle::R,
                    g: vk::ComponentSwizzle::G,
                    b: vk::ComponentSwizzle::B,
                    a: vk::ComponentSwizzle::A,
                },
                subresource_range: vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                ..Default::default()
            };
            let view = gpu.create_image_view(&ci).call("vkCreateImageView")?;
            self.views.push(view);
        }
        Ok(())
    }

    /// Image views, then the swapchain. Later calls do nothing.
    pub fn destroy<G: Gpu>(&mut self, gpu: &G) {
        for view in self.views.drain(..) {
            gpu.destroy_image_view(view);
        }
        self.images.clear();
        if let Some(sc) = take(&mut self.swapchain) {
            gpu.destroy_swapchain(sc);
        }
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn views(&self) -> &[vk::ImageView] {
        &self.views
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}
