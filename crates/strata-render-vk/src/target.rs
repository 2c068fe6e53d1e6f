// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use tracing::debug;

use crate::error::{CallExt, Result};
use crate::gpu::Gpu;
use crate::handles::take;
use crate::swapchain::SwapchainManager;

/// The render pass plus one framebuffer per swapchain image view.
#[derive(Debug, Default)]
pub struct RenderTarget {
    render_pass: vk::RenderPass,
    framebuffers: Vec<vk::Framebuffer>,
    extent: vk::Extent2D,
}

impl RenderTarget {
    pub fn create<G: Gpu>(gpu: &G, swapchain: &SwapchainManager) -> Result<Self> {
        let mut out = Self {
            render_pass: Self::create_render_pass(gpu, swapchain.format())?,
            framebuffers: Vec::new(),
            extent: swapchain.extent(),
        };
        match Self::create_framebuffers(gpu, out.render_pass, swapchain.views(), out.extent, None) {
            Ok(fbs) => out.framebuffers = fbs,
            Err(e) => {
                out.destroy(gpu);
                return Err(e);
            }
        }
        Ok(out)
    }

    /// Single subpass, single color attachment cleared on load.
    pub fn create_render_pass<G: Gpu>(gpu: &G, format: vk::Format) -> Result<vk::RenderPass> {
        let color = vk::AttachmentDescription {
            format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            final_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            ..Default::default()
        };
        let color_ref = vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        };
        let subpass = vk::SubpassDescription {
            pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
            color_attachment_count: 1,
            p_color_attachments: &color_ref,
            ..Default::default()
        };
        let ci = vk::RenderPassCreateInfo {
            s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
            attachment_count: 1,
            p_attachments: &color,
            subpass_count: 1,
            p_subpasses: &subpass,
            ..Default::default()
        };
        gpu.create_render_pass(&ci).call("vkCreateRenderPass")
    }

    /// One framebuffer per view, with `depth` as a second attachment when given.
    /// All or nothing: on failure the ones already built are destroyed.
    pub fn create_framebuffers<G: Gpu>(
        gpu: &G,
        render_pass: vk::RenderPass,
        views: &[vk::ImageView],
        extent: vk::Extent2D,
        depth: Option<vk::ImageView>,
    ) -> Result<Vec<vk::Framebuffer>> {
        let mut out = Vec::with_capacity(views.len());
        for &view in views {
            let attachments: Vec<vk::ImageView> = std::iter::once(view).chain(depth).collect();
            let ci = vk::FramebufferCreateInfo {
                s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
                render_pass,
                attachment_count: attachments.len() as u32,
                p_attachments: attachments.as_ptr(),
                width: extent.width,
                height: extent.height,
                layers: 1,
                ..Default::default()
            };
            match gpu.create_framebuffer(&ci).call("vkCreateFramebuffer") {
                Ok(fb) => out.push(fb),
                Err(e) => {
                    for fb in out.drain(..) {
                        gpu.destroy_framebuffer(fb);
                    }
                    return Err(e);
                }
            }
        }
        debug!(count = out.len(), "framebuffers created");
        Ok(out)
    }

    /// Framebuffers, then the render pass. Later calls do nothing.
    pub fn destroy<G: Gpu>(&mut self, gpu: &G) {
        for fb in self.framebuffers.drain(..) {
            gpu.destroy_framebuffer(fb);
        }
        if let Some(pass) = take(&mut self.render_pass) {
            gpu.destroy_render_pass(pass);
        }
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub fn framebuffers(&self) -> &[vk::Framebuffer] {
        &self.framebuffers
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}
