// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use tracing::debug;

use crate::device::QUEUE_FAMILY;
use crate::error::{CallExt, Result};
use crate::geometry::GeometryBuffer;
use crate::gpu::Gpu;
use crate::handles::take;
use crate::pipeline::GraphicsPipeline;
use crate::target::RenderTarget;

/// Command pool plus one pre-recorded primary buffer per framebuffer.
#[derive(Debug, Default)]
pub struct CommandRecorder {
    pool: vk::CommandPool,
    buffers: Vec<vk::CommandBuffer>,
}

impl CommandRecorder {
    pub fn create<G: Gpu>(gpu: &G) -> Result<Self> {
        let ci = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            queue_family_index: QUEUE_FAMILY,
            ..Default::default()
        };
        Ok(Self {
            pool: gpu.create_command_pool(&ci).call("vkCreateCommandPool")?,
            buffers: Vec::new(),
        })
    }

    /// Replaces the buffer set and records every buffer once. The recordings are
    /// replayed unchanged until the next call.
    pub fn record_all<G: Gpu>(
        &mut self,
        gpu: &G,
        target: &RenderTarget,
        geometry: &GeometryBuffer,
        pipeline: &GraphicsPipeline,
        clear_color: [f32; 4],
    ) -> Result<()> {
        self.free_buffers(gpu);
        let framebuffers = target.framebuffers();
        let ai = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: self.pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: framebuffers.len() as u32,
            ..Default::default()
        };
        self.buffers = gpu
            .allocate_command_buffers(&ai)
            .call("vkAllocateCommandBuffers")?;

        let clear = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: clear_color,
            },
        }];
        for (&cmd, &framebuffer) in self.buffers.iter().zip(framebuffers) {
            let begin = vk::CommandBufferBeginInfo {
                s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
                ..Default::default()
            };
            gpu.begin_command_buffer(cmd, &begin)
                .call("vkBeginCommandBuffer")?;

            let rp_begin = vk::RenderPassBeginInfo {
                s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
                render_pass: target.render_pass(),
                framebuffer,
                render_area: vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent: target.extent(),
                },
                clear_value_count: clear.len() as u32,
                p_clear_values: clear.as_ptr(),
                ..Default::default()
            };
            gpu.cmd_begin_render_pass(cmd, &rp_begin);
            gpu.cmd_bind_pipeline(cmd, pipeline.handle());
            gpu.cmd_bind_vertex_buffers(cmd, 0, &[geometry.buffer()], &[0]);
            gpu.cmd_draw(cmd, geometry.vertex_count(), 1, 0, 0);
            gpu.cmd_end_render_pass(cmd);

            gpu.end_command_buffer(cmd).call("vkEndCommandBuffer")?;
        }
        debug!(count = self.buffers.len(), "command buffers recorded");
        Ok(())
    }

    fn free_buffers<G: Gpu>(&mut self, gpu: &G) {
        if !self.buffers.is_empty() {
            gpu.free_command_buffers(self.pool, &self.buffers);
            self.buffers.clear();
        }
    }

    /// Command buffers, then the pool. Later calls do nothing.
    pub fn destroy<G: Gpu>(&mut self, gpu: &G) {
        self.free_buffers(gpu);
        if let Some(pool) = take(&mut self.pool) {
            gpu.destroy_command_pool(pool);
        }
    }

    pub fn buffers(&self) -> &[vk::CommandBuffer] {
        &self.buffers
    }

    pub fn pool(&self) -> vk::CommandPool {
        self.pool
    }
}
