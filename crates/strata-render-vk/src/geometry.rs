// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use strata_math::{geometry::as_bytes, Position};
use tracing::{debug, warn};

use crate::device::DeviceContext;
use crate::error::{CallExt, RenderError, Result};
use crate::gpu::Gpu;
use crate::handles::take;

/// Lowest memory type allowed by `type_bits` that has `required`, preferring one
/// that also has `preferred`.
fn find_memory_type(
    mem: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
    preferred: vk::MemoryPropertyFlags,
) -> Option<u32> {
    let candidates = || {
        (0..mem.memory_type_count).filter(move |&i| {
            (type_bits & (1 << i)) != 0
                && mem.memory_types[i as usize].property_flags.contains(required)
        })
    };
    candidates()
        .find(|&i| {
            mem.memory_types[i as usize]
                .property_flags
                .contains(required | preferred)
        })
        .or_else(|| candidates().next())
}

/// Host-visible, host-coherent vertex buffer (the upload never flushes).
/// Filled once, lives until shutdown.
#[derive(Debug, Default)]
pub struct GeometryBuffer {
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    vertex_count: u32,
}

impl GeometryBuffer {
    pub fn create<G: Gpu>(ctx: &DeviceContext<G>, vertices: &[Position]) -> Result<Self> {
        let gpu = ctx.gpu();
        let bytes = as_bytes(vertices);
        let bci = vk::BufferCreateInfo {
            s_type: vk::StructureType::BUFFER_CREATE_INFO,
            size: bytes.len() as vk::DeviceSize,
            usage: vk::BufferUsageFlags::VERTEX_BUFFER,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        let mut out = Self {
            buffer: gpu.create_buffer(&bci).call("vkCreateBuffer")?,
            memory: vk::DeviceMemory::null(),
            vertex_count: vertices.len() as u32,
        };
        if let Err(e) = out.fill(ctx, bytes) {
            out.destroy(gpu);
            return Err(e);
        }
        debug!(vertices = out.vertex_count, bytes = bytes.len(), "vertex buffer ready");
        Ok(out)
    }

    fn fill<G: Gpu>(&mut self, ctx: &DeviceContext<G>, bytes: &[u8]) -> Result<()> {
        let gpu = ctx.gpu();
        let req = gpu.buffer_memory_requirements(self.buffer);
        let mem_type = find_memory_type(
            ctx.memory_properties(),
            req.memory_type_bits,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )
        .ok_or(RenderError::Call {
            op: "find_memory_type",
            code: vk::Result::ERROR_FEATURE_NOT_PRESENT,
        })?;
        let mai = vk::MemoryAllocateInfo {
            s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
            allocation_size: req.size,
            memory_type_index: mem_type,
            ..Default::default()
        };
        self.memory = gpu.allocate_memory(&mai).call("vkAllocateMemory")?;

        let copied = gpu.upload(self.memory, bytes).call("vkMapMemory")?;
        if copied != bytes.len() {
            warn!(copied, expected = bytes.len(), "vertex upload copied a different byte count");
        }
        gpu.bind_buffer_memory(self.buffer, self.memory)
            .call("vkBindBufferMemory")
    }

    /// Buffer, then its memory. Later calls do nothing.
    pub fn destroy<G: Gpu>(&mut self, gpu: &G) {
        if let Some(buffer) = take(&mut self.buffer) {
            gpu.destroy_buffer(buffer);
        }
        if let Some(memory) = take(&mut self.memory) {
            gpu.free_memory(memory);
        }
    }

    pub fn buffer(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }
}
