// SPDX-License-Identifier: CEPL-1.0
//! The per-tick acquire → submit → wait → present sequence.
//!
//! One frame is in flight at a time. Steady-state failures never escape as errors:
//! they turn into [`FrameOutcome::Dropped`] (the fence did not signal in time) or
//! [`FrameOutcome::Invalidated`] (the swapchain chain has to be rebuilt before the
//! next frame). The only fatal error out of [`FrameLoop::tick`] is device loss.

use ash::vk;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{CallExt, RenderError, Result};
use crate::gpu::Gpu;
use crate::handles::take;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrameState {
    #[default]
    Idle,
    Acquiring,
    Submitting,
    Presenting,
    Invalidated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented { image: u32 },
    Dropped,
    Invalidated,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub presented: u64,
    pub dropped: u64,
    pub invalidated: u64,
}

/// Image-available semaphore and render fence for the single in-flight frame.
#[derive(Debug, Default)]
pub struct FrameSyncState {
    image_available: vk::Semaphore,
    render_fence: vk::Fence,
}

impl FrameSyncState {
    pub fn create<G: Gpu>(gpu: &G) -> Result<Self> {
        let mut out = Self {
            image_available: gpu.create_semaphore().call("vkCreateSemaphore")?,
            render_fence: vk::Fence::null(),
        };
        match gpu.create_fence(true).call("vkCreateFence") {
            Ok(fence) => out.render_fence = fence,
            Err(e) => {
                out.destroy(gpu);
                return Err(e);
            }
        }
        Ok(out)
    }

    pub fn destroy<G: Gpu>(&mut self, gpu: &G) {
        if let Some(s) = take(&mut self.image_available) {
            gpu.destroy_semaphore(s);
        }
        if let Some(f) = take(&mut self.render_fence) {
            gpu.destroy_fence(f);
        }
    }

    pub fn image_available(&self) -> vk::Semaphore {
        self.image_available
    }

    pub fn render_fence(&self) -> vk::Fence {
        self.render_fence
    }
}

#[derive(Debug, Default)]
pub struct FrameLoop {
    sync: FrameSyncState,
    state: FrameState,
    fence_timeout: Duration,
    /// Acquired and submitted, but the fence timed out before it could be presented.
    held_image: Option<u32>,
    stats: FrameStats,
}

impl FrameLoop {
    pub fn create<G: Gpu>(gpu: &G, fence_timeout: Duration) -> Result<Self> {
        Ok(Self {
            sync: FrameSyncState::create(gpu)?,
            state: FrameState::Idle,
            fence_timeout,
            held_image: None,
            stats: FrameStats::default(),
        })
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn sync(&self) -> &FrameSyncState {
        &self.sync
    }

    /// Forces a rebuild before the next frame (e.g. the window was resized).
    pub fn invalidate(&mut self) {
        self.state = FrameState::Invalidated;
    }

    /// Back to `Idle` after the swapchain chain was rebuilt. The semaphore is
    /// replaced since an abandoned acquire may have left it signaled.
    /// The device must be idle.
    pub fn recover<G: Gpu>(&mut self, gpu: &G) -> Result<()> {
        if let Some(s) = take(&mut self.sync.image_available) {
            gpu.destroy_semaphore(s);
        }
        self.sync.image_available = gpu.create_semaphore().call("vkCreateSemaphore")?;
        self.held_image = None;
        self.state = FrameState::Idle;
        debug!("frame loop recovered");
        Ok(())
    }

    pub fn destroy<G: Gpu>(&mut self, gpu: &G) {
        self.sync.destroy(gpu);
        self.held_image = None;
    }

    fn timeout_ns(&self) -> u64 {
        u64::try_from(self.fence_timeout.as_nanos()).unwrap_or(u64::MAX)
    }

    fn invalidated(&mut self, op: &'static str, code: vk::Result) -> FrameOutcome {
        warn!(op, ?code, "frame invalidated");
        self.state = FrameState::Invalidated;
        self.stats.invalidated += 1;
        FrameOutcome::Invalidated
    }

    fn dropped(&mut self) -> FrameOutcome {
        self.state = FrameState::Idle;
        self.stats.dropped += 1;
        FrameOutcome::Dropped
    }

    /// `Ok(true)` once the fence signaled; `Ok(false)` on timeout or a non-fatal error.
    fn wait_fence<G: Gpu>(&self, gpu: &G) -> Result<bool> {
        match gpu.wait_for_fence(self.sync.render_fence, self.timeout_ns()) {
            Ok(()) => Ok(true),
            Err(vk::Result::ERROR_DEVICE_LOST) => Err(RenderError::DeviceLost {
                op: "vkWaitForFences",
            }),
            Err(code) => {
                warn!(?code, timeout = ?self.fence_timeout, "render fence did not signal; frame dropped");
                Ok(false)
            }
        }
    }

    fn present<G: Gpu>(
        &mut self,
        gpu: &G,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image: u32,
    ) -> FrameOutcome {
        self.state = FrameState::Presenting;
        let swapchains = [swapchain];
        let indices = [image];
        let info = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            swapchain_count: 1,
            p_swapchains: swapchains.as_ptr(),
            p_image_indices: indices.as_ptr(),
            ..Default::default()
        };
        match gpu.queue_present(queue, &info) {
            Ok(false) => {
                self.state = FrameState::Idle;
                self.stats.presented += 1;
                FrameOutcome::Presented { image }
            }
            Ok(true) => self.invalidated("vkQueuePresentKHR", vk::Result::SUBOPTIMAL_KHR),
            Err(code) => self.invalidated("vkQueuePresentKHR", code),
        }
    }

    /// One frame. `buffers[i]` is the recording for swapchain image `i`.
    pub fn tick<G: Gpu>(
        &mut self,
        gpu: &G,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        buffers: &[vk::CommandBuffer],
    ) -> Result<FrameOutcome> {
        if self.state == FrameState::Invalidated {
            return Ok(FrameOutcome::Invalidated);
        }

        // A previous frame is still in flight: finish it before starting another.
        if let Some(image) = self.held_image {
            if !self.wait_fence(gpu)? {
                return Ok(self.dropped());
            }
            self.held_image = None;
            return Ok(self.present(gpu, queue, swapchain, image));
        }

        // --- Acquire ---
        self.state = FrameState::Acquiring;
        let image = match gpu.acquire_next_image(swapchain, u64::MAX, self.sync.image_available) {
            Ok((image, false)) => image,
            Ok((_, true)) => {
                return Ok(self.invalidated("vkAcquireNextImageKHR", vk::Result::SUBOPTIMAL_KHR))
            }
            Err(code) => return Ok(self.invalidated("vkAcquireNextImageKHR", code)),
        };
        let Some(&cmd) = buffers.get(image as usize) else {
            return Ok(self.invalidated("vkAcquireNextImageKHR", vk::Result::ERROR_OUT_OF_DATE_KHR));
        };

        // --- Submit ---
        self.state = FrameState::Submitting;
        if let Err(code) = gpu.reset_fence(self.sync.render_fence) {
            return Ok(self.invalidated("vkResetFences", code));
        }
        let wait_semaphores = [self.sync.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let cmds = [cmd];
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: wait_semaphores.as_ptr(),
            p_wait_dst_stage_mask: wait_stages.as_ptr(),
            command_buffer_count: 1,
            p_command_buffers: cmds.as_ptr(),
            ..Default::default()
        };
        if let Err(code) = gpu.queue_submit(queue, &submit, self.sync.render_fence) {
            return Ok(self.invalidated("vkQueueSubmit", code));
        }

        // --- Synchronize ---
        if !self.wait_fence(gpu)? {
            self.held_image = Some(image);
            return Ok(self.dropped());
        }

        // --- Present ---
        Ok(self.present(gpu, queue, swapchain, image))
    }
}
