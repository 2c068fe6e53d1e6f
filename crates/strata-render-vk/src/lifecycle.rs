// SPDX-License-Identifier: CEPL-1.0
use strata_math::QUAD_STRIP;
use tracing::{debug, info, warn};

use crate::commands::CommandRecorder;
use crate::device::DeviceContext;
use crate::error::{CallExt, RenderError, Result};
use crate::frame::{FrameLoop, FrameOutcome, FrameState, FrameStats};
use crate::geometry::GeometryBuffer;
use crate::gpu::Gpu;
use crate::host::WindowHost;
use crate::pipeline::GraphicsPipeline;
use crate::shader::ShaderSource;
use crate::swapchain::SwapchainManager;
use crate::target::RenderTarget;
use crate::{RenderSettings, RenderSize};

/// Owns the whole component chain and enforces its creation, rebuild and
/// teardown order.
///
/// Device and geometry live for the whole run. Swapchain, render target,
/// pipeline and command recordings are rebuilt together whenever the frame
/// loop is invalidated.
pub struct Renderer<G: Gpu> {
    settings: RenderSettings,
    shaders: Box<dyn ShaderSource>,
    size: RenderSize,
    ctx: DeviceContext<G>,
    swapchain: SwapchainManager,
    target: RenderTarget,
    geometry: GeometryBuffer,
    pipeline: GraphicsPipeline,
    commands: CommandRecorder,
    frames: FrameLoop,
    shut_down: bool,
}

impl<G: Gpu> Renderer<G> {
    /// Creates everything in dependency order. Any failure here is fatal and
    /// whatever was already created is released.
    pub fn startup<H: WindowHost<G>>(
        gpu: G,
        host: &H,
        settings: RenderSettings,
        shaders: Box<dyn ShaderSource>,
    ) -> Result<Self> {
        let required = host.required_extensions()?;
        let ctx = DeviceContext::create(
            gpu,
            &settings.app_name,
            &required,
            settings.enable_debug,
            |gpu, instance| host.create_surface(gpu, instance),
        )?;
        let mut r = Self {
            settings,
            shaders,
            size: host.size(),
            ctx,
            swapchain: SwapchainManager::default(),
            target: RenderTarget::default(),
            geometry: GeometryBuffer::default(),
            pipeline: GraphicsPipeline::default(),
            commands: CommandRecorder::default(),
            frames: FrameLoop::default(),
            shut_down: false,
        };
        if let Err(e) = r.build() {
            r.shutdown_all();
            return Err(e);
        }
        info!(
            width = r.swapchain.extent().width,
            height = r.swapchain.extent().height,
            images = r.swapchain.image_count(),
            "renderer ready"
        );
        Ok(r)
    }

    fn build(&mut self) -> Result<()> {
        let gpu = self.ctx.gpu();
        self.swapchain = SwapchainManager::create(&self.ctx, self.size)?;
        self.target = RenderTarget::create(gpu, &self.swapchain)?;
        self.geometry = GeometryBuffer::create(&self.ctx, &QUAD_STRIP)?;
        self.pipeline = GraphicsPipeline::create(
            gpu,
            self.swapchain.extent(),
            self.target.render_pass(),
            self.shaders.as_ref(),
            self.settings.pipeline_cache_path.as_deref(),
        )?;
        self.commands = CommandRecorder::create(gpu)?;
        self.commands.record_all(
            gpu,
            &self.target,
            &self.geometry,
            &self.pipeline,
            self.settings.clear_color,
        )?;
        self.frames = FrameLoop::create(gpu, self.settings.fence_timeout)?;
        Ok(())
    }

    /// One frame tick. Rebuilds the swapchain chain first if the last tick
    /// invalidated it; while the surface has zero area nothing is drawn.
    pub fn render_frame(&mut self) -> Result<FrameOutcome> {
        if self.shut_down {
            return Ok(FrameOutcome::Invalidated);
        }
        if self.frames.state() == FrameState::Invalidated && !self.recreate_swapchain_chain()? {
            return Ok(FrameOutcome::Invalidated);
        }
        self.frames.tick(
            self.ctx.gpu(),
            self.ctx.queue(),
            self.swapchain.handle(),
            self.commands.buffers(),
        )
    }

    /// Explicit resize: the next tick rebuilds against `size`.
    pub fn notify_resized(&mut self, size: RenderSize) {
        debug!(width = size.width, height = size.height, "resize");
        self.size = size;
        self.frames.invalidate();
    }

    /// Tears down commands, render target and swapchain, then rebuilds
    /// swapchain → render target → pipeline (same cache) → commands.
    /// Returns `Ok(false)` when the surface has zero area; the rebuild is
    /// retried on the next call.
    pub fn recreate_swapchain_chain(&mut self) -> Result<bool> {
        let gpu = self.ctx.gpu();
        gpu.device_wait_idle().call("vkDeviceWaitIdle")?;

        self.commands.destroy(gpu);
        self.target.destroy(gpu);
        self.swapchain.destroy(gpu);

        self.swapchain = match SwapchainManager::create(&self.ctx, self.size) {
            Ok(sc) => sc,
            Err(RenderError::SurfaceUnavailable { width, height, .. }) => {
                debug!(width, height, "surface has zero area; rendering paused");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        self.target = RenderTarget::create(gpu, &self.swapchain)?;
        self.pipeline.rebuild(
            gpu,
            self.swapchain.extent(),
            self.target.render_pass(),
            self.shaders.as_ref(),
        )?;
        self.commands = CommandRecorder::create(gpu)?;
        self.commands.record_all(
            gpu,
            &self.target,
            &self.geometry,
            &self.pipeline,
            self.settings.clear_color,
        )?;
        self.frames.recover(gpu)?;
        info!(
            width = self.swapchain.extent().width,
            height = self.swapchain.extent().height,
            "swapchain recreated"
        );
        Ok(true)
    }

    /// Waits for the device, then destroys everything in reverse creation order.
    /// Also run on drop; only the first call does anything.
    pub fn shutdown_all(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        let gpu = self.ctx.gpu();
        if self.ctx.is_alive() {
            if let Err(e) = gpu.device_wait_idle().call("vkDeviceWaitIdle") {
                warn!(error = %e, "device not idle at shutdown");
            }
        }
        self.commands.destroy(gpu);
        self.target.destroy(gpu);
        self.swapchain.destroy(gpu);
        self.pipeline.destroy(gpu);
        self.geometry.destroy(gpu);
        self.frames.destroy(gpu);
        self.ctx.destroy();

        let stats = self.frames.stats();
        info!(
            presented = stats.presented,
            dropped = stats.dropped,
            invalidated = stats.invalidated,
            "renderer shut down"
        );
    }

    pub fn frame_state(&self) -> FrameState {
        self.frames.state()
    }

    pub fn stats(&self) -> FrameStats {
        self.frames.stats()
    }

    pub fn context(&self) -> &DeviceContext<G> {
        &self.ctx
    }

    pub fn swapchain(&self) -> &SwapchainManager {
        &self.swapchain
    }

    pub fn target(&self) -> &RenderTarget {
        &self.target
    }

    pub fn geometry(&self) -> &GeometryBuffer {
        &self.geometry
    }

    pub fn pipeline(&self) -> &GraphicsPipeline {
        &self.pipeline
    }

    pub fn commands(&self) -> &CommandRecorder {
        &self.commands
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }
}

impl<G: Gpu> Drop for Renderer<G> {
    fn drop(&mut self) {
        self.shutdown_all();
    }
}
