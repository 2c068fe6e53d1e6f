// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Vulkan renderer: resource lifecycle plus the acquire/submit/present loop.

mod ash_gpu;
mod commands;
mod device;
mod error;
mod frame;
mod geometry;
pub mod gpu;
pub mod handles;
mod host;
mod lifecycle;
mod pipeline;
mod runner;
mod shader;
mod swapchain;
mod target;

#[cfg(test)]
mod fake;

use std::path::PathBuf;
use std::time::Duration;

pub use ash::vk;
pub use ash_gpu::AshGpu;
pub use commands::CommandRecorder;
pub use device::{DeviceContext, QUEUE_FAMILY};
pub use error::{CallExt, RenderError, Result};
pub use frame::{FrameLoop, FrameOutcome, FrameState, FrameStats, FrameSyncState};
pub use geometry::GeometryBuffer;
pub use gpu::Gpu;
pub use host::WindowHost;
pub use lifecycle::Renderer;
pub use pipeline::GraphicsPipeline;
pub use runner::run;
pub use shader::{load_shader, EmbeddedShaders, FileShaders, ShaderSource, ShaderStage};
pub use swapchain::SwapchainManager;
pub use target::RenderTarget;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Clone, Debug)]
pub struct RenderSettings {
    pub app_name: String,
    pub clear_color: [f32; 4],
    /// Bound on the post-submit fence wait.
    pub fence_timeout: Duration,
    pub enable_debug: bool,
    /// Seed/save location for the pipeline cache. `None` keeps it in memory only.
    pub pipeline_cache_path: Option<PathBuf>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            app_name: "strata".to_owned(),
            clear_color: [0.098, 0.71, 0.996, 1.0],
            fence_timeout: Duration::from_secs(10),
            enable_debug: false,
            pipeline_cache_path: None,
        }
    }
}
