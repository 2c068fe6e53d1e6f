// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use std::ffi::CString;

use crate::error::Result;
use crate::gpu::Gpu;
use crate::RenderSize;

/// The window the renderer presents into. Polled from the frame thread between ticks.
pub trait WindowHost<G: Gpu> {
    /// Instance extensions the window system needs for presentation.
    fn required_extensions(&self) -> Result<Vec<CString>>;
    fn create_surface(&self, gpu: &G, instance: vk::Instance) -> Result<vk::SurfaceKHR>;
    fn should_close(&self) -> bool;
    fn poll_events(&mut self);
    /// True once per resize since the last call.
    fn take_resized(&mut self) -> bool;
    fn size(&self) -> RenderSize;
    fn destroy(&mut self);
}
