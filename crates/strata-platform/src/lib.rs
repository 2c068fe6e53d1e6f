// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Desktop window host: a winit window driven by `pump_app_events` from the
//! render thread, plus `ash-window` surface plumbing.

pub use winit;

use std::ffi::{CStr, CString};
use std::time::Duration;

use anyhow::{bail, Context};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use strata_render_vk::{vk, AshGpu, RenderError, RenderSize, WindowHost};
use tracing::{debug, info, warn};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    error::OsError,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    window::{Window, WindowAttributes, WindowId},
};

// Pumps allowed for the platform to deliver `resumed` before giving up.
const OPEN_ATTEMPTS: u32 = 100;
const OPEN_PUMP_TIMEOUT: Duration = Duration::from_millis(10);

struct WindowState {
    attributes: WindowAttributes,
    window: Option<Window>,
    open_error: Option<OsError>,
    close_requested: bool,
    resized: bool,
    size: RenderSize,
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Poll);
        if self.window.is_some() {
            return;
        }
        match event_loop.create_window(self.attributes.clone()) {
            Ok(window) => {
                let s = window.inner_size();
                self.size = RenderSize {
                    width: s.width,
                    height: s.height,
                };
                info!("window opened at {}x{}", s.width, s.height);
                self.window = Some(window);
            }
            Err(e) => self.open_error = Some(e),
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        if self.window.as_ref().is_some_and(|w| w.id() != id) {
            return;
        }
        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.close_requested = true;
            }
            WindowEvent::Resized(new_size) => {
                let size = RenderSize {
                    width: new_size.width,
                    height: new_size.height,
                };
                if size != self.size {
                    debug!("Resized → {}x{}", size.width, size.height);
                    self.size = size;
                    self.resized = true;
                }
            }
            _ => {}
        }
    }
}

/// A single desktop window. All methods must be called from the thread that
/// opened it.
pub struct DesktopWindow {
    event_loop: EventLoop<()>,
    state: WindowState,
}

impl DesktopWindow {
    pub fn open(title: &str, width: u32, height: u32) -> anyhow::Result<Self> {
        let event_loop = EventLoop::new().context("create event loop")?;
        let attributes = Window::default_attributes()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height));

        let mut this = Self {
            event_loop,
            state: WindowState {
                attributes,
                window: None,
                open_error: None,
                close_requested: false,
                resized: false,
                size: RenderSize { width, height },
            },
        };

        for _ in 0..OPEN_ATTEMPTS {
            let status = this
                .event_loop
                .pump_app_events(Some(OPEN_PUMP_TIMEOUT), &mut this.state);
            if let Some(e) = this.state.open_error.take() {
                return Err(e).context("create window");
            }
            if this.state.window.is_some() {
                return Ok(this);
            }
            if let PumpStatus::Exit(code) = status {
                bail!("event loop exited with {code} before the window opened");
            }
        }
        bail!("window was not created after {OPEN_ATTEMPTS} event pumps")
    }

    pub fn window(&self) -> Option<&Window> {
        self.state.window.as_ref()
    }

    fn live_window(&self, op: &'static str) -> strata_render_vk::Result<&Window> {
        self.window().ok_or(RenderError::SurfaceCreationFailed {
            op,
            code: vk::Result::ERROR_NATIVE_WINDOW_IN_USE_KHR,
        })
    }
}

impl WindowHost<AshGpu> for DesktopWindow {
    fn required_extensions(&self) -> strata_render_vk::Result<Vec<CString>> {
        const OP: &str = "enumerate_required_extensions";
        let window = self.live_window(OP)?;
        let display = window
            .display_handle()
            .map_err(|_| RenderError::SurfaceCreationFailed {
                op: OP,
                code: vk::Result::ERROR_EXTENSION_NOT_PRESENT,
            })?;
        let names = ash_window::enumerate_required_extensions(display.as_raw())
            .map_err(|code| RenderError::SurfaceCreationFailed { op: OP, code })?;
        // SAFETY: ash-window returns pointers to static NUL-terminated names.
        Ok(names
            .iter()
            .map(|&p| unsafe { CStr::from_ptr(p) }.to_owned())
            .collect())
    }

    fn create_surface(&self, gpu: &AshGpu, instance: vk::Instance) -> strata_render_vk::Result<vk::SurfaceKHR> {
        const OP: &str = "vkCreateSurfaceKHR";
        let window = self.live_window(OP)?;
        let loader = gpu.instance().ok_or(RenderError::SurfaceCreationFailed {
            op: OP,
            code: vk::Result::ERROR_INITIALIZATION_FAILED,
        })?;
        if loader.handle() != instance {
            warn!("surface requested for an instance the backend does not own");
        }
        let handles = window
            .display_handle()
            .and_then(|d| window.window_handle().map(|w| (d.as_raw(), w.as_raw())));
        let Ok((display, raw_window)) = handles else {
            return Err(RenderError::SurfaceCreationFailed {
                op: OP,
                code: vk::Result::ERROR_NATIVE_WINDOW_IN_USE_KHR,
            });
        };
        // SAFETY: the window outlives the surface; the renderer is shut down
        // before `destroy` drops it.
        unsafe { ash_window::create_surface(gpu.entry(), loader, display, raw_window, None) }
            .map_err(|code| RenderError::SurfaceCreationFailed { op: OP, code })
    }

    fn should_close(&self) -> bool {
        self.state.close_requested
    }

    fn poll_events(&mut self) {
        let status = self
            .event_loop
            .pump_app_events(Some(Duration::ZERO), &mut self.state);
        if let PumpStatus::Exit(code) = status {
            debug!("event loop exited with {code}");
            self.state.close_requested = true;
        }
    }

    fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.state.resized)
    }

    fn size(&self) -> RenderSize {
        self.state.size
    }

    fn destroy(&mut self) {
        if self.state.window.take().is_some() {
            info!("window closed");
        }
    }
}

impl Drop for DesktopWindow {
    fn drop(&mut self) {
        self.destroy();
    }
}
