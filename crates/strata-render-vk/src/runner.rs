// SPDX-License-Identifier: CEPL-1.0
use strata_core::{ShutdownListener, Ticker};
use tracing::{error, info};

use crate::error::Result;
use crate::frame::FrameStats;
use crate::gpu::Gpu;
use crate::host::WindowHost;
use crate::lifecycle::Renderer;

/// Drives the renderer at the ticker's rate until a stop is requested or the
/// window closes, then tears everything down and acknowledges the stop.
///
/// A fatal render error also ends the loop with a full teardown, but no
/// acknowledgment is sent; the requesting side sees the listener disconnect.
pub fn run<G, H>(
    renderer: &mut Renderer<G>,
    host: &mut H,
    listener: ShutdownListener,
    ticker: &mut Ticker,
) -> Result<FrameStats>
where
    G: Gpu,
    H: WindowHost<G>,
{
    let result = loop {
        host.poll_events();
        if host.should_close() {
            info!("window close requested");
            listener.request();
        }
        if listener.stop_requested() {
            break Ok(());
        }
        if host.take_resized() {
            renderer.notify_resized(host.size());
        }
        if let Err(e) = renderer.render_frame() {
            error!(error = %e, "fatal render error");
            break Err(e);
        }
        ticker.wait();
    };

    renderer.shutdown_all();
    host.destroy();
    let stats = renderer.stats();
    result.map(|()| {
        listener.acknowledge();
        stats
    })
}
