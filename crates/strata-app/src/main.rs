// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use strata_core::{init_tracing, shutdown_channel, Ticker};
use strata_platform::DesktopWindow;
use strata_render_vk::{run, AshGpu, EmbeddedShaders, FileShaders, Renderer, ShaderSource};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config; missing means defaults
    #[arg(long, default_value = "strata.toml")]
    config: PathBuf,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let cfg = config::load_cfg(&args.config);

    let shaders: Box<dyn ShaderSource> = match &cfg.render.shader_dir {
        Some(dir) => {
            info!("shaders from {}", dir.display());
            Box::new(FileShaders::new(dir))
        }
        None => Box::new(EmbeddedShaders),
    };

    let mut window = DesktopWindow::open(&cfg.window.title, cfg.window.width, cfg.window.height)
        .context("open window")?;
    let mut renderer = Renderer::startup(AshGpu::linked(), &window, cfg.render_settings(), shaders)
        .context("renderer startup")?;

    let (handle, listener) = shutdown_channel();
    let mut ticker = Ticker::from_hz(cfg.render.tick_hz);
    info!("running at {} Hz", cfg.render.tick_hz);

    let stats = run(&mut renderer, &mut window, listener, &mut ticker).context("render loop")?;
    info!(
        presented = stats.presented,
        dropped = stats.dropped,
        invalidated = stats.invalidated,
        "shutdown complete"
    );
    if let Err(e) = handle.try_ack() {
        warn!("shutdown was not acknowledged: {e}");
    }
    Ok(())
}
