// SPDX-License-Identifier: CEPL-1.0
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use strata_render_vk::RenderSettings;
use tracing::{info, warn};

#[derive(Debug, Deserialize, Default, PartialEq)]
pub struct AppCfg {
    #[serde(default)]
    pub window: WindowCfg,
    #[serde(default)]
    pub render: RenderCfg,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WindowCfg {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            title: "strata".to_owned(),
            width: 500,
            height: 500,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RenderCfg {
    #[serde(default = "default_clear")]
    pub clear_color: [f32; 4],
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,
    #[serde(default = "default_fence_timeout_ms")]
    pub fence_timeout_ms: u64,
    #[serde(default)]
    pub debug_messenger: bool,
    #[serde(default)]
    pub shader_dir: Option<PathBuf>,
    #[serde(default)]
    pub pipeline_cache: Option<PathBuf>,
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            clear_color: default_clear(),
            tick_hz: default_tick_hz(),
            fence_timeout_ms: default_fence_timeout_ms(),
            debug_messenger: false,
            shader_dir: None,
            pipeline_cache: None,
        }
    }
}

fn default_clear() -> [f32; 4] {
    [0.098, 0.71, 0.996, 1.0]
}
fn default_tick_hz() -> u32 {
    30
}
fn default_fence_timeout_ms() -> u64 {
    10_000
}

impl AppCfg {
    pub fn render_settings(&self) -> RenderSettings {
        RenderSettings {
            app_name: self.window.title.clone(),
            clear_color: self.render.clear_color,
            fence_timeout: Duration::from_millis(self.render.fence_timeout_ms),
            enable_debug: self.render.debug_messenger,
            pipeline_cache_path: self.render.pipeline_cache.clone(),
        }
    }
}

pub fn parse_cfg(text: &str) -> Result<AppCfg, toml::de::Error> {
    toml::from_str::<AppCfg>(text)
}

/// Reads `path`; a missing or malformed file yields the defaults.
pub fn load_cfg(path: &Path) -> AppCfg {
    match fs::read_to_string(path) {
        Ok(s) => match parse_cfg(&s) {
            Ok(cfg) => {
                info!("config loaded from {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("invalid config {}: {e}; using defaults", path.display());
                AppCfg::default()
            }
        },
        Err(e) => {
            warn!("config {} not read ({e}); using defaults", path.display());
            AppCfg::default()
        }
    }
}
