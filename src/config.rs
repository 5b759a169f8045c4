use std::path::PathBuf;
use std::time::Duration;

use log::{debug, info};
use serde::Deserialize;

use crate::cache::DEFAULT_CAPACITY;

// ---------------------------------------------------------------------------
// ConfigFile: deserialized from TOML (all fields optional)
// ---------------------------------------------------------------------------

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    #[serde(default)]
    pub viewer: ViewerConfigFile,
}

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct ViewerConfigFile {
    pub pan_step: Option<u32>,
    pub cache_capacity: Option<usize>,
    pub tick_ms: Option<u64>,
    pub overlay_ms: Option<u64>,
    pub prefetch_workers: Option<usize>,
    pub viewport_width: Option<u32>,
    pub viewport_height: Option<u32>,
}

// ---------------------------------------------------------------------------
// Config: resolved (all fields concrete)
// ---------------------------------------------------------------------------

pub struct Config {
    pub viewer: ViewerConfig,
}

#[derive(Clone)]
pub struct ViewerConfig {
    pub pan_step: u32,
    pub cache_capacity: usize,
    pub tick: Duration,
    pub overlay_delay: Duration,
    pub prefetch_workers: usize,
    /// Fixed viewport size; `None` means "use the terminal's pixel size".
    pub viewport_width: Option<u32>,
    pub viewport_height: Option<u32>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        ConfigFile::default().resolve().viewer
    }
}

/// CLI values that override the config file.
#[derive(Default, Clone)]
pub struct CliOverrides {
    pub pan_step: Option<u32>,
    pub cache_capacity: Option<usize>,
}

impl ConfigFile {
    /// Merge CLI values (overwrites non-None fields).
    pub fn merge_cli(&mut self, cli: &CliOverrides) {
        if let Some(v) = cli.pan_step {
            debug!("config: CLI override pan_step={v}");
            self.viewer.pan_step = Some(v);
        }
        if let Some(v) = cli.cache_capacity {
            debug!("config: CLI override cache_capacity={v}");
            self.viewer.cache_capacity = Some(v);
        }
    }

    /// Resolve to a Config by applying defaults to missing fields.
    pub fn resolve(self) -> Config {
        let config = Config {
            viewer: ViewerConfig {
                pan_step: self.viewer.pan_step.unwrap_or(100).max(1),
                cache_capacity: self
                    .viewer
                    .cache_capacity
                    .unwrap_or(DEFAULT_CAPACITY)
                    .max(1),
                tick: Duration::from_millis(self.viewer.tick_ms.unwrap_or(50).max(1)),
                overlay_delay: Duration::from_millis(self.viewer.overlay_ms.unwrap_or(1000)),
                prefetch_workers: self.viewer.prefetch_workers.unwrap_or(2).max(1),
                viewport_width: self.viewer.viewport_width.filter(|&w| w > 0),
                viewport_height: self.viewer.viewport_height.filter(|&h| h > 0),
            },
        };
        info!(
            "config: resolved pan_step={}, cache_capacity={}, tick={}ms, \
             overlay={}ms, prefetch_workers={}, viewport={:?}x{:?}",
            config.viewer.pan_step,
            config.viewer.cache_capacity,
            config.viewer.tick.as_millis(),
            config.viewer.overlay_delay.as_millis(),
            config.viewer.prefetch_workers,
            config.viewer.viewport_width,
            config.viewer.viewport_height,
        );
        config
    }
}

/// Resolve the XDG config path for fitview.
fn config_path() -> Option<PathBuf> {
    let config_dir = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
    Some(config_dir.join("fitview").join("config.toml"))
}

/// Load config file. Returns `ConfigFile::default()` if no file exists.
/// Returns an error if the file exists but cannot be parsed.
pub fn load_config() -> anyhow::Result<ConfigFile> {
    let path = match config_path() {
        Some(p) => p,
        None => {
            info!("config: no HOME or XDG_CONFIG_HOME set, using defaults");
            return Ok(ConfigFile::default());
        }
    };
    debug!("config: looking for {}", path.display());
    match std::fs::read_to_string(&path) {
        Ok(text) => {
            info!("config: loaded from {}", path.display());
            let cfg: ConfigFile = toml::from_str(&text)
                .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))?;
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("config: {} not found, using defaults", path.display());
            Ok(ConfigFile::default())
        }
        Err(e) => Err(anyhow::anyhow!("failed to read {}: {e}", path.display())),
    }
}
