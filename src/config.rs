//! User preferences stored in `settings.toml`.
//!
//! The directory is resolved from, in order: an explicit `--config-dir`,
//! the `MEDVIEW_CONFIG_DIR` environment variable, then the platform config
//! directory. A missing file means defaults; a malformed one means defaults
//! plus a warning for the caller to log.

use crate::engine::metadata::MIN_FRAME_INTERVAL;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = "medview";
const CONFIG_FILE: &str = "settings.toml";
pub const ENV_CONFIG_DIR: &str = "MEDVIEW_CONFIG_DIR";

pub const DEFAULT_FRAME_RATE: f32 = 30.0;
pub const DEFAULT_ZOOM_SENSITIVITY: f32 = 0.01;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ThemeMode {
    #[default]
    Dark,
    Light,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Frames per second for cine objects that declare no timing.
    pub default_frame_rate: f32,
    pub autoplay: bool,
    pub loop_playback: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            default_frame_rate: DEFAULT_FRAME_RATE,
            autoplay: true,
            loop_playback: true,
        }
    }
}

impl PlaybackConfig {
    pub fn default_frame_interval(&self) -> Duration {
        let rate = if self.default_frame_rate.is_finite() && self.default_frame_rate > 0.0 {
            self.default_frame_rate
        } else {
            DEFAULT_FRAME_RATE
        };
        Duration::from_secs_f32(1.0 / rate).max(MIN_FRAME_INTERVAL)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ToolsConfig {
    pub invert_scroll: bool,
    pub loop_stack_scroll: bool,
    /// Zoom change per pixel of vertical drag.
    pub zoom_sensitivity: f32,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            invert_scroll: false,
            loop_stack_scroll: false,
            zoom_sensitivity: DEFAULT_ZOOM_SENSITIVITY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct DisplayConfig {
    pub theme: ThemeMode,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub playback: PlaybackConfig,
    pub tools: ToolsConfig,
    pub display: DisplayConfig,
}

/// Directory holding `settings.toml`.
pub fn config_dir(override_dir: Option<&Path>) -> Option<PathBuf> {
    if let Some(dir) = override_dir {
        return Some(dir.to_path_buf());
    }
    if let Some(dir) = std::env::var_os(ENV_CONFIG_DIR).filter(|dir| !dir.is_empty()) {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|dir| dir.join(APP_DIR))
}

pub fn config_path(override_dir: Option<&Path>) -> Option<PathBuf> {
    config_dir(override_dir).map(|dir| dir.join(CONFIG_FILE))
}

/// Loads the configuration, falling back to defaults. The second value is a
/// warning when the file existed but could not be used.
pub fn load(override_dir: Option<&Path>) -> (Config, Option<String>) {
    let Some(path) = config_path(override_dir) else {
        return (Config::default(), None);
    };
    match load_from_path(&path) {
        Ok(config) => (config, None),
        Err(err) => (
            Config::default(),
            Some(format!("{}: {err}; using defaults", path.display())),
        ),
    }
}

pub fn load_from_path(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

pub fn save_to_path(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, toml::to_string_pretty(config)?)?;
    Ok(())
}
