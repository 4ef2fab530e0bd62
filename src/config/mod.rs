//! Configuration management for shm-window
//!
//! This module handles loading, parsing, and validating configuration
//! from TOML files. There are no command-line flags; the file is looked up
//! through `SHM_WINDOW_CONFIG` or at `~/.config/shm-window/config.toml`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::pool::{PixelFormat, Size};

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV: &str = "SHM_WINDOW_CONFIG";

/// Default location, relative to the home directory
const DEFAULT_CONFIG_PATH: &str = "~/.config/shm-window/config.toml";

/// Main configuration struct containing all client settings
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ClientConfig {
    /// Toplevel window settings
    #[serde(default)]
    pub window: WindowConfig,

    /// Pixel content settings
    #[serde(default)]
    pub render: RenderConfig,

    /// Logging settings
    #[serde(default)]
    pub log: LogConfig,
}

/// Toplevel window configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    /// Window title sent once the toplevel exists
    pub title: String,

    /// Width used when the compositor lets the client choose (pixels)
    pub default_width: u32,

    /// Height used when the compositor lets the client choose (pixels)
    pub default_height: u32,
}

/// Pixel content configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    /// shm pixel format ("xrgb8888" or "argb8888")
    pub format: PixelFormat,

    /// Fill colour (hex: #RRGGBB or #AARRGGBB)
    pub fill_color: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter when RUST_LOG is unset
    pub level: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "My GUI App".to_string(),
            default_width: 117,
            default_height: 150,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            format: PixelFormat::Xrgb8888,
            fill_color: "#FF0000".to_string(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl WindowConfig {
    /// Size used for any axis the compositor leaves to the client
    pub fn default_size(&self) -> Size {
        Size::new(self.default_width, self.default_height)
    }
}

impl RenderConfig {
    /// Fill colour as a packed 32-bit pixel, opaque unless alpha was given
    pub fn fill_pixel(&self) -> Option<u32> {
        parse_hex_color(&self.fill_color)
    }
}

/// Parses `#RRGGBB` or `#AARRGGBB`
pub fn parse_hex_color(value: &str) -> Option<u32> {
    let hex = value.strip_prefix('#')?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let raw = u32::from_str_radix(hex, 16).ok()?;
    match hex.len() {
        6 => Some(0xFF00_0000 | raw),
        8 => Some(raw),
        _ => None,
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let expanded_path = expand_home(path.as_ref())?;

        let contents = fs::read_to_string(&expanded_path)
            .with_context(|| format!("Failed to read config file: {}", expanded_path.display()))?;

        let config: ClientConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", expanded_path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Path to load from: the environment override, else the default
    /// location if a file exists there
    pub fn discover_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        expand_home(Path::new(DEFAULT_CONFIG_PATH))
            .ok()
            .filter(|path| path.exists())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.window.default_width == 0 || self.window.default_height == 0 {
            anyhow::bail!(
                "Invalid default size {}x{}: both dimensions must be non-zero",
                self.window.default_width,
                self.window.default_height
            );
        }

        if self.render.fill_pixel().is_none() {
            anyhow::bail!("Invalid fill_color: {}", self.render.fill_color);
        }

        let valid_levels = ["off", "error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log.level.to_ascii_lowercase().as_str()) {
            anyhow::bail!("Invalid log level: {}", self.log.level);
        }

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, contents).context("Failed to write configuration file")?;

        Ok(())
    }
}

fn expand_home(path: &Path) -> Result<PathBuf> {
    // Expand ~ to home directory
    if let Ok(rest) = path.strip_prefix("~") {
        let home = std::env::var("HOME").context("Failed to get HOME environment variable")?;
        Ok(Path::new(&home).join(rest))
    } else {
        Ok(path.to_path_buf())
    }
}
