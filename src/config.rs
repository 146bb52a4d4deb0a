//! Runtime configuration
//!
//! Settings are read from a TOML file and fall back to compiled defaults
//! for anything the file leaves out. A missing file is not an error.
//!
//! Default locations:
//! - Linux: ~/.config/alert-subjects/config.toml
//! - macOS: ~/Library/Application Support/alert-subjects/config.toml
//! - Windows: %APPDATA%\alert-subjects\config.toml

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

const APP_DIR: &str = "alert-subjects";

/// Largest accepted upscale factor
pub const MAX_SCALE: u32 = 64;
/// Largest accepted border between triplet panels
pub const MAX_BORDER: u32 = 256;

/// Image rendering settings shared by all image generators
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    /// Lower clipping percentile (0.0 to 100.0)
    pub clip_low: f64,
    /// Upper clipping percentile, must be above `clip_low`
    pub clip_high: f64,
    /// Pixels between triplet panels
    pub border: u32,
    /// Gray level of the border
    pub border_value: u8,
    /// Nearest-neighbour upscale factor (1 = native stamp size)
    pub scale: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            clip_low: 1.0,
            clip_high: 99.0,
            border: 2,
            border_value: 255,
            scale: 4,
        }
    }
}

impl RenderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let in_range = |p: f64| (0.0..=100.0).contains(&p);
        if !in_range(self.clip_low) || !in_range(self.clip_high) || self.clip_low >= self.clip_high
        {
            return Err(ConfigError::InvalidRender(format!(
                "clip percentiles must satisfy 0 <= low < high <= 100, got {} and {}",
                self.clip_low, self.clip_high
            )));
        }
        if self.scale == 0 || self.scale > MAX_SCALE {
            return Err(ConfigError::InvalidRender(format!(
                "scale must be between 1 and {MAX_SCALE}, got {}",
                self.scale
            )));
        }
        if self.border > MAX_BORDER {
            return Err(ConfigError::InvalidRender(format!(
                "border must be at most {MAX_BORDER}, got {}",
                self.border
            )));
        }
        Ok(())
    }
}

/// Lightcurve document settings
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LightcurveConfig {
    /// Series label; the special value "band" labels each series by its band
    pub label: String,
}

impl Default for LightcurveConfig {
    fn default() -> Self {
        Self {
            label: "Lightcurve".to_string(),
        }
    }
}

/// Alert broker connection
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct BrokerConfig {
    pub base_url: String,
    /// API token; the LASAIR_TOKEN environment variable takes precedence in the CLI
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://lasair-lsst.lsst.ac.uk/api".to_string(),
            token: None,
            timeout_secs: 30,
        }
    }
}

/// Top-level configuration
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Where saved subject media is written
    pub output_dir: PathBuf,
    /// First generation index of a run
    pub start_index: u64,
    /// Role names of the media generators to run, in order
    pub generators: Vec<String>,
    pub render: RenderConfig,
    pub lightcurve: LightcurveConfig,
    pub broker: BrokerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            start_index: 1,
            generators: vec!["triplet".to_string(), "json".to_string()],
            render: RenderConfig::default(),
            lightcurve: LightcurveConfig::default(),
            broker: BrokerConfig::default(),
        }
    }
}

impl Config {
    /// Parse from TOML text
    pub fn from_toml(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.render.validate()?;
        Ok(config)
    }

    /// Load an explicit config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&text, path)?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load `path` if given, otherwise the default location if it exists,
    /// otherwise compiled defaults
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => {
                tracing::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }
}

/// ~/.config/alert-subjects/config.toml on Linux
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
}

/// ~/.local/share/alert-subjects/subjects on Linux
pub fn default_output_dir() -> PathBuf {
    let mut path = dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."));

    path.push(APP_DIR);
    path.push("subjects");
    path
}
