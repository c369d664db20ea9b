//! Rune configuration system
//!
//! This crate provides centralized configuration for the blitter and its
//! supporting engine objects, loading settings from `rune.toml` with
//! environment variable overrides.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct RuneConfig {
    /// Blit path selection
    pub blit: BlitConfig,
    /// Staging buffer pool
    pub staging: StagingConfig,
    /// Deferred destruction
    pub disposer: DisposerConfig,
    /// Log output
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BlitConfig {
    /// Route every blit through the shader path, even when a copy would do
    pub force_shader_path: bool,
    /// Allow the backend's scaled blit for color attachments
    pub allow_hardware_scaling: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StagingConfig {
    /// Smallest staging buffer ever allocated, in bytes
    pub min_stage_size: u64,
    /// Generations a free stage may sit unused before it is destroyed
    pub max_idle_generations: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DisposerConfig {
    /// Generations submitted but not yet confirmed before the host waits
    pub frames_in_flight: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// env_logger filter, e.g. "info" or "engine_core=trace"
    pub filter: Option<String>,
}

impl Default for BlitConfig {
    fn default() -> Self {
        Self {
            force_shader_path: false,
            allow_hardware_scaling: true,
        }
    }
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            min_stage_size: 4096,
            max_idle_generations: 8,
        }
    }
}

impl Default for DisposerConfig {
    fn default() -> Self {
        Self { frames_in_flight: 3 }
    }
}

fn parse_flag(val: &str) -> bool {
    val == "1" || val.eq_ignore_ascii_case("true")
}

impl RuneConfig {
    /// Load configuration from a TOML file
    ///
    /// # Returns
    /// * `Ok(RuneConfig)` - Successfully loaded configuration
    /// * `Err(String)` - Error message if loading failed
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        toml::from_str(&content).map_err(|e| format!("Failed to parse config file: {}", e))
    }

    /// Load configuration from the default location (rune.toml in the current directory)
    /// or return default configuration if file doesn't exist
    pub fn load_or_default() -> Self {
        Self::load_from_file("rune.toml").unwrap_or_default()
    }

    /// Merge configuration with environment variables
    ///
    /// Environment variables take precedence over configuration file values.
    /// Unparseable numbers are ignored.
    pub fn merge_with_env(&mut self) {
        self.merge_with(|key| std::env::var(key).ok());
    }

    fn merge_with(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Blit settings
        if let Some(val) = var("RUNE_BLIT_FORCE_SHADER") {
            self.blit.force_shader_path = parse_flag(&val);
        }
        if let Some(val) = var("RUNE_BLIT_HW_SCALING") {
            self.blit.allow_hardware_scaling = parse_flag(&val);
        }

        // Staging settings
        if let Some(size) = var("RUNE_STAGE_MIN_SIZE").and_then(|v| v.parse().ok()) {
            self.staging.min_stage_size = size;
        }
        if let Some(idle) = var("RUNE_STAGE_MAX_IDLE").and_then(|v| v.parse().ok()) {
            self.staging.max_idle_generations = idle;
        }

        if let Some(frames) = var("RUNE_FRAMES_IN_FLIGHT").and_then(|v| v.parse().ok()) {
            self.disposer.frames_in_flight = frames;
        }

        if let Some(filter) = var("RUNE_LOG") {
            self.logging.filter = Some(filter);
        }
    }

    /// Load configuration with environment variable overrides
    ///
    /// This is the recommended way to load configuration:
    /// 1. Load from rune.toml (or use defaults if not found)
    /// 2. Override with environment variables if present
    pub fn load() -> Self {
        let mut config = Self::load_or_default();
        config.merge_with_env();
        config
    }
}
