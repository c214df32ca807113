//! Configuration management for audio-streamer
//!
//! Settings sources, highest priority first:
//! 1. Command-line arguments
//! 2. Environment variables (through clap `env` fallbacks)
//! 3. TOML configuration file
//! 4. Built-in defaults
//!
//! Sample-rate labels and bit depths are kept as given here. They are validated
//! only when the stream manager resolves its [`SampleFormat`](crate::audio::SampleFormat),
//! so an unknown value fails configuration instead of falling back to a default.

use crate::audio::DecoderCapability;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Output stream settings (`[stream]` table)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamConfig {
    /// One of 8KHZ, 16KHZ, 22KHZ, 44KHZ
    #[serde(default = "default_sample_rate")]
    pub sample_rate: String,

    /// 8 or 16
    #[serde(default = "default_bits_per_sample")]
    pub bits_per_sample: u8,

    #[serde(default)]
    pub encrypted: bool,

    #[serde(default)]
    pub decoder: DecoderCapability,

    /// Frames per buffer for the compat decode strategy
    #[serde(default = "default_buffer_frames")]
    pub buffer_frames: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            bits_per_sample: default_bits_per_sample(),
            encrypted: false,
            decoder: DecoderCapability::default(),
            buffer_frames: default_buffer_frames(),
        }
    }
}

/// Logging configuration (`[logging]` table)
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_sample_rate() -> String {
    "16KHZ".to_string()
}

fn default_bits_per_sample() -> u8 {
    16
}

fn default_buffer_frames() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn parse(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Load configuration from a TOML file
    pub async fn load(toml_path: &Path) -> Result<Self> {
        let toml_str = tokio::fs::read_to_string(toml_path).await.map_err(|e| {
            Error::Config(format!("Failed to read config file {:?}: {}", toml_path, e))
        })?;

        let config = Self::parse(&toml_str)?;
        info!("Loaded TOML configuration from {:?}", toml_path);
        Ok(config)
    }

    /// Apply command-line overrides on top of the file values
    pub fn apply_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(sample_rate) = overrides.sample_rate {
            self.stream.sample_rate = sample_rate;
        }
        if let Some(bits) = overrides.bits_per_sample {
            self.stream.bits_per_sample = bits;
        }
        if let Some(decoder) = overrides.decoder {
            self.stream.decoder = decoder;
        }
        if overrides.encrypted {
            self.stream.encrypted = true;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
        self
    }
}

/// Values given on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub sample_rate: Option<String>,
    pub bits_per_sample: Option<u8>,
    pub decoder: Option<DecoderCapability>,
    pub encrypted: bool,
    pub log_level: Option<String>,
}
