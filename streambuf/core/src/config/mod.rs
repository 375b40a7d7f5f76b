//! TOML Configuration File Support
//!
//! Configuration loading for streambuf surfaces, backed by a TOML file at
//! `~/.config/streambuf/streambuf.toml`.
//!
//! # Configuration Priority
//!
//! Values are resolved with the following priority (highest first):
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [throttle]
//! interval_ms = 16
//!
//! [producer]
//! min_delay_ms = 5
//! max_delay_ms = 40
//! chunk_words = 1
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::streaming::DEFAULT_THROTTLE_INTERVAL;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Throttle section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleToml {
    /// Coalescing window in milliseconds
    pub interval_ms: Option<u64>,
}

/// Demo producer section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerToml {
    /// Shortest pause between chunks in milliseconds
    pub min_delay_ms: Option<u64>,

    /// Longest pause between chunks in milliseconds
    pub max_delay_ms: Option<u64>,

    /// Words per appended chunk
    pub chunk_words: Option<usize>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamToml {
    /// Throttle configuration section
    pub throttle: ThrottleToml,

    /// Producer configuration section
    pub producer: ProducerToml,
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Pacing for the simulated streaming producer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProducerConfig {
    /// Shortest pause between chunks
    pub min_delay: Duration,
    /// Longest pause between chunks
    pub max_delay: Duration,
    /// Words per appended chunk
    pub chunk_words: usize,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(40),
            chunk_words: 1,
        }
    }
}

/// Resolved configuration for a streambuf surface
#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// Coalescing window of the throttled notifier
    pub throttle_interval: Duration,

    /// Demo producer pacing
    pub producer: ProducerConfig,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            throttle_interval: DEFAULT_THROTTLE_INTERVAL,
            producer: ProducerConfig::default(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl StreamConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Check that the values make sense together
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for a zero throttle interval,
    /// a zero chunk size, or a producer delay range that is upside down.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.throttle_interval.is_zero() {
            return Err(ConfigError::ValidationError(
                "throttle interval must be greater than zero".to_string(),
            ));
        }
        if self.producer.chunk_words == 0 {
            return Err(ConfigError::ValidationError(
                "producer chunk_words must be at least 1".to_string(),
            ));
        }
        if self.producer.min_delay > self.producer.max_delay {
            return Err(ConfigError::ValidationError(format!(
                "producer min_delay_ms ({}) exceeds max_delay_ms ({})",
                self.producer.min_delay.as_millis(),
                self.producer.max_delay.as_millis()
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/streambuf/streambuf.toml` or
/// `~/.config/streambuf/streambuf.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("streambuf").join("streambuf.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if the
/// resulting values fail validation. A missing config file is not an error.
pub fn load_config() -> Result<StreamConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed, or
/// if the resulting values fail validation.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<StreamConfig, ConfigError> {
    let mut config = StreamConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: StreamToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config);
    config.validate()?;

    Ok(config)
}

fn apply_toml_config(config: &mut StreamConfig, toml: &StreamToml) {
    if let Some(interval) = toml.throttle.interval_ms {
        config.throttle_interval = Duration::from_millis(interval);
    }

    if let Some(delay) = toml.producer.min_delay_ms {
        config.producer.min_delay = Duration::from_millis(delay);
    }
    if let Some(delay) = toml.producer.max_delay_ms {
        config.producer.max_delay = Duration::from_millis(delay);
    }
    if let Some(words) = toml.producer.chunk_words {
        config.producer.chunk_words = words;
    }
}

fn env_millis(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_millis)
}

fn apply_env_config(config: &mut StreamConfig) {
    if let Some(interval) = env_millis("STREAMBUF_THROTTLE_MS") {
        config.throttle_interval = interval;
        config.source = ConfigSource::Env;
    }
    if let Some(delay) = env_millis("STREAMBUF_PRODUCER_MIN_DELAY_MS") {
        config.producer.min_delay = delay;
        config.source = ConfigSource::Env;
    }
    if let Some(delay) = env_millis("STREAMBUF_PRODUCER_MAX_DELAY_MS") {
        config.producer.max_delay = delay;
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides,
/// then call [`StreamConfig::validate`] again.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Throttle interval override (milliseconds)
    pub throttle_ms: Option<u64>,

    /// Producer chunk size override
    pub chunk_words: Option<usize>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set throttle interval override
    #[must_use]
    pub fn with_throttle_ms(mut self, ms: u64) -> Self {
        self.throttle_ms = Some(ms);
        self
    }

    /// Set producer chunk size override
    #[must_use]
    pub fn with_chunk_words(mut self, words: usize) -> Self {
        self.chunk_words = Some(words);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut StreamConfig) {
        if self.throttle_ms.is_some() || self.chunk_words.is_some() {
            config.source = ConfigSource::Cli;
        }
        if let Some(ms) = self.throttle_ms {
            config.throttle_interval = Duration::from_millis(ms);
        }
        if let Some(words) = self.chunk_words {
            config.producer.chunk_words = words;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
