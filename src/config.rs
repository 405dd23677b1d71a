//! Configuration module for the media vector index.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `MEDIAVEC_` and use double
//! underscores to separate nested levels:
//! - `MEDIAVEC_BATCH__BATCH_SIZE=32` sets `batch.batch_size`
//! - `MEDIAVEC_MEMORY__MAX_CONCURRENCY=8` sets `memory.max_concurrency`
//! - `MEDIAVEC_LOGGING__LEVEL=debug` sets `logging.level`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::vector::{
    DEFAULT_CLASSIFICATION_THRESHOLD, DEFAULT_CONFIDENCE_MARGIN, VECTOR_DIMENSION_512,
    VectorDimension, VectorError,
};

const CONFIG_DIR: &str = ".mediavec";
const CONFIG_FILE: &str = "settings.toml";
const ENV_PREFIX: &str = "MEDIAVEC_";
const MIB: u64 = 1024 * 1024;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write configuration: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub classification: ClassificationConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StoreConfig {
    /// Path of the vector store file
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Number of components in every stored vector
    #[serde(default = "default_dimension")]
    pub dimension: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BatchConfig {
    /// Items per chunk
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

/// Free-memory thresholds (bytes) and the concurrency range they map onto.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct MemoryConfig {
    #[serde(default = "default_low_memory_threshold")]
    pub low_memory_threshold: u64,

    #[serde(default = "default_high_memory_threshold")]
    pub high_memory_threshold: u64,

    #[serde(default = "default_min_concurrency")]
    pub min_concurrency: usize,

    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ClassificationConfig {
    /// Minimum similarity the best prototype must reach
    #[serde(default = "default_threshold")]
    pub threshold: f32,

    /// Minimum lead of the best prototype over the runner-up
    #[serde(default = "default_confidence_margin")]
    pub confidence_margin: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// `tracing` filter level: error, warn, info, debug or trace
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_store_path() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join("vectors.bin")
}
fn default_dimension() -> usize {
    VECTOR_DIMENSION_512
}
fn default_batch_size() -> usize {
    10
}
fn default_low_memory_threshold() -> u64 {
    800 * MIB
}
fn default_high_memory_threshold() -> u64 {
    1600 * MIB
}
fn default_min_concurrency() -> usize {
    1
}
fn default_max_concurrency() -> usize {
    4
}
fn default_threshold() -> f32 {
    DEFAULT_CLASSIFICATION_THRESHOLD
}
fn default_confidence_margin() -> f32 {
    DEFAULT_CONFIDENCE_MARGIN
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            dimension: default_dimension(),
        }
    }
}

impl StoreConfig {
    pub fn vector_dimension(&self) -> Result<VectorDimension, VectorError> {
        VectorDimension::new(self.dimension)
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            low_memory_threshold: default_low_memory_threshold(),
            high_memory_threshold: default_high_memory_threshold(),
            min_concurrency: default_min_concurrency(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl MemoryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.low_memory_threshold > self.high_memory_threshold {
            return Err(ConfigError::invalid(
                "memory.low_memory_threshold",
                format!(
                    "{} exceeds high_memory_threshold {}",
                    self.low_memory_threshold, self.high_memory_threshold
                ),
            ));
        }
        if self.min_concurrency == 0 {
            return Err(ConfigError::invalid(
                "memory.min_concurrency",
                "must be at least 1",
            ));
        }
        if self.min_concurrency > self.max_concurrency {
            return Err(ConfigError::invalid(
                "memory.min_concurrency",
                format!(
                    "{} exceeds max_concurrency {}",
                    self.min_concurrency, self.max_concurrency
                ),
            ));
        }
        // each chunk sizes a tokio Semaphore from this value
        if self.max_concurrency > tokio::sync::Semaphore::MAX_PERMITS {
            return Err(ConfigError::invalid(
                "memory.max_concurrency",
                format!(
                    "{} exceeds the limit of {} concurrent items",
                    self.max_concurrency,
                    tokio::sync::Semaphore::MAX_PERMITS
                ),
            ));
        }
        Ok(())
    }
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            confidence_margin: default_confidence_margin(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, still honoring env overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let settings: Settings = Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            // Double underscore separates nesting; single underscores stay in field names
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)?;

        settings.validate()?;
        Ok(settings)
    }

    /// Find `.mediavec/settings.toml` in the current directory or an ancestor
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .map(|ancestor| ancestor.join(CONFIG_DIR))
            .find(|dir| dir.is_dir())
            .map(|dir| dir.join(CONFIG_FILE))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.dimension == 0 {
            return Err(ConfigError::invalid("store.dimension", "must be positive"));
        }
        if self.batch.batch_size == 0 {
            return Err(ConfigError::invalid("batch.batch_size", "must be at least 1"));
        }
        if self.classification.confidence_margin < 0.0 {
            return Err(ConfigError::invalid(
                "classification.confidence_margin",
                "must not be negative",
            ));
        }
        self.memory.validate()
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }
}
