/*!
 * Configuration for storekit engines
 */

use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default maximum gap between ranges merged into one fetch (1 MiB)
pub const DEFAULT_COALESCE_THRESHOLD: u64 = 1024 * 1024;

/// Default cap on concurrent range fetches
pub const DEFAULT_RANGE_CONCURRENCY: usize = 10;

/// Default multipart part size (5 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 5 * 1024 * 1024;

/// Default cap on concurrent part uploads
pub const DEFAULT_PART_CONCURRENCY: usize = 12;

/// Default number of entries requested per listing page
pub const DEFAULT_LIST_CHUNK_SIZE: usize = 50;

/// Default minimum chunk size when streaming a get result (10 MiB)
pub const DEFAULT_STREAM_CHUNK_SIZE: usize = 10 * 1024 * 1024;

/// Store-wide tunables
///
/// Every field has a default, so a TOML file only needs the keys it changes:
///
/// ```toml
/// coalesce_threshold = 262144
/// multipart_max_concurrency = 4
///
/// [log]
/// level = "debug"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Ranges closer than this are fetched with one request
    pub coalesce_threshold: u64,

    /// Maximum in-flight range fetches
    pub max_range_concurrency: usize,

    /// Part size, and the size above which seekable sources go multipart
    pub multipart_chunk_size: usize,

    /// Maximum in-flight part uploads
    pub multipart_max_concurrency: usize,

    /// Entries per listing chunk
    pub list_chunk_size: usize,

    /// Minimum chunk size for streamed get results
    pub stream_min_chunk_size: usize,

    /// Logging
    pub log: LogConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            coalesce_threshold: DEFAULT_COALESCE_THRESHOLD,
            max_range_concurrency: DEFAULT_RANGE_CONCURRENCY,
            multipart_chunk_size: DEFAULT_CHUNK_SIZE,
            multipart_max_concurrency: DEFAULT_PART_CONCURRENCY,
            list_chunk_size: DEFAULT_LIST_CHUNK_SIZE,
            stream_min_chunk_size: DEFAULT_STREAM_CHUNK_SIZE,
            log: LogConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Validate the configuration
    pub fn validate(&self) -> StoreResult<()> {
        let checks: [(&str, bool); 5] = [
            ("max_range_concurrency", self.max_range_concurrency == 0),
            ("multipart_chunk_size", self.multipart_chunk_size == 0),
            ("multipart_max_concurrency", self.multipart_max_concurrency == 0),
            ("list_chunk_size", self.list_chunk_size == 0),
            ("stream_min_chunk_size", self.stream_min_chunk_size == 0),
        ];

        for (field, is_zero) in checks {
            if is_zero {
                return Err(StoreError::InvalidConfig(format!(
                    "{} must be greater than zero",
                    field
                )));
            }
        }

        Ok(())
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> StoreResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: StoreConfig = toml::from_str(&contents).map_err(|e| {
            StoreError::InvalidConfig(format!("{}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> StoreResult<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| StoreError::InvalidConfig(format!("serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Minimum level
    pub level: LogLevel,

    /// Write JSON lines here instead of compact stdout output
    pub log_file: Option<PathBuf>,

    /// Force debug level
    pub verbose: bool,
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}
