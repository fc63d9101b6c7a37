//! Service configuration, deserialized from TOML.
//!
//! Every field has a default, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use dashcache_core::ReloadPolicy;

use crate::logging::{LoggingConfig, LOG_FORMATS};
use crate::response::{QueryFamily, TtlTable};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFile(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Trading days kept in memory.
    pub retention_days: usize,
    /// Query pool threads.
    pub workers: usize,
    pub source: SourceConfig,
    pub reload: ReloadPolicy,
    pub response_cache: ResponseCacheConfig,
    pub logging: LoggingConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            retention_days: 120,
            workers: 4,
            source: SourceConfig::default(),
            reload: ReloadPolicy::default(),
            response_cache: ResponseCacheConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Directory holding the Parquet tables.
    pub dir: PathBuf,
    /// Optional universe TOML used to classify instruments.
    pub universe: Option<PathBuf>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data"),
            universe: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseCacheConfig {
    pub dir: PathBuf,
    pub byte_budget: u64,
    pub default_ttl_secs: u64,
    /// Per-family TTL overrides, keyed by family name (`ranking`, ...).
    pub ttl_secs: BTreeMap<String, u64>,
}

impl Default for ResponseCacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("cache/responses"),
            byte_budget: 64 * 1024 * 1024,
            default_ttl_secs: 300,
            ttl_secs: BTreeMap::new(),
        }
    }
}

impl ResponseCacheConfig {
    /// TTL table for the response cache. Unknown family names are skipped;
    /// [`ServiceConfig::validate`] rejects them.
    pub fn ttl_table(&self) -> TtlTable {
        self.ttl_secs
            .iter()
            .filter_map(|(name, secs)| QueryFamily::parse(name).map(|f| (f, *secs)))
            .fold(
                TtlTable::new(Duration::from_secs(self.default_ttl_secs)),
                |table, (family, secs)| table.with(family, Duration::from_secs(secs)),
            )
    }
}

impl ServiceConfig {
    /// Parse and validate TOML content.
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retention_days == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retention_days",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.workers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "workers",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.response_cache.byte_budget == 0 {
            return Err(ConfigError::InvalidValue {
                field: "response_cache.byte_budget",
                reason: "must be greater than 0".to_string(),
            });
        }
        if let Some(name) = self
            .response_cache
            .ttl_secs
            .keys()
            .find(|name| QueryFamily::parse(name).is_none())
        {
            return Err(ConfigError::InvalidValue {
                field: "response_cache.ttl_secs",
                reason: format!("unknown query family '{name}'"),
            });
        }
        if !LOG_FORMATS.contains(&self.logging.format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "logging.format",
                reason: format!("expected one of {LOG_FORMATS:?}"),
            });
        }
        Ok(())
    }
}
