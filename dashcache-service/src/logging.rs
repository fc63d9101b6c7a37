//! Logging configuration and initialization.

use serde::{Deserialize, Serialize};
use std::io;
use tracing_subscriber::{fmt, EnvFilter};

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    pub level: String,
    /// `pretty`, `compact` or `json`.
    pub format: String,
}

pub const LOG_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

impl LoggingConfig {
    /// Install the global tracing subscriber, writing to stderr. `RUST_LOG`
    /// overrides the configured level. Fails if a subscriber is already
    /// installed.
    pub fn init(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));

        match self.format.as_str() {
            "json" => fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .try_init(),
            "compact" => fmt()
                .compact()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .try_init(),
            _ => fmt()
                .pretty()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .try_init(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}
