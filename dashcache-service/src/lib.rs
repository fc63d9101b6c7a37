//! DashCache Service: the serving layer around `dashcache-core`.
//!
//! This crate provides:
//! - Response cache with per-key single-flight, TTLs and LRU eviction by bytes
//! - Structured cache keys grouped into query families
//! - A private worker pool for dashboard queries
//! - TOML service configuration and tracing initialisation
//! - `DashboardService`, the composition root and import hook

pub mod config;
pub mod logging;
pub mod pool;
pub mod response;
pub mod service;

pub use config::{ConfigError, ResponseCacheConfig, ServiceConfig, SourceConfig};
pub use logging::LoggingConfig;
pub use pool::{PendingQuery, QueryAborted, QueryPool};
pub use response::{CacheKey, CacheStats, QueryFamily, ResponseCache, ResponseCacheError, TtlTable};
pub use service::{DashboardService, MarketOverview, QueryError, QueryResult, ServiceStats};
