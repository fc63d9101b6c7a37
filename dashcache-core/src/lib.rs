//! DashCache Core: in-process market-data cache for dashboard queries.
//!
//! This crate holds the read path of the dashboard:
//! - Domain records (instruments, sectors, daily rows) handed to consumers
//! - Record sources: the `RecordSource` trait, Parquet, in-memory, synthetic
//! - Index manager mapping symbols, sector ids and dates to dense indices
//! - Fixed-schema columnar stores addressed by those indices
//! - Cache middleware that rebuilds everything on reload and swaps generations

pub mod data;
pub mod domain;
pub mod index;
pub mod middleware;
pub mod store;

pub use middleware::{
    CacheMiddleware, Generation, MiddlewareStats, ReloadError, ReloadPolicy, ReloadSummary,
};
