//! Source-of-record trait and structured error types.
//!
//! The cache only talks to its upstream during a reload, and only through
//! bulk columnar fetches. Implementations decide where rows come from
//! (Parquet files, an embedding host, synthetic data); the middleware
//! never knows.

use chrono::NaiveDate;
use thiserror::Error;

use super::batch::{DailyBatch, SectorBatch};
use crate::domain::{Instrument, Sector};

/// Structured error types for source operations.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source unreachable: {0}")]
    Unreachable(String),

    #[error("source schema mismatch in {table}: {detail}")]
    Schema { table: String, detail: String },

    #[error("parquet I/O error: {0}")]
    Parquet(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Bulk, read-only access to the source of record.
pub trait RecordSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// All known instruments. Order defines instrument index assignment.
    fn fetch_instruments(&self) -> Result<Vec<Instrument>, SourceError>;

    /// All known sectors. Order defines sector index assignment.
    fn fetch_sectors(&self) -> Result<Vec<Sector>, SourceError>;

    /// The most recent `limit` distinct dates that carry instrument rows,
    /// in any order.
    fn fetch_trading_dates(&self, limit: usize) -> Result<Vec<NaiveDate>, SourceError>;

    /// Daily instrument rows dated on or after `since`.
    fn fetch_daily(&self, since: NaiveDate) -> Result<DailyBatch, SourceError>;

    /// Daily sector rows dated on or after `since`.
    fn fetch_sector_daily(&self, since: NaiveDate) -> Result<SectorBatch, SourceError>;
}
