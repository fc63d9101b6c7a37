//! Parquet source: write a synthetic dataset, reload it, and compare with
//! the same dataset served from memory.

use chrono::NaiveDate;
use std::sync::Arc;

use dashcache_core::data::synthetic::{self, SyntheticDataset};
use dashcache_core::data::{MemorySource, ParquetSource, RecordSource, Universe};
use dashcache_core::{CacheMiddleware, ReloadPolicy};

fn dataset() -> SyntheticDataset {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let end = NaiveDate::from_ymd_opt(2024, 3, 29).unwrap();
    synthetic::generate(&Universe::default_us(), start, end)
}

#[test]
fn parquet_round_trip_matches_memory() {
    let dir = tempfile::tempdir().unwrap();
    let data = dataset();
    ParquetSource::new(dir.path()).write_dataset(&data).unwrap();

    let parquet = CacheMiddleware::new(
        Arc::new(ParquetSource::new(dir.path())),
        ReloadPolicy { reject_malformed: true },
    );
    let memory = CacheMiddleware::new(
        Arc::new(MemorySource::new(
            data.instruments.clone(),
            data.sectors.clone(),
            data.daily.clone(),
            data.sector_daily.clone(),
        )),
        ReloadPolicy { reject_malformed: true },
    );

    let a = parquet.reload(20).unwrap();
    let b = memory.reload(20).unwrap();
    assert_eq!(a.trading_days, 20);
    assert_eq!(a.daily_rows, b.daily_rows);
    assert_eq!(a.sector_rows, b.sector_rows);
    assert_eq!(a.last_date, b.last_date);

    let latest = parquet.latest_date().unwrap();
    assert_eq!(parquet.top_n_by_rank(latest, 10), memory.top_n_by_rank(latest, 10));
    assert_eq!(parquet.history("AAPL", 15), memory.history("AAPL", 15));
    assert_eq!(
        parquet.sectors_for_date(latest),
        memory.sectors_for_date(latest)
    );
    assert_eq!(parquet.instrument("MSFT"), memory.instrument("MSFT"));
}

#[test]
fn date_filter_is_pushed_down() {
    let dir = tempfile::tempdir().unwrap();
    let data = dataset();
    let source = ParquetSource::new(dir.path());
    source.write_dataset(&data).unwrap();

    let since = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    let batch = source.fetch_daily(since).unwrap();
    assert!(!batch.is_empty());
    assert!(batch.date.iter().all(|d| *d >= since));
    assert_eq!(batch.len(), data.daily.retain_since(since).len());
}

#[test]
fn missing_directory_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let mw = CacheMiddleware::new(
        Arc::new(ParquetSource::new(dir.path().join("nope"))),
        ReloadPolicy::default(),
    );
    assert!(mw.reload(10).is_err());
    assert!(!mw.is_loaded());
}
