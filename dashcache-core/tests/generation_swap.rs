//! Concurrent reload and read: readers pinned to a generation always see
//! that generation whole.

use chrono::{Duration, NaiveDate};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use dashcache_core::data::{DailyBatch, DailyRow, MemorySource, SectorBatch};
use dashcache_core::domain::Instrument;
use dashcache_core::{CacheMiddleware, ReloadPolicy};

const SYMBOLS: [&str; 4] = ["AAA", "BBB", "CCC", "DDD"];

fn base() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
}

/// A dataset where every close equals `version`, over `days` days.
fn dataset(version: u32, days: i64) -> (Vec<Instrument>, DailyBatch) {
    let instruments = SYMBOLS.iter().map(|s| Instrument::new(*s, *s)).collect();
    let mut daily = DailyBatch::default();
    for day in 0..days {
        for (i, s) in SYMBOLS.iter().enumerate() {
            daily.push(
                DailyRow::new(s, base() + Duration::days(day))
                    .rank(i as i64 + 1)
                    .close(version as f64),
            );
        }
    }
    (instruments, daily)
}

#[test]
fn readers_see_self_consistent_generations() {
    let (instruments, daily) = dataset(1, 10);
    let source = Arc::new(MemorySource::new(instruments, vec![], daily, SectorBatch::default()));
    let mw = Arc::new(CacheMiddleware::new(source.clone(), ReloadPolicy::default()));
    mw.reload(60).unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let mut readers = Vec::new();
    for _ in 0..4 {
        let mw = Arc::clone(&mw);
        let stop = Arc::clone(&stop);
        readers.push(thread::spawn(move || {
            let mut checked = 0usize;
            while !stop.load(Ordering::Relaxed) {
                let gen = mw.snapshot().expect("loaded before readers start");
                let Some(latest) = gen.latest_date() else {
                    continue;
                };
                let version = gen.daily_data("AAA", latest).and_then(|r| r.close);
                let rows = gen.all_for_date(latest);
                assert_eq!(rows.len(), SYMBOLS.len());
                for row in &rows {
                    assert_eq!(row.close, version, "mixed generations in one snapshot");
                }
                let hist = gen.history("DDD", 100);
                assert_eq!(hist.len(), gen.dates_range(1000).len());
                assert!(hist.iter().all(|r| r.close == version));
                checked += 1;
            }
            checked
        }));
    }

    for version in 2..30u32 {
        let (instruments, daily) = dataset(version, 5 + (version % 7) as i64);
        source.replace(instruments, vec![], daily, SectorBatch::default());
        mw.reload(60).unwrap();
    }
    stop.store(true, Ordering::Relaxed);

    let total: usize = readers.into_iter().map(|h| h.join().unwrap()).sum();
    assert!(total > 0);
    assert_eq!(mw.stats().reloads, 29);
}

#[test]
fn concurrent_reloads_are_serialized() {
    let (instruments, daily) = dataset(7, 20);
    let source = Arc::new(MemorySource::new(instruments, vec![], daily, SectorBatch::default()));
    let mw = Arc::new(CacheMiddleware::new(source, ReloadPolicy::default()));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let mw = Arc::clone(&mw);
            thread::spawn(move || mw.reload(15).unwrap().generation)
        })
        .collect();
    let mut ids: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    ids.sort_unstable();
    ids.dedup();

    assert_eq!(ids.len(), 8);
    let stats = mw.stats();
    assert_eq!(stats.trading_days, 15);
    assert_eq!(stats.daily_rows, 15 * SYMBOLS.len());
}
