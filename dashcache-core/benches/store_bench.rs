//! Criterion benchmarks for DashCache hot paths.
//!
//! Benchmarks:
//! 1. Store build from a columnar batch (full reload cost minus I/O)
//! 2. Top-N by rank on one date
//! 3. Per-symbol history walk
//! 4. Point lookup through the middleware

use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

use dashcache_core::data::synthetic::{self, SyntheticDataset};
use dashcache_core::data::{MemorySource, Universe};
use dashcache_core::index::KeyTables;
use dashcache_core::store::DailyStore;
use dashcache_core::{CacheMiddleware, ReloadPolicy};

// ── Helpers ──────────────────────────────────────────────────────────

fn dataset(days: i64) -> SyntheticDataset {
    let end = NaiveDate::from_ymd_opt(2024, 6, 28).unwrap();
    let start = end - chrono::Duration::days(days);
    synthetic::generate(&Universe::default_us(), start, end)
}

fn keys_for(data: &SyntheticDataset) -> KeyTables {
    let mut keys = KeyTables::default();
    for inst in &data.instruments {
        keys.symbols.register(inst.symbol.clone());
    }
    keys.register_dates(&data.daily.date);
    keys
}

fn loaded(data: &SyntheticDataset) -> CacheMiddleware {
    let source = MemorySource::new(
        data.instruments.clone(),
        data.sectors.clone(),
        data.daily.clone(),
        data.sector_daily.clone(),
    );
    let mw = CacheMiddleware::new(Arc::new(source), ReloadPolicy::default());
    mw.reload(10_000).expect("synthetic data reloads");
    mw
}

// ── 1. Build ─────────────────────────────────────────────────────────

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_build");
    for days in [60, 250, 750] {
        let data = dataset(days);
        let keys = keys_for(&data);
        group.bench_with_input(BenchmarkId::from_parameter(days), &data, |b, data| {
            b.iter(|| DailyStore::build(black_box(&data.daily), &keys))
        });
    }
    group.finish();
}

// ── 2. Top-N ─────────────────────────────────────────────────────────

fn bench_top_n(c: &mut Criterion) {
    let data = dataset(250);
    let keys = keys_for(&data);
    let (store, _) = DailyStore::build(&data.daily, &keys);
    let latest = keys.dates.len() as u32 - 1;

    let mut group = c.benchmark_group("top_n_by_rank");
    for n in [10, 50] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| store.top_n_by_rank(black_box(latest), n))
        });
    }
    group.finish();
}

// ── 3. History ───────────────────────────────────────────────────────

fn bench_history(c: &mut Criterion) {
    let data = dataset(750);
    let keys = keys_for(&data);
    let (store, _) = DailyStore::build(&data.daily, &keys);
    let latest = keys.dates.len() as u32 - 1;
    let entity = keys.symbols.index_of("AAPL").unwrap_or(0);

    let mut group = c.benchmark_group("history");
    for days in [20, 120, 500] {
        group.bench_with_input(BenchmarkId::from_parameter(days), &days, |b, &days| {
            b.iter(|| store.history(black_box(entity), days, latest))
        });
    }
    group.finish();
}

// ── 4. Middleware lookups ────────────────────────────────────────────

fn bench_middleware(c: &mut Criterion) {
    let data = dataset(250);
    let mw = loaded(&data);
    let latest = mw.latest_date().expect("loaded");

    c.bench_function("daily_data", |b| {
        b.iter(|| mw.daily_data(black_box("MSFT"), latest))
    });
    c.bench_function("history_decode_60", |b| {
        b.iter(|| mw.history(black_box("NVDA"), 60))
    });
}

criterion_group!(
    benches,
    bench_build,
    bench_top_n,
    bench_history,
    bench_middleware
);
criterion_main!(benches);
