//! Cache middleware: rebuilds the index and columnar stores from a record
//! source and answers semantic queries against the current generation.
//!
//! A reload builds a complete [`Generation`] off to the side and publishes
//! it with a single pointer swap. Readers clone the `Arc` and never see a
//! half-built generation; a reader that keeps its snapshot keeps the old
//! generation alive until it lets go.

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::data::{DailyBatch, RecordSource, SectorBatch, SourceError, Universe};
use crate::domain::{DailyRecord, Instrument, Sector, SectorRecord};
use crate::index::{IndexManager, KeyTables};
use crate::store::{ColumnarStore, DailyStore, MalformedReport, RowSchema, SectorStore};

/// Why a reload did not publish a new generation.
#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("source unavailable: {0}")]
    SourceUnavailable(#[from] SourceError),

    #[error("reload rejected: {0}")]
    Malformed(MalformedReport),

    #[error("no trading dates in the retention window")]
    EmptyWindow,
}

/// What a reload does with rejected rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReloadPolicy {
    /// Fail the whole reload if any row is rejected.
    pub reject_malformed: bool,
}

/// Outcome of a successful reload.
#[derive(Debug, Clone, Serialize)]
pub struct ReloadSummary {
    pub generation: u64,
    pub trading_days: usize,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub instruments: usize,
    pub sectors: usize,
    pub daily_rows: usize,
    pub sector_rows: usize,
    pub bytes: usize,
    pub malformed: MalformedReport,
    pub elapsed_ms: u64,
}

/// Point-in-time counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MiddlewareStats {
    pub loaded: bool,
    pub generation: Option<u64>,
    pub loaded_at: Option<DateTime<Utc>>,
    pub retention_days: usize,
    pub trading_days: usize,
    pub instruments: usize,
    pub sectors: usize,
    pub daily_rows: usize,
    pub sector_rows: usize,
    pub bytes: usize,
    pub reloads: u64,
    pub failed_reloads: u64,
}

/// One immutable build of every index table and store.
#[derive(Debug)]
pub struct Generation {
    id: u64,
    loaded_at: DateTime<Utc>,
    retention_days: usize,
    index: IndexManager,
    daily: DailyStore,
    sectors: SectorStore,
    /// Indexed by instrument index.
    instruments: Vec<Instrument>,
    /// Indexed by sector index.
    sector_meta: Vec<Sector>,
}

/// Everything fetched from the source for one reload.
struct Fetched {
    instruments: Vec<Instrument>,
    sectors: Vec<Sector>,
    dates: Vec<NaiveDate>,
    daily: DailyBatch,
    sector_daily: SectorBatch,
}

impl Generation {
    fn build(id: u64, retention_days: usize, fetched: Fetched) -> (Self, MalformedReport) {
        let mut keys = KeyTables::default();

        let mut instruments = Vec::with_capacity(fetched.instruments.len());
        for inst in fetched.instruments {
            if keys.symbols.index_of(inst.symbol.as_str()).is_none() {
                keys.symbols.register(inst.symbol.clone());
                instruments.push(inst);
            }
        }

        let mut sector_meta = Vec::with_capacity(fetched.sectors.len());
        for sector in fetched.sectors {
            if keys.sectors.index_of(sector.id.as_str()).is_none() {
                keys.sectors.register(sector.id.clone());
                sector_meta.push(sector);
            }
        }
        // Classifications that name a sector the source did not list.
        for sector_id in instruments.iter().filter_map(|i| i.sector_id.as_deref()) {
            if keys.sectors.index_of(sector_id).is_none() {
                keys.sectors.register(sector_id.to_string());
                sector_meta.push(Sector::new(sector_id, sector_id));
            }
        }

        keys.register_dates(&fetched.dates);

        let (daily, mut report) = DailyStore::build(&fetched.daily, &keys);
        let (sectors, sector_report) = SectorStore::build(&fetched.sector_daily, &keys);
        report.merge(sector_report);

        let index = IndexManager::new(keys, daily.row_index(), sectors.row_index());
        let generation = Self {
            id,
            loaded_at: Utc::now(),
            retention_days,
            index,
            daily,
            sectors,
            instruments,
            sector_meta,
        };
        (generation, report)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn retention_days(&self) -> usize {
        self.retention_days
    }

    pub fn index(&self) -> &IndexManager {
        &self.index
    }

    pub fn daily_store(&self) -> &DailyStore {
        &self.daily
    }

    pub fn sector_store(&self) -> &SectorStore {
        &self.sectors
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    pub fn sectors(&self) -> &[Sector] {
        &self.sector_meta
    }

    /// Row buffer bytes across both stores.
    pub fn byte_size(&self) -> usize {
        self.daily.byte_size() + self.sectors.byte_size()
    }

    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.index
            .latest_date_index()
            .and_then(|d| self.index.date_of(d))
    }

    /// The `n` most recent trading dates, newest first.
    pub fn dates_range(&self, n: usize) -> Vec<NaiveDate> {
        self.index.keys().dates.keys().iter().rev().take(n).copied().collect()
    }

    fn record<S: RowSchema>(
        &self,
        store: &ColumnarStore<S>,
        key: &str,
        date: NaiveDate,
    ) -> Option<S::Record> {
        let entity = self.index.entity_index(S::KIND, key)?;
        let date = self.index.date_index(date)?;
        let row = store.row_of(entity, date)?;
        store.decode(row, self.index.keys())
    }

    fn records<'k, S: RowSchema>(
        &self,
        store: &ColumnarStore<S>,
        keys: impl IntoIterator<Item = &'k str>,
        date: NaiveDate,
    ) -> Vec<S::Record> {
        let Some(date_idx) = self.index.date_index(date) else {
            return Vec::new();
        };
        keys.into_iter()
            .filter_map(|key| {
                let entity = self.index.entity_index(S::KIND, key)?;
                let row = store.row_of(entity, date_idx)?;
                store.decode(row, self.index.keys())
            })
            .collect()
    }

    fn history_in<S: RowSchema>(
        &self,
        store: &ColumnarStore<S>,
        key: &str,
        days: usize,
        end: Option<NaiveDate>,
    ) -> Vec<S::Record> {
        let Some(entity) = self.index.entity_index(S::KIND, key) else {
            return Vec::new();
        };
        let end_idx = match end {
            Some(date) => self.index.date_index_at_or_before(date),
            None => self.index.latest_date_index(),
        };
        let Some(end_idx) = end_idx else {
            return Vec::new();
        };
        store.decode_all(store.history(entity, days, end_idx), self.index.keys())
    }

    fn top_in<S: RowSchema>(
        &self,
        store: &ColumnarStore<S>,
        date: NaiveDate,
        n: usize,
    ) -> Vec<S::Record> {
        match self.index.date_index(date) {
            Some(d) => store.decode_all(store.top_n_by_rank(d, n), self.index.keys()),
            None => Vec::new(),
        }
    }

    fn all_in<S: RowSchema>(&self, store: &ColumnarStore<S>, date: NaiveDate) -> Vec<S::Record> {
        match self.index.date_index(date) {
            Some(d) => store.decode_all(store.rows_for_date(d).rows(), self.index.keys()),
            None => Vec::new(),
        }
    }

    pub fn daily_data(&self, symbol: &str, date: NaiveDate) -> Option<DailyRecord> {
        self.record(&self.daily, symbol, date)
    }

    /// Records for `symbols` on `date`, in input order, skipping misses.
    pub fn daily_data_batch<'k>(
        &self,
        symbols: impl IntoIterator<Item = &'k str>,
        date: NaiveDate,
    ) -> Vec<DailyRecord> {
        self.records(&self.daily, symbols, date)
    }

    /// Up to `days` most recent rows for `symbol`, newest first.
    pub fn history(&self, symbol: &str, days: usize) -> Vec<DailyRecord> {
        self.history_in(&self.daily, symbol, days, None)
    }

    /// Like [`history`](Self::history) but ending at `end`. A non-trading
    /// `end` resolves to the latest trading date before it.
    pub fn history_until(&self, symbol: &str, days: usize, end: NaiveDate) -> Vec<DailyRecord> {
        self.history_in(&self.daily, symbol, days, Some(end))
    }

    pub fn top_n_by_rank(&self, date: NaiveDate, n: usize) -> Vec<DailyRecord> {
        self.top_in(&self.daily, date, n)
    }

    /// Every instrument row on `date`, in instrument index order.
    pub fn all_for_date(&self, date: NaiveDate) -> Vec<DailyRecord> {
        self.all_in(&self.daily, date)
    }

    pub fn sector_data(&self, sector_id: &str, date: NaiveDate) -> Option<SectorRecord> {
        self.record(&self.sectors, sector_id, date)
    }

    pub fn sector_data_batch<'k>(
        &self,
        sector_ids: impl IntoIterator<Item = &'k str>,
        date: NaiveDate,
    ) -> Vec<SectorRecord> {
        self.records(&self.sectors, sector_ids, date)
    }

    pub fn sector_history(&self, sector_id: &str, days: usize) -> Vec<SectorRecord> {
        self.history_in(&self.sectors, sector_id, days, None)
    }

    pub fn sector_top_n_by_rank(&self, date: NaiveDate, n: usize) -> Vec<SectorRecord> {
        self.top_in(&self.sectors, date, n)
    }

    pub fn sectors_for_date(&self, date: NaiveDate) -> Vec<SectorRecord> {
        self.all_in(&self.sectors, date)
    }

    pub fn instrument(&self, symbol: &str) -> Option<Instrument> {
        let idx = self.index.symbol_index(symbol)?;
        self.instruments.get(idx as usize).cloned()
    }

    /// Instruments classified under `sector_id`, in instrument index order.
    pub fn sector_members(&self, sector_id: &str) -> Vec<Instrument> {
        self.instruments
            .iter()
            .filter(|i| i.belongs_to(sector_id))
            .cloned()
            .collect()
    }
}

/// Façade over the current generation.
pub struct CacheMiddleware {
    source: Arc<dyn RecordSource>,
    policy: ReloadPolicy,
    universe: Option<Universe>,
    current: RwLock<Option<Arc<Generation>>>,
    reload_lock: Mutex<()>,
    next_generation: AtomicU64,
    reloads: AtomicU64,
    failed_reloads: AtomicU64,
}

impl CacheMiddleware {
    pub fn new(source: Arc<dyn RecordSource>, policy: ReloadPolicy) -> Self {
        Self {
            source,
            policy,
            universe: None,
            current: RwLock::new(None),
            reload_lock: Mutex::new(()),
            next_generation: AtomicU64::new(1),
            reloads: AtomicU64::new(0),
            failed_reloads: AtomicU64::new(0),
        }
    }

    /// Classify instruments the source leaves unclassified.
    pub fn with_universe(mut self, universe: Universe) -> Self {
        self.universe = Some(universe);
        self
    }

    pub fn policy(&self) -> ReloadPolicy {
        self.policy
    }

    /// Rebuild from the source, keeping the most recent `max_days_retained`
    /// trading days. On error the previous generation stays published.
    pub fn reload(&self, max_days_retained: usize) -> Result<ReloadSummary, ReloadError> {
        let _serial = self.reload_lock.lock();
        let started = Instant::now();

        match self.build_generation(max_days_retained) {
            Ok((generation, malformed)) => {
                let generation = Arc::new(generation);
                *self.current.write() = Some(Arc::clone(&generation));
                self.reloads.fetch_add(1, Ordering::Relaxed);

                let summary = ReloadSummary {
                    generation: generation.id,
                    trading_days: generation.index.date_count(),
                    first_date: generation.index.date_of(0).unwrap_or_default(),
                    last_date: generation.latest_date().unwrap_or_default(),
                    instruments: generation.instruments.len(),
                    sectors: generation.sector_meta.len(),
                    daily_rows: generation.daily.len(),
                    sector_rows: generation.sectors.len(),
                    bytes: generation.byte_size(),
                    malformed,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                };
                info!(
                    source = self.source.name(),
                    generation = summary.generation,
                    trading_days = summary.trading_days,
                    daily_rows = summary.daily_rows,
                    sector_rows = summary.sector_rows,
                    bytes = summary.bytes,
                    elapsed_ms = summary.elapsed_ms,
                    "reload complete"
                );
                Ok(summary)
            }
            Err(err) => {
                self.failed_reloads.fetch_add(1, Ordering::Relaxed);
                warn!(
                    source = self.source.name(),
                    error = %err,
                    "reload failed, keeping previous generation"
                );
                Err(err)
            }
        }
    }

    fn build_generation(
        &self,
        max_days: usize,
    ) -> Result<(Generation, MalformedReport), ReloadError> {
        if max_days == 0 {
            return Err(ReloadError::EmptyWindow);
        }

        let mut dates = self.source.fetch_trading_dates(max_days)?;
        dates.sort_unstable();
        dates.dedup();
        if dates.len() > max_days {
            dates.drain(..dates.len() - max_days);
        }
        let Some(&since) = dates.first() else {
            return Err(ReloadError::EmptyWindow);
        };

        let mut instruments = self.source.fetch_instruments()?;
        if let Some(universe) = &self.universe {
            universe.classify(&mut instruments);
        }
        let fetched = Fetched {
            instruments,
            sectors: self.source.fetch_sectors()?,
            dates,
            daily: self.source.fetch_daily(since)?,
            sector_daily: self.source.fetch_sector_daily(since)?,
        };
        debug!(
            since = %since,
            daily_rows = fetched.daily.len(),
            sector_rows = fetched.sector_daily.len(),
            "fetched source batches"
        );

        let id = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (generation, malformed) = Generation::build(id, max_days, fetched);

        if !malformed.is_empty() {
            if self.policy.reject_malformed {
                return Err(ReloadError::Malformed(malformed));
            }
            warn!(
                generation = id,
                report = %malformed,
                samples = ?malformed.samples,
                "malformed rows skipped"
            );
        }
        Ok((generation, malformed))
    }

    /// Pin the current generation so several reads see the same data.
    pub fn snapshot(&self) -> Option<Arc<Generation>> {
        self.current.read().clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.current.read().is_some()
    }

    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.snapshot()?.latest_date()
    }

    pub fn dates_range(&self, n: usize) -> Vec<NaiveDate> {
        self.with_generation(|g| g.dates_range(n))
    }

    pub fn daily_data(&self, symbol: &str, date: NaiveDate) -> Option<DailyRecord> {
        self.snapshot()?.daily_data(symbol, date)
    }

    pub fn daily_data_batch<'k>(
        &self,
        symbols: impl IntoIterator<Item = &'k str>,
        date: NaiveDate,
    ) -> Vec<DailyRecord> {
        self.with_generation(|g| g.daily_data_batch(symbols, date))
    }

    pub fn history(&self, symbol: &str, days: usize) -> Vec<DailyRecord> {
        self.with_generation(|g| g.history(symbol, days))
    }

    pub fn history_until(&self, symbol: &str, days: usize, end: NaiveDate) -> Vec<DailyRecord> {
        self.with_generation(|g| g.history_until(symbol, days, end))
    }

    pub fn top_n_by_rank(&self, date: NaiveDate, n: usize) -> Vec<DailyRecord> {
        self.with_generation(|g| g.top_n_by_rank(date, n))
    }

    pub fn all_for_date(&self, date: NaiveDate) -> Vec<DailyRecord> {
        self.with_generation(|g| g.all_for_date(date))
    }

    pub fn sector_data(&self, sector_id: &str, date: NaiveDate) -> Option<SectorRecord> {
        self.snapshot()?.sector_data(sector_id, date)
    }

    pub fn sector_data_batch<'k>(
        &self,
        sector_ids: impl IntoIterator<Item = &'k str>,
        date: NaiveDate,
    ) -> Vec<SectorRecord> {
        self.with_generation(|g| g.sector_data_batch(sector_ids, date))
    }

    pub fn sector_history(&self, sector_id: &str, days: usize) -> Vec<SectorRecord> {
        self.with_generation(|g| g.sector_history(sector_id, days))
    }

    pub fn sector_top_n_by_rank(&self, date: NaiveDate, n: usize) -> Vec<SectorRecord> {
        self.with_generation(|g| g.sector_top_n_by_rank(date, n))
    }

    pub fn sectors_for_date(&self, date: NaiveDate) -> Vec<SectorRecord> {
        self.with_generation(|g| g.sectors_for_date(date))
    }

    pub fn instrument(&self, symbol: &str) -> Option<Instrument> {
        self.snapshot()?.instrument(symbol)
    }

    pub fn sector_members(&self, sector_id: &str) -> Vec<Instrument> {
        self.with_generation(|g| g.sector_members(sector_id))
    }

    pub fn stats(&self) -> MiddlewareStats {
        let mut stats = MiddlewareStats {
            reloads: self.reloads.load(Ordering::Relaxed),
            failed_reloads: self.failed_reloads.load(Ordering::Relaxed),
            ..MiddlewareStats::default()
        };
        if let Some(g) = self.snapshot() {
            stats.loaded = true;
            stats.generation = Some(g.id);
            stats.loaded_at = Some(g.loaded_at);
            stats.retention_days = g.retention_days;
            stats.trading_days = g.index.date_count();
            stats.instruments = g.instruments.len();
            stats.sectors = g.sector_meta.len();
            stats.daily_rows = g.daily.len();
            stats.sector_rows = g.sectors.len();
            stats.bytes = g.byte_size();
        }
        stats
    }

    fn with_generation<T: Default>(&self, f: impl FnOnce(&Generation) -> T) -> T {
        self.snapshot().map(|g| f(&g)).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DailyRow, MemorySource, SectorRow};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    fn source() -> Arc<MemorySource> {
        let mut daily = DailyBatch::default();
        for (day, ranks) in [(3, [3, 1]), (4, [1, 2]), (5, [2, 3])] {
            daily.push(DailyRow::new("AAA", d(day)).rank(ranks[0]).close(10.0 + day as f64));
            daily.push(DailyRow::new("BBB", d(day)).rank(ranks[1]));
        }
        let mut sector_daily = SectorBatch::default();
        sector_daily.push(SectorRow::new("tech", d(5)).rank(1).heat(0.5));

        Arc::new(MemorySource::new(
            vec![
                Instrument::new("AAA", "Triple A").in_sector("tech"),
                Instrument::new("BBB", "Triple B"),
            ],
            vec![Sector::new("tech", "Technology")],
            daily,
            sector_daily,
        ))
    }

    #[test]
    fn unloaded_middleware_answers_empty() {
        let mw = CacheMiddleware::new(source(), ReloadPolicy::default());
        assert!(!mw.is_loaded());
        assert_eq!(mw.latest_date(), None);
        assert!(mw.history("AAA", 5).is_empty());
        assert!(mw.snapshot().is_none());
        assert!(!mw.stats().loaded);
    }

    #[test]
    fn reload_publishes_generation() {
        let mw = CacheMiddleware::new(source(), ReloadPolicy::default());
        let summary = mw.reload(30).unwrap();
        assert_eq!(summary.trading_days, 3);
        assert_eq!(summary.daily_rows, 6);
        assert_eq!(summary.sector_rows, 1);
        assert_eq!(summary.first_date, d(3));
        assert_eq!(summary.last_date, d(5));
        assert!(summary.malformed.is_empty());

        assert!(mw.is_loaded());
        assert_eq!(mw.latest_date(), Some(d(5)));
        assert_eq!(mw.dates_range(2), vec![d(5), d(4)]);
        assert_eq!(mw.daily_data("AAA", d(4)).unwrap().close, Some(14.0));
        assert_eq!(mw.sector_data("tech", d(5)).unwrap().heat, Some(0.5));
        assert_eq!(mw.sector_members("tech").len(), 1);
        assert_eq!(mw.instrument("BBB").unwrap().name, "Triple B");
    }

    #[test]
    fn retention_window_trims_oldest_days() {
        let mw = CacheMiddleware::new(source(), ReloadPolicy::default());
        let summary = mw.reload(2).unwrap();
        assert_eq!(summary.trading_days, 2);
        assert_eq!(summary.daily_rows, 4);
        assert!(mw.daily_data("AAA", d(3)).is_none());
        assert_eq!(mw.history("AAA", 10).len(), 2);
    }

    #[test]
    fn history_until_resolves_non_trading_end() {
        let mw = CacheMiddleware::new(source(), ReloadPolicy::default());
        mw.reload(30).unwrap();
        let ranks: Vec<_> = mw
            .history_until("AAA", 5, d(4))
            .iter()
            .map(|r| r.rank)
            .collect();
        assert_eq!(ranks, vec![Some(1), Some(3)]);

        // d(30) is after the window; resolves to the latest date
        assert_eq!(mw.history_until("AAA", 1, d(30))[0].date, d(5));
        assert!(mw.history_until("AAA", 5, d(1)).is_empty());
    }

    #[test]
    fn batch_reads_keep_input_order_and_skip_misses() {
        let mw = CacheMiddleware::new(source(), ReloadPolicy::default());
        mw.reload(30).unwrap();
        let recs = mw.daily_data_batch(["BBB", "NOPE", "AAA"], d(5));
        let symbols: Vec<_> = recs.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["BBB", "AAA"]);
    }

    #[test]
    fn failed_reload_keeps_previous_generation() {
        let src = source();
        let mw = CacheMiddleware::new(src.clone(), ReloadPolicy::default());
        mw.reload(30).unwrap();
        let before = mw.snapshot().unwrap().id();

        src.set_offline(true);
        let err = mw.reload(30).unwrap_err();
        assert!(matches!(err, ReloadError::SourceUnavailable(_)));
        assert_eq!(mw.snapshot().unwrap().id(), before);
        assert_eq!(mw.stats().failed_reloads, 1);
        assert_eq!(mw.top_n_by_rank(d(5), 1)[0].symbol, "AAA");
    }

    #[test]
    fn zero_retention_is_an_empty_window() {
        let mw = CacheMiddleware::new(source(), ReloadPolicy::default());
        assert!(matches!(mw.reload(0), Err(ReloadError::EmptyWindow)));
        assert!(!mw.is_loaded());
    }

    #[test]
    fn reject_malformed_policy_fails_reload() {
        let src = source();
        let mut daily = DailyBatch::default();
        daily.push(DailyRow::new("AAA", d(5)).rank(1));
        daily.push(DailyRow::new("AAA", d(5)).rank(2));
        src.replace(
            vec![Instrument::new("AAA", "Triple A")],
            vec![],
            daily,
            SectorBatch::default(),
        );

        let strict = CacheMiddleware::new(src.clone(), ReloadPolicy { reject_malformed: true });
        match strict.reload(10) {
            Err(ReloadError::Malformed(report)) => assert_eq!(report.duplicate, 1),
            other => panic!("expected malformed error, got {other:?}"),
        }
        assert!(!strict.is_loaded());

        let lenient = CacheMiddleware::new(src, ReloadPolicy::default());
        let summary = lenient.reload(10).unwrap();
        assert_eq!(summary.malformed.duplicate, 1);
        assert_eq!(lenient.daily_data("AAA", d(5)).unwrap().rank, Some(1));
    }

    #[test]
    fn universe_classifies_unassigned_instruments() {
        let universe = Universe::from_toml("[sectors]\nfinance = [\"BBB\"]\n").unwrap();
        let mw = CacheMiddleware::new(source(), ReloadPolicy::default()).with_universe(universe);
        mw.reload(30).unwrap();
        assert_eq!(mw.sector_members("finance").len(), 1);
        assert_eq!(mw.stats().sectors, 2);
    }

    #[test]
    fn snapshot_survives_reload() {
        let src = source();
        let mw = CacheMiddleware::new(src.clone(), ReloadPolicy::default());
        mw.reload(30).unwrap();
        let pinned = mw.snapshot().unwrap();

        src.replace(vec![], vec![], {
            let mut b = DailyBatch::default();
            b.push(DailyRow::new("ZZZ", d(20)));
            b
        }, SectorBatch::default());
        mw.reload(30).unwrap();

        assert_eq!(pinned.history("AAA", 3).len(), 3);
        assert!(mw.history("AAA", 3).is_empty());
        assert_ne!(pinned.id(), mw.snapshot().unwrap().id());
    }
}
