//! In-process source, for tests and for hosts that already hold the data.
//!
//! Contents can be replaced between reloads, which is how an embedding
//! import pipeline hands over a fresh ingest.

use chrono::NaiveDate;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};

use super::batch::{DailyBatch, SectorBatch};
use super::source::{RecordSource, SourceError};
use crate::domain::{Instrument, Sector};

#[derive(Debug, Clone, Default)]
struct Contents {
    instruments: Vec<Instrument>,
    sectors: Vec<Sector>,
    daily: DailyBatch,
    sector_daily: SectorBatch,
}

/// A [`RecordSource`] backed by batches held in memory.
#[derive(Debug, Default)]
pub struct MemorySource {
    contents: RwLock<Contents>,
    offline: AtomicBool,
}

impl MemorySource {
    pub fn new(
        instruments: Vec<Instrument>,
        sectors: Vec<Sector>,
        daily: DailyBatch,
        sector_daily: SectorBatch,
    ) -> Self {
        Self {
            contents: RwLock::new(Contents {
                instruments,
                sectors,
                daily,
                sector_daily,
            }),
            offline: AtomicBool::new(false),
        }
    }

    /// Swap in a new ingest. Takes effect on the next reload.
    pub fn replace(
        &self,
        instruments: Vec<Instrument>,
        sectors: Vec<Sector>,
        daily: DailyBatch,
        sector_daily: SectorBatch,
    ) {
        *self.contents.write() = Contents {
            instruments,
            sectors,
            daily,
            sector_daily,
        };
    }

    /// Simulate an unreachable source: every fetch fails while set.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), SourceError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SourceError::Unreachable("memory source is offline".into()));
        }
        Ok(())
    }
}

impl RecordSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn fetch_instruments(&self) -> Result<Vec<Instrument>, SourceError> {
        self.check_online()?;
        Ok(self.contents.read().instruments.clone())
    }

    fn fetch_sectors(&self) -> Result<Vec<Sector>, SourceError> {
        self.check_online()?;
        Ok(self.contents.read().sectors.clone())
    }

    fn fetch_trading_dates(&self, limit: usize) -> Result<Vec<NaiveDate>, SourceError> {
        self.check_online()?;
        let contents = self.contents.read();
        let distinct: BTreeSet<NaiveDate> = contents.daily.date.iter().copied().collect();
        Ok(distinct.into_iter().rev().take(limit).collect())
    }

    fn fetch_daily(&self, since: NaiveDate) -> Result<DailyBatch, SourceError> {
        self.check_online()?;
        Ok(self.contents.read().daily.retain_since(since))
    }

    fn fetch_sector_daily(&self, since: NaiveDate) -> Result<SectorBatch, SourceError> {
        self.check_online()?;
        Ok(self.contents.read().sector_daily.retain_since(since))
    }
}
