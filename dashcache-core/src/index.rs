//! Index manager: dense integer indices for every key space, plus the
//! composite (entity, date) → row tables.
//!
//! Indices are assigned zero-based in first-seen order. Nothing here is
//! mutable once a generation is published; a reload builds fresh tables
//! and the whole generation is swapped as one reference.

use chrono::NaiveDate;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::ops::Range;
use std::sync::Arc;

use crate::domain::EntityKind;

/// Bidirectional key ↔ index table for one key space.
#[derive(Debug, Clone)]
pub struct KeySpace<K> {
    keys: Vec<K>,
    lookup: HashMap<K, u32>,
}

impl<K> Default for KeySpace<K> {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            lookup: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone> KeySpace<K> {
    /// Register a key, returning its index. Re-registering returns the
    /// index assigned the first time.
    pub fn register(&mut self, key: K) -> u32 {
        if let Some(idx) = self.lookup.get(&key) {
            return *idx;
        }
        let idx = self.keys.len() as u32;
        self.lookup.insert(key.clone(), idx);
        self.keys.push(key);
        idx
    }

    pub fn index_of<Q>(&self, key: &Q) -> Option<u32>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.lookup.get(key).copied()
    }

    pub fn key_of(&self, index: u32) -> Option<&K> {
        self.keys.get(index as usize)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Keys in index order.
    pub fn keys(&self) -> &[K] {
        &self.keys
    }
}

/// The three key spaces of one generation.
#[derive(Debug, Clone, Default)]
pub struct KeyTables {
    pub symbols: KeySpace<String>,
    pub sectors: KeySpace<String>,
    /// Registered in ascending date order, so index order is chronological.
    pub dates: KeySpace<NaiveDate>,
}

impl KeyTables {
    /// Key space holding the entities of `kind`.
    pub fn entities(&self, kind: EntityKind) -> &KeySpace<String> {
        match kind {
            EntityKind::Instrument => &self.symbols,
            EntityKind::Sector => &self.sectors,
        }
    }

    /// Register dates in ascending order. Input may be unsorted and may
    /// repeat dates.
    pub fn register_dates(&mut self, dates: &[NaiveDate]) {
        let mut sorted = dates.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        for date in sorted {
            self.dates.register(date);
        }
    }
}

/// Half-open row range `[start, end)` in a columnar store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowRange {
    pub start: u32,
    pub end: u32,
}

impl RowRange {
    pub const EMPTY: RowRange = RowRange { start: 0, end: 0 };

    pub fn len(&self) -> usize {
        (self.end - self.start) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn contains(&self, row: u32) -> bool {
        row >= self.start && row < self.end
    }

    pub fn rows(&self) -> Range<u32> {
        self.start..self.end
    }
}

fn composite_key(entity: u32, date: u32) -> u64 {
    ((entity as u64) << 32) | date as u64
}

/// Row placement tables for one store.
#[derive(Debug, Clone, Default)]
pub struct RowIndex {
    composite: HashMap<u64, u32>,
    by_date: Vec<RowRange>,
}

impl RowIndex {
    /// Build from `(date, entity)` pairs already in row order, i.e. sorted
    /// by date then entity, with no duplicates.
    pub fn from_sorted(placements: &[(u32, u32)], date_count: usize) -> Self {
        let mut composite = HashMap::with_capacity(placements.len());
        let mut by_date = vec![RowRange::EMPTY; date_count];

        for (row, &(date, entity)) in placements.iter().enumerate() {
            let row = row as u32;
            composite.insert(composite_key(entity, date), row);
            let range = &mut by_date[date as usize];
            if range.is_empty() {
                *range = RowRange {
                    start: row,
                    end: row + 1,
                };
            } else {
                range.end = row + 1;
            }
        }

        Self { composite, by_date }
    }

    pub fn row_of(&self, entity: u32, date: u32) -> Option<u32> {
        self.composite.get(&composite_key(entity, date)).copied()
    }

    /// Rows dated `date`, or an empty range.
    pub fn rows_for_date(&self, date: u32) -> RowRange {
        self.by_date
            .get(date as usize)
            .copied()
            .unwrap_or(RowRange::EMPTY)
    }

    pub fn row_count(&self) -> usize {
        self.composite.len()
    }

    /// Number of dates the range table covers.
    pub fn date_count(&self) -> usize {
        self.by_date.len()
    }
}

/// All index tables of one generation.
#[derive(Debug, Clone)]
pub struct IndexManager {
    keys: KeyTables,
    daily: Arc<RowIndex>,
    sectors: Arc<RowIndex>,
}

impl IndexManager {
    pub fn new(keys: KeyTables, daily: Arc<RowIndex>, sectors: Arc<RowIndex>) -> Self {
        Self {
            keys,
            daily,
            sectors,
        }
    }

    pub fn keys(&self) -> &KeyTables {
        &self.keys
    }

    pub fn symbol_index(&self, symbol: &str) -> Option<u32> {
        self.keys.symbols.index_of(symbol)
    }

    pub fn symbol_of(&self, index: u32) -> Option<&str> {
        self.keys.symbols.key_of(index).map(|s| s.as_str())
    }

    pub fn sector_index(&self, sector_id: &str) -> Option<u32> {
        self.keys.sectors.index_of(sector_id)
    }

    pub fn sector_of(&self, index: u32) -> Option<&str> {
        self.keys.sectors.key_of(index).map(|s| s.as_str())
    }

    pub fn entity_index(&self, kind: EntityKind, key: &str) -> Option<u32> {
        self.keys.entities(kind).index_of(key)
    }

    pub fn entity_key(&self, kind: EntityKind, index: u32) -> Option<&str> {
        self.keys.entities(kind).key_of(index).map(|s| s.as_str())
    }

    pub fn date_index(&self, date: NaiveDate) -> Option<u32> {
        self.keys.dates.index_of(&date)
    }

    pub fn date_of(&self, index: u32) -> Option<NaiveDate> {
        self.keys.dates.key_of(index).copied()
    }

    /// Index of the latest trading date on or before `date`.
    pub fn date_index_at_or_before(&self, date: NaiveDate) -> Option<u32> {
        let dates = self.keys.dates.keys();
        let pos = dates.partition_point(|d| *d <= date);
        pos.checked_sub(1).map(|i| i as u32)
    }

    pub fn latest_date_index(&self) -> Option<u32> {
        self.keys.dates.len().checked_sub(1).map(|i| i as u32)
    }

    pub fn date_count(&self) -> usize {
        self.keys.dates.len()
    }

    fn rows(&self, kind: EntityKind) -> &RowIndex {
        match kind {
            EntityKind::Instrument => &self.daily,
            EntityKind::Sector => &self.sectors,
        }
    }

    pub fn row_of(&self, kind: EntityKind, entity: u32, date: u32) -> Option<u32> {
        self.rows(kind).row_of(entity, date)
    }

    pub fn rows_for_date(&self, kind: EntityKind, date: u32) -> RowRange {
        self.rows(kind).rows_for_date(date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn register_assigns_dense_first_seen_indices() {
        let mut space = KeySpace::default();
        assert_eq!(space.register("MSFT".to_string()), 0);
        assert_eq!(space.register("AAPL".to_string()), 1);
        assert_eq!(space.register("MSFT".to_string()), 0);
        assert_eq!(space.len(), 2);
        assert_eq!(space.index_of("AAPL"), Some(1));
        assert_eq!(space.key_of(0).map(String::as_str), Some("MSFT"));
    }

    #[test]
    fn misses_are_none() {
        let space: KeySpace<String> = KeySpace::default();
        assert_eq!(space.index_of("NOPE"), None);
        assert_eq!(space.key_of(7), None);
    }

    #[test]
    fn dates_register_chronologically() {
        let mut keys = KeyTables::default();
        keys.register_dates(&[d(5), d(3), d(4), d(3)]);
        assert_eq!(keys.dates.keys(), &[d(3), d(4), d(5)]);
    }

    #[test]
    fn row_index_ranges_and_composite() {
        // date 0: entities 0, 2; date 1: none; date 2: entity 1
        let placements = [(0, 0), (0, 2), (2, 1)];
        let idx = RowIndex::from_sorted(&placements, 3);

        assert_eq!(idx.rows_for_date(0), RowRange { start: 0, end: 2 });
        assert!(idx.rows_for_date(1).is_empty());
        assert_eq!(idx.rows_for_date(2), RowRange { start: 2, end: 3 });
        assert!(idx.rows_for_date(99).is_empty());

        assert_eq!(idx.row_of(2, 0), Some(1));
        assert_eq!(idx.row_of(1, 2), Some(2));
        assert_eq!(idx.row_of(1, 0), None);
    }

    #[test]
    fn date_at_or_before() {
        let mut keys = KeyTables::default();
        keys.register_dates(&[d(2), d(4), d(8)]);
        let im = IndexManager::new(keys, Arc::default(), Arc::default());

        assert_eq!(im.date_index_at_or_before(d(1)), None);
        assert_eq!(im.date_index_at_or_before(d(4)), Some(1));
        assert_eq!(im.date_index_at_or_before(d(7)), Some(1));
        assert_eq!(im.date_index_at_or_before(d(30)), Some(2));
        assert_eq!(im.latest_date_index(), Some(2));
    }
}
