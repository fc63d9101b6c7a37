//! Columnar store: one contiguous byte buffer per build, rows sorted by
//! date index then entity index.

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use super::encoding::checked_rank;
use super::schema::{FieldValue, Layout, RowSchema, RowView, RowWriter};
use crate::data::SourceBatch;
use crate::domain::EntityKind;
use crate::index::{KeyTables, RowIndex, RowRange};

/// Number of rejected rows kept verbatim in a report.
const SAMPLE_LIMIT: usize = 16;

/// Why a source row was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "fault", content = "value", rename_all = "snake_case")]
pub enum RowFault {
    UnknownEntity,
    UnknownDate,
    RankOutOfRange(i64),
    Duplicate,
}

impl fmt::Display for RowFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowFault::UnknownEntity => write!(f, "unregistered entity key"),
            RowFault::UnknownDate => write!(f, "date outside the retained window"),
            RowFault::RankOutOfRange(r) => write!(f, "rank {r} not representable"),
            RowFault::Duplicate => write!(f, "duplicate (entity, date) pair"),
        }
    }
}

/// A rejected source row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MalformedRow {
    pub kind: EntityKind,
    /// Position in the source batch.
    pub source_row: usize,
    pub key: String,
    pub date: NaiveDate,
    pub fault: RowFault,
}

/// Aggregated rejections from one or more builds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MalformedReport {
    pub rows_seen: usize,
    pub unknown_entity: usize,
    pub unknown_date: usize,
    pub rank_out_of_range: usize,
    pub duplicate: usize,
    /// The first few rejected rows.
    pub samples: Vec<MalformedRow>,
}

impl MalformedReport {
    pub fn rejected(&self) -> usize {
        self.unknown_entity + self.unknown_date + self.rank_out_of_range + self.duplicate
    }

    pub fn is_empty(&self) -> bool {
        self.rejected() == 0
    }

    fn record(&mut self, row: MalformedRow) {
        match row.fault {
            RowFault::UnknownEntity => self.unknown_entity += 1,
            RowFault::UnknownDate => self.unknown_date += 1,
            RowFault::RankOutOfRange(_) => self.rank_out_of_range += 1,
            RowFault::Duplicate => self.duplicate += 1,
        }
        if self.samples.len() < SAMPLE_LIMIT {
            self.samples.push(row);
        }
    }

    pub fn merge(&mut self, other: MalformedReport) {
        self.rows_seen += other.rows_seen;
        self.unknown_entity += other.unknown_entity;
        self.unknown_date += other.unknown_date;
        self.rank_out_of_range += other.rank_out_of_range;
        self.duplicate += other.duplicate;
        let room = SAMPLE_LIMIT.saturating_sub(self.samples.len());
        self.samples.extend(other.samples.into_iter().take(room));
    }
}

impl fmt::Display for MalformedReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} rows rejected (unknown entity {}, unknown date {}, bad rank {}, duplicate {})",
            self.rejected(),
            self.rows_seen,
            self.unknown_entity,
            self.unknown_date,
            self.rank_out_of_range,
            self.duplicate
        )
    }
}

/// Fixed-schema rows addressed by integer indices.
pub struct ColumnarStore<S: RowSchema> {
    buffer: Vec<u8>,
    layout: Layout,
    index: Arc<RowIndex>,
    _schema: PhantomData<fn() -> S>,
}

impl<S: RowSchema> fmt::Debug for ColumnarStore<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnarStore")
            .field("kind", &S::KIND)
            .field("rows", &self.layout.rows())
            .field("bytes", &self.buffer.len())
            .finish()
    }
}

impl<S: RowSchema> ColumnarStore<S> {
    /// Build a store from a source batch against registered keys.
    ///
    /// Rows with unregistered keys, unrepresentable ranks, or an (entity,
    /// date) pair already seen earlier in the batch are left out and
    /// reported.
    pub fn build(batch: &S::Batch, keys: &KeyTables) -> (Self, MalformedReport) {
        let entities = keys.entities(S::KIND);
        let mut report = MalformedReport {
            rows_seen: batch.len(),
            ..MalformedReport::default()
        };
        let reject = |report: &mut MalformedReport, row: usize, fault: RowFault| {
            report.record(MalformedRow {
                kind: S::KIND,
                source_row: row,
                key: batch.entity_key(row).to_string(),
                date: batch.date(row),
                fault,
            });
        };

        // (date index, entity index, source row)
        let mut placements: Vec<(u32, u32, usize)> = Vec::with_capacity(batch.len());
        for row in 0..batch.len() {
            let Some(entity) = entities.index_of(batch.entity_key(row)) else {
                reject(&mut report, row, RowFault::UnknownEntity);
                continue;
            };
            let Some(date) = keys.dates.index_of(&batch.date(row)) else {
                reject(&mut report, row, RowFault::UnknownDate);
                continue;
            };
            if let Some(rank) = S::source_rank(batch, row) {
                if checked_rank(rank).is_none() {
                    reject(&mut report, row, RowFault::RankOutOfRange(rank));
                    continue;
                }
            }
            placements.push((date, entity, row));
        }

        // Stable sort keeps the earliest source row first within a pair.
        placements.sort_by_key(|&(date, entity, _)| (date, entity));
        placements.dedup_by(|later, earlier| {
            let dup = later.0 == earlier.0 && later.1 == earlier.1;
            if dup {
                reject(&mut report, later.2, RowFault::Duplicate);
            }
            dup
        });

        let layout = Layout::new(S::COLUMNS, placements.len());
        let mut buffer = vec![0u8; layout.byte_len()];
        for (row, &(date, entity, source_row)) in placements.iter().enumerate() {
            let mut writer = RowWriter::new(&mut buffer, &layout, row);
            writer.put_keys(entity, date);
            S::encode(batch, source_row, &mut writer);
        }

        let pairs: Vec<(u32, u32)> = placements.iter().map(|&(d, e, _)| (d, e)).collect();
        let index = RowIndex::from_sorted(&pairs, keys.dates.len());

        let store = Self {
            buffer,
            layout,
            index: Arc::new(index),
            _schema: PhantomData,
        };
        (store, report)
    }

    pub fn len(&self) -> usize {
        self.layout.rows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the row buffer in bytes.
    pub fn byte_size(&self) -> usize {
        self.buffer.len()
    }

    /// Placement tables, shared with the index manager.
    pub fn row_index(&self) -> Arc<RowIndex> {
        Arc::clone(&self.index)
    }

    pub fn view(&self, row: u32) -> Option<RowView<'_>> {
        ((row as usize) < self.len()).then(|| RowView::new(&self.buffer, &self.layout, row as usize))
    }

    /// One cell. `None` if the row offset is out of range, `FieldValue::Null`
    /// if the cell holds a null sentinel.
    pub fn get(&self, row: u32, field: S::Field) -> Option<FieldValue> {
        self.view(row).map(|v| v.value(S::column(field)))
    }

    pub fn rows_for_date(&self, date: u32) -> RowRange {
        self.index.rows_for_date(date)
    }

    pub fn row_of(&self, entity: u32, date: u32) -> Option<u32> {
        self.index.row_of(entity, date)
    }

    /// Up to `n` rows on `date` with the smallest ranks, ascending, ties
    /// broken by entity index. Unranked rows are excluded.
    pub fn top_n_by_rank(&self, date: u32, n: usize) -> Vec<u32> {
        let mut ranked: Vec<(u32, u32, u32)> = self
            .rows_for_date(date)
            .rows()
            .filter_map(|row| {
                let view = RowView::new(&self.buffer, &self.layout, row as usize);
                view.rank(S::RANK_COLUMN)
                    .map(|rank| (rank, view.entity(), row))
            })
            .collect();

        if n == 0 {
            return Vec::new();
        }
        if n < ranked.len() {
            ranked.select_nth_unstable(n - 1);
            ranked.truncate(n);
        }
        ranked.sort_unstable();
        ranked.into_iter().map(|(_, _, row)| row).collect()
    }

    /// Reverse-chronological rows of `entity`, walking back from
    /// `end_date` (inclusive). Dates without a row for the entity are
    /// skipped; at most `max_days` rows are returned.
    pub fn history(&self, entity: u32, max_days: usize, end_date: u32) -> Vec<u32> {
        let date_count = self.index.date_count();
        if date_count == 0 || max_days == 0 {
            return Vec::new();
        }
        let end = (end_date as usize).min(date_count - 1);

        let mut rows = Vec::with_capacity(max_days.min(end + 1));
        for date in (0..=end as u32).rev() {
            if let Some(row) = self.index.row_of(entity, date) {
                rows.push(row);
                if rows.len() == max_days {
                    break;
                }
            }
        }
        rows
    }

    /// Copy a row out as a value record.
    pub fn decode(&self, row: u32, keys: &KeyTables) -> Option<S::Record> {
        let view = self.view(row)?;
        let key = keys.entities(S::KIND).key_of(view.entity())?;
        let date = keys.dates.key_of(view.date())?;
        Some(S::decode(&view, key, *date))
    }

    pub fn decode_all(&self, rows: impl IntoIterator<Item = u32>, keys: &KeyTables) -> Vec<S::Record> {
        rows.into_iter()
            .filter_map(|row| self.decode(row, keys))
            .collect()
    }
}
