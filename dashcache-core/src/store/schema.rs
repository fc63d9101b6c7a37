//! Fixed row schemas and the cell-level read/write views over a store buffer.
//!
//! A schema is a static list of typed columns. The store prepends two
//! implicit `u32` columns (entity index, date index) and lays every column
//! out contiguously, column-major, in one byte buffer.

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

use super::encoding;
use crate::data::SourceBatch;
use crate::domain::EntityKind;

/// Physical type of a stored column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnType {
    /// `u32` with `u32::MAX` as the null sentinel.
    Rank,
    /// `u64`, absent stored as zero.
    Count,
    Float64,
    Float32,
}

impl ColumnType {
    pub const fn width(self) -> usize {
        match self {
            ColumnType::Rank | ColumnType::Float32 => 4,
            ColumnType::Count | ColumnType::Float64 => 8,
        }
    }
}

/// One column of a row schema.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub ty: ColumnType,
}

impl ColumnSpec {
    pub const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self { name, ty }
    }
}

/// A decoded cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Null,
    Rank(u32),
    Count(u64),
    F64(f64),
    F32(f32),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

}

/// A fixed-schema row layout the columnar store is generic over.
pub trait RowSchema: Send + Sync + 'static {
    type Batch: SourceBatch;
    type Record: Clone + Send + Sync + fmt::Debug;
    type Field: Copy + Eq + fmt::Debug;

    const KIND: EntityKind;
    const COLUMNS: &'static [ColumnSpec];
    /// Position of the rank column in `COLUMNS`.
    const RANK_COLUMN: usize;

    /// Position of `field` in `COLUMNS`.
    fn column(field: Self::Field) -> usize;

    /// Raw rank as delivered by the source, before range checking.
    fn source_rank(batch: &Self::Batch, row: usize) -> Option<i64>;

    /// Write one source row. Only called for rows that passed validation.
    fn encode(batch: &Self::Batch, row: usize, out: &mut RowWriter<'_>);

    fn decode(row: &RowView<'_>, key: &str, date: NaiveDate) -> Self::Record;
}

/// Byte offsets of every column for a given row count.
#[derive(Debug, Clone)]
pub struct Layout {
    rows: usize,
    entity_offset: usize,
    date_offset: usize,
    columns: &'static [ColumnSpec],
    offsets: Vec<usize>,
    total: usize,
}

impl Layout {
    pub fn new(columns: &'static [ColumnSpec], rows: usize) -> Self {
        let entity_offset = 0;
        let date_offset = rows * 4;
        let mut cursor = date_offset + rows * 4;
        let mut offsets = Vec::with_capacity(columns.len());
        for spec in columns {
            offsets.push(cursor);
            cursor += rows * spec.ty.width();
        }
        Self {
            rows,
            entity_offset,
            date_offset,
            columns,
            offsets,
            total: cursor,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Total buffer size in bytes.
    pub fn byte_len(&self) -> usize {
        self.total
    }

    /// Bytes per row across all columns.
    pub fn row_width(&self) -> usize {
        8 + self.columns.iter().map(|c| c.ty.width()).sum::<usize>()
    }

    pub fn column_type(&self, column: usize) -> ColumnType {
        self.columns[column].ty
    }

    fn cell(&self, column: usize, row: usize) -> usize {
        self.offsets[column] + row * self.columns[column].ty.width()
    }
}

fn read4(buf: &[u8], at: usize) -> [u8; 4] {
    let mut out = [0u8; 4];
    out.copy_from_slice(&buf[at..at + 4]);
    out
}

fn read8(buf: &[u8], at: usize) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&buf[at..at + 8]);
    out
}

/// Mutable access to one row while a store is being built.
pub struct RowWriter<'a> {
    buf: &'a mut [u8],
    layout: &'a Layout,
    row: usize,
}

impl<'a> RowWriter<'a> {
    pub(crate) fn new(buf: &'a mut [u8], layout: &'a Layout, row: usize) -> Self {
        Self { buf, layout, row }
    }

    pub(crate) fn put_keys(&mut self, entity: u32, date: u32) {
        let at = self.layout.entity_offset + self.row * 4;
        self.buf[at..at + 4].copy_from_slice(&entity.to_le_bytes());
        let at = self.layout.date_offset + self.row * 4;
        self.buf[at..at + 4].copy_from_slice(&date.to_le_bytes());
    }

    pub fn put_rank(&mut self, column: usize, rank: Option<u32>) {
        debug_assert_eq!(self.layout.column_type(column), ColumnType::Rank);
        let at = self.layout.cell(column, self.row);
        self.buf[at..at + 4].copy_from_slice(&encoding::encode_rank(rank).to_le_bytes());
    }

    pub fn put_count(&mut self, column: usize, count: Option<u64>) {
        debug_assert_eq!(self.layout.column_type(column), ColumnType::Count);
        let at = self.layout.cell(column, self.row);
        self.buf[at..at + 8].copy_from_slice(&encoding::encode_count(count).to_le_bytes());
    }

    pub fn put_f64(&mut self, column: usize, value: Option<f64>) {
        debug_assert_eq!(self.layout.column_type(column), ColumnType::Float64);
        let at = self.layout.cell(column, self.row);
        self.buf[at..at + 8].copy_from_slice(&encoding::encode_f64(value).to_le_bytes());
    }

    pub fn put_f32(&mut self, column: usize, value: Option<f32>) {
        debug_assert_eq!(self.layout.column_type(column), ColumnType::Float32);
        let at = self.layout.cell(column, self.row);
        self.buf[at..at + 4].copy_from_slice(&encoding::encode_f32(value).to_le_bytes());
    }
}

/// Read access to one stored row.
#[derive(Clone, Copy)]
pub struct RowView<'a> {
    buf: &'a [u8],
    layout: &'a Layout,
    row: usize,
}

impl<'a> RowView<'a> {
    pub(crate) fn new(buf: &'a [u8], layout: &'a Layout, row: usize) -> Self {
        Self { buf, layout, row }
    }

    pub fn entity(&self) -> u32 {
        u32::from_le_bytes(read4(self.buf, self.layout.entity_offset + self.row * 4))
    }

    pub fn date(&self) -> u32 {
        u32::from_le_bytes(read4(self.buf, self.layout.date_offset + self.row * 4))
    }

    pub fn rank(&self, column: usize) -> Option<u32> {
        let raw = u32::from_le_bytes(read4(self.buf, self.layout.cell(column, self.row)));
        encoding::decode_rank(raw)
    }

    pub fn count(&self, column: usize) -> u64 {
        u64::from_le_bytes(read8(self.buf, self.layout.cell(column, self.row)))
    }

    pub fn f64(&self, column: usize) -> Option<f64> {
        let raw = f64::from_le_bytes(read8(self.buf, self.layout.cell(column, self.row)));
        encoding::decode_f64(raw)
    }

    pub fn f32(&self, column: usize) -> Option<f32> {
        let raw = f32::from_le_bytes(read4(self.buf, self.layout.cell(column, self.row)));
        encoding::decode_f32(raw)
    }

    /// Decode any column according to its declared type.
    pub fn value(&self, column: usize) -> FieldValue {
        match self.layout.column_type(column) {
            ColumnType::Rank => self.rank(column).map_or(FieldValue::Null, FieldValue::Rank),
            ColumnType::Count => FieldValue::Count(self.count(column)),
            ColumnType::Float64 => self.f64(column).map_or(FieldValue::Null, FieldValue::F64),
            ColumnType::Float32 => self.f32(column).map_or(FieldValue::Null, FieldValue::F32),
        }
    }
}
