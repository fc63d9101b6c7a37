//! Daily sector row schema.

use chrono::NaiveDate;

use super::encoding::checked_rank;
use super::schema::{ColumnSpec, ColumnType, RowSchema, RowView, RowWriter};
use crate::data::SectorBatch;
use crate::domain::{EntityKind, SectorRecord};

/// Addressable fields of a sector row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectorField {
    Rank,
    Score,
    ChangePct,
    Volume,
    Turnover,
    Heat,
}

impl SectorField {
    pub const ALL: [SectorField; 6] = [
        SectorField::Rank,
        SectorField::Score,
        SectorField::ChangePct,
        SectorField::Volume,
        SectorField::Turnover,
        SectorField::Heat,
    ];
}

/// Column order matches `SectorField` declaration order.
pub struct SectorSchema;

impl RowSchema for SectorSchema {
    type Batch = SectorBatch;
    type Record = SectorRecord;
    type Field = SectorField;

    const KIND: EntityKind = EntityKind::Sector;
    const COLUMNS: &'static [ColumnSpec] = &[
        ColumnSpec::new("rank", ColumnType::Rank),
        ColumnSpec::new("score", ColumnType::Float64),
        ColumnSpec::new("change_pct", ColumnType::Float64),
        ColumnSpec::new("volume", ColumnType::Count),
        ColumnSpec::new("turnover", ColumnType::Float64),
        ColumnSpec::new("heat", ColumnType::Float32),
    ];
    const RANK_COLUMN: usize = 0;

    fn column(field: SectorField) -> usize {
        field as usize
    }

    fn source_rank(batch: &SectorBatch, row: usize) -> Option<i64> {
        batch.rank[row]
    }

    fn encode(batch: &SectorBatch, row: usize, out: &mut RowWriter<'_>) {
        use SectorField as F;
        let col = Self::column;
        out.put_rank(col(F::Rank), batch.rank[row].and_then(checked_rank));
        out.put_f64(col(F::Score), batch.score[row]);
        out.put_f64(col(F::ChangePct), batch.change_pct[row]);
        out.put_count(col(F::Volume), batch.volume[row]);
        out.put_f64(col(F::Turnover), batch.turnover[row]);
        out.put_f32(col(F::Heat), batch.heat[row]);
    }

    fn decode(row: &RowView<'_>, key: &str, date: NaiveDate) -> SectorRecord {
        use SectorField as F;
        let col = Self::column;
        SectorRecord {
            sector_id: key.to_string(),
            date,
            rank: row.rank(col(F::Rank)),
            score: row.f64(col(F::Score)),
            change_pct: row.f64(col(F::ChangePct)),
            volume: row.count(col(F::Volume)),
            turnover: row.f64(col(F::Turnover)),
            heat: row.f32(col(F::Heat)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_order_matches_columns() {
        assert_eq!(SectorField::ALL.len(), SectorSchema::COLUMNS.len());
        for (i, field) in SectorField::ALL.iter().enumerate() {
            assert_eq!(SectorSchema::column(*field), i);
        }
        assert_eq!(SectorSchema::COLUMNS[SectorSchema::RANK_COLUMN].name, "rank");
        assert_eq!(SectorSchema::COLUMNS[SectorSchema::column(SectorField::Heat)].name, "heat");
    }

    #[test]
    fn heat_is_reduced_precision() {
        assert_eq!(
            SectorSchema::COLUMNS[SectorSchema::column(SectorField::Heat)].ty,
            ColumnType::Float32
        );
        assert_eq!(
            SectorSchema::COLUMNS[SectorSchema::column(SectorField::Volume)].ty,
            ColumnType::Count
        );
    }
}
