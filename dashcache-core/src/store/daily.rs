//! Daily instrument row schema.

use chrono::NaiveDate;

use super::schema::{ColumnSpec, ColumnType, RowSchema, RowView, RowWriter};
use crate::data::DailyBatch;
use crate::domain::{DailyRecord, EntityKind, Indicators};

/// Addressable fields of a daily row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DailyField {
    Rank,
    Score,
    Open,
    High,
    Low,
    Close,
    ChangePct,
    Volume,
    Turnover,
    Volatility,
    MarketCap,
    TurnoverRate,
    VolumeRatio,
    Rsi,
    Macd,
}

impl DailyField {
    pub const ALL: [DailyField; 15] = [
        DailyField::Rank,
        DailyField::Score,
        DailyField::Open,
        DailyField::High,
        DailyField::Low,
        DailyField::Close,
        DailyField::ChangePct,
        DailyField::Volume,
        DailyField::Turnover,
        DailyField::Volatility,
        DailyField::MarketCap,
        DailyField::TurnoverRate,
        DailyField::VolumeRatio,
        DailyField::Rsi,
        DailyField::Macd,
    ];
}

/// Column order matches `DailyField` declaration order.
pub struct DailySchema;

impl RowSchema for DailySchema {
    type Batch = DailyBatch;
    type Record = DailyRecord;
    type Field = DailyField;

    const KIND: EntityKind = EntityKind::Instrument;
    const COLUMNS: &'static [ColumnSpec] = &[
        ColumnSpec::new("rank", ColumnType::Rank),
        ColumnSpec::new("score", ColumnType::Float64),
        ColumnSpec::new("open", ColumnType::Float64),
        ColumnSpec::new("high", ColumnType::Float64),
        ColumnSpec::new("low", ColumnType::Float64),
        ColumnSpec::new("close", ColumnType::Float64),
        ColumnSpec::new("change_pct", ColumnType::Float64),
        ColumnSpec::new("volume", ColumnType::Count),
        ColumnSpec::new("turnover", ColumnType::Float64),
        ColumnSpec::new("volatility", ColumnType::Float64),
        ColumnSpec::new("market_cap", ColumnType::Float64),
        ColumnSpec::new("turnover_rate", ColumnType::Float32),
        ColumnSpec::new("volume_ratio", ColumnType::Float32),
        ColumnSpec::new("rsi", ColumnType::Float32),
        ColumnSpec::new("macd", ColumnType::Float32),
    ];
    const RANK_COLUMN: usize = 0;

    fn column(field: DailyField) -> usize {
        field as usize
    }

    fn source_rank(batch: &DailyBatch, row: usize) -> Option<i64> {
        batch.rank[row]
    }

    fn encode(batch: &DailyBatch, row: usize, out: &mut RowWriter<'_>) {
        use DailyField as F;
        let col = Self::column;
        out.put_rank(
            col(F::Rank),
            batch.rank[row].and_then(super::encoding::checked_rank),
        );
        out.put_f64(col(F::Score), batch.score[row]);
        out.put_f64(col(F::Open), batch.open[row]);
        out.put_f64(col(F::High), batch.high[row]);
        out.put_f64(col(F::Low), batch.low[row]);
        out.put_f64(col(F::Close), batch.close[row]);
        out.put_f64(col(F::ChangePct), batch.change_pct[row]);
        out.put_count(col(F::Volume), batch.volume[row]);
        out.put_f64(col(F::Turnover), batch.turnover[row]);
        out.put_f64(col(F::Volatility), batch.volatility[row]);
        out.put_f64(col(F::MarketCap), batch.market_cap[row]);
        out.put_f32(col(F::TurnoverRate), batch.turnover_rate[row]);
        out.put_f32(col(F::VolumeRatio), batch.volume_ratio[row]);
        out.put_f32(col(F::Rsi), batch.rsi[row]);
        out.put_f32(col(F::Macd), batch.macd[row]);
    }

    fn decode(row: &RowView<'_>, key: &str, date: NaiveDate) -> DailyRecord {
        use DailyField as F;
        let col = Self::column;
        DailyRecord {
            symbol: key.to_string(),
            date,
            rank: row.rank(col(F::Rank)),
            score: row.f64(col(F::Score)),
            open: row.f64(col(F::Open)),
            high: row.f64(col(F::High)),
            low: row.f64(col(F::Low)),
            close: row.f64(col(F::Close)),
            change_pct: row.f64(col(F::ChangePct)),
            volume: row.count(col(F::Volume)),
            turnover: row.f64(col(F::Turnover)),
            volatility: row.f64(col(F::Volatility)),
            market_cap: row.f64(col(F::MarketCap)),
            indicators: Indicators {
                turnover_rate: row.f32(col(F::TurnoverRate)),
                volume_ratio: row.f32(col(F::VolumeRatio)),
                rsi: row.f32(col(F::Rsi)),
                macd: row.f32(col(F::Macd)),
            },
        }
    }
}
