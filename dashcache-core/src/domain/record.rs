//! Plain value records returned by every read.
//!
//! Records are copied out of the columnar buffer; nothing here borrows
//! from store internals. Nullable columns are `Option`s, volume is the one
//! exception (absent volume is zero).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Which key space a row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Instrument,
    Sector,
}

/// Secondary indicator block. Stored at reduced (32-bit) precision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Indicators {
    pub turnover_rate: Option<f32>,
    pub volume_ratio: Option<f32>,
    pub rsi: Option<f32>,
    pub macd: Option<f32>,
}

/// One instrument on one trading date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub symbol: String,
    pub date: NaiveDate,
    pub rank: Option<u32>,
    pub score: Option<f64>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub change_pct: Option<f64>,
    pub volume: u64,
    pub turnover: Option<f64>,
    pub volatility: Option<f64>,
    pub market_cap: Option<f64>,
    pub indicators: Indicators,
}

impl DailyRecord {
    /// True if the row carries a rank for its date.
    pub fn is_ranked(&self) -> bool {
        self.rank.is_some()
    }
}

/// One sector on one trading date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorRecord {
    pub sector_id: String,
    pub date: NaiveDate,
    pub rank: Option<u32>,
    pub score: Option<f64>,
    pub change_pct: Option<f64>,
    pub volume: u64,
    pub turnover: Option<f64>,
    pub heat: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_serialization_roundtrip() {
        let rec = SectorRecord {
            sector_id: "tech".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            rank: Some(1),
            score: Some(87.25),
            change_pct: None,
            volume: 0,
            turnover: Some(1.5e9),
            heat: Some(0.75),
        };
        let json = serde_json::to_string(&rec).unwrap();
        let back: SectorRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(rec, back);
    }
}
