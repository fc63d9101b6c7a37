//! Columnar batches produced by a bulk fetch.
//!
//! A batch holds one `Vec` per column. Entity keys are dictionary-coded so
//! a batch of a million rows allocates one `String` per distinct symbol,
//! not one per row.

use chrono::NaiveDate;
use std::collections::HashMap;

/// Row-addressable view shared by every batch kind.
pub trait SourceBatch: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entity key (symbol or sector id) of a row.
    fn entity_key(&self, row: usize) -> &str;

    fn date(&self, row: usize) -> NaiveDate;
}

/// Dictionary-coded string column.
#[derive(Debug, Clone, Default)]
pub struct KeyColumn {
    dictionary: Vec<String>,
    lookup: HashMap<String, u32>,
    codes: Vec<u32>,
}

impl KeyColumn {
    pub fn with_capacity(rows: usize) -> Self {
        Self {
            codes: Vec::with_capacity(rows),
            ..Self::default()
        }
    }

    pub fn push(&mut self, key: &str) {
        let code = match self.lookup.get(key) {
            Some(code) => *code,
            None => {
                let code = self.dictionary.len() as u32;
                self.dictionary.push(key.to_string());
                self.lookup.insert(key.to_string(), code);
                code
            }
        };
        self.codes.push(code);
    }

    pub fn get(&self, row: usize) -> &str {
        &self.dictionary[self.codes[row] as usize]
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Number of distinct keys seen.
    pub fn distinct(&self) -> usize {
        self.dictionary.len()
    }
}

/// One daily row as handed to [`DailyBatch::push`] or read back with
/// [`DailyBatch::row`]. Rank is signed because sources may carry garbage;
/// the store rejects anything outside the valid range.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyRow<'a> {
    pub symbol: &'a str,
    pub date: NaiveDate,
    pub rank: Option<i64>,
    pub score: Option<f64>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub change_pct: Option<f64>,
    pub volume: Option<u64>,
    pub turnover: Option<f64>,
    pub volatility: Option<f64>,
    pub market_cap: Option<f64>,
    pub turnover_rate: Option<f32>,
    pub volume_ratio: Option<f32>,
    pub rsi: Option<f32>,
    pub macd: Option<f32>,
}

impl<'a> DailyRow<'a> {
    /// A row with every nullable column absent.
    pub fn new(symbol: &'a str, date: NaiveDate) -> Self {
        Self {
            symbol,
            date,
            rank: None,
            score: None,
            open: None,
            high: None,
            low: None,
            close: None,
            change_pct: None,
            volume: None,
            turnover: None,
            volatility: None,
            market_cap: None,
            turnover_rate: None,
            volume_ratio: None,
            rsi: None,
            macd: None,
        }
    }

    pub fn rank(mut self, rank: i64) -> Self {
        self.rank = Some(rank);
        self
    }

    pub fn score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn close(mut self, close: f64) -> Self {
        self.close = Some(close);
        self
    }

    pub fn volume(mut self, volume: u64) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn market_cap(mut self, market_cap: f64) -> Self {
        self.market_cap = Some(market_cap);
        self
    }
}

/// Columnar daily instrument rows.
#[derive(Debug, Clone, Default)]
pub struct DailyBatch {
    pub symbol: KeyColumn,
    pub date: Vec<NaiveDate>,
    pub rank: Vec<Option<i64>>,
    pub score: Vec<Option<f64>>,
    pub open: Vec<Option<f64>>,
    pub high: Vec<Option<f64>>,
    pub low: Vec<Option<f64>>,
    pub close: Vec<Option<f64>>,
    pub change_pct: Vec<Option<f64>>,
    pub volume: Vec<Option<u64>>,
    pub turnover: Vec<Option<f64>>,
    pub volatility: Vec<Option<f64>>,
    pub market_cap: Vec<Option<f64>>,
    pub turnover_rate: Vec<Option<f32>>,
    pub volume_ratio: Vec<Option<f32>>,
    pub rsi: Vec<Option<f32>>,
    pub macd: Vec<Option<f32>>,
}

impl DailyBatch {
    pub fn with_capacity(rows: usize) -> Self {
        Self {
            symbol: KeyColumn::with_capacity(rows),
            date: Vec::with_capacity(rows),
            rank: Vec::with_capacity(rows),
            score: Vec::with_capacity(rows),
            open: Vec::with_capacity(rows),
            high: Vec::with_capacity(rows),
            low: Vec::with_capacity(rows),
            close: Vec::with_capacity(rows),
            change_pct: Vec::with_capacity(rows),
            volume: Vec::with_capacity(rows),
            turnover: Vec::with_capacity(rows),
            volatility: Vec::with_capacity(rows),
            market_cap: Vec::with_capacity(rows),
            turnover_rate: Vec::with_capacity(rows),
            volume_ratio: Vec::with_capacity(rows),
            rsi: Vec::with_capacity(rows),
            macd: Vec::with_capacity(rows),
        }
    }

    pub fn len(&self) -> usize {
        self.date.len()
    }

    pub fn is_empty(&self) -> bool {
        self.date.is_empty()
    }

    pub fn push(&mut self, row: DailyRow<'_>) {
        self.symbol.push(row.symbol);
        self.date.push(row.date);
        self.rank.push(row.rank);
        self.score.push(row.score);
        self.open.push(row.open);
        self.high.push(row.high);
        self.low.push(row.low);
        self.close.push(row.close);
        self.change_pct.push(row.change_pct);
        self.volume.push(row.volume);
        self.turnover.push(row.turnover);
        self.volatility.push(row.volatility);
        self.market_cap.push(row.market_cap);
        self.turnover_rate.push(row.turnover_rate);
        self.volume_ratio.push(row.volume_ratio);
        self.rsi.push(row.rsi);
        self.macd.push(row.macd);
    }

    pub fn row(&self, i: usize) -> DailyRow<'_> {
        DailyRow {
            symbol: self.symbol.get(i),
            date: self.date[i],
            rank: self.rank[i],
            score: self.score[i],
            open: self.open[i],
            high: self.high[i],
            low: self.low[i],
            close: self.close[i],
            change_pct: self.change_pct[i],
            volume: self.volume[i],
            turnover: self.turnover[i],
            volatility: self.volatility[i],
            market_cap: self.market_cap[i],
            turnover_rate: self.turnover_rate[i],
            volume_ratio: self.volume_ratio[i],
            rsi: self.rsi[i],
            macd: self.macd[i],
        }
    }

    /// Keep only rows dated on or after `since`.
    pub fn retain_since(&self, since: NaiveDate) -> Self {
        let mut out = Self::with_capacity(self.len());
        for i in 0..self.len() {
            if self.date[i] >= since {
                out.push(self.row(i));
            }
        }
        out
    }
}

impl SourceBatch for DailyBatch {
    fn len(&self) -> usize {
        self.date.len()
    }

    fn entity_key(&self, row: usize) -> &str {
        self.symbol.get(row)
    }

    fn date(&self, row: usize) -> NaiveDate {
        self.date[row]
    }
}

/// One sector row.
#[derive(Debug, Clone, PartialEq)]
pub struct SectorRow<'a> {
    pub sector_id: &'a str,
    pub date: NaiveDate,
    pub rank: Option<i64>,
    pub score: Option<f64>,
    pub change_pct: Option<f64>,
    pub volume: Option<u64>,
    pub turnover: Option<f64>,
    pub heat: Option<f32>,
}

impl<'a> SectorRow<'a> {
    pub fn new(sector_id: &'a str, date: NaiveDate) -> Self {
        Self {
            sector_id,
            date,
            rank: None,
            score: None,
            change_pct: None,
            volume: None,
            turnover: None,
            heat: None,
        }
    }

    pub fn rank(mut self, rank: i64) -> Self {
        self.rank = Some(rank);
        self
    }

    pub fn heat(mut self, heat: f32) -> Self {
        self.heat = Some(heat);
        self
    }
}

/// Columnar daily sector rows.
#[derive(Debug, Clone, Default)]
pub struct SectorBatch {
    pub sector_id: KeyColumn,
    pub date: Vec<NaiveDate>,
    pub rank: Vec<Option<i64>>,
    pub score: Vec<Option<f64>>,
    pub change_pct: Vec<Option<f64>>,
    pub volume: Vec<Option<u64>>,
    pub turnover: Vec<Option<f64>>,
    pub heat: Vec<Option<f32>>,
}

impl SectorBatch {
    pub fn with_capacity(rows: usize) -> Self {
        Self {
            sector_id: KeyColumn::with_capacity(rows),
            date: Vec::with_capacity(rows),
            rank: Vec::with_capacity(rows),
            score: Vec::with_capacity(rows),
            change_pct: Vec::with_capacity(rows),
            volume: Vec::with_capacity(rows),
            turnover: Vec::with_capacity(rows),
            heat: Vec::with_capacity(rows),
        }
    }

    pub fn len(&self) -> usize {
        self.date.len()
    }

    pub fn is_empty(&self) -> bool {
        self.date.is_empty()
    }

    pub fn push(&mut self, row: SectorRow<'_>) {
        self.sector_id.push(row.sector_id);
        self.date.push(row.date);
        self.rank.push(row.rank);
        self.score.push(row.score);
        self.change_pct.push(row.change_pct);
        self.volume.push(row.volume);
        self.turnover.push(row.turnover);
        self.heat.push(row.heat);
    }

    pub fn row(&self, i: usize) -> SectorRow<'_> {
        SectorRow {
            sector_id: self.sector_id.get(i),
            date: self.date[i],
            rank: self.rank[i],
            score: self.score[i],
            change_pct: self.change_pct[i],
            volume: self.volume[i],
            turnover: self.turnover[i],
            heat: self.heat[i],
        }
    }

    pub fn retain_since(&self, since: NaiveDate) -> Self {
        let mut out = Self::with_capacity(self.len());
        for i in 0..self.len() {
            if self.date[i] >= since {
                out.push(self.row(i));
            }
        }
        out
    }
}

impl SourceBatch for SectorBatch {
    fn len(&self) -> usize {
        self.date.len()
    }

    fn entity_key(&self, row: usize) -> &str {
        self.sector_id.get(row)
    }

    fn date(&self, row: usize) -> NaiveDate {
        self.date[row]
    }
}
