//! Parquet-backed source of record.
//!
//! Layout: one directory holding four tables.
//!
//! - `instruments.parquet`: `symbol`, `name`, `sector_id` (nullable)
//! - `sectors.parquet`: `sector_id`, `name` (optional file)
//! - `daily.parquet`: `symbol`, `date`, then nullable value columns
//! - `sector_daily.parquet`: `sector_id`, `date`, nullable value columns (optional file)
//!
//! Reads are lazy scans with the date filter pushed down, then one pass
//! per column into the batch vectors. Value columns missing from a file
//! read as all-null.

use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::batch::{DailyBatch, KeyColumn, SectorBatch};
use super::source::{RecordSource, SourceError};
use super::synthetic::SyntheticDataset;
use crate::domain::{Instrument, Sector};

/// Days between 0001-01-01 (CE day 1) and 1970-01-01.
const UNIX_EPOCH_CE_DAYS: i32 = 719_163;

pub const INSTRUMENTS_FILE: &str = "instruments.parquet";
pub const SECTORS_FILE: &str = "sectors.parquet";
pub const DAILY_FILE: &str = "daily.parquet";
pub const SECTOR_DAILY_FILE: &str = "sector_daily.parquet";

/// A [`RecordSource`] reading a directory of Parquet tables.
pub struct ParquetSource {
    dir: PathBuf,
}

impl ParquetSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn table(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    fn scan(&self, file: &str) -> Result<LazyFrame, SourceError> {
        let path = self.table(file);
        if !path.exists() {
            return Err(SourceError::Unreachable(format!(
                "missing table {}",
                path.display()
            )));
        }
        LazyFrame::scan_parquet(&path, Default::default())
            .map_err(|e| SourceError::Parquet(format!("scan {file}: {e}")))
    }

    fn scan_since(&self, file: &str, since: NaiveDate) -> Result<DataFrame, SourceError> {
        self.scan(file)?
            .filter(col("date").cast(DataType::Int32).gt_eq(lit(to_epoch_days(since))))
            .collect()
            .map_err(|e| SourceError::Parquet(format!("collect {file}: {e}")))
    }

    /// Write a dataset as the four tables. Writes are atomic per table:
    /// write to `.tmp`, then rename into place.
    pub fn write_dataset(&self, dataset: &SyntheticDataset) -> Result<(), SourceError> {
        fs::create_dir_all(&self.dir)?;

        let mut instruments = instruments_frame(&dataset.instruments)?;
        write_atomic(&mut instruments, &self.table(INSTRUMENTS_FILE))?;

        let mut sectors = sectors_frame(&dataset.sectors)?;
        write_atomic(&mut sectors, &self.table(SECTORS_FILE))?;

        let mut daily = daily_frame(&dataset.daily)?;
        write_atomic(&mut daily, &self.table(DAILY_FILE))?;

        let mut sector_daily = sector_daily_frame(&dataset.sector_daily)?;
        write_atomic(&mut sector_daily, &self.table(SECTOR_DAILY_FILE))?;

        debug!(
            dir = %self.dir.display(),
            daily_rows = dataset.daily.len(),
            sector_rows = dataset.sector_daily.len(),
            "wrote parquet dataset"
        );
        Ok(())
    }
}

impl RecordSource for ParquetSource {
    fn name(&self) -> &str {
        "parquet"
    }

    fn fetch_instruments(&self) -> Result<Vec<Instrument>, SourceError> {
        let df = self
            .scan(INSTRUMENTS_FILE)?
            .collect()
            .map_err(|e| SourceError::Parquet(format!("collect {INSTRUMENTS_FILE}: {e}")))?;

        let symbols = required_str(&df, INSTRUMENTS_FILE, "symbol")?;
        let names = optional_str(&df, INSTRUMENTS_FILE, "name")?;
        let sectors = optional_str(&df, INSTRUMENTS_FILE, "sector_id")?;

        let mut out = Vec::with_capacity(symbols.len());
        for i in 0..symbols.len() {
            let Some(symbol) = symbols[i].clone() else {
                return Err(schema_error(INSTRUMENTS_FILE, format!("null symbol at row {i}")));
            };
            out.push(Instrument {
                name: names[i].clone().unwrap_or_else(|| symbol.clone()),
                sector_id: sectors[i].clone(),
                symbol,
            });
        }
        Ok(out)
    }

    fn fetch_sectors(&self) -> Result<Vec<Sector>, SourceError> {
        if !self.table(SECTORS_FILE).exists() {
            return Ok(Vec::new());
        }
        let df = self
            .scan(SECTORS_FILE)?
            .collect()
            .map_err(|e| SourceError::Parquet(format!("collect {SECTORS_FILE}: {e}")))?;

        let ids = required_str(&df, SECTORS_FILE, "sector_id")?;
        let names = optional_str(&df, SECTORS_FILE, "name")?;

        ids.into_iter()
            .zip(names)
            .enumerate()
            .map(|(i, (id, name))| {
                let id = id
                    .ok_or_else(|| schema_error(SECTORS_FILE, format!("null sector_id at row {i}")))?;
                Ok(Sector {
                    name: name.unwrap_or_else(|| id.clone()),
                    id,
                })
            })
            .collect()
    }

    fn fetch_trading_dates(&self, limit: usize) -> Result<Vec<NaiveDate>, SourceError> {
        let df = self
            .scan(DAILY_FILE)?
            .select([col("date")])
            .collect()
            .map_err(|e| SourceError::Parquet(format!("collect {DAILY_FILE}: {e}")))?;

        let distinct: BTreeSet<NaiveDate> = dates(&df, DAILY_FILE)?.into_iter().collect();
        Ok(distinct.into_iter().rev().take(limit).collect())
    }

    fn fetch_daily(&self, since: NaiveDate) -> Result<DailyBatch, SourceError> {
        let df = self.scan_since(DAILY_FILE, since)?;
        let t = DAILY_FILE;
        let n = df.height();

        Ok(DailyBatch {
            symbol: key_column(&df, t, "symbol")?,
            date: dates(&df, t)?,
            rank: optional_i64(&df, t, "rank", n)?,
            score: optional_f64(&df, t, "score", n)?,
            open: optional_f64(&df, t, "open", n)?,
            high: optional_f64(&df, t, "high", n)?,
            low: optional_f64(&df, t, "low", n)?,
            close: optional_f64(&df, t, "close", n)?,
            change_pct: optional_f64(&df, t, "change_pct", n)?,
            volume: optional_u64(&df, t, "volume", n)?,
            turnover: optional_f64(&df, t, "turnover", n)?,
            volatility: optional_f64(&df, t, "volatility", n)?,
            market_cap: optional_f64(&df, t, "market_cap", n)?,
            turnover_rate: optional_f32(&df, t, "turnover_rate", n)?,
            volume_ratio: optional_f32(&df, t, "volume_ratio", n)?,
            rsi: optional_f32(&df, t, "rsi", n)?,
            macd: optional_f32(&df, t, "macd", n)?,
        })
    }

    fn fetch_sector_daily(&self, since: NaiveDate) -> Result<SectorBatch, SourceError> {
        if !self.table(SECTOR_DAILY_FILE).exists() {
            return Ok(SectorBatch::default());
        }
        let df = self.scan_since(SECTOR_DAILY_FILE, since)?;
        let t = SECTOR_DAILY_FILE;
        let n = df.height();

        Ok(SectorBatch {
            sector_id: key_column(&df, t, "sector_id")?,
            date: dates(&df, t)?,
            rank: optional_i64(&df, t, "rank", n)?,
            score: optional_f64(&df, t, "score", n)?,
            change_pct: optional_f64(&df, t, "change_pct", n)?,
            volume: optional_u64(&df, t, "volume", n)?,
            turnover: optional_f64(&df, t, "turnover", n)?,
            heat: optional_f32(&df, t, "heat", n)?,
        })
    }
}

// ── Column readers ──────────────────────────────────────────────────

fn schema_error(table: &str, detail: impl Into<String>) -> SourceError {
    SourceError::Schema {
        table: table.to_string(),
        detail: detail.into(),
    }
}

pub(crate) fn to_epoch_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_CE_DAYS
}

pub(crate) fn from_epoch_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_CE_DAYS)
}

fn cast_column(df: &DataFrame, table: &str, name: &str, dtype: DataType) -> Result<Option<Column>, SourceError> {
    match df.column(name) {
        Ok(col) => col
            .cast(&dtype)
            .map(Some)
            .map_err(|e| schema_error(table, format!("column '{name}': {e}"))),
        Err(_) => Ok(None),
    }
}

fn required_str(df: &DataFrame, table: &str, name: &str) -> Result<Vec<Option<String>>, SourceError> {
    let col = cast_column(df, table, name, DataType::String)?
        .ok_or_else(|| schema_error(table, format!("missing column '{name}'")))?;
    let ca = col
        .str()
        .map_err(|e| schema_error(table, format!("column '{name}': {e}")))?;
    Ok(ca.into_iter().map(|v| v.map(String::from)).collect())
}

fn optional_str(df: &DataFrame, table: &str, name: &str) -> Result<Vec<Option<String>>, SourceError> {
    if df.column(name).is_err() {
        return Ok(vec![None; df.height()]);
    }
    required_str(df, table, name)
}

fn key_column(df: &DataFrame, table: &str, name: &str) -> Result<KeyColumn, SourceError> {
    let col = cast_column(df, table, name, DataType::String)?
        .ok_or_else(|| schema_error(table, format!("missing column '{name}'")))?;
    let ca = col
        .str()
        .map_err(|e| schema_error(table, format!("column '{name}': {e}")))?;

    let mut keys = KeyColumn::with_capacity(df.height());
    for (i, key) in ca.into_iter().enumerate() {
        let key = key.ok_or_else(|| schema_error(table, format!("null {name} at row {i}")))?;
        keys.push(key);
    }
    Ok(keys)
}

fn dates(df: &DataFrame, table: &str) -> Result<Vec<NaiveDate>, SourceError> {
    let col = cast_column(df, table, "date", DataType::Int32)?
        .ok_or_else(|| schema_error(table, "missing column 'date'"))?;
    let ca = col
        .i32()
        .map_err(|e| schema_error(table, format!("column 'date': {e}")))?;

    ca.into_iter()
        .enumerate()
        .map(|(i, days)| {
            days.and_then(from_epoch_days)
                .ok_or_else(|| schema_error(table, format!("null or invalid date at row {i}")))
        })
        .collect()
}

macro_rules! optional_numeric {
    ($fn_name:ident, $ty:ty, $dtype:expr, $accessor:ident) => {
        fn $fn_name(
            df: &DataFrame,
            table: &str,
            name: &str,
            rows: usize,
        ) -> Result<Vec<Option<$ty>>, SourceError> {
            let Some(col) = cast_column(df, table, name, $dtype)? else {
                return Ok(vec![None; rows]);
            };
            let ca = col
                .$accessor()
                .map_err(|e| schema_error(table, format!("column '{name}': {e}")))?;
            Ok(ca.into_iter().collect())
        }
    };
}

optional_numeric!(optional_f64, f64, DataType::Float64, f64);
optional_numeric!(optional_f32, f32, DataType::Float32, f32);
optional_numeric!(optional_i64, i64, DataType::Int64, i64);
optional_numeric!(optional_u64, u64, DataType::UInt64, u64);

// ── Frame writers ───────────────────────────────────────────────────

fn frame_error(e: PolarsError) -> SourceError {
    SourceError::Parquet(format!("dataframe creation: {e}"))
}

fn date_column(values: &[NaiveDate]) -> Result<Column, SourceError> {
    let days: Vec<i32> = values.iter().map(|d| to_epoch_days(*d)).collect();
    Column::new("date".into(), days)
        .cast(&DataType::Date)
        .map_err(|e| SourceError::Parquet(format!("date cast: {e}")))
}

fn keys(column: &KeyColumn) -> Vec<&str> {
    (0..column.len()).map(|i| column.get(i)).collect()
}

fn instruments_frame(instruments: &[Instrument]) -> Result<DataFrame, SourceError> {
    let symbols: Vec<&str> = instruments.iter().map(|i| i.symbol.as_str()).collect();
    let names: Vec<&str> = instruments.iter().map(|i| i.name.as_str()).collect();
    let sectors: Vec<Option<&str>> = instruments.iter().map(|i| i.sector_id.as_deref()).collect();
    DataFrame::new(vec![
        Column::new("symbol".into(), symbols),
        Column::new("name".into(), names),
        Column::new("sector_id".into(), sectors),
    ])
    .map_err(frame_error)
}

fn sectors_frame(sectors: &[Sector]) -> Result<DataFrame, SourceError> {
    let ids: Vec<&str> = sectors.iter().map(|s| s.id.as_str()).collect();
    let names: Vec<&str> = sectors.iter().map(|s| s.name.as_str()).collect();
    DataFrame::new(vec![
        Column::new("sector_id".into(), ids),
        Column::new("name".into(), names),
    ])
    .map_err(frame_error)
}

fn daily_frame(batch: &DailyBatch) -> Result<DataFrame, SourceError> {
    DataFrame::new(vec![
        Column::new("symbol".into(), keys(&batch.symbol)),
        date_column(&batch.date)?,
        Column::new("rank".into(), batch.rank.clone()),
        Column::new("score".into(), batch.score.clone()),
        Column::new("open".into(), batch.open.clone()),
        Column::new("high".into(), batch.high.clone()),
        Column::new("low".into(), batch.low.clone()),
        Column::new("close".into(), batch.close.clone()),
        Column::new("change_pct".into(), batch.change_pct.clone()),
        Column::new("volume".into(), batch.volume.clone()),
        Column::new("turnover".into(), batch.turnover.clone()),
        Column::new("volatility".into(), batch.volatility.clone()),
        Column::new("market_cap".into(), batch.market_cap.clone()),
        Column::new("turnover_rate".into(), batch.turnover_rate.clone()),
        Column::new("volume_ratio".into(), batch.volume_ratio.clone()),
        Column::new("rsi".into(), batch.rsi.clone()),
        Column::new("macd".into(), batch.macd.clone()),
    ])
    .map_err(frame_error)
}

fn sector_daily_frame(batch: &SectorBatch) -> Result<DataFrame, SourceError> {
    DataFrame::new(vec![
        Column::new("sector_id".into(), keys(&batch.sector_id)),
        date_column(&batch.date)?,
        Column::new("rank".into(), batch.rank.clone()),
        Column::new("score".into(), batch.score.clone()),
        Column::new("change_pct".into(), batch.change_pct.clone()),
        Column::new("volume".into(), batch.volume.clone()),
        Column::new("turnover".into(), batch.turnover.clone()),
        Column::new("heat".into(), batch.heat.clone()),
    ])
    .map_err(frame_error)
}

fn write_atomic(df: &mut DataFrame, path: &Path) -> Result<(), SourceError> {
    let tmp_path = path.with_extension("parquet.tmp");
    let file = fs::File::create(&tmp_path)?;
    ParquetWriter::new(file)
        .finish(df)
        .map_err(|e| SourceError::Parquet(format!("write parquet: {e}")))?;

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        SourceError::Io(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_days_roundtrip() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(from_epoch_days(to_epoch_days(date)), Some(date));
        assert_eq!(to_epoch_days(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()), 0);
    }

    #[test]
    fn missing_directory_is_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let source = ParquetSource::new(dir.path().join("nope"));
        assert!(matches!(
            source.fetch_instruments(),
            Err(SourceError::Unreachable(_))
        ));
    }
}
