//! Deterministic synthetic dataset for demos and benchmarks.
//!
//! Each ticker follows a seeded random walk (seed = BLAKE3 of the symbol),
//! scores are ranked per day, and sector rows are aggregated from their
//! members. Roughly one row in fifty is a suspended day: no rank, no
//! volume.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::batch::{DailyBatch, DailyRow, SectorBatch, SectorRow};
use super::universe::Universe;
use crate::domain::{Instrument, Sector};

/// Everything a [`MemorySource`](super::MemorySource) or Parquet export needs.
#[derive(Debug, Clone)]
pub struct SyntheticDataset {
    pub instruments: Vec<Instrument>,
    pub sectors: Vec<Sector>,
    pub daily: DailyBatch,
    pub sector_daily: SectorBatch,
}

struct Tick {
    close: f64,
    prev_close: f64,
    score: f64,
    volume: u64,
    suspended: bool,
    rsi: f32,
}

/// Weekdays in `[start, end]`.
pub fn trading_days(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut current = start;
    while current <= end {
        if !matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
            days.push(current);
        }
        current += Duration::days(1);
    }
    days
}

fn rng_for(key: &str) -> StdRng {
    let seed: [u8; 32] = *blake3::hash(key.as_bytes()).as_bytes();
    StdRng::from_seed(seed)
}

fn simulate(symbol: &str, days: usize) -> Vec<Tick> {
    let mut rng = rng_for(symbol);
    let mut price = rng.gen_range(20.0..400.0_f64);
    let mut ticks = Vec::with_capacity(days);

    for _ in 0..days {
        let daily_return: f64 = rng.gen_range(-0.04..0.04);
        let prev_close = price;
        price = (price * (1.0 + daily_return)).max(0.5);
        ticks.push(Tick {
            close: (price * 100.0).round() / 100.0,
            prev_close,
            score: rng.gen_range(0.0..100.0),
            volume: rng.gen_range(100_000..20_000_000u64),
            suspended: rng.gen_bool(0.02),
            rsi: rng.gen_range(10.0..90.0_f32),
        });
    }
    ticks
}

/// Generate a dataset for every ticker in `universe` over `[start, end]`.
pub fn generate(universe: &Universe, start: NaiveDate, end: NaiveDate) -> SyntheticDataset {
    let days = trading_days(start, end);
    let instruments = universe.instruments();
    let sectors = universe.sector_list();

    let series: Vec<Vec<Tick>> = instruments
        .iter()
        .map(|inst| simulate(&inst.symbol, days.len()))
        .collect();

    let mut daily = DailyBatch::with_capacity(days.len() * instruments.len());
    let mut sector_daily = SectorBatch::with_capacity(days.len() * sectors.len());

    for (d, date) in days.iter().enumerate() {
        // Rank active instruments by descending score.
        let mut order: Vec<usize> = (0..instruments.len())
            .filter(|&i| !series[i][d].suspended)
            .collect();
        order.sort_by(|&a, &b| series[b][d].score.total_cmp(&series[a][d].score));
        let mut ranks = vec![None; instruments.len()];
        for (pos, &i) in order.iter().enumerate() {
            ranks[i] = Some(pos as i64 + 1);
        }

        for (i, inst) in instruments.iter().enumerate() {
            let t = &series[i][d];
            let mut row = DailyRow::new(&inst.symbol, *date);
            if !t.suspended {
                let change = (t.close - t.prev_close) / t.prev_close * 100.0;
                row.rank = ranks[i];
                row.score = Some((t.score * 100.0).round() / 100.0);
                row.open = Some(t.prev_close);
                row.high = Some(t.close.max(t.prev_close) * 1.01);
                row.low = Some(t.close.min(t.prev_close) * 0.99);
                row.close = Some(t.close);
                row.change_pct = Some(change);
                row.volume = Some(t.volume);
                row.turnover = Some(t.volume as f64 * t.close);
                row.volatility = Some(change.abs());
                row.market_cap = Some(t.close * 1.0e9);
                row.turnover_rate = Some((t.volume as f32) / 1.0e8);
                row.volume_ratio = Some(1.0);
                row.rsi = Some(t.rsi);
                row.macd = Some((t.close - t.prev_close) as f32);
            }
            daily.push(row);
        }

        // Sector aggregates over active members.
        let mut aggregates: Vec<(usize, f64, f64, u64, usize, usize)> = Vec::new();
        for (s, sector) in sectors.iter().enumerate() {
            let (mut score, mut change, mut volume, mut up, mut active) = (0.0, 0.0, 0u64, 0, 0);
            for (i, inst) in instruments.iter().enumerate() {
                let t = &series[i][d];
                if !inst.belongs_to(&sector.id) || t.suspended {
                    continue;
                }
                active += 1;
                score += t.score;
                change += (t.close - t.prev_close) / t.prev_close * 100.0;
                volume += t.volume;
                if t.close > t.prev_close {
                    up += 1;
                }
            }
            aggregates.push((s, score, change, volume, up, active));
        }
        let mut by_score: Vec<&(usize, f64, f64, u64, usize, usize)> =
            aggregates.iter().filter(|a| a.5 > 0).collect();
        by_score.sort_by(|a, b| (b.1 / b.5 as f64).total_cmp(&(a.1 / a.5 as f64)));

        for &(s, score, change, volume, up, active) in &aggregates {
            let mut row = SectorRow::new(&sectors[s].id, *date);
            if active > 0 {
                let n = active as f64;
                row.rank = by_score
                    .iter()
                    .position(|a| a.0 == s)
                    .map(|p| p as i64 + 1);
                row.score = Some((score / n * 100.0).round() / 100.0);
                row.change_pct = Some(change / n);
                row.volume = Some(volume);
                row.heat = Some(up as f32 / active as f32);
            }
            sector_daily.push(row);
        }
    }

    SyntheticDataset {
        instruments,
        sectors,
        daily,
        sector_daily,
    }
}
