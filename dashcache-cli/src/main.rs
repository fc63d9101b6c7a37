//! DashCache CLI: seed, load and query a market-data cache.
//!
//! Commands:
//! - `seed`: write a synthetic dataset as Parquet tables
//! - `load`: load the dataset and print the reload summary
//! - `top`: top-ranked instruments for a date
//! - `history`: recent history for one instrument or sector
//! - `sectors`: sector heat ranking for a date
//! - `overview`: market breadth and leaders for a date
//! - `stats`: load, run the dashboard queries twice and print cache counters
//!
//! Query commands print JSON on stdout; logs go to stderr.

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use dashcache_core::data::{synthetic, ParquetSource, Universe};
use dashcache_service::{DashboardService, PendingQuery, QueryResult, ServiceConfig};

#[derive(Parser)]
#[command(name = "dashcache", about = "DashCache CLI: market-data cache for dashboards")]
struct Cli {
    /// Service configuration (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Parquet data directory. Overrides `source.dir` from the config.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a synthetic dataset and write it as Parquet.
    Seed {
        /// First calendar date (YYYY-MM-DD). Defaults to 180 days ago.
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Last calendar date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Universe TOML. Defaults to the built-in US universe.
        #[arg(long)]
        universe: Option<PathBuf>,
    },
    /// Load the dataset and print the reload summary.
    Load,
    /// Top-ranked instruments for a date.
    Top {
        /// Trading date (YYYY-MM-DD). Defaults to the latest loaded date.
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Number of instruments.
        #[arg(short, long, default_value_t = 20)]
        n: usize,
    },
    /// Most recent rows for one instrument, newest first.
    History {
        /// Instrument symbol, or sector id with `--sector`.
        key: String,

        /// Maximum number of trading days.
        #[arg(long, default_value_t = 20)]
        days: usize,

        /// Treat `key` as a sector id.
        #[arg(long, default_value_t = false)]
        sector: bool,
    },
    /// Sector heat ranking for a date.
    Sectors {
        /// Trading date (YYYY-MM-DD). Defaults to the latest loaded date.
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Number of sectors.
        #[arg(short, long, default_value_t = 10)]
        n: usize,
    },
    /// Market breadth and leaders for a date.
    Overview {
        /// Trading date (YYYY-MM-DD). Defaults to the latest loaded date.
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Load, run the dashboard queries twice, and print every counter.
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref(), cli.data_dir)?;
    config
        .logging
        .init()
        .map_err(|e| anyhow!("failed to initialise logging: {e}"))?;

    match cli.command {
        Commands::Seed {
            start,
            end,
            universe,
        } => run_seed(&config, start, end, universe.as_deref()),
        Commands::Load => {
            let service = DashboardService::from_config(config)?;
            print_json(&service.start()?)
        }
        Commands::Top { date, n } => {
            let service = started(config)?;
            print_json(&finish(service.ranking(date, n))?)
        }
        Commands::History { key, days, sector } => {
            let service = started(config)?;
            if sector {
                print_json(&finish(service.sector_history(&key, days))?)
            } else {
                print_json(&finish(service.stock_history(&key, days))?)
            }
        }
        Commands::Sectors { date, n } => {
            let service = started(config)?;
            print_json(&finish(service.sector_heat(date, n))?)
        }
        Commands::Overview { date } => {
            let service = started(config)?;
            print_json(&finish(service.overview(date))?)
        }
        Commands::Stats => run_stats(config),
    }
}

fn load_config(path: Option<&Path>, data_dir: Option<PathBuf>) -> Result<ServiceConfig> {
    let mut config = match path {
        Some(path) => ServiceConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ServiceConfig::default(),
    };
    if let Some(dir) = data_dir {
        config.source.dir = dir;
    }
    Ok(config)
}

fn started(config: ServiceConfig) -> Result<DashboardService> {
    let service = DashboardService::from_config(config)?;
    service.start()?;
    Ok(service)
}

fn finish<V>(pending: PendingQuery<QueryResult<V>>) -> Result<V> {
    Ok(pending.wait()??)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_seed(
    config: &ServiceConfig,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    universe_path: Option<&Path>,
) -> Result<()> {
    let end = end.unwrap_or_else(|| chrono::Local::now().date_naive());
    let start = start.unwrap_or(end - chrono::Duration::days(180));
    if start > end {
        bail!("--start {start} is after --end {end}");
    }

    let universe = match universe_path {
        Some(path) => Universe::from_file(path)
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("failed to load universe {}", path.display()))?,
        None => Universe::default_us(),
    };

    let dataset = synthetic::generate(&universe, start, end);
    let source = ParquetSource::new(&config.source.dir);
    source
        .write_dataset(&dataset)
        .with_context(|| format!("failed to write dataset to {}", source.dir().display()))?;

    info!(
        dir = %source.dir().display(),
        instruments = dataset.instruments.len(),
        daily_rows = dataset.daily.len(),
        sector_rows = dataset.sector_daily.len(),
        "dataset written"
    );
    println!(
        "Wrote {} instruments, {} daily rows and {} sector rows to {}",
        dataset.instruments.len(),
        dataset.daily.len(),
        dataset.sector_daily.len(),
        source.dir().display()
    );
    Ok(())
}

fn run_stats(config: ServiceConfig) -> Result<()> {
    let service = started(config)?;
    let symbol = service
        .middleware()
        .snapshot()
        .and_then(|g| g.instruments().first().map(|i| i.symbol.clone()));

    // The second pass is answered from the response cache.
    for _ in 0..2 {
        finish(service.ranking(None, 20))?;
        finish(service.sector_heat(None, 10))?;
        finish(service.overview(None))?;
        if let Some(symbol) = &symbol {
            finish(service.stock_history(symbol, 20))?;
        }
    }
    print_json(&service.stats())
}
