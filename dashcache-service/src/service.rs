//! Composition root: one middleware, one response cache and one query
//! pool wired together, plus the import-complete hook.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use dashcache_core::data::{ParquetSource, RecordSource, Universe};
use dashcache_core::domain::{DailyRecord, SectorRecord};
use dashcache_core::{CacheMiddleware, Generation, MiddlewareStats, ReloadError, ReloadSummary};

use crate::config::ServiceConfig;
use crate::pool::{PendingQuery, QueryPool};
use crate::response::{CacheKey, CacheStats, QueryFamily, ResponseCache, ResponseCacheError};

/// Why a dashboard query could not be computed. Never cached.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("market data not loaded yet")]
    NotLoaded,

    #[error("no trading dates loaded")]
    NoDates,
}

/// Result type of every pooled dashboard query.
pub type QueryResult<V> = Result<V, ResponseCacheError>;

/// Market breadth and leaders for one trading date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketOverview {
    pub date: NaiveDate,
    pub instruments: usize,
    pub ranked: usize,
    pub advancing: usize,
    pub declining: usize,
    pub unchanged: usize,
    pub leaders: Vec<DailyRecord>,
    pub sectors: Vec<SectorRecord>,
}

const OVERVIEW_LEADERS: usize = 5;

/// Counters from every layer.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub middleware: MiddlewareStats,
    pub responses: CacheStats,
    pub workers: usize,
}

pub struct DashboardService {
    config: ServiceConfig,
    middleware: Arc<CacheMiddleware>,
    responses: Arc<ResponseCache>,
    pool: QueryPool,
}

impl fmt::Debug for DashboardService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DashboardService")
            .field("retention_days", &self.config.retention_days)
            .field("responses", &self.responses)
            .field("workers", &self.pool.workers())
            .finish()
    }
}

impl DashboardService {
    /// Build a service reading the Parquet directory named in `config`.
    pub fn from_config(config: ServiceConfig) -> Result<Self> {
        let source = Arc::new(ParquetSource::new(&config.source.dir));
        Self::new(config, source)
    }

    pub fn new(config: ServiceConfig, source: Arc<dyn RecordSource>) -> Result<Self> {
        config.validate().context("invalid service configuration")?;

        let mut middleware = CacheMiddleware::new(source, config.reload);
        if let Some(path) = &config.source.universe {
            let universe = Universe::from_file(path)
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("failed to load universe {}", path.display()))?;
            middleware = middleware.with_universe(universe);
        }

        let responses = ResponseCache::open(
            &config.response_cache.dir,
            config.response_cache.byte_budget,
        )
        .with_context(|| {
            format!(
                "failed to open response cache at {}",
                config.response_cache.dir.display()
            )
        })?
        .with_ttls(config.response_cache.ttl_table());

        let pool = QueryPool::new(config.workers).context("failed to build query pool")?;

        Ok(Self {
            config,
            middleware: Arc::new(middleware),
            responses: Arc::new(responses),
            pool,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn middleware(&self) -> &Arc<CacheMiddleware> {
        &self.middleware
    }

    pub fn responses(&self) -> &Arc<ResponseCache> {
        &self.responses
    }

    /// Initial load at startup.
    pub fn start(&self) -> Result<ReloadSummary> {
        self.middleware
            .reload(self.config.retention_days)
            .context("initial load failed")
    }

    /// Called by the import pipeline after a successful ingest: reload,
    /// then drop every cached response. A failed reload leaves both the
    /// previous generation and the cached responses in place.
    pub fn on_import_complete(&self) -> Result<ReloadSummary, ReloadError> {
        let summary = match self.middleware.reload(self.config.retention_days) {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "import reload failed, response cache kept");
                return Err(e);
            }
        };
        let removed = self.responses.invalidate(None);
        info!(
            generation = summary.generation,
            responses_removed = removed,
            "import applied"
        );
        Ok(summary)
    }

    /// Run `compute` against a pinned generation on the query pool,
    /// memoized under `key`.
    pub fn query<V, E, F>(&self, key: CacheKey, compute: F) -> PendingQuery<QueryResult<V>>
    where
        V: Serialize + DeserializeOwned + Send + 'static,
        E: fmt::Display + From<QueryError>,
        F: FnOnce(&Generation) -> Result<V, E> + Send + 'static,
    {
        let middleware = Arc::clone(&self.middleware);
        let responses = Arc::clone(&self.responses);
        self.pool.submit(move || {
            responses.get_or_compute_default(&key, || {
                let generation = middleware.snapshot().ok_or(QueryError::NotLoaded)?;
                compute(&generation)
            })
        })
    }

    /// Top `n` instruments by rank on `date` (latest when `None`).
    pub fn ranking(
        &self,
        date: Option<NaiveDate>,
        n: usize,
    ) -> PendingQuery<QueryResult<Vec<DailyRecord>>> {
        let key = dated(CacheKey::new(QueryFamily::Ranking), date).param("n", clamp(n));
        self.query(key, move |g: &Generation| {
            let date = resolve(g, date)?;
            Ok::<_, QueryError>(g.top_n_by_rank(date, n))
        })
    }

    /// Top `n` sectors by rank on `date` (latest when `None`).
    pub fn sector_heat(
        &self,
        date: Option<NaiveDate>,
        n: usize,
    ) -> PendingQuery<QueryResult<Vec<SectorRecord>>> {
        let key = dated(CacheKey::new(QueryFamily::SectorHeat), date).param("n", clamp(n));
        self.query(key, move |g: &Generation| {
            let date = resolve(g, date)?;
            Ok::<_, QueryError>(g.sector_top_n_by_rank(date, n))
        })
    }

    pub fn stock_history(
        &self,
        symbol: &str,
        days: usize,
    ) -> PendingQuery<QueryResult<Vec<DailyRecord>>> {
        let key = CacheKey::new(QueryFamily::StockHistory)
            .subject(symbol)
            .param("days", clamp(days));
        let symbol = symbol.to_string();
        self.query(key, move |g: &Generation| Ok::<_, QueryError>(g.history(&symbol, days)))
    }

    pub fn sector_history(
        &self,
        sector_id: &str,
        days: usize,
    ) -> PendingQuery<QueryResult<Vec<SectorRecord>>> {
        let key = CacheKey::new(QueryFamily::SectorHistory)
            .subject(sector_id)
            .param("days", clamp(days));
        let sector_id = sector_id.to_string();
        self.query(key, move |g: &Generation| {
            Ok::<_, QueryError>(g.sector_history(&sector_id, days))
        })
    }

    pub fn overview(&self, date: Option<NaiveDate>) -> PendingQuery<QueryResult<MarketOverview>> {
        let key = dated(CacheKey::new(QueryFamily::Overview), date);
        self.query(key, move |g: &Generation| {
            let date = resolve(g, date)?;
            Ok::<_, QueryError>(overview(g, date))
        })
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            middleware: self.middleware.stats(),
            responses: self.responses.stats(),
            workers: self.pool.workers(),
        }
    }
}

fn dated(key: CacheKey, date: Option<NaiveDate>) -> CacheKey {
    match date {
        Some(d) => key.on(d),
        None => key,
    }
}

fn clamp(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

fn resolve(generation: &Generation, date: Option<NaiveDate>) -> Result<NaiveDate, QueryError> {
    match date {
        Some(d) => Ok(d),
        None => generation.latest_date().ok_or(QueryError::NoDates),
    }
}

fn overview(generation: &Generation, date: NaiveDate) -> MarketOverview {
    let rows = generation.all_for_date(date);
    let mut out = MarketOverview {
        date,
        instruments: rows.len(),
        ranked: rows.iter().filter(|r| r.is_ranked()).count(),
        advancing: 0,
        declining: 0,
        unchanged: 0,
        leaders: generation.top_n_by_rank(date, OVERVIEW_LEADERS),
        sectors: generation.sector_top_n_by_rank(date, OVERVIEW_LEADERS),
    };
    for change in rows.iter().filter_map(|r| r.change_pct) {
        if change > 0.0 {
            out.advancing += 1;
        } else if change < 0.0 {
            out.declining += 1;
        } else {
            out.unchanged += 1;
        }
    }
    out
}
