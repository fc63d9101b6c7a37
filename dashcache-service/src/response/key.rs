//! Cache keys. Every key belongs to a query family and carries only a
//! symbol or sector id, a date and small integer parameters, so the key
//! domain is bounded by the data itself.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kinds of memoized dashboard queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryFamily {
    Ranking,
    /// Reserved for the signal layer, which memoizes its rank-jump scans
    /// through `DashboardService::query`. No built-in query uses it.
    RankJump,
    SectorHeat,
    StockHistory,
    SectorHistory,
    Overview,
}

impl QueryFamily {
    pub const ALL: [QueryFamily; 6] = [
        QueryFamily::Ranking,
        QueryFamily::RankJump,
        QueryFamily::SectorHeat,
        QueryFamily::StockHistory,
        QueryFamily::SectorHistory,
        QueryFamily::Overview,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QueryFamily::Ranking => "ranking",
            QueryFamily::RankJump => "rank_jump",
            QueryFamily::SectorHeat => "sector_heat",
            QueryFamily::StockHistory => "stock_history",
            QueryFamily::SectorHistory => "sector_history",
            QueryFamily::Overview => "overview",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == name)
    }
}

impl fmt::Display for QueryFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured response-cache key.
///
/// Rendered as `family|subject|date|name=value,...` with parameters sorted
/// by name, so equal keys always render identically and substring
/// invalidation can target a family, a subject or a date.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    family: QueryFamily,
    subject: Option<String>,
    date: Option<NaiveDate>,
    params: Vec<(&'static str, u32)>,
}

impl CacheKey {
    pub fn new(family: QueryFamily) -> Self {
        Self {
            family,
            subject: None,
            date: None,
            params: Vec::new(),
        }
    }

    /// Symbol or sector id the query is about.
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    /// Set an integer parameter, replacing an earlier value of the same name.
    pub fn param(mut self, name: &'static str, value: u32) -> Self {
        match self.params.binary_search_by(|(n, _)| n.cmp(&name)) {
            Ok(pos) => self.params[pos].1 = value,
            Err(pos) => self.params.insert(pos, (name, value)),
        }
        self
    }

    pub fn family(&self) -> QueryFamily {
        self.family
    }

    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|", self.family, self.subject.as_deref().unwrap_or("-"))?;
        match self.date {
            Some(date) => write!(f, "{date}")?,
            None => f.write_str("-")?,
        }
        f.write_str("|")?;
        for (i, (name, value)) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}
