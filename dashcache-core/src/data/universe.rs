//! Universe configuration: sector-organized ticker lists.
//!
//! Stored as TOML with one array of tickers per sector id. Used to
//! classify instruments when the source carries no sector column, and by
//! the synthetic generator to lay out a demo dataset.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::domain::{Instrument, Sector};

/// The complete universe configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Universe {
    pub sectors: BTreeMap<String, Vec<String>>,
}

impl Universe {
    /// Load a universe from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content =
            std::fs::read_to_string(path).map_err(|e| format!("read universe file: {e}"))?;
        Self::from_toml(&content)
    }

    /// Parse a universe from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| format!("parse universe TOML: {e}"))
    }

    /// Sector a ticker is listed under, if any.
    pub fn sector_of(&self, ticker: &str) -> Option<&str> {
        self.sectors
            .iter()
            .find(|(_, tickers)| tickers.iter().any(|t| t == ticker))
            .map(|(id, _)| id.as_str())
    }

    /// Instruments for every ticker, classified by sector. Display names
    /// default to the ticker.
    pub fn instruments(&self) -> Vec<Instrument> {
        self.sectors
            .iter()
            .flat_map(|(sector, tickers)| {
                tickers
                    .iter()
                    .map(move |t| Instrument::new(t.as_str(), t.as_str()).in_sector(sector.as_str()))
            })
            .collect()
    }

    pub fn sector_list(&self) -> Vec<Sector> {
        self.sectors
            .keys()
            .map(|id| Sector::new(id.as_str(), id.as_str()))
            .collect()
    }

    /// Fill in missing sector classifications from this universe.
    pub fn classify(&self, instruments: &mut [Instrument]) {
        for inst in instruments.iter_mut().filter(|i| i.sector_id.is_none()) {
            inst.sector_id = self.sector_of(&inst.symbol).map(String::from);
        }
    }

    /// A default US equity universe with major sectors.
    pub fn default_us() -> Self {
        let mut sectors = BTreeMap::new();
        let mut add = |id: &str, tickers: &[&str]| {
            sectors.insert(
                id.to_string(),
                tickers.iter().map(|t| t.to_string()).collect::<Vec<_>>(),
            );
        };

        add(
            "technology",
            &["AAPL", "MSFT", "GOOGL", "AMZN", "NVDA", "META", "AVGO", "CRM", "ADBE", "ORCL"],
        );
        add("healthcare", &["JNJ", "UNH", "PFE", "ABBV", "MRK", "LLY", "TMO", "ABT"]);
        add(
            "finance",
            &["JPM", "BAC", "WFC", "GS", "MS", "BLK", "SCHW", "C", "AXP", "V"],
        );
        add("energy", &["XOM", "CVX", "COP", "SLB", "EOG", "MPC", "PSX", "VLO"]);
        add(
            "consumer",
            &["WMT", "PG", "KO", "PEP", "COST", "HD", "MCD", "NKE", "SBUX", "TGT"],
        );

        Self { sectors }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_universe_has_sectors() {
        let u = Universe::default_us();
        let ids: Vec<_> = u.sector_list().into_iter().map(|s| s.id).collect();
        assert!(ids.contains(&"technology".to_string()));
        assert!(u.instruments().len() > 30);
    }

    #[test]
    fn parses_toml() {
        let u = Universe::from_toml(
            r#"
            [sectors]
            energy = ["XOM", "CVX"]
            finance = ["JPM"]
            "#,
        )
        .unwrap();
        assert_eq!(u.sector_of("CVX"), Some("energy"));
        assert_eq!(u.sector_of("AAPL"), None);
        assert_eq!(u.instruments().len(), 3);

        assert!(Universe::from_toml("sectors = 5").is_err());
    }

    #[test]
    fn instruments_carry_sector() {
        let u = Universe::default_us();
        let insts = u.instruments();
        let xom = insts.iter().find(|i| i.symbol == "XOM").unwrap();
        assert!(xom.belongs_to("energy"));
    }

    #[test]
    fn classify_fills_only_missing() {
        let u = Universe::default_us();
        let mut insts = vec![
            Instrument::new("AAPL", "Apple"),
            Instrument::new("XOM", "Exxon").in_sector("custom"),
            Instrument::new("ZZZZ", "Unknown"),
        ];
        u.classify(&mut insts);
        assert_eq!(insts[0].sector_id.as_deref(), Some("technology"));
        assert_eq!(insts[1].sector_id.as_deref(), Some("custom"));
        assert_eq!(insts[2].sector_id, None);
    }
}
