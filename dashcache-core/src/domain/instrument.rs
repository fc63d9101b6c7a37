use serde::{Deserialize, Serialize};

/// A listed instrument. Immutable for the lifetime of a generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Instrument {
    pub symbol: String,
    pub name: String,
    /// Sector classification, if the source provides one.
    pub sector_id: Option<String>,
}

impl Instrument {
    pub fn new(symbol: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            name: name.into(),
            sector_id: None,
        }
    }

    /// Attach a sector classification.
    pub fn in_sector(mut self, sector_id: impl Into<String>) -> Self {
        self.sector_id = Some(sector_id.into());
        self
    }

    pub fn belongs_to(&self, sector_id: &str) -> bool {
        self.sector_id.as_deref() == Some(sector_id)
    }
}

/// A sector (industry group) that carries its own daily rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sector {
    pub id: String,
    pub name: String,
}

impl Sector {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}
