//! Domain types: instruments, sectors and the value records handed to consumers.

pub mod instrument;
pub mod record;

pub use instrument::{Instrument, Sector};
pub use record::{DailyRecord, EntityKind, Indicators, SectorRecord};
