//! Record sources and the columnar batches they hand to the store.

pub mod batch;
pub mod memory;
pub mod parquet;
pub mod source;
pub mod synthetic;
pub mod universe;

pub use batch::{DailyBatch, DailyRow, KeyColumn, SectorBatch, SectorRow, SourceBatch};
pub use memory::MemorySource;
pub use parquet::ParquetSource;
pub use source::{RecordSource, SourceError};
pub use universe::Universe;
