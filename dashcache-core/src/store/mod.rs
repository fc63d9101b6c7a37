//! Fixed-schema columnar storage for daily instrument and sector rows.

pub mod columnar;
pub mod daily;
pub mod encoding;
pub mod schema;
pub mod sector;

pub use columnar::{ColumnarStore, MalformedReport, MalformedRow, RowFault};
pub use daily::{DailyField, DailySchema};
pub use schema::{ColumnSpec, ColumnType, FieldValue, RowSchema, RowView};
pub use sector::{SectorField, SectorSchema};

pub type DailyStore = ColumnarStore<DailySchema>;
pub type SectorStore = ColumnarStore<SectorSchema>;
