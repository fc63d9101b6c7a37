//! Response-level memoization for expensive dashboard queries.

mod cache;
mod disk;
mod flight;
pub mod key;

pub use cache::{CacheStats, ResponseCache, ResponseCacheError, TtlTable};
pub use key::{CacheKey, QueryFamily};
