//! Response cache: memoized query results on disk, bounded by a byte
//! budget, with at most one running computation per key.
//!
//! Reads go to the entry table (a sharded map) and the value file; there is
//! no cache-wide lock on the hit path. All mutations of the entry table and
//! the disk (store, evict, expire, invalidate) are serialized by one writer
//! lock so the byte count stays exact.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::disk::DiskStore;
use super::flight::{Flight, Outcome};
use super::key::{CacheKey, QueryFamily};

#[derive(Debug, Error)]
pub enum ResponseCacheError {
    /// The computation failed (or panicked). Shared by every caller that
    /// waited on it; never cached.
    #[error("computation for '{key}' failed: {message}")]
    ComputeFailure { key: String, message: String },

    #[error("serialization error for '{key}': {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("response cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Time-to-live per query family.
#[derive(Debug, Clone)]
pub struct TtlTable {
    default: Duration,
    families: HashMap<QueryFamily, Duration>,
}

impl TtlTable {
    pub fn new(default: Duration) -> Self {
        Self {
            default,
            families: HashMap::new(),
        }
    }

    pub fn with(mut self, family: QueryFamily, ttl: Duration) -> Self {
        self.families.insert(family, ttl);
        self
    }

    pub fn ttl_for(&self, family: QueryFamily) -> Duration {
        self.families.get(&family).copied().unwrap_or(self.default)
    }
}

impl Default for TtlTable {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

/// Point-in-time counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub computations: u64,
    pub failures: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub invalidations: u64,
    pub entries: usize,
    pub bytes: u64,
    pub byte_budget: u64,
    pub in_flight: usize,
}

#[derive(Debug)]
struct EntryMeta {
    size: u64,
    expires_at: Instant,
    /// Recency stamp from the cache clock.
    last_access: AtomicU64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    computations: AtomicU64,
    failures: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    invalidations: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

pub struct ResponseCache {
    disk: DiskStore,
    entries: DashMap<String, EntryMeta>,
    flights: DashMap<String, Arc<Flight>>,
    writer: Mutex<()>,
    bytes: AtomicU64,
    byte_budget: u64,
    ttls: TtlTable,
    clock: AtomicU64,
    counters: Counters,
}

impl fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseCache")
            .field("dir", &self.disk.dir())
            .field("entries", &self.entries.len())
            .field("bytes", &self.bytes.load(Ordering::Relaxed))
            .field("byte_budget", &self.byte_budget)
            .finish()
    }
}

/// Retires the flight before publishing, so a caller arriving after the
/// outcome is known starts from the entry table instead of joining.
/// Publishes a failure to waiters if the leader unwinds before finishing.
struct FlightGuard<'a> {
    cache: &'a ResponseCache,
    key: &'a str,
    flight: &'a Arc<Flight>,
}

impl FlightGuard<'_> {
    fn finish(self, outcome: Outcome) {
        self.retire();
        self.flight.publish(outcome);
    }

    /// No-op if an invalidation already detached this flight or a newer
    /// one took its place.
    fn retire(&self) {
        self.cache
            .flights
            .remove_if(self.key, |_, f| Arc::ptr_eq(f, self.flight));
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.retire();
        self.flight.publish(Err("computation panicked".into()));
    }
}

impl ResponseCache {
    /// Open a cache rooted at `dir`. Value files from an earlier process
    /// are deleted.
    pub fn open(dir: impl AsRef<Path>, byte_budget: u64) -> Result<Self, ResponseCacheError> {
        Ok(Self {
            disk: DiskStore::open(dir)?,
            entries: DashMap::new(),
            flights: DashMap::new(),
            writer: Mutex::new(()),
            bytes: AtomicU64::new(0),
            byte_budget,
            ttls: TtlTable::default(),
            clock: AtomicU64::new(0),
            counters: Counters::default(),
        })
    }

    pub fn with_ttls(mut self, ttls: TtlTable) -> Self {
        self.ttls = ttls;
        self
    }

    pub fn ttls(&self) -> &TtlTable {
        &self.ttls
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Return the cached value for `key`, or run `compute` and cache its
    /// result for `ttl`.
    ///
    /// Concurrent misses on the same key run `compute` once; the others
    /// block and receive the same value or the same failure. Misses on
    /// different keys never wait on each other.
    pub fn get_or_compute<V, E, F>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<V, ResponseCacheError>
    where
        V: Serialize + DeserializeOwned,
        E: fmt::Display,
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(bytes) = self.lookup(key) {
            bump(&self.counters.hits);
            debug!(key, "response cache hit");
            return decode(key, &bytes);
        }
        bump(&self.counters.misses);

        let (flight, leader) = match self.flights.entry(key.to_string()) {
            Entry::Occupied(e) => (Arc::clone(e.get()), false),
            Entry::Vacant(e) => {
                let flight = Arc::new(Flight::new());
                e.insert(Arc::clone(&flight));
                (flight, true)
            }
        };

        if !leader {
            debug!(key, "joining in-flight computation");
            return match flight.wait() {
                Ok(bytes) => decode(key, &bytes),
                Err(message) => Err(ResponseCacheError::ComputeFailure {
                    key: key.to_string(),
                    message,
                }),
            };
        }

        let guard = FlightGuard {
            cache: self,
            key,
            flight: &flight,
        };

        // A previous leader may have stored the value between our miss and
        // taking the flight.
        if let Some(bytes) = self.lookup(key) {
            guard.finish(Ok(Arc::clone(&bytes)));
            return decode(key, &bytes);
        }

        bump(&self.counters.computations);
        debug!(key, "computing response");
        let value = match compute() {
            Ok(value) => value,
            Err(e) => {
                bump(&self.counters.failures);
                let message = e.to_string();
                warn!(key, error = %message, "response computation failed");
                guard.finish(Err(message.clone()));
                return Err(ResponseCacheError::ComputeFailure {
                    key: key.to_string(),
                    message,
                });
            }
        };

        let bytes = match serde_json::to_vec(&value) {
            Ok(bytes) => Arc::new(bytes),
            Err(source) => {
                bump(&self.counters.failures);
                guard.finish(Err(format!("serialization failed: {source}")));
                return Err(ResponseCacheError::Serialization {
                    key: key.to_string(),
                    source,
                });
            }
        };

        self.store(key, &bytes, ttl, &flight);
        guard.finish(Ok(bytes));
        Ok(value)
    }

    /// [`get_or_compute`](Self::get_or_compute) with the TTL configured
    /// for the key's family.
    pub fn get_or_compute_default<V, E, F>(
        &self,
        key: &CacheKey,
        compute: F,
    ) -> Result<V, ResponseCacheError>
    where
        V: Serialize + DeserializeOwned,
        E: fmt::Display,
        F: FnOnce() -> Result<V, E>,
    {
        let ttl = self.ttls.ttl_for(key.family());
        self.get_or_compute(&key.render(), ttl, compute)
    }

    /// Remove cached values whose key contains `pattern`, or every value
    /// when `pattern` is `None`. Computations already running for a
    /// matching key still answer the callers that joined them, but they do
    /// not store and later callers start a fresh computation.
    pub fn invalidate(&self, pattern: Option<&str>) -> usize {
        let matches = |key: &str| pattern.map_or(true, |p| key.contains(p));
        let _writer = self.writer.lock();

        self.flights.retain(|key, flight| {
            if matches(key.as_str()) {
                flight.mark_stale();
                false
            } else {
                true
            }
        });

        let victims: Vec<String> = self
            .entries
            .iter()
            .filter(|e| matches(e.key().as_str()))
            .map(|e| e.key().clone())
            .collect();
        let mut removed = 0;
        for key in victims {
            if let Some((key, meta)) = self.entries.remove(&key) {
                self.drop_file(&key, meta.size);
                removed += 1;
            }
        }

        bump(&self.counters.invalidations);
        info!(pattern = pattern.unwrap_or("*"), removed, "response cache invalidated");
        removed
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            computations: self.counters.computations.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            expirations: self.counters.expirations.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
            entries: self.entries.len(),
            bytes: self.bytes.load(Ordering::Relaxed),
            byte_budget: self.byte_budget,
            in_flight: self.flights.len(),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .is_some_and(|e| e.expires_at > Instant::now())
    }

    /// Live value bytes, or `None` on miss or expiry.
    fn lookup(&self, key: &str) -> Option<Arc<Vec<u8>>> {
        let expired = {
            let entry = self.entries.get(key)?;
            if entry.expires_at <= Instant::now() {
                true
            } else {
                entry.last_access.store(self.tick(), Ordering::Relaxed);
                false
            }
        };
        if expired {
            self.expire(key);
            return None;
        }

        match self.disk.read(key) {
            Ok(bytes) => Some(Arc::new(bytes)),
            Err(e) => {
                // Evicted between the table check and the read.
                debug!(key, error = %e, "value file unreadable, treating as miss");
                None
            }
        }
    }

    fn expire(&self, key: &str) {
        let _writer = self.writer.lock();
        let now = Instant::now();
        if let Some((key, meta)) = self.entries.remove_if(key, |_, m| m.expires_at <= now) {
            self.drop_file(&key, meta.size);
            bump(&self.counters.expirations);
            debug!(key = %key, "response expired");
        }
    }

    fn store(&self, key: &str, bytes: &[u8], ttl: Duration, flight: &Flight) {
        let size = bytes.len() as u64;
        if size > self.byte_budget {
            debug!(key, size, budget = self.byte_budget, "response larger than budget, not stored");
            return;
        }

        let _writer = self.writer.lock();
        if flight.is_stale() {
            debug!(key, "response invalidated while computing, not stored");
            return;
        }
        if let Some((old_key, old)) = self.entries.remove(key) {
            self.drop_file(&old_key, old.size);
        }
        self.evict_for(size);

        if let Err(e) = self.disk.write(key, bytes) {
            warn!(key, error = %e, "failed to write response file");
            return;
        }
        self.entries.insert(
            key.to_string(),
            EntryMeta {
                size,
                expires_at: Instant::now() + ttl,
                last_access: AtomicU64::new(self.tick()),
            },
        );
        self.bytes.fetch_add(size, Ordering::Relaxed);
    }

    /// Evict least recently used entries until `incoming` more bytes fit.
    /// Caller holds the writer lock.
    fn evict_for(&self, incoming: u64) {
        if self.bytes.load(Ordering::Relaxed) + incoming <= self.byte_budget {
            return;
        }
        let mut by_recency: Vec<(u64, String)> = self
            .entries
            .iter()
            .map(|e| (e.last_access.load(Ordering::Relaxed), e.key().clone()))
            .collect();
        by_recency.sort_unstable();

        for (_, key) in by_recency {
            if self.bytes.load(Ordering::Relaxed) + incoming <= self.byte_budget {
                break;
            }
            if let Some((key, meta)) = self.entries.remove(&key) {
                self.drop_file(&key, meta.size);
                bump(&self.counters.evictions);
                debug!(key = %key, size = meta.size, "response evicted");
            }
        }
    }

    /// Caller holds the writer lock and has removed the entry.
    fn drop_file(&self, key: &str, size: u64) {
        if let Err(e) = self.disk.remove(key) {
            warn!(key, error = %e, "failed to delete response file");
        }
        self.bytes.fetch_sub(size, Ordering::Relaxed);
    }
}

fn decode<V: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<V, ResponseCacheError> {
    serde_json::from_slice(bytes).map_err(|source| ResponseCacheError::Serialization {
        key: key.to_string(),
        source,
    })
}
