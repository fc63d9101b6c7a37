//! Query worker pool.
//!
//! A private rayon thread pool (not the global one). Callers submit a
//! closure and get a [`PendingQuery`] back; the closure, including any
//! response-cache computation it triggers, runs on a pool thread.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;
use thiserror::Error;
use tracing::error;

/// The job ended without producing a result (it panicked).
#[derive(Debug, Error, PartialEq, Eq)]
#[error("query aborted before producing a result")]
pub struct QueryAborted;

pub struct QueryPool {
    pool: rayon::ThreadPool,
}

impl QueryPool {
    pub fn new(workers: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("dashcache-query-{i}"))
            .panic_handler(|_| error!("query job panicked"))
            .build()?;
        Ok(Self { pool })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `job` on the pool.
    pub fn submit<T, F>(&self, job: F) -> PendingQuery<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        self.pool.spawn(move || {
            // The receiver may have been dropped; nothing to report then.
            let _ = tx.send(job());
        });
        PendingQuery { rx }
    }
}

/// Handle to a submitted query.
pub struct PendingQuery<T> {
    rx: Receiver<T>,
}

impl<T> PendingQuery<T> {
    /// Block until the query finishes.
    pub fn wait(self) -> Result<T, QueryAborted> {
        self.rx.recv().map_err(|_| QueryAborted)
    }

    /// Wait at most `timeout`. `Ok(None)` means still running.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Option<T>, QueryAborted> {
        match self.rx.recv_timeout(timeout) {
            Ok(value) => Ok(Some(value)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(QueryAborted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};

    #[test]
    fn submit_and_wait() {
        let pool = QueryPool::new(2).unwrap();
        assert_eq!(pool.workers(), 2);
        let pending = pool.submit(|| 6 * 7);
        assert_eq!(pending.wait(), Ok(42));
    }

    #[test]
    fn jobs_run_concurrently() {
        let pool = QueryPool::new(2).unwrap();
        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|i| {
                let b = Arc::clone(&barrier);
                pool.submit(move || {
                    b.wait();
                    i
                })
            })
            .collect();
        let sum: i32 = handles.into_iter().map(|h| h.wait().unwrap()).sum();
        assert_eq!(sum, 1);
    }

    #[test]
    fn panicking_job_reports_aborted() {
        let pool = QueryPool::new(1).unwrap();
        let pending = pool.submit(|| -> u32 { panic!("bad query") });
        assert_eq!(pending.wait(), Err(QueryAborted));

        // the pool survives
        assert_eq!(pool.submit(|| 1).wait(), Ok(1));
    }

    #[test]
    fn wait_timeout_reports_running() {
        let pool = QueryPool::new(1).unwrap();
        let pending = pool.submit(|| {
            std::thread::sleep(Duration::from_millis(100));
            5
        });
        assert_eq!(pending.wait_timeout(Duration::from_millis(1)), Ok(None));
        assert_eq!(pending.wait_timeout(Duration::from_secs(5)), Ok(Some(5)));
    }
}
