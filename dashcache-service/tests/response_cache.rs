//! Response cache concurrency and eviction behaviour.

use proptest::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use dashcache_service::{ResponseCache, ResponseCacheError};

const TTL: Duration = Duration::from_secs(60);

fn open(budget: u64) -> (tempfile::TempDir, Arc<ResponseCache>) {
    let dir = tempfile::tempdir().unwrap();
    let cache = ResponseCache::open(dir.path(), budget).unwrap();
    (dir, Arc::new(cache))
}

// ── Stampede ─────────────────────────────────────────────────────────

#[test]
fn concurrent_misses_compute_once() {
    const CALLERS: usize = 16;
    let (_dir, cache) = open(1 << 20);
    let computations = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(CALLERS));

    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let computations = Arc::clone(&computations);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cache
                    .get_or_compute("ranking|-|2024-06-05|n=50", TTL, || {
                        computations.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(150));
                        Ok::<_, String>(vec!["AAPL".to_string(), "MSFT".to_string()])
                    })
                    .unwrap()
            })
        })
        .collect();

    let results: Vec<Vec<String>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(computations.load(Ordering::SeqCst), 1);
    assert!(results.iter().all(|r| r == &results[0]));

    let stats = cache.stats();
    assert_eq!(stats.computations, 1);
    assert_eq!(stats.hits + stats.misses, CALLERS as u64);
    assert_eq!(stats.in_flight, 0);
}

#[test]
fn waiters_share_the_failure_and_nothing_is_cached() {
    const CALLERS: usize = 6;
    let (_dir, cache) = open(1 << 20);
    let barrier = Arc::new(Barrier::new(CALLERS));

    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cache.get_or_compute::<u32, _, _>("overview|-|-|", TTL, || {
                    thread::sleep(Duration::from_millis(150));
                    Err("source timed out")
                })
            })
        })
        .collect();

    for h in handles {
        match h.join().unwrap() {
            Err(ResponseCacheError::ComputeFailure { message, .. }) => {
                assert_eq!(message, "source timed out")
            }
            other => panic!("expected compute failure, got {other:?}"),
        }
    }
    assert_eq!(cache.stats().computations, 1);
    assert!(!cache.contains("overview|-|-|"));

    // next caller retries
    let v: u32 = cache.get_or_compute("overview|-|-|", TTL, || Ok::<_, String>(3)).unwrap();
    assert_eq!(v, 3);
}

#[test]
fn failed_computation_is_retired_before_waiters_wake() {
    let (_dir, cache) = open(1 << 20);
    let key = "sector_heat|-|2024-06-05|n=10";
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let (started_tx, started_rx) = mpsc::channel();

    let leader = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || {
            cache.get_or_compute::<u32, _, _>(key, TTL, || {
                started_tx.send(()).unwrap();
                release_rx.recv_timeout(Duration::from_secs(10)).ok();
                Err("source timed out")
            })
        })
    };
    started_rx.recv().unwrap();

    let waiter = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || {
            let result = cache.get_or_compute::<u32, _, _>(key, TTL, || Ok::<_, String>(0));
            (result, cache.stats().in_flight)
        })
    };
    thread::sleep(Duration::from_millis(100));
    release_tx.send(()).unwrap();

    assert!(leader.join().unwrap().is_err());
    let (result, in_flight_on_wake) = waiter.join().unwrap();
    assert!(matches!(result, Err(ResponseCacheError::ComputeFailure { .. })));
    assert_eq!(in_flight_on_wake, 0);

    let v: u32 = cache.get_or_compute(key, TTL, || Ok::<_, String>(3)).unwrap();
    assert_eq!(v, 3);
}

#[test]
fn leader_panic_is_reported_to_waiters() {
    let (_dir, cache) = open(1 << 20);
    let (started_tx, started_rx) = mpsc::channel();

    let leader = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || {
            let _: Result<u32, _> = cache.get_or_compute("k", TTL, || -> Result<u32, String> {
                started_tx.send(()).unwrap();
                thread::sleep(Duration::from_millis(200));
                panic!("computation bug");
            });
        })
    };
    started_rx.recv().unwrap();

    let waiter = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || cache.get_or_compute::<u32, String, _>("k", TTL, || Ok(1)))
    };

    assert!(leader.join().is_err());
    match waiter.join().unwrap() {
        Err(ResponseCacheError::ComputeFailure { message, .. }) => {
            assert!(message.contains("panicked"))
        }
        other => panic!("expected compute failure, got {other:?}"),
    }
    assert_eq!(cache.stats().in_flight, 0);
    assert_eq!(cache.get_or_compute::<u32, String, _>("k", TTL, || Ok(9)).unwrap(), 9);
}

// ── Isolation ────────────────────────────────────────────────────────

#[test]
fn distinct_keys_do_not_block_each_other() {
    let (_dir, cache) = open(1 << 20);
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let (started_tx, started_rx) = mpsc::channel();
    let slow_done = Arc::new(AtomicBool::new(false));

    let slow = {
        let cache = Arc::clone(&cache);
        let slow_done = Arc::clone(&slow_done);
        thread::spawn(move || {
            let v: u32 = cache
                .get_or_compute("slow", TTL, || {
                    started_tx.send(()).unwrap();
                    release_rx.recv_timeout(Duration::from_secs(10)).ok();
                    Ok::<_, String>(1)
                })
                .unwrap();
            slow_done.store(true, Ordering::SeqCst);
            v
        })
    };
    started_rx.recv().unwrap();

    // Same key: blocks behind the running computation.
    let same_key_done = Arc::new(AtomicBool::new(false));
    let same_key = {
        let cache = Arc::clone(&cache);
        let done = Arc::clone(&same_key_done);
        thread::spawn(move || {
            let v: u32 = cache
                .get_or_compute("slow", TTL, || Ok::<_, String>(2))
                .unwrap();
            done.store(true, Ordering::SeqCst);
            v
        })
    };

    // Different key: completes while "slow" is still running.
    let started = Instant::now();
    let fast: u32 = cache.get_or_compute("fast", TTL, || Ok::<_, String>(5)).unwrap();
    assert_eq!(fast, 5);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!slow_done.load(Ordering::SeqCst));

    thread::sleep(Duration::from_millis(100));
    assert!(!same_key_done.load(Ordering::SeqCst));

    release_tx.send(()).unwrap();
    assert_eq!(slow.join().unwrap(), 1);
    assert_eq!(same_key.join().unwrap(), 1);
}

// ── Eviction ─────────────────────────────────────────────────────────

/// JSON of an 8-character string is 10 bytes.
fn ten_bytes(c: char) -> String {
    std::iter::repeat(c).take(8).collect()
}

#[test]
fn lru_by_bytes_spares_recently_read_entries() {
    let (_dir, cache) = open(30);
    for (key, c) in [("k1", 'a'), ("k2", 'b'), ("k3", 'c')] {
        let _: String = cache.get_or_compute(key, TTL, || Ok::<_, String>(ten_bytes(c))).unwrap();
    }
    assert_eq!(cache.stats().bytes, 30);

    // touch k1 so k2 becomes least recently used
    let hit: String = cache
        .get_or_compute("k1", TTL, || Err::<String, _>("must be a hit"))
        .unwrap();
    assert_eq!(hit, ten_bytes('a'));

    let _: String = cache.get_or_compute("k4", TTL, || Ok::<_, String>(ten_bytes('d'))).unwrap();

    assert!(cache.contains("k1"));
    assert!(!cache.contains("k2"));
    assert!(cache.contains("k3"));
    assert!(cache.contains("k4"));
    let stats = cache.stats();
    assert_eq!(stats.evictions, 1);
    assert_eq!(stats.bytes, 30);
    assert_eq!(stats.entries, 3);
}

#[test]
fn invalidation_during_compute_discards_result() {
    let (_dir, cache) = open(1 << 20);
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let (started_tx, started_rx) = mpsc::channel();

    let leader = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || {
            cache
                .get_or_compute("ranking|-|-|n=10", TTL, || {
                    started_tx.send(()).unwrap();
                    release_rx.recv_timeout(Duration::from_secs(10)).ok();
                    Ok::<_, String>("old".to_string())
                })
                .unwrap()
        })
    };
    started_rx.recv().unwrap();
    cache.invalidate(Some("ranking|"));
    release_tx.send(()).unwrap();

    // the caller still gets its value
    assert_eq!(leader.join().unwrap(), "old");
    assert!(!cache.contains("ranking|-|-|n=10"));

    let fresh: String = cache
        .get_or_compute("ranking|-|-|n=10", TTL, || Ok::<_, String>("new".to_string()))
        .unwrap();
    assert_eq!(fresh, "new");
}

#[test]
fn caller_after_invalidation_does_not_join_stale_computation() {
    let (_dir, cache) = open(1 << 20);
    let key = "overview|-|2024-06-05|";
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let (started_tx, started_rx) = mpsc::channel();

    let leader = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || {
            cache
                .get_or_compute(key, TTL, || {
                    started_tx.send(()).unwrap();
                    release_rx.recv_timeout(Duration::from_secs(10)).ok();
                    Ok::<_, String>("old-generation".to_string())
                })
                .unwrap()
        })
    };
    started_rx.recv().unwrap();
    cache.invalidate(None);
    assert_eq!(cache.stats().in_flight, 0);

    // Runs its own computation while the stale one is still blocked.
    let late: String = cache
        .get_or_compute(key, TTL, || Ok::<_, String>("new-generation".to_string()))
        .unwrap();
    assert_eq!(late, "new-generation");

    release_tx.send(()).unwrap();
    assert_eq!(leader.join().unwrap(), "old-generation");

    // The stale result never replaces the fresh one.
    let cached: String = cache
        .get_or_compute(key, TTL, || Err::<String, _>("must not run"))
        .unwrap();
    assert_eq!(cached, "new-generation");
    assert_eq!(cache.stats().computations, 2);
}

#[test]
fn reopening_purges_previous_files() {
    let dir = tempfile::tempdir().unwrap();
    {
        let cache = ResponseCache::open(dir.path(), 1 << 20).unwrap();
        let _: u8 = cache.get_or_compute("k", TTL, || Ok::<_, String>(1)).unwrap();
    }
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

    let cache = ResponseCache::open(dir.path(), 1 << 20).unwrap();
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    assert!(!cache.contains("k"));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Whatever the insertion pattern, stored bytes never exceed the budget.
    #[test]
    fn bytes_stay_within_budget(
        ops in proptest::collection::vec((0..12_usize, 1..40_usize), 1..60),
        budget in 16..200_u64,
    ) {
        let (_dir, cache) = open(budget);
        for (key, len) in ops {
            let value = "x".repeat(len);
            let got: String = cache
                .get_or_compute(&format!("key-{key}"), TTL, || Ok::<_, String>(value.clone()))
                .unwrap();
            prop_assert!(got.starts_with('x'));
            let stats = cache.stats();
            prop_assert!(stats.bytes <= budget);
            prop_assert!(stats.entries <= 12);
        }
    }
}
