//! Loom tests for the VersionWord protocol.
//!
//! Loom explores all interleavings of a small thread schedule, catching
//! ordering bugs that stochastic stress tests miss.
//!
//! Run with: `RUSTFLAGS="--cfg loom" cargo test --lib version::loom_tests`
//!
//! NOTE: Loom requires its own atomic types, so these tests model the word
//! with a shadow implementation that mirrors the production bit layout and
//! orderings exactly.

#![expect(clippy::unwrap_used, reason = "fail fast in tests")]

use loom::sync::Arc;
use loom::sync::atomic::{AtomicU64, Ordering};
use loom::thread;

// Bit constants (same as the main module)
const LOCK_BIT: u64 = 1 << 0;
const VALID_BIT: u64 = 1 << 1;
const INCREMENT: u64 = 1 << 3;

/// Shadow VersionWord over loom atomics.
struct LoomVersionWord {
    value: AtomicU64,
}

impl LoomVersionWord {
    fn new(initial: u64) -> Self {
        Self {
            value: AtomicU64::new(initial),
        }
    }

    fn load(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    fn lock(&self) {
        loop {
            let v = self.value.load(Ordering::Relaxed);
            if v & LOCK_BIT != 0 {
                thread::yield_now();
                continue;
            }
            if self
                .value
                .compare_exchange_weak(v, v | LOCK_BIT, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
            thread::yield_now();
        }
    }

    fn set_version(&self, v: u64) {
        self.value.store(v, Ordering::Release);
    }

    fn unlock(&self) {
        let v = self.value.load(Ordering::Relaxed);
        self.value.store(v & !LOCK_BIT, Ordering::Release);
    }
}

/// Shadow leaf: version + payload cell, written only under lock.
struct LoomLeaf {
    version: LoomVersionWord,
    payload: AtomicU64,
}

impl LoomLeaf {
    fn new() -> Self {
        Self {
            version: LoomVersionWord::new(INCREMENT),
            payload: AtomicU64::new(0),
        }
    }

    fn publish(&self, value: u64) {
        self.version.lock();
        self.payload.store(value, Ordering::Release);
        let v = self.version.value.load(Ordering::Relaxed);
        self.version.set_version((v + INCREMENT) | VALID_BIT);
        self.version.unlock();
    }

    /// The atomic-read loop: versions must match and be unlocked.
    fn read(&self) -> (u64, u64) {
        loop {
            let v1 = self.version.load();
            if v1 & LOCK_BIT != 0 {
                thread::yield_now();
                continue;
            }
            let value = self.payload.load(Ordering::Acquire);
            let v2 = self.version.load();
            if v1 == v2 {
                return (v1, value);
            }
            thread::yield_now();
        }
    }
}

#[test]
fn loom_lock_is_mutually_exclusive() {
    loom::model(|| {
        let word = Arc::new(LoomVersionWord::new(INCREMENT));
        let token = Arc::new(AtomicU64::new(0));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let word = Arc::clone(&word);
                let token = Arc::clone(&token);
                thread::spawn(move || {
                    word.lock();
                    // Non-atomic-style read-modify-write: only safe if the
                    // lock excludes the other thread.
                    let t = token.load(Ordering::Relaxed);
                    token.store(t + 1, Ordering::Relaxed);
                    let v = word.value.load(Ordering::Relaxed);
                    word.set_version(v + INCREMENT);
                    word.unlock();
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(token.load(Ordering::Relaxed), 2);
        assert_eq!(word.load() & !LOCK_BIT, 3 * INCREMENT);
    });
}

#[test]
fn loom_reader_never_observes_torn_write() {
    loom::model(|| {
        let leaf = Arc::new(LoomLeaf::new());

        let writer = {
            let leaf = Arc::clone(&leaf);
            thread::spawn(move || {
                leaf.publish(7);
            })
        };

        let reader = {
            let leaf = Arc::clone(&leaf);
            thread::spawn(move || {
                let (v, value) = leaf.read();
                // Either the pre-publish state or the complete post-publish
                // state; never VALID with a stale payload.
                if v & VALID_BIT != 0 {
                    assert_eq!(value, 7);
                } else {
                    assert_eq!(value, 0);
                }
            })
        };

        writer.join().unwrap();
        reader.join().unwrap();
    });
}

#[test]
fn loom_two_writers_total_order() {
    loom::model(|| {
        let leaf = Arc::new(LoomLeaf::new());

        let handles: Vec<_> = [11u64, 22u64]
            .into_iter()
            .map(|value| {
                let leaf = Arc::clone(&leaf);
                thread::spawn(move || leaf.publish(value))
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        let (v, value) = leaf.read();
        assert!(v & VALID_BIT != 0);
        assert!(value == 11 || value == 22);
        // Both publishes landed: counter advanced twice.
        assert_eq!(v & !(LOCK_BIT | VALID_BIT), 3 * INCREMENT);
    });
}
