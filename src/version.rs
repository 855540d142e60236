//! Packed version word for optimistic concurrency control.
//!
//! [`VersionWord`] combines a spin lock, two state flags, and a monotonic
//! commit counter in a single `u64`. Readers validate optimistically against
//! a snapshot; writers acquire the lock bit and publish a bumped counter.
//!
//! # Layout
//!
//! Bit 0: `LOCK` | Bit 1: `VALID` | Bit 2: `INSERT` | Bits 3-63: counter
//!
//! - `LOCK` — held by at most one thread; excludes concurrent writers of the
//!   owning node or leaf.
//! - `VALID` — the leaf currently holds a live value; clear means absent or
//!   removed.
//! - `INSERT` — the leaf was freshly allocated and its first write has not
//!   committed yet (tentative).
//! - The counter advances by [`INCREMENT`] on every state change and never
//!   goes backward modulo its width.
//!
//! # Concurrency Model
//!
//! 1. Readers: load a snapshot, perform the read, load again; accept iff the
//!    two snapshots are equal and unlocked ([`VersionWord::same_version`]
//!    masks only the lock bit).
//! 2. Writers: acquire the lock (spin), publish the new state with
//!    [`VersionWord::set_version`], release.
//!
//! # Type-State Pattern
//!
//! Single-operation writers use [`LockGuard`], which proves the lock is held
//! and releases it on drop (panic-safe). The transactional commit path holds
//! locks across separate callback invocations and therefore uses the raw
//! [`VersionWord::lock`] / [`VersionWord::unlock`] pair instead.

use std::marker::PhantomData;
use std::sync::atomic::AtomicU64;

use crate::ordering::{LOCK_FAILURE, LOCK_SUCCESS, READ_ORD, RELAXED, WRITE_ORD};

#[cfg(all(test, loom))]
mod loom_tests;

// ============================================================================
//  Bit Constants
// ============================================================================

/// Lock bit: word is locked for modification.
pub const LOCK_BIT: u64 = 1 << 0;

/// Valid bit: the leaf holds a live, committed value.
pub const VALID_BIT: u64 = 1 << 1;

/// Insert bit (the reserved user bit): the leaf exists but its first write
/// has not committed.
pub const INSERT_BIT: u64 = 1 << 2;

/// Counter step. The counter occupies bits 3..64.
pub const INCREMENT: u64 = 1 << 3;

/// All flag bits below the counter.
const FLAGS_MASK: u64 = LOCK_BIT | VALID_BIT | INSERT_BIT;

// ============================================================================
//  VersionWord
// ============================================================================

/// A versioned spin lock for tree nodes and leaves.
///
/// # Example
///
/// ```rust
/// use txradix::version::VersionWord;
///
/// let v = VersionWord::new();
/// let before = v.load();
///
/// let guard = v.lock_guard();
/// guard.set(guard.value() + txradix::version::INCREMENT);
/// drop(guard);
///
/// assert!(!VersionWord::same_version(before, v.load()));
/// ```
#[derive(Debug)]
pub struct VersionWord {
    value: AtomicU64,
}

impl VersionWord {
    /// Create a version word for an internal node: flags clear, counter at
    /// its first tick.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            value: AtomicU64::new(INCREMENT),
        }
    }

    /// Create a version word for a freshly allocated leaf: tentative
    /// (INSERT set, VALID clear), counter at zero.
    #[must_use]
    pub const fn tentative() -> Self {
        Self {
            value: AtomicU64::new(INSERT_BIT),
        }
    }

    /// Create a version word from a raw value. Test use only.
    #[must_use]
    pub const fn from_value(value: u64) -> Self {
        Self {
            value: AtomicU64::new(value),
        }
    }

    // ========================================================================
    //  Snapshots and flag predicates
    // ========================================================================

    /// Load the current value with Acquire ordering.
    ///
    /// This is the snapshot read of the optimistic protocol; pair it with a
    /// second [`load`](Self::load) and [`same_version`](Self::same_version).
    #[inline]
    #[must_use]
    pub fn load(&self) -> u64 {
        self.value.load(READ_ORD)
    }

    /// Check whether this word is currently locked.
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        Self::locked(self.value.load(RELAXED))
    }

    /// Lock bit test on a snapshot.
    #[inline]
    #[must_use]
    pub const fn locked(v: u64) -> bool {
        v & LOCK_BIT != 0
    }

    /// Valid bit test on a snapshot.
    #[inline]
    #[must_use]
    pub const fn valid(v: u64) -> bool {
        v & VALID_BIT != 0
    }

    /// Insert bit test on a snapshot.
    #[inline]
    #[must_use]
    pub const fn tentative_bit(v: u64) -> bool {
        v & INSERT_BIT != 0
    }

    /// Counter portion of a snapshot.
    #[inline]
    #[must_use]
    pub const fn counter(v: u64) -> u64 {
        v & !FLAGS_MASK
    }

    /// Compare two snapshots, ignoring the lock bit.
    ///
    /// Two versions are "the same" when everything but LOCK is equal: a
    /// concurrent writer merely holding the lock has not yet changed state.
    #[inline]
    #[must_use]
    pub const fn same_version(a: u64, b: u64) -> bool {
        (a ^ b) & !LOCK_BIT == 0
    }

    // ========================================================================
    //  Lock operations
    // ========================================================================

    /// Acquire the lock, spinning until the LOCK bit can be set.
    ///
    /// Acquire-ordered on success. Locking is blocking; contention is never
    /// surfaced to callers.
    pub fn lock(&self) {
        loop {
            let v: u64 = self.value.load(RELAXED);
            if Self::locked(v) {
                std::hint::spin_loop();
                continue;
            }
            if self
                .value
                .compare_exchange_weak(v, v | LOCK_BIT, LOCK_SUCCESS, LOCK_FAILURE)
                .is_ok()
            {
                return;
            }
            std::hint::spin_loop();
        }
    }

    /// Release the lock with a Release store.
    ///
    /// The caller must hold the lock.
    pub fn unlock(&self) {
        let v: u64 = self.value.load(RELAXED);
        debug_assert!(Self::locked(v), "unlock() without holding the lock");
        self.value.store(v & !LOCK_BIT, WRITE_ORD);
    }

    /// Store a new version with Release ordering, preserving the
    /// caller-supplied LOCK state.
    ///
    /// The caller must hold the lock; the value typically derives from the
    /// locked snapshot (`old + INCREMENT` with flags adjusted), so the lock
    /// bit carries through until [`unlock`](Self::unlock).
    pub fn set_version(&self, v: u64) {
        debug_assert!(Self::locked(self.value.load(RELAXED)));
        self.value.store(v, WRITE_ORD);
    }

    /// Advance the counter by one step.
    ///
    /// The caller must hold the lock. Flag bits are unaffected because the
    /// step is aligned above them.
    pub fn increment(&self) {
        let v: u64 = self.value.load(RELAXED);
        debug_assert!(Self::locked(v), "increment() without holding the lock");
        self.value.store(v + INCREMENT, WRITE_ORD);
    }

    /// Acquire the lock and return a guard that releases it on drop.
    #[must_use = "releasing a lock without using the guard is a logic error"]
    pub fn lock_guard(&self) -> LockGuard<'_> {
        self.lock();
        LockGuard {
            version: self,
            _marker: PhantomData,
        }
    }
}

impl Default for VersionWord {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for VersionWord {
    fn clone(&self) -> Self {
        Self {
            value: AtomicU64::new(self.value.load(RELAXED)),
        }
    }
}

// ============================================================================
//  LockGuard (Type-State Pattern)
// ============================================================================

/// Proof that a [`VersionWord`] lock is held.
///
/// Cannot be constructed except through [`VersionWord::lock_guard`]. The lock
/// is released when the guard drops, even during unwinding.
///
/// `PhantomData<*mut ()>` makes the guard `!Send + !Sync`, so it cannot cross
/// the thread that acquired the lock.
#[derive(Debug)]
#[must_use = "releasing a lock without using the guard is a logic error"]
pub struct LockGuard<'a> {
    version: &'a VersionWord,
    _marker: PhantomData<*mut ()>,
}

impl LockGuard<'_> {
    /// Read the locked value. Includes the LOCK bit.
    #[inline]
    #[must_use]
    pub fn value(&self) -> u64 {
        self.version.value.load(RELAXED)
    }

    /// Publish a new version while keeping the lock held.
    ///
    /// The LOCK bit is forced on so a stale flag computation cannot release
    /// the lock early; release happens on drop.
    #[inline]
    pub fn set(&self, v: u64) {
        self.version.set_version(v | LOCK_BIT);
    }

    /// Advance the counter by one step while keeping the lock held.
    #[inline]
    pub fn bump(&self) {
        self.version.increment();
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.version.unlock();
    }
}

// ============================================================================
//  Tests
// ============================================================================
