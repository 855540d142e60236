//! Minimal optimistic STM runtime.
//!
//! This module carries the transaction side of the protocol: per-transaction
//! item records ([`TransItem`]), the participant capability set
//! ([`CommitParticipant`]), and the two-phase commit driver
//! ([`Transaction::commit`]). It deliberately carries no scheduling policy;
//! an aborted transaction is reported as [`Aborted`] and retried by the
//! caller's loop.
//!
//! # Protocol
//!
//! During execution a participant registers items keyed on a pointer of its
//! choosing (a leaf or node address), attaching read versions, a write
//! payload, and user flags. At commit:
//!
//! ```text
//! 1. lock    - every item with write intent, in ascending key order
//! 2. check   - every item; all must validate before any install
//! 3. install - every item with write intent (only if all checks passed)
//! 4. unlock  - every locked item
//! ```
//!
//! The ascending lock order gives concurrent committers a total order over
//! contended items, so the spin locks cannot deadlock. Read-only items are
//! never locked or installed.
//!
//! # Lifetimes
//!
//! A [`Transaction<'t, V>`] borrows every participant it touches for `'t`,
//! so the participants (and the pointers items are keyed on) provably
//! outlive the transaction.

use std::fmt as StdFmt;
use std::sync::Arc;

use crate::tracing_helpers::debug_log;

// ============================================================================
//  Aborted
// ============================================================================

/// The transaction observed or produced an inconsistency and must be retried.
///
/// This is the only user-visible failure of the protocol: raised eagerly when
/// a stale read is detected during execution, or at commit when validation
/// fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aborted;

impl StdFmt::Display for Aborted {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        write!(f, "transaction must be retried")
    }
}

impl std::error::Error for Aborted {}

/// Result alias for transactional operations.
pub type TxnResult<T> = Result<T, Aborted>;

// ============================================================================
//  Flags
// ============================================================================

/// Per-item user flag bits.
pub type ItemFlags = u8;

/// Base of the user flag space. Participants derive their flags by shifting
/// this bit; the radix tree consumes three consecutive bits.
pub const USER0_BIT: ItemFlags = 1 << 0;

// ============================================================================
//  CommitParticipant
// ============================================================================

/// The commit-time capability set of a transactional object.
///
/// Implementations cast [`TransItem::key`] back to whatever pointer they
/// registered the item under.
pub trait CommitParticipant<V> {
    /// Phase 1: acquire the item's lock. Called only for write items.
    fn lock(&self, item: &TransItem<'_, V>);

    /// Phase 2: validate the item's recorded read against current state.
    /// Called for every item; must not mutate anything.
    fn check(&self, item: &TransItem<'_, V>, txn: &Transaction<'_, V>) -> bool;

    /// Phase 3: apply the item's write. Called only for write items, and
    /// only after every item validated.
    fn install(&self, item: &TransItem<'_, V>, txn: &Transaction<'_, V>);

    /// Phase 4: release the item's lock. Called only for write items.
    fn unlock(&self, item: &TransItem<'_, V>);
}

// ============================================================================
//  TransItem
// ============================================================================

/// One item in a transaction's read/write set.
///
/// Keyed on `(participant, pointer)`; holds at most one recorded read
/// version, at most one write payload, and a small user flag bitfield.
pub struct TransItem<'t, V> {
    owner: &'t dyn CommitParticipant<V>,
    key: *const (),
    read_version: Option<u64>,
    write_value: Option<Arc<V>>,
    write_intent: bool,
    flags: ItemFlags,
}

impl<'t, V> TransItem<'t, V> {
    fn new(owner: &'t dyn CommitParticipant<V>, key: *const ()) -> Self {
        Self {
            owner,
            key,
            read_version: None,
            write_value: None,
            write_intent: false,
            flags: 0,
        }
    }

    /// The pointer this item was registered under.
    #[inline]
    #[must_use]
    pub fn key(&self) -> *const () {
        self.key
    }

    /// Record a read of `version`. A later read of the same item overwrites
    /// the recorded version (the caller validates continuity first).
    pub fn add_read(&mut self, version: u64) {
        self.read_version = Some(version);
    }

    /// Whether a read has been recorded.
    #[inline]
    #[must_use]
    pub fn has_read(&self) -> bool {
        self.read_version.is_some()
    }

    /// The recorded read version, if any.
    #[inline]
    #[must_use]
    pub fn read_version(&self) -> Option<u64> {
        self.read_version
    }

    /// Attach a write payload and mark write intent.
    pub fn add_write(&mut self, value: Arc<V>) {
        self.write_value = Some(value);
        self.write_intent = true;
    }

    /// Mark write intent without a payload (a blind state change such as a
    /// remove), discarding any payload attached earlier.
    pub fn mark_write(&mut self) {
        self.write_value = None;
        self.write_intent = true;
    }

    /// Whether this item is part of the write set.
    #[inline]
    #[must_use]
    pub fn has_write(&self) -> bool {
        self.write_intent
    }

    /// The pending write payload, if any.
    #[inline]
    #[must_use]
    pub fn write_value(&self) -> Option<&Arc<V>> {
        self.write_value.as_ref()
    }

    /// Set user flag bits.
    pub fn add_flags(&mut self, flags: ItemFlags) {
        self.flags |= flags;
    }

    /// Clear user flag bits.
    pub fn clear_flags(&mut self, flags: ItemFlags) {
        self.flags &= !flags;
    }

    /// Test whether all of `flags` are set.
    #[inline]
    #[must_use]
    pub fn has_flags(&self, flags: ItemFlags) -> bool {
        self.flags & flags == flags
    }

    /// The raw flag bitfield.
    #[inline]
    #[must_use]
    pub fn flags(&self) -> ItemFlags {
        self.flags
    }
}

impl<V> StdFmt::Debug for TransItem<'_, V> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("TransItem")
            .field("key", &self.key)
            .field("read_version", &self.read_version)
            .field("write_intent", &self.write_intent)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

// ============================================================================
//  Transaction
// ============================================================================

/// An open transaction: an ordered set of items plus the commit driver.
pub struct Transaction<'t, V> {
    items: Vec<TransItem<'t, V>>,
}

impl<V> Default for Transaction<'_, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> StdFmt::Debug for Transaction<'_, V> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("Transaction")
            .field("items", &self.items)
            .finish()
    }
}

impl<'t, V> Transaction<'t, V> {
    /// Start an empty transaction.
    #[must_use]
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Find or create the item for `(owner, key)`.
    pub fn item(
        &mut self,
        owner: &'t dyn CommitParticipant<V>,
        key: *const (),
    ) -> &mut TransItem<'t, V> {
        let found: Option<usize> = self.items.iter().position(|it| {
            std::ptr::addr_eq(std::ptr::from_ref(it.owner), std::ptr::from_ref(owner))
                && std::ptr::eq(it.key, key)
        });
        let pos: usize = match found {
            Some(pos) => pos,
            None => {
                self.items.push(TransItem::new(owner, key));
                self.items.len() - 1
            }
        };
        &mut self.items[pos]
    }

    /// Number of registered items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the transaction touched nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drive the two-phase commit.
    ///
    /// On success every write installed atomically with respect to each
    /// item's lock. On [`Aborted`], nothing was installed and every acquired
    /// lock has been released; the caller rebuilds the transaction and
    /// retries.
    pub fn commit(self) -> TxnResult<()> {
        // Lock phase: write set in ascending key order.
        let mut write_set: Vec<usize> = (0..self.items.len())
            .filter(|&i| self.items[i].has_write())
            .collect();
        write_set.sort_by_key(|&i| self.items[i].key.addr());

        for &i in &write_set {
            let item = &self.items[i];
            item.owner.lock(item);
        }

        // Check phase: every item, reads and writes alike.
        let ok: bool = self
            .items
            .iter()
            .all(|item| item.owner.check(item, &self));

        // Install phase: only when the whole read set validated.
        if ok {
            for &i in &write_set {
                let item = &self.items[i];
                item.owner.install(item, &self);
            }
        } else {
            debug_log!("commit validation failed, releasing {} locks", write_set.len());
        }

        for &i in &write_set {
            let item = &self.items[i];
            item.owner.unlock(item);
        }

        if ok { Ok(()) } else { Err(Aborted) }
    }

    /// Discard the transaction without installing anything.
    ///
    /// Tentative leaves created during execution persist in their trees;
    /// they are invisible to readers and bounded by the key space.
    pub fn abort(self) {
        drop(self);
    }
}

// ============================================================================
//  Tests
// ============================================================================
