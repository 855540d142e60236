//! Transactional entry points and commit hooks for [`RadixTree`].
//!
//! Each transactional call registers a [`TransItem`] keyed on either a leaf
//! pointer (the path was complete) or an internal-node pointer (the lookup
//! stopped at an empty slot). Three user flag bits partition the item space:
//!
//! - `PUT` / `REMOVE` - mutually exclusive write tags on leaf items.
//! - `EMPTY_OBSERVED` - the item records an internal node's version taken
//!   when a lookup found the next slot empty. A racing inserter bumps that
//!   version while publishing, so validation catches the phantom.
//!
//! `trans_remove` of an absent key also records `EMPTY_OBSERVED` rather than
//! being a pure blind write; without the recorded read, a concurrent
//! insert-then-remove could commit out of order.
//!
//! # Known limitation
//!
//! A transaction that observes a slot empty and then fills that same slot
//! itself (`trans_get` absent followed by `trans_put` of the key) fails its
//! own `EMPTY_OBSERVED` validation at commit: `insert_nodes` bumps the node
//! version the recorded read no longer matches. Such transactions abort and
//! succeed on retry, when the lookup finds the (tentative) leaf instead.

use std::sync::Arc;

use crate::key::KeyTransformer;
use crate::leaf::VersionedValue;
use crate::node::InternalNode;
use crate::stm::{
    Aborted, CommitParticipant, ItemFlags, TransItem, Transaction, TxnResult, USER0_BIT,
};
use crate::tracing_helpers::{debug_log, trace_log};
use crate::version::{INCREMENT, INSERT_BIT, VALID_BIT, VersionWord};

use super::{Lookup, RadixTree};

/// Write tag: install stores the payload and sets VALID.
pub(crate) const ITEM_PUT_BIT: ItemFlags = USER0_BIT;

/// Write tag: install clears VALID.
pub(crate) const ITEM_REMOVE_BIT: ItemFlags = USER0_BIT << 1;

/// The item records an internal node observed with an empty slot.
pub(crate) const ITEM_EMPTY_BIT: ItemFlags = USER0_BIT << 2;

/// Erase a reference into the item key space.
fn ptr_key<P>(p: &P) -> *const () {
    std::ptr::from_ref(p).cast()
}

impl<K, V, T: KeyTransformer<K>> RadixTree<K, V, T> {
    /// Transactional lookup.
    ///
    /// Reports `Ok(None)` for absent keys (registering the phantom read) and
    /// `Err(Aborted)` when the leaf's version no longer matches a read this
    /// transaction recorded earlier.
    pub fn trans_get<'t>(
        &'t self,
        txn: &mut Transaction<'t, V>,
        key: &K,
    ) -> TxnResult<Option<Arc<V>>> {
        let nibbles = self.transformer.transform(key);
        match self.lookup(nibbles.as_ref()) {
            Lookup::Vacant(node) => {
                // Absent: record the node's version to detect inserts.
                let version: u64 = node.version().load();
                let item = txn.item(self, ptr_key(node));
                item.add_read(version);
                item.add_flags(ITEM_EMPTY_BIT);
                Ok(None)
            }

            Lookup::Leaf(leaf) => {
                let leaf_key: *const () = ptr_key(leaf);

                {
                    let item = txn.item(self, leaf_key);
                    if item.has_write() {
                        // This transaction's own pending write wins.
                        if item.has_flags(ITEM_REMOVE_BIT) {
                            return Ok(None);
                        }
                        return Ok(item.write_value().cloned());
                    }

                    if let Some(recorded) = item.read_version() {
                        if !VersionWord::same_version(recorded, leaf.version().load()) {
                            // The version moved since our last read; this
                            // transaction can no longer validate.
                            debug_log!("stale leaf read, eager abort");
                            return Err(Aborted);
                        }
                    }
                }

                let guard = self.collector().enter();
                let (version, value) = leaf.read(&guard);
                drop(guard);

                let item = txn.item(self, leaf_key);
                item.add_read(version);

                if VersionWord::valid(version) {
                    Ok(value)
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Transactional insert or overwrite.
    ///
    /// Creates the path eagerly; even if this transaction aborts, the fresh
    /// tentative leaf is invisible to readers and the node version bumps are
    /// legitimate observed changes.
    pub fn trans_put<'t>(&'t self, txn: &mut Transaction<'t, V>, key: &K, value: V) {
        let nibbles = self.transformer.transform(key);
        let leaf: &VersionedValue<V> = self.insert_nodes(nibbles.as_ref());

        let item = txn.item(self, ptr_key(leaf));
        item.add_write(Arc::new(value));
        item.clear_flags(ITEM_REMOVE_BIT);
        item.add_flags(ITEM_PUT_BIT);
    }

    /// Transactional remove.
    ///
    /// For an absent key this records the same phantom read as a failed
    /// `trans_get`, so a racing inserter invalidates this transaction.
    pub fn trans_remove<'t>(&'t self, txn: &mut Transaction<'t, V>, key: &K) {
        let nibbles = self.transformer.transform(key);
        match self.lookup(nibbles.as_ref()) {
            Lookup::Vacant(node) => {
                let version: u64 = node.version().load();
                let item = txn.item(self, ptr_key(node));
                item.add_read(version);
                item.add_flags(ITEM_EMPTY_BIT);
            }

            Lookup::Leaf(leaf) => {
                let item = txn.item(self, ptr_key(leaf));
                item.mark_write();
                item.clear_flags(ITEM_PUT_BIT);
                item.add_flags(ITEM_REMOVE_BIT);
            }
        }
    }
}

// ============================================================================
//  Commit hooks
// ============================================================================

impl<K, V, T: KeyTransformer<K>> CommitParticipant<V> for RadixTree<K, V, T> {
    fn lock(&self, item: &TransItem<'_, V>) {
        // SAFETY: write items are keyed on leaves of this tree, which live
        // as long as the tree; the transaction borrows the tree.
        let leaf: &VersionedValue<V> = unsafe { &*item.key().cast() };
        leaf.version().lock();
    }

    fn check(&self, item: &TransItem<'_, V>, _txn: &Transaction<'_, V>) -> bool {
        let Some(recorded) = item.read_version() else {
            // Blind write: nothing to validate.
            return true;
        };

        let current: u64 = if item.has_flags(ITEM_EMPTY_BIT) {
            // SAFETY: EMPTY items are keyed on internal nodes of this tree.
            let node: &InternalNode<V> = unsafe { &*item.key().cast() };
            node.version().load()
        } else {
            // SAFETY: leaf items are keyed on leaves of this tree.
            let leaf: &VersionedValue<V> = unsafe { &*item.key().cast() };
            leaf.version().load()
        };

        let ok: bool = VersionWord::same_version(recorded, current);
        if !ok {
            debug_log!(recorded, current, "commit validation mismatch");
        }
        ok
    }

    fn install(&self, item: &TransItem<'_, V>, _txn: &Transaction<'_, V>) {
        // SAFETY: write items are keyed on leaves of this tree; the lock
        // hook already acquired this leaf's lock.
        let leaf: &VersionedValue<V> = unsafe { &*item.key().cast() };

        // The locked snapshot carries LOCK through set_version; unlock
        // clears it afterwards.
        let mut new_ver: u64 = leaf.version().load() + INCREMENT;

        if item.has_flags(ITEM_PUT_BIT) {
            new_ver = (new_ver | VALID_BIT) & !INSERT_BIT;
            if let Some(value) = item.write_value() {
                let new: *mut V = Arc::into_raw(Arc::clone(value)).cast_mut();
                let old: *mut V = leaf.swap_value(new);
                self.retire_value(old);
            }
        } else if item.has_flags(ITEM_REMOVE_BIT) {
            new_ver &= !(VALID_BIT | INSERT_BIT);
        }

        leaf.version().set_version(new_ver);
        trace_log!(flags = item.flags(), "installed");
    }

    fn unlock(&self, item: &TransItem<'_, V>) {
        // SAFETY: same keying as `lock`.
        let leaf: &VersionedValue<V> = unsafe { &*item.key().cast() };
        leaf.version().unlock();
    }
}

// ============================================================================
//  Tests
// ============================================================================
