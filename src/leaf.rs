//! Versioned value leaf.
//!
//! A [`VersionedValue`] stores one value payload next to a [`VersionWord`].
//! Reads are wait-free: the atomic-read loop loads the version, the payload
//! pointer, and the version again, accepting only an unlocked, unchanged
//! pair. Writes happen under the leaf lock and publish a bumped version.
//!
//! # Payload lifetime
//!
//! The payload is an `Arc<V>` held as a raw pointer (null until the first
//! publish). A reader may hold the raw pointer between the load and the Arc
//! clone, so a displaced payload cannot be dropped immediately; writers hand
//! it to the tree's [`seize::Collector`] instead and readers pin a guard for
//! the duration of the read. The clone itself happens only after version
//! validation, so the cloned Arc always pairs with the version returned.
//!
//! Leaves themselves are never freed while the tree lives. A removed leaf
//! stays resident with VALID clear so that re-insertion reuses it and
//! pointers held by in-flight transactions stay valid.

use std::sync::Arc;
use std::sync::atomic::AtomicPtr;

use seize::{Collector, LocalGuard};

use crate::ordering::{READ_ORD, WRITE_ORD};
use crate::version::VersionWord;

/// One value slot plus its version word.
#[derive(Debug)]
pub struct VersionedValue<V> {
    version: VersionWord,
    value: AtomicPtr<V>,
}

// SAFETY: the payload pointer is published only under the leaf lock and read
// through the validated snapshot protocol; V crosses threads as Arc<V>.
unsafe impl<V: Send + Sync> Send for VersionedValue<V> {}
unsafe impl<V: Send + Sync> Sync for VersionedValue<V> {}

impl<V> VersionedValue<V> {
    /// Allocate a fresh tentative leaf: INSERT set, VALID clear, no payload.
    #[must_use]
    pub(crate) fn new_tentative() -> Box<Self> {
        Box::new(Self {
            version: VersionWord::tentative(),
            value: AtomicPtr::new(std::ptr::null_mut()),
        })
    }

    /// The leaf's version word.
    #[inline]
    #[must_use]
    pub fn version(&self) -> &VersionWord {
        &self.version
    }

    /// The atomic-read loop: returns a consistent `(version, payload)` pair.
    ///
    /// Spins while a writer holds the lock or slips between the two version
    /// loads; each retry corresponds to a completed concurrent write, so the
    /// loop is wait-free under a bounded writer rate. The payload is `None`
    /// when the consistent version lacks VALID.
    ///
    /// The guard keeps a concurrently displaced payload alive until the
    /// clone-after-validate completes.
    pub fn read(&self, _guard: &LocalGuard<'_>) -> (u64, Option<Arc<V>>) {
        loop {
            let v1: u64 = self.version.load();
            if VersionWord::locked(v1) {
                std::hint::spin_loop();
                continue;
            }

            let ptr: *mut V = self.value.load(READ_ORD);
            let v2: u64 = self.version.load();

            if v1 != v2 {
                continue;
            }

            if !VersionWord::valid(v1) {
                return (v1, None);
            }

            // VALID implies the payload was published before this version.
            debug_assert!(!ptr.is_null());

            // SAFETY: the version pair validated, so `ptr` was the current
            // payload at v1; the guard defers its retirement, so the Arc
            // allocation is still live here.
            let arc: Arc<V> = unsafe {
                Arc::increment_strong_count(ptr);
                Arc::from_raw(ptr)
            };
            return (v1, Some(arc));
        }
    }

    /// Swap in a new payload pointer, returning the displaced one.
    ///
    /// The caller must hold the leaf lock and retire the returned pointer
    /// through the tree's collector (unless null).
    pub(crate) fn swap_value(&self, new: *mut V) -> *mut V {
        debug_assert!(self.version.is_locked());
        self.value.swap(new, WRITE_ORD)
    }
}

impl<V> Drop for VersionedValue<V> {
    fn drop(&mut self) {
        let ptr: *mut V = *self.value.get_mut();
        if !ptr.is_null() {
            // SAFETY: the leaf owns the last published payload; the tree is
            // being torn down, so no reader can race this drop.
            unsafe { drop(Arc::from_raw(ptr)) };
        }
    }
}

/// Reclaim a displaced `Arc<V>` payload (seize callback).
///
/// # Safety
///
/// - `ptr` must come from `Arc::into_raw` and carry the slot's ownership of
///   one strong count.
/// - Must only be called once seize determines no guard can still reach it.
pub(crate) unsafe fn reclaim_value<V>(ptr: *mut V, _collector: &Collector) {
    // SAFETY: caller guarantees ptr provenance and that readers are done.
    unsafe { drop(Arc::from_raw(ptr)) };
}
