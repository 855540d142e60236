//! Internal routing node.
//!
//! An [`InternalNode`] covers one nibble of the key: a [`FANOUT`]-wide array
//! of child pointers plus its own [`VersionWord`]. Children are type-erased
//! `*mut u8`; the kind is fixed by depth (terminal depth holds leaves, every
//! other depth holds internal nodes), so traversal casts without a runtime
//! tag.
//!
//! The node version is bumped under the node lock whenever a child slot goes
//! from null to non-null. Transactions that observed the slot empty recorded
//! the pre-bump version as a read, which is what makes phantom inserts
//! detectable at validation.

use std::fmt as StdFmt;
use std::marker::PhantomData;
use std::ptr as StdPtr;
use std::sync::atomic::AtomicPtr;

use crate::key::FANOUT;
use crate::ordering::{READ_ORD, WRITE_ORD};
use crate::version::VersionWord;

/// An internal node: one tree level of fanout.
pub struct InternalNode<V> {
    version: VersionWord,

    /// Child pointers, indexed by nibble. Null means empty. Cast to
    /// `InternalNode<V>` or `VersionedValue<V>` based on depth.
    children: [AtomicPtr<u8>; FANOUT],

    /// Weak back-reference to the parent, kept for range iteration support.
    /// Never dereferenced by get/put/remove.
    parent: AtomicPtr<u8>,

    /// This node's slot index in its parent.
    parent_index: u8,

    _marker: PhantomData<V>,
}

// SAFETY: children are published only under the node lock with Release
// stores and read with Acquire loads; the parent back-reference is never
// dereferenced concurrently.
unsafe impl<V: Send + Sync> Send for InternalNode<V> {}
unsafe impl<V: Send + Sync> Sync for InternalNode<V> {}

impl<V> InternalNode<V> {
    /// Create a detached node (used for the embedded root).
    #[must_use]
    pub(crate) fn root() -> Self {
        Self {
            version: VersionWord::new(),
            children: std::array::from_fn(|_| AtomicPtr::new(StdPtr::null_mut())),
            parent: AtomicPtr::new(StdPtr::null_mut()),
            parent_index: 0,
            _marker: PhantomData,
        }
    }

    /// Allocate a child node below `parent` at `parent_index`.
    #[must_use]
    pub(crate) fn new(parent: *mut u8, parent_index: u8) -> Box<Self> {
        Box::new(Self {
            version: VersionWord::new(),
            children: std::array::from_fn(|_| AtomicPtr::new(StdPtr::null_mut())),
            parent: AtomicPtr::new(parent),
            parent_index,
            _marker: PhantomData,
        })
    }

    /// The node's version word.
    #[inline]
    #[must_use]
    pub fn version(&self) -> &VersionWord {
        &self.version
    }

    /// Load the child pointer for `nibble`.
    #[inline]
    #[must_use]
    pub(crate) fn child(&self, nibble: usize) -> *mut u8 {
        self.children[nibble].load(READ_ORD)
    }

    /// Publish a child pointer.
    ///
    /// The caller must hold the node lock and must have bumped the version
    /// first so that observers of the old (empty) slot fail validation.
    pub(crate) fn store_child(&self, nibble: usize, child: *mut u8) {
        debug_assert!(self.version.is_locked());
        self.children[nibble].store(child, WRITE_ORD);
    }

    /// Raw parent pointer. Kept for range iteration support; tree operations
    /// never dereference it.
    #[inline]
    #[must_use]
    pub fn parent(&self) -> *mut u8 {
        self.parent.load(READ_ORD)
    }

    /// This node's slot index in its parent. Iterator support, like
    /// [`parent`](Self::parent).
    #[inline]
    #[must_use]
    pub fn parent_index(&self) -> u8 {
        self.parent_index
    }
}

impl<V> StdFmt::Debug for InternalNode<V> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        let occupied: usize = (0..FANOUT).filter(|&i| !self.child(i).is_null()).count();
        f.debug_struct("InternalNode")
            .field("occupied", &occupied)
            .field("parent_index", &self.parent_index)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::{INCREMENT, VersionWord};

    #[test]
    fn test_root_starts_empty() {
        let node: InternalNode<u64> = InternalNode::root();
        for i in 0..FANOUT {
            assert!(node.child(i).is_null());
        }
        assert_eq!(VersionWord::counter(node.version().load()), INCREMENT);
    }

    #[test]
    fn test_publish_child_visible() {
        let node: InternalNode<u64> = InternalNode::root();
        let child: Box<InternalNode<u64>> = InternalNode::new(StdPtr::null_mut(), 3);
        let child_ptr: *mut u8 = Box::into_raw(child).cast();

        {
            let guard = node.version().lock_guard();
            guard.bump();
            node.store_child(3, child_ptr);
        }

        assert_eq!(node.child(3), child_ptr);
        assert!(node.child(4).is_null());

        // SAFETY: child_ptr was just created from Box::into_raw.
        unsafe { drop(Box::from_raw(child_ptr.cast::<InternalNode<u64>>())) };
    }

    #[test]
    fn test_child_records_its_slot() {
        let parent: InternalNode<u64> = InternalNode::root();
        let parent_ptr: *mut u8 = StdPtr::from_ref(&parent).cast_mut().cast();
        let child: Box<InternalNode<u64>> = InternalNode::new(parent_ptr, 7);
        assert_eq!(child.parent_index(), 7);
    }
}
