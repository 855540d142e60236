//! Standard memory orderings for concurrent tree access.
//!
//! These constants keep ordering usage consistent across the crate and make
//! the intent clear at each access point.

use std::sync::atomic::Ordering;

/// Ordering for reading versions and child/value pointers during optimistic
/// traversal. Pairs with writers' Release stores.
pub const READ_ORD: Ordering = Ordering::Acquire;

/// Ordering for publishing versions and pointers under lock.
/// Pairs with readers' Acquire loads.
pub const WRITE_ORD: Ordering = Ordering::Release;

/// Ordering for a successful lock compare-and-swap.
pub const LOCK_SUCCESS: Ordering = Ordering::Acquire;

/// Ordering for a failed lock compare-and-swap.
/// Only needs to observe the current value.
pub const LOCK_FAILURE: Ordering = Ordering::Relaxed;

/// Ordering for loads within a locked region.
/// The lock itself provides the synchronization.
pub const RELAXED: Ordering = Ordering::Relaxed;
