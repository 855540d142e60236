//! # txradix
//!
//! A transactional, concurrent radix tree.
//!
//! The tree maps fixed-width keys to values and participates in an
//! optimistic software-transactional-memory protocol. Callers either operate
//! directly (`get`/`put`/`remove`, single-op atomicity) or inside a
//! multi-operation [`Transaction`] (`trans_get`/`trans_put`/`trans_remove`)
//! that commits atomically alongside other transactional objects.
//!
//! ## Design
//!
//! - Keys are decomposed into SPAN-bit nibbles by an order-preserving
//!   [`KeyTransformer`]; each nibble indexes one [`FANOUT`]-wide level.
//!   No path compression.
//! - Every node and leaf carries a [`VersionWord`]: a spin lock, VALID and
//!   INSERT flags, and a monotonic counter packed into one atomic integer.
//! - Readers are wait-free: traversal is lock-free and the leaf read loop
//!   validates a `(version, value)` snapshot instead of locking.
//! - Writers lock one word at a time. Publishing a child bumps the parent's
//!   version first, which is what lets commit validation catch phantom
//!   inserts behind a negative lookup.
//! - The commit protocol is two-phase: lock the write set, validate every
//!   recorded read, install, unlock ([`CommitParticipant`]).
//!
//! ## Example
//!
//! ```rust
//! use txradix::{RadixTree, Transaction};
//!
//! let tree: RadixTree<u64, u64> = RadixTree::new();
//! tree.put(&1, 10);
//!
//! let mut txn = Transaction::new();
//! let seen = tree.trans_get(&mut txn, &1)?;
//! assert_eq!(seen.as_deref(), Some(&10));
//! tree.trans_put(&mut txn, &2, 20);
//! txn.commit()?;
//!
//! assert_eq!(tree.get(&2).as_deref(), Some(&20));
//! # Ok::<(), txradix::Aborted>(())
//! ```
//!
//! ## Retry loops
//!
//! An aborted transaction reports [`Aborted`]; retry policy belongs to the
//! caller:
//!
//! ```rust
//! use txradix::{RadixTree, Transaction};
//!
//! let tree: RadixTree<u64, u64> = RadixTree::new();
//! loop {
//!     let mut txn = Transaction::new();
//!     let Ok(current) = tree.trans_get(&mut txn, &1) else { continue };
//!     let next = current.as_deref().copied().unwrap_or(0) + 1;
//!     tree.trans_put(&mut txn, &1, next);
//!     if txn.commit().is_ok() {
//!         break;
//!     }
//! }
//! assert_eq!(tree.get(&1).as_deref(), Some(&1));
//! ```

pub mod key;
pub mod leaf;
pub mod node;
pub mod ordering;
pub mod stm;
pub mod tree;
pub mod version;

pub(crate) mod tracing_helpers;

pub use key::{FANOUT, KeyTransformer, SPAN, U64KeyTransformer};
pub use stm::{Aborted, CommitParticipant, ItemFlags, TransItem, Transaction, TxnResult, USER0_BIT};
pub use tree::RadixTree;
pub use version::VersionWord;
