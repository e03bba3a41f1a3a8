//! # mvtreap
//!
//! A persistent ordered map from byte strings to byte strings, built on a
//! randomized treap, with O(1) snapshots and node recycling for bulk
//! updates.
//!
//! ## Overview
//!
//! [`Treap`] keeps keys in ascending lexicographic byte order and supports
//! lookup, insertion, deletion, and ordered traversal in O(log n) expected
//! time. Every write copies only the path it touches and shares the rest of
//! the tree with the previous version, so:
//!
//! - old handles remain valid, fully readable versions forever;
//! - cloning a handle is an O(1) snapshot;
//! - publishing a new version to other threads is a pointer swap away.
//!
//! For write-heavy phases the `*_mut` variants update a handle in place and
//! recycle the nodes each write abandons through a process-wide pool. A
//! [snapshot record](SnapRecord) pins a version's nodes: while it is live,
//! nothing it could observe is recycled; nodes that must wait are parked on
//! the oldest live record and pooled when it is released.
//!
//! ## Examples
//!
//! Persistent updates and structural sharing:
//!
//! ```rust
//! use mvtreap::Treap;
//!
//! let base = Treap::new().insert(b"b", b"2").insert(b"a", b"1");
//! let updated = base.insert(b"a", b"one");
//!
//! assert_eq!(base.get(b"a"), Some(&b"1"[..]));
//! assert_eq!(updated.get(b"a"), Some(&b"one"[..]));
//! ```
//!
//! Bulk updates with a pinned snapshot:
//!
//! ```rust
//! use mvtreap::Treap;
//!
//! let mut live = Treap::new().insert(b"a", b"1");
//! let view = live.clone();
//! let record = live.snapshot();
//!
//! live.insert_mut(b"a", b"2", None);
//! live.insert_mut(b"d", b"4", None);
//!
//! // The snapshot still reads the old version.
//! assert_eq!(view.get(b"a"), Some(&b"1"[..]));
//! assert_eq!(live.get(b"a"), Some(&b"2"[..]));
//!
//! drop(view);
//! record.release();
//! ```
//!
//! ## Concurrency
//!
//! Handles are `Send + Sync`; unlimited readers may share one handle
//! without coordination. Writers are the caller's to serialize: keep each
//! version line behind a single writer and publish new versions with an
//! atomic swap.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod iter;
mod node;
mod pool;
mod snapshot;
mod stack;
mod treap;

pub use iter::TreapIter;
pub use pool::{pool_stats, PoolStats};
pub use snapshot::SnapRecord;
pub use treap::Treap;
