//! Process-wide node pool.
//!
//! Writes allocate a node for every cloned ancestor, so bulk-update
//! workloads churn through allocations quickly. The pool keeps a bounded
//! freelist of node allocations that are provably unshared and hands them
//! back to subsequent writes, overwriting them in place.
//!
//! Safety of reuse rests on uniqueness: an allocation enters the freelist
//! only while its reference count is exactly one, and it is overwritten only
//! through [`Arc::get_mut`], which re-checks that uniqueness. A node that
//! any container or snapshot can still reach is therefore impossible to
//! recycle, regardless of what the caller asks for.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::node::{NodeRef, TreapNode};

/// Upper bound on spare allocations retained by the freelist. Releases
/// beyond the bound simply drop the node.
const FREELIST_CAPACITY: usize = 1024;

/// Counters describing the pool's activity since process start.
///
/// The counters are cumulative and monotone; callers interested in a single
/// workload should difference two snapshots taken around it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Nodes created with a fresh heap allocation.
    pub allocated: u64,
    /// Nodes served by overwriting a pooled allocation.
    pub reused: u64,
    /// Released nodes retained on the freelist.
    pub pooled: u64,
    /// Released nodes that were dropped instead, either because they were
    /// still shared or because the freelist was full.
    pub dropped: u64,
}

/// A freelist of uniquely-owned node allocations.
pub(crate) struct NodePool {
    freelist: Mutex<Vec<NodeRef>>,
    allocated: AtomicU64,
    reused: AtomicU64,
    pooled: AtomicU64,
    dropped: AtomicU64,
}

static POOL: NodePool = NodePool::new();

/// Returns the process-wide pool.
pub(crate) fn pool() -> &'static NodePool {
    &POOL
}

/// Returns a snapshot of the process-wide pool counters.
#[must_use]
pub fn pool_stats() -> PoolStats {
    POOL.stats()
}

impl NodePool {
    pub(crate) const fn new() -> Self {
        Self {
            freelist: Mutex::new(Vec::new()),
            allocated: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            pooled: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Wraps `node` in a shared pointer, reusing a pooled allocation when
    /// one is available.
    pub(crate) fn acquire(&self, node: TreapNode) -> NodeRef {
        if let Some(mut spare) = self.freelist.lock().pop() {
            // Entries are unshared by construction, but re-check rather
            // than assume.
            if let Some(slot) = Arc::get_mut(&mut spare) {
                *slot = node;
                self.reused.fetch_add(1, Ordering::Relaxed);
                return spare;
            }
        }
        self.allocated.fetch_add(1, Ordering::Relaxed);
        Arc::new(node)
    }

    /// Offers `node` back to the pool.
    ///
    /// The allocation is retained only if nothing else references it; the
    /// child links are scrubbed first so a pooled slot never keeps a
    /// subtree alive.
    pub(crate) fn release(&self, mut node: NodeRef) {
        if let Some(slot) = Arc::get_mut(&mut node) {
            slot.left = None;
            slot.right = None;
            let mut freelist = self.freelist.lock();
            if freelist.len() < FREELIST_CAPACITY {
                freelist.push(node);
                self.pooled.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the cumulative counters.
    pub(crate) fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.allocated.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            pooled: self.pooled.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}
