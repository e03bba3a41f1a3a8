//! Snapshot registry and the node-recycle protocol.
//!
//! Every container carries a history identifier; all versions derived from
//! one original share it. Taking a snapshot registers a record stamped with
//! the version's generation in a process-wide table keyed by that history.
//! The in-place write paths consult the table to decide the fate of each
//! node they abandon:
//!
//! - no live record, or the node is newer than every live record's stamp:
//!   the node goes back to the pool immediately;
//! - otherwise the node is parked on the *oldest* live record and pooled
//!   when that record is released. Releases may arrive in any order, but by
//!   the time the oldest record goes away no older one can still reach the
//!   parked nodes.
//!
//! A single mutex guards the whole table; none of the operations holding it
//! can block on anything else.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::node::NodeRef;
use crate::pool::pool;
use crate::stack::ParentStack;

/// Source of history identifiers handed to fresh containers.
static NEXT_HISTORY: AtomicU64 = AtomicU64::new(0);

/// Allocates a history identifier for a fresh container line.
pub(crate) fn next_history() -> u64 {
    NEXT_HISTORY.fetch_add(1, Ordering::Relaxed)
}

/// One outstanding snapshot.
struct RecordEntry {
    history: u64,
    generation: u64,
    /// Nodes whose recycling waits for this record's release.
    deferred: Vec<NodeRef>,
}

struct Registry {
    records: BTreeMap<u64, RecordEntry>,
    next_id: u64,
}

static REGISTRY: Mutex<Registry> = Mutex::new(Registry {
    records: BTreeMap::new(),
    next_id: 0,
});

/// Aggregate view of the live records of one history.
struct LiveSummary {
    count: usize,
    /// Highest generation stamp among the live records.
    max_generation: u64,
    /// Record with the lowest generation stamp; the earliest-registered one
    /// wins ties, so "oldest" is well-defined.
    oldest_id: u64,
    oldest_generation: u64,
}

fn summarize(registry: &Registry, history: u64, excluded: Option<u64>) -> Option<LiveSummary> {
    let mut summary: Option<LiveSummary> = None;
    for (&id, entry) in &registry.records {
        if entry.history != history || Some(id) == excluded {
            continue;
        }
        match summary.as_mut() {
            None => {
                summary = Some(LiveSummary {
                    count: 1,
                    max_generation: entry.generation,
                    oldest_id: id,
                    oldest_generation: entry.generation,
                });
            }
            Some(summary) => {
                summary.count += 1;
                summary.max_generation = summary.max_generation.max(entry.generation);
                if entry.generation < summary.oldest_generation {
                    summary.oldest_id = id;
                    summary.oldest_generation = entry.generation;
                }
            }
        }
    }
    summary
}

/// A live snapshot registration.
///
/// While the record exists, the in-place write paths will not recycle any
/// node whose generation is covered by it. The record releases itself when
/// dropped; [`release`](Self::release) spells that out at call sites.
/// Records are not clonable, so a double release cannot be expressed.
///
/// The record does not retain the snapshotted data by itself — keep a clone
/// of the container handle alongside it to read the old version.
#[derive(Debug)]
pub struct SnapRecord {
    pub(crate) id: u64,
    generation: u64,
}

impl SnapRecord {
    /// Generation stamp this record was taken at.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Releases the record, returning its deferred nodes to the pool.
    ///
    /// Equivalent to dropping it.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for SnapRecord {
    fn drop(&mut self) {
        let mut registry = REGISTRY.lock();
        if let Some(entry) = registry.records.remove(&self.id) {
            for node in entry.deferred {
                pool().release(node);
            }
        }
    }
}

/// Registers a snapshot of `history` at `generation`.
pub(crate) fn register(history: u64, generation: u64) -> SnapRecord {
    let mut registry = REGISTRY.lock();
    let id = registry.next_id;
    registry.next_id += 1;
    registry.records.insert(
        id,
        RecordEntry {
            history,
            generation,
            deferred: Vec::new(),
        },
    );
    SnapRecord { id, generation }
}

/// Decides the fate of every node abandoned by an in-place write.
///
/// Nodes are processed root-first so each scrubbed parent releases its hold
/// on the child examined after it.
pub(crate) fn reclaim(history: u64, abandoned: ParentStack, excluded: Option<&SnapRecord>) {
    if abandoned.is_empty() {
        return;
    }
    let mut registry = REGISTRY.lock();
    let summary = summarize(&registry, history, excluded.map(|record| record.id));
    match summary {
        None => {
            for node in abandoned.drain_from_root() {
                pool().release(node);
            }
        }
        Some(summary) => {
            for node in abandoned.drain_from_root() {
                if node.generation > summary.max_generation {
                    // Newer than every live snapshot: nothing can see it.
                    pool().release(node);
                } else if let Some(entry) = registry.records.get_mut(&summary.oldest_id) {
                    entry.deferred.push(node);
                }
            }
        }
    }
}

/// Highest generation among the live records of `history`, or `None` when
/// no snapshot is outstanding.
pub(crate) fn max_live_generation(history: u64, excluded: Option<&SnapRecord>) -> Option<u64> {
    let registry = REGISTRY.lock();
    summarize(&registry, history, excluded.map(|record| record.id))
        .map(|summary| summary.max_generation)
}
