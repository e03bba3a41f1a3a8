//! Treap node representation.
//!
//! Nodes carry a key, a value, a random priority, and the generation of the
//! container version that created them. Key and value buffers are shared
//! reference-counted slices so that path copying never duplicates payload
//! bytes: a shallow clone of a node shares its buffers and its children with
//! the original.

use std::mem;
use std::sync::Arc;

use rand::Rng;

/// Shared pointer to a node.
///
/// Structural sharing between container versions is expressed through this
/// pointer: after a write, every node off the modified path is the same
/// allocation in both the old and the new version.
pub(crate) type NodeRef = Arc<TreapNode>;

/// Shared byte buffer used for keys and values.
pub(crate) type ByteBuffer = Arc<[u8]>;

/// Priorities are drawn from 63 bits so the full space of a signed integer
/// remains representable by callers embedding them elsewhere.
const PRIORITY_MASK: u64 = u64::MAX >> 1;

/// A single node of the treap.
///
/// The tree is a binary search tree on `key` (lexicographic byte order) and
/// a min-heap on `priority`. `generation` records the container version that
/// allocated the node and gates recycling decisions.
pub(crate) struct TreapNode {
    /// Search key, ordered by lexicographic byte comparison.
    pub(crate) key: ByteBuffer,
    /// Payload. An empty buffer is a present, zero-length value and is
    /// distinguishable from an absent key.
    pub(crate) value: ByteBuffer,
    /// Min-heap key, drawn uniformly at random at creation.
    pub(crate) priority: u64,
    /// Generation of the container version that allocated this node.
    pub(crate) generation: u64,
    /// Left subtree: keys strictly less than `key`.
    pub(crate) left: Option<NodeRef>,
    /// Right subtree: keys strictly greater than `key`.
    pub(crate) right: Option<NodeRef>,
}

impl TreapNode {
    /// Creates a leaf node.
    pub(crate) const fn new(
        key: ByteBuffer,
        value: ByteBuffer,
        priority: u64,
        generation: u64,
    ) -> Self {
        Self {
            key,
            value,
            priority,
            generation,
            left: None,
            right: None,
        }
    }

    /// Returns a shallow copy stamped with `generation`, sharing this node's
    /// key, value, and children.
    pub(crate) fn shallow_clone(&self, generation: u64) -> Self {
        Self {
            key: Arc::clone(&self.key),
            value: Arc::clone(&self.value),
            priority: self.priority,
            generation,
            left: self.left.clone(),
            right: self.right.clone(),
        }
    }

    /// Best-estimate contribution of this node to a container's total size:
    /// the fixed node footprint plus the key and value byte lengths.
    pub(crate) fn footprint(&self) -> u64 {
        node_overhead() + self.key.len() as u64 + self.value.len() as u64
    }
}

/// Fixed per-node overhead used by the size estimate.
pub(crate) fn node_overhead() -> u64 {
    mem::size_of::<TreapNode>() as u64
}

/// Draws a fresh 63-bit priority.
///
/// The generator is thread-local and seeded from the operating system, so
/// adversarial key sequences cannot steer the tree shape.
pub(crate) fn random_priority() -> u64 {
    rand::thread_rng().gen::<u64>() & PRIORITY_MASK
}
