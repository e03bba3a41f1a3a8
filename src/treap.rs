//! Persistent ordered map on a randomized treap.
//!
//! [`Treap`] keeps byte-string keys in ascending lexicographic order. It is
//! a binary search tree on keys and a min-heap on per-node random
//! priorities, which keeps the expected height logarithmic without explicit
//! balancing. All writes are path copying: they clone the ancestors of the
//! touched node, share every other node with the previous version, and
//! return a new handle. Old handles stay valid indefinitely, which makes a
//! clone of the handle an O(1) snapshot.
//!
//! The `*_mut` variants perform the same logical operation in place and
//! hand the abandoned ancestor chain to the recycle protocol, so a burst of
//! updates between snapshots reuses node allocations instead of leaving
//! them for the allocator to reclaim.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::iter::TreapIter;
use crate::node::{random_priority, NodeRef, TreapNode};
use crate::pool::pool;
use crate::snapshot::{self, SnapRecord};
use crate::stack::ParentStack;

/// A persistent ordered map from byte strings to byte strings.
///
/// Handles are cheap to clone; a clone shares all nodes with the original
/// and observes the same version forever. Writes return (or install, for
/// the `*_mut` variants) a new version; readers holding older handles are
/// unaffected.
///
/// # Concurrency
///
/// Any number of threads may read one handle concurrently without
/// coordination. Writers must be serialized externally: two threads
/// mutating clones of the same version produce two diverging versions, not
/// a merged one.
///
/// # Examples
///
/// ```rust
/// use mvtreap::Treap;
///
/// let base = Treap::new().insert(b"b", b"2").insert(b"a", b"1");
/// let updated = base.insert(b"c", b"3");
///
/// // The old version is untouched.
/// assert_eq!(base.len(), 2);
/// assert_eq!(base.get(b"c"), None);
/// assert_eq!(updated.get(b"c"), Some(&b"3"[..]));
///
/// // Keys iterate in ascending order.
/// let keys: Vec<&[u8]> = updated.keys().collect();
/// assert_eq!(keys, vec![&b"a"[..], &b"b"[..], &b"c"[..]]);
/// ```
#[derive(Clone)]
pub struct Treap {
    root: Option<NodeRef>,
    count: usize,
    total_size: u64,
    generation: u64,
    history: u64,
}

impl Treap {
    /// Creates an empty map.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mvtreap::Treap;
    ///
    /// let map = Treap::new();
    /// assert!(map.is_empty());
    /// assert_eq!(map.get(b"a"), None);
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: None,
            count: 0,
            total_size: 0,
            generation: 0,
            history: snapshot::next_history(),
        }
    }

    /// Returns the number of keys stored.
    ///
    /// # Complexity
    ///
    /// O(1)
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    /// Returns `true` if the map holds no keys.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns a best estimate of the bytes consumed by the map: key and
    /// value lengths plus a fixed per-node footprint. Structure shared with
    /// other versions is counted as if it were exclusively owned.
    ///
    /// # Complexity
    ///
    /// O(1)
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.total_size
    }

    /// Returns this version's generation stamp. Every successful write
    /// produces a version with a strictly greater generation.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns the value stored for `key`, or `None` if the key is absent.
    ///
    /// A key stored with an empty value yields `Some(&[])`, which is
    /// distinguishable from absence.
    ///
    /// # Complexity
    ///
    /// O(log n) expected; allocates nothing.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mvtreap::Treap;
    ///
    /// let map = Treap::new().insert(b"present", b"").insert(b"k", b"v");
    /// assert_eq!(map.get(b"k"), Some(&b"v"[..]));
    /// assert_eq!(map.get(b"present"), Some(&b""[..]));
    /// assert_eq!(map.get(b"absent"), None);
    /// ```
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        let mut current = self.root.as_deref();
        while let Some(node) = current {
            match key.cmp(node.key.as_ref()) {
                Ordering::Less => current = node.left.as_deref(),
                Ordering::Greater => current = node.right.as_deref(),
                Ordering::Equal => return Some(node.value.as_ref()),
            }
        }
        None
    }

    /// Returns `true` if `key` is present, even with an empty value.
    #[must_use]
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Returns a new version with `key` bound to `value`.
    ///
    /// Existing keys are overwritten. Only the nodes on the search path
    /// (plus any rotations needed to restore heap order) are copied; the
    /// rest of the tree is shared with `self`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mvtreap::Treap;
    ///
    /// let one = Treap::new().insert(b"k", b"1");
    /// let two = one.insert(b"k", b"2");
    /// assert_eq!(one.get(b"k"), Some(&b"1"[..]));
    /// assert_eq!(two.get(b"k"), Some(&b"2"[..]));
    /// assert_eq!(one.len(), two.len());
    /// ```
    #[must_use]
    pub fn insert(&self, key: &[u8], value: &[u8]) -> Self {
        self.insert_impl(key, value).0
    }

    /// Returns a new version without `key`.
    ///
    /// Removing an absent key returns a handle equal to `self` and does not
    /// advance the generation.
    #[must_use]
    pub fn remove(&self, key: &[u8]) -> Self {
        self.remove_impl(key).0
    }

    /// Binds `key` to `value` in place, recycling abandoned nodes.
    ///
    /// Logically equivalent to `*self = self.insert(key, value)`, followed
    /// by an examination of every node the write abandoned: nodes no live
    /// snapshot could observe return to the node pool immediately, the rest
    /// are parked on the oldest live snapshot and pooled when it is
    /// released. Pass `excluded` to leave one snapshot record out of that
    /// liveness count.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mvtreap::Treap;
    ///
    /// let mut map = Treap::new();
    /// for key in [&b"a"[..], b"b", b"c"] {
    ///     map.insert_mut(key, key, None);
    /// }
    /// assert_eq!(map.len(), 3);
    /// ```
    pub fn insert_mut(&mut self, key: &[u8], value: &[u8], excluded: Option<&SnapRecord>) {
        let (next, abandoned) = self.insert_impl(key, value);
        // Drop the previous handle before reclaiming so its references do
        // not keep the abandoned path alive.
        drop(std::mem::replace(self, next));
        snapshot::reclaim(self.history, abandoned, excluded);
    }

    /// Removes `key` in place, recycling abandoned nodes.
    ///
    /// The in-place counterpart of [`remove`](Self::remove); see
    /// [`insert_mut`](Self::insert_mut) for the recycling contract.
    pub fn remove_mut(&mut self, key: &[u8], excluded: Option<&SnapRecord>) {
        let (next, abandoned) = self.remove_impl(key);
        drop(std::mem::replace(self, next));
        snapshot::reclaim(self.history, abandoned, excluded);
    }

    /// Registers and returns a snapshot record stamped with this version's
    /// generation.
    ///
    /// While the record is live, the `*_mut` variants will not recycle any
    /// node this or any earlier version could observe. The record releases
    /// on drop; keep a clone of the handle alongside it to read the
    /// snapshotted state.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mvtreap::Treap;
    ///
    /// let mut map = Treap::new().insert(b"a", b"1");
    /// let view = map.clone();
    /// let record = map.snapshot();
    /// map.insert_mut(b"a", b"2", None);
    ///
    /// assert_eq!(view.get(b"a"), Some(&b"1"[..]));
    /// assert_eq!(map.get(b"a"), Some(&b"2"[..]));
    /// drop(view);
    /// record.release();
    /// ```
    #[must_use]
    pub fn snapshot(&self) -> SnapRecord {
        snapshot::register(self.history, self.generation)
    }

    /// Consumes this handle and returns every node no live snapshot could
    /// observe to the node pool.
    ///
    /// Intended for a handle the caller is about to drop anyway. Nodes
    /// shared with other live handles, and nodes a live snapshot protects,
    /// are left untouched. Pass `excluded` to leave one snapshot record out
    /// of the liveness count.
    pub fn recycle(self, excluded: Option<&SnapRecord>) {
        let threshold = snapshot::max_live_generation(self.history, excluded);
        let mut pending = ParentStack::new();
        if let Some(root) = self.root {
            pending.push(root);
        }
        while let Some(mut node_ref) = pending.pop() {
            // A node still shared with another version cannot be reclaimed,
            // and neither can anything below it.
            let Some(node) = Arc::get_mut(&mut node_ref) else {
                continue;
            };
            if let Some(left) = node.left.take() {
                pending.push(left);
            }
            if let Some(right) = node.right.take() {
                pending.push(right);
            }
            if threshold.map_or(true, |generation| node.generation > generation) {
                pool().release(node_ref);
            }
        }
    }

    /// Calls `visitor` with every key/value pair in ascending key order,
    /// stopping early when it returns `false`.
    ///
    /// Traversal is iterative and does not mutate the tree, so it is safe
    /// to run concurrently with other readers of the same handle.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mvtreap::Treap;
    ///
    /// let map = Treap::new().insert(b"b", b"2").insert(b"a", b"1");
    /// let mut seen = Vec::new();
    /// map.for_each(|key, _| {
    ///     seen.push(key.to_vec());
    ///     true
    /// });
    /// assert_eq!(seen, vec![b"a".to_vec(), b"b".to_vec()]);
    /// ```
    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        for (key, value) in self.iter() {
            if !visitor(key, value) {
                return;
            }
        }
    }

    /// Returns an iterator over key/value pairs in ascending key order.
    #[must_use]
    pub fn iter(&self) -> TreapIter<'_> {
        TreapIter::new(self.root.as_deref(), self.count)
    }

    /// Returns an iterator over the keys in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = &[u8]> {
        self.iter().map(|(key, _)| key)
    }

    /// Returns an iterator over the values, ordered by key.
    pub fn values(&self) -> impl Iterator<Item = &[u8]> {
        self.iter().map(|(_, value)| value)
    }

    // -------------------------------------------------------------------
    // Write internals
    // -------------------------------------------------------------------

    /// Inserts and additionally returns the abandoned originals along the
    /// copied path, for the recycle protocol.
    fn insert_impl(&self, key: &[u8], value: &[u8]) -> (Self, ParentStack) {
        let generation = self.generation + 1;

        // First key: the new node is the root.
        if self.root.is_none() {
            let node = TreapNode::new(
                Arc::from(key),
                Arc::from(value),
                random_priority(),
                generation,
            );
            let total_size = node.footprint();
            return (
                Self {
                    root: Some(pool().acquire(node)),
                    count: 1,
                    total_size,
                    generation,
                    history: self.history,
                },
                ParentStack::new(),
            );
        }

        // Descend to the key or to a null child, recording the originals:
        // every visited node is about to be replaced by a clone.
        let mut old_parents = ParentStack::new();
        let mut matched = None;
        let mut current = self.root.clone();
        while let Some(node) = current {
            let step = key.cmp(node.key.as_ref());
            old_parents.push(Arc::clone(&node));
            match step {
                Ordering::Less => current = node.left.clone(),
                Ordering::Greater => current = node.right.clone(),
                Ordering::Equal => {
                    matched = Some(node);
                    break;
                }
            }
        }

        if let Some(target) = matched {
            // Overwrite the value on a clone of the matched node; priorities
            // are untouched, so no rotation can be needed.
            let mut replacement = target.shallow_clone(generation);
            replacement.value = Arc::from(value);
            let total_size =
                self.total_size - target.value.len() as u64 + value.len() as u64;
            let root = rebuild_ancestors(
                &old_parents,
                1,
                Some(pool().acquire(replacement)),
                generation,
            );
            return (
                Self {
                    root,
                    count: self.count,
                    total_size,
                    generation,
                    history: self.history,
                },
                old_parents,
            );
        }

        // Attach a fresh node at the null child we reached, then rotate it
        // above each cloned ancestor whose priority it beats. Once heap
        // order is restored the remaining ancestors are plain clones.
        let mut rising = TreapNode::new(
            Arc::from(key),
            Arc::from(value),
            random_priority(),
            generation,
        );
        let added = rising.footprint();
        let mut replaced: Option<NodeRef> = None;
        let mut depth = 0;
        while depth < old_parents.len() {
            let Some(ancestor) = old_parents.at(depth) else {
                break;
            };
            let on_left = match &replaced {
                Some(original) => child_is_left(ancestor, original),
                None => key < ancestor.key.as_ref(),
            };
            let mut parent_clone = ancestor.shallow_clone(generation);
            if rising.priority < parent_clone.priority {
                if on_left {
                    // Right rotation: the parent takes over the rising
                    // node's right subtree and becomes its right child.
                    parent_clone.left = rising.right.take();
                    rising.right = Some(pool().acquire(parent_clone));
                } else {
                    parent_clone.right = rising.left.take();
                    rising.left = Some(pool().acquire(parent_clone));
                }
            } else {
                let child = pool().acquire(rising);
                if on_left {
                    parent_clone.left = Some(child);
                } else {
                    parent_clone.right = Some(child);
                }
                rising = parent_clone;
            }
            replaced = Some(Arc::clone(ancestor));
            depth += 1;
        }

        (
            Self {
                root: Some(pool().acquire(rising)),
                count: self.count + 1,
                total_size: self.total_size + added,
                generation,
                history: self.history,
            },
            old_parents,
        )
    }

    /// Removes and additionally returns the abandoned originals along the
    /// copied path, for the recycle protocol.
    fn remove_impl(&self, key: &[u8]) -> (Self, ParentStack) {
        let mut old_parents = ParentStack::new();
        let mut found = None;
        let mut current = self.root.clone();
        while let Some(node) = current {
            let step = key.cmp(node.key.as_ref());
            old_parents.push(Arc::clone(&node));
            match step {
                Ordering::Less => current = node.left.clone(),
                Ordering::Greater => current = node.right.clone(),
                Ordering::Equal => {
                    found = Some(node);
                    break;
                }
            }
        }
        let Some(target) = found else {
            // Nothing to do; hand back an equivalent version and no
            // abandoned nodes.
            return (self.clone(), ParentStack::new());
        };

        let generation = self.generation + 1;
        let removed = target.footprint();

        // Sink the target towards a leaf by rotating it with whichever
        // child must win the heap comparison (smaller priority; the left
        // child on ties, so the shape is reproducible). Each promoted child
        // is cloned; the target itself is never published and simply falls
        // away once it reaches a leaf. `spine` records the promoted clones
        // together with the side on which the subtree built below them
        // attaches.
        let mut spine: Vec<(TreapNode, bool)> = Vec::new();
        let mut sink_left = target.left.clone();
        let mut sink_right = target.right.clone();
        loop {
            let from_left = match (&sink_left, &sink_right) {
                (None, None) => break,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (Some(left), Some(right)) => left.priority <= right.priority,
            };
            if from_left {
                let Some(child_ref) = sink_left.take() else {
                    break;
                };
                let mut child = child_ref.shallow_clone(generation);
                sink_left = child.right.take();
                spine.push((child, true));
            } else {
                let Some(child_ref) = sink_right.take() else {
                    break;
                };
                let mut child = child_ref.shallow_clone(generation);
                sink_right = child.left.take();
                spine.push((child, false));
            }
        }

        // Reassemble the sink path bottom-up. The deepest promoted child
        // receives the hole left by the detached target.
        let mut replacement: Option<NodeRef> = None;
        while let Some((mut node, attach_right)) = spine.pop() {
            if attach_right {
                node.right = replacement;
            } else {
                node.left = replacement;
            }
            replacement = Some(pool().acquire(node));
        }

        let root = rebuild_ancestors(&old_parents, 1, replacement, generation);
        (
            Self {
                root,
                count: self.count - 1,
                total_size: self.total_size - removed,
                generation,
                history: self.history,
            },
            old_parents,
        )
    }
}

/// Clones the ancestors recorded at `old_parents[start_depth..]`, linking
/// `subtree` in place of the original child at each step, and returns the
/// new root.
fn rebuild_ancestors(
    old_parents: &ParentStack,
    start_depth: usize,
    subtree: Option<NodeRef>,
    generation: u64,
) -> Option<NodeRef> {
    let mut child = subtree;
    let mut depth = start_depth;
    while depth < old_parents.len() {
        let (Some(ancestor), Some(original)) =
            (old_parents.at(depth), old_parents.at(depth - 1))
        else {
            break;
        };
        let mut clone = ancestor.shallow_clone(generation);
        if child_is_left(ancestor, original) {
            clone.left = child;
        } else {
            clone.right = child;
        }
        child = Some(pool().acquire(clone));
        depth += 1;
    }
    child
}

/// Returns `true` if `child` is `parent`'s left child, by identity.
fn child_is_left(parent: &TreapNode, child: &NodeRef) -> bool {
    parent
        .left
        .as_ref()
        .is_some_and(|left| Arc::ptr_eq(left, child))
}

impl Default for Treap {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Treap {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_map().entries(self.iter()).finish()
    }
}

impl PartialEq for Treap {
    /// Content equality: same keys bound to the same values.
    fn eq(&self, other: &Self) -> bool {
        self.count == other.count && self.iter().eq(other.iter())
    }
}

impl Eq for Treap {}

impl<K, V> FromIterator<(K, V)> for Treap
where
    K: AsRef<[u8]>,
    V: AsRef<[u8]>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iterable: I) -> Self {
        let mut map = Self::new();
        map.extend(iterable);
        map
    }
}

impl<K, V> Extend<(K, V)> for Treap
where
    K: AsRef<[u8]>,
    V: AsRef<[u8]>,
{
    /// Bulk insertion through the in-place path, so intermediate versions
    /// are recycled as they are abandoned.
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iterable: I) {
        for (key, value) in iterable {
            self.insert_mut(key.as_ref(), value.as_ref(), None);
        }
    }
}
