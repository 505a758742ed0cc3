//! The hash set facade: bucket trie composed with a collision-list strategy.

use crate::list::{CollisionList, Guarded};
use crate::trie::{BucketTrie, LevelStats};
use core::hash::{BuildHasher, Hash};
use core::marker::PhantomData;
use core::sync::atomic::{AtomicUsize, Ordering};
use foldhash::fast::FixedState;

/// A concurrent hash set that stays correct under a degenerate hash
/// function.
///
/// Every operation hashes the key, locates the bucket's collision list in
/// the trie, and delegates the key-level decision to the list. True
/// collisions (distinct keys, equal hashes) cost a scan of that one bucket's
/// list, never of the whole set.
///
/// `L` selects the collision-resolution strategy at compile time
/// ([`MichaelList`](crate::MichaelList) by default, see also
/// [`LazyList`](crate::LazyList) and [`ChunkList`](crate::ChunkList));
/// `S` supplies the hash function and is allowed to collide arbitrarily.
///
/// # Example
///
/// ```rust
/// use bramble_set::HashSet;
///
/// let set: HashSet<u32> = HashSet::new();
/// assert!(set.insert(7));
/// assert!(!set.insert(7));
/// assert!(set.find(&7));
/// assert!(set.erase(&7));
/// assert!(set.is_empty());
/// ```
pub struct HashSet<K, L = crate::MichaelList<K>, S = FixedState> {
    buckets: BucketTrie<L>,
    /// Live-element counter, eventually consistent under concurrent
    /// mutation: adjusted only after the bucket list confirms an operation,
    /// so a reader racing a writer may see the count off by in-flight calls.
    len: AtomicUsize,
    hasher: S,
    _marker: PhantomData<fn(K) -> K>,
}

impl<K, L, S> HashSet<K, L, S>
where
    K: Ord + Hash + Send + Sync + 'static,
    L: CollisionList<K>,
    S: BuildHasher + Default,
{
    /// An empty set with the default hasher for `S`.
    pub fn new() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<K, L, S> Default for HashSet<K, L, S>
where
    K: Ord + Hash + Send + Sync + 'static,
    L: CollisionList<K>,
    S: BuildHasher + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, L, S> HashSet<K, L, S>
where
    K: Ord + Hash + Send + Sync + 'static,
    L: CollisionList<K>,
    S: BuildHasher,
{
    /// An empty set using `hasher`. Correctness does not depend on hash
    /// quality; a hasher mapping every key to one value only degrades the
    /// affected bucket to its list's scan cost.
    pub fn with_hasher(hasher: S) -> Self {
        Self {
            buckets: BucketTrie::new(),
            len: AtomicUsize::new(0),
            hasher,
            _marker: PhantomData,
        }
    }

    #[inline]
    fn hash_of(&self, key: &K) -> u64 {
        self.hasher.hash_one(key)
    }

    /// Inserts `key`; true iff it was not present.
    ///
    /// The bucket is created on first use. A thread that loses the
    /// bucket-creation race inserts into the winner's list instead; the
    /// insert is never dropped on that account.
    pub fn insert(&self, key: K) -> bool {
        let hash = self.hash_of(&key);
        let list = self.buckets.get_or_create(hash, L::new);
        if list.insert(key) {
            self.len.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Existence check. Never creates a bucket.
    pub fn find(&self, key: &K) -> bool {
        match self.buckets.lookup(self.hash_of(key)) {
            Some(list) => list.find(key),
            None => false,
        }
    }

    /// Like [`find`](Self::find); on a match invokes `f` with
    /// `(matched element, probe key)` exactly once.
    pub fn find_with<F>(&self, key: &K, f: F) -> bool
    where
        F: FnMut(&K, &K),
    {
        match self.buckets.lookup(self.hash_of(key)) {
            Some(list) => list.find_with(key, f),
            None => false,
        }
    }

    /// Membership test; identical to [`find`](Self::find). An existing but
    /// momentarily empty bucket reports not-found like an absent one.
    pub fn contains(&self, key: &K) -> bool {
        self.find(key)
    }

    /// Removes `key`; true iff it was present.
    pub fn erase(&self, key: &K) -> bool {
        self.erase_with(key, |_| {})
    }

    /// Like [`erase`](Self::erase); invokes `f` with the matched element
    /// exactly once, on the call that wins the removal.
    pub fn erase_with<F>(&self, key: &K, f: F) -> bool
    where
        F: FnMut(&K),
    {
        let erased = match self.buckets.lookup(self.hash_of(key)) {
            Some(list) => list.erase_with(key, f),
            None => false,
        };
        if erased {
            self.len.fetch_sub(1, Ordering::Relaxed);
        }
        erased
    }

    /// A reclamation-safe handle to the stored element equal to `key`, or
    /// `None`. The element cannot be reclaimed while the handle lives, even
    /// if another thread erases it concurrently.
    pub fn get(&self, key: &K) -> Option<Guarded<K>> {
        self.buckets.lookup(self.hash_of(key))?.get(key)
    }

    /// Approximate number of live elements; converges to the exact count
    /// once in-flight operations complete.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// True if [`len`](Self::len) reads zero.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of cells in the trie's root table. Diagnostic only.
    pub fn head_size(&self) -> usize {
        self.buckets.head_size()
    }

    /// Number of cells in each interior trie table. Diagnostic only.
    pub fn array_node_size(&self) -> usize {
        self.buckets.array_node_size()
    }

    /// Per-level trie occupancy. Diagnostic only; approximate under
    /// concurrent insertion.
    pub fn level_statistics(&self) -> Vec<LevelStats> {
        self.buckets.level_statistics()
    }
}
