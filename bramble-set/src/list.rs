//! The collision-list contract shared by all resolution strategies.
//!
//! Every bucket of the set holds one collision list: a concurrent,
//! duplicate-free container for all keys whose hashes landed on the same
//! bucket. The strategies differ in how they resolve insert/erase races,
//! never in what the caller observes.

use bramble::Guard;
use core::fmt;
use core::ops::Deref;
use core::ptr::NonNull;

/// A concurrent, duplicate-free key container for one hash bucket.
///
/// Implementations must give identical externally observable behavior:
/// a key is either fully visible or fully absent, an insert/erase race on
/// one key resolves to a single consistent winner, and a previously erased
/// key is always re-insertable.
pub trait CollisionList<K>: Send + Sync
where
    K: Ord + Send + Sync + 'static,
{
    /// An empty list.
    fn new() -> Self;

    /// Links `key` and returns true iff no equal live key was present.
    /// Returns false without mutating on a duplicate.
    fn insert(&self, key: K) -> bool;

    /// Existence check.
    fn find(&self, key: &K) -> bool {
        self.find_with(key, |_, _| {})
    }

    /// Like [`find`](Self::find), but on a match invokes `f` with
    /// `(matched element, probe key)` exactly once. The visitor may carry
    /// side effects; it is never invoked on a miss.
    fn find_with<F>(&self, key: &K, f: F) -> bool
    where
        F: FnMut(&K, &K);

    /// Unlinks the live node equal to `key`; false if absent.
    fn erase(&self, key: &K) -> bool {
        self.erase_with(key, |_| {})
    }

    /// Like [`erase`](Self::erase), but invokes `f` with the matched
    /// element exactly once, only on the call that wins the removal.
    fn erase_with<F>(&self, key: &K, f: F) -> bool
    where
        F: FnMut(&K);

    /// A reclamation-safe handle to the matching element, or `None`.
    fn get(&self, key: &K) -> Option<Guarded<K>>;

    /// True if no live key is present. Exact only when no insert or erase
    /// races with the call.
    fn is_empty(&self) -> bool;

    /// Number of live keys; same caveat as [`is_empty`](Self::is_empty).
    fn len(&self) -> usize;
}

/// A scoped, reclamation-safe reference to an element of a collision list.
///
/// Holds a [`Guard`] for its whole lifetime, so the underlying node cannot
/// be physically reclaimed while the handle exists, even if another thread
/// erases the key concurrently.
pub struct Guarded<K> {
    key: NonNull<K>,
    _guard: Guard,
}

impl<K> Guarded<K> {
    /// `key` must stay valid for as long as `guard` is held.
    pub(crate) fn new(guard: Guard, key: NonNull<K>) -> Self {
        Self { key, _guard: guard }
    }
}

impl<K> Deref for Guarded<K> {
    type Target = K;

    #[inline]
    fn deref(&self) -> &K {
        // SAFETY: the embedded guard keeps the node's epoch pinned; the
        // pointee outlives self.
        unsafe { self.key.as_ref() }
    }
}

impl<K: fmt::Debug> fmt::Debug for Guarded<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Guarded").field(&**self).finish()
    }
}
