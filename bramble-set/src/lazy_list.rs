//! Validated "lazy" list strategy.
//!
//! Readers traverse without ever blocking and judge membership by a
//! per-node logical-deletion flag. Writers commit under a short per-node
//! test-test-and-set flag: take the predecessor's flag, re-validate that it
//! is still live and still linked to the observed successor, then splice.
//! Validation failure throws the traversal away and retries from the head.
//! Marking and splicing happen in the same critical section, so a deleted
//! node is unlinked before the flags are released.

use crate::list::{CollisionList, Guarded};
use bramble::{pin, retire, Atomic, Guard, Ordering, Shared};
use core::cmp;
use core::hint::spin_loop;
use core::ptr::NonNull;
use core::sync::atomic::AtomicBool;

/// Writer-side commit flag, test-test-and-set like any short spin flag.
/// Readers never touch it.
struct CommitFlag {
    held: AtomicBool,
}

impl CommitFlag {
    const fn new() -> Self {
        Self {
            held: AtomicBool::new(false),
        }
    }

    #[inline]
    fn acquire(&self) -> CommitGuard<'_> {
        loop {
            while self.held.load(Ordering::Relaxed) {
                spin_loop();
            }
            if !self.held.swap(true, Ordering::Acquire) {
                return CommitGuard { flag: self };
            }
        }
    }
}

struct CommitGuard<'a> {
    flag: &'a CommitFlag,
}

impl Drop for CommitGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.flag.held.store(false, Ordering::Release);
    }
}

/// Link block shared by the head sentinel and every node, so a predecessor
/// can be validated uniformly whether it is the sentinel or a real node.
struct Links<K> {
    commit: CommitFlag,
    /// Logical deletion: readers treat the node as absent once set.
    deleted: AtomicBool,
    /// Set after the node has been spliced out of the chain.
    unlinked: AtomicBool,
    next: Atomic<Node<K>>,
}

impl<K> Links<K> {
    fn new() -> Self {
        Self {
            commit: CommitFlag::new(),
            deleted: AtomicBool::new(false),
            unlinked: AtomicBool::new(false),
            next: Atomic::null(),
        }
    }

    /// A predecessor is a valid splice point while it is live and still
    /// points at the successor the traversal saw.
    fn validate(&self, curr: Shared<'_, Node<K>>, guard: &Guard) -> bool {
        !self.deleted.load(Ordering::Acquire)
            && !self.unlinked.load(Ordering::Acquire)
            && self.next.load(Ordering::Acquire, guard) == curr
    }
}

struct Node<K> {
    links: Links<K>,
    key: K,
}

/// Key-ordered list with flag-based logical deletion and validated commits.
pub struct LazyList<K> {
    head: Links<K>,
}

// SAFETY: shared mutation is confined to atomics and the commit flags;
// node reclamation goes through the guard protocol.
unsafe impl<K: Send + Sync> Send for LazyList<K> {}
unsafe impl<K: Send + Sync> Sync for LazyList<K> {}

impl<K> LazyList<K>
where
    K: Ord + Send + Sync + 'static,
{
    /// Walk to the first node with `node.key >= key` without skipping
    /// logically deleted nodes (they still order the chain).
    ///
    /// `found` is true only for an equal node that is live.
    fn search<'g>(
        &'g self,
        key: &K,
        guard: &'g Guard,
    ) -> (bool, &'g Links<K>, Shared<'g, Node<K>>) {
        let mut pred: &Links<K> = &self.head;
        let mut curr = pred.next.load(Ordering::Acquire, guard);

        loop {
            let node = match unsafe { curr.as_ref() } {
                Some(node) => node,
                None => return (false, pred, curr),
            };
            match node.key.cmp(key) {
                cmp::Ordering::Less => {
                    pred = &node.links;
                    curr = node.links.next.load(Ordering::Acquire, guard);
                }
                cmp::Ordering::Equal => {
                    let live = !node.links.deleted.load(Ordering::Acquire);
                    return (live, pred, curr);
                }
                cmp::Ordering::Greater => return (false, pred, curr),
            }
        }
    }
}

impl<K> CollisionList<K> for LazyList<K>
where
    K: Ord + Send + Sync + 'static,
{
    fn new() -> Self {
        Self { head: Links::new() }
    }

    fn insert(&self, key: K) -> bool {
        let guard = pin();
        let new = Box::new(Node {
            links: Links::new(),
            key,
        });

        loop {
            let (found, pred, curr) = self.search(&new.key, &guard);
            if found {
                return false;
            }

            let commit = pred.commit.acquire();
            if !pred.validate(curr, &guard) {
                drop(commit);
                continue;
            }

            new.links.next.store(curr, Ordering::Relaxed);
            let ptr = Box::into_raw(new);
            pred.next
                .store(unsafe { Shared::from_raw(ptr) }, Ordering::Release);
            drop(commit);
            return true;
        }
    }

    fn find_with<F>(&self, key: &K, mut f: F) -> bool
    where
        F: FnMut(&K, &K),
    {
        let guard = pin();
        let (found, _, curr) = self.search(key, &guard);
        if found {
            f(&unsafe { curr.deref() }.key, key);
        }
        found
    }

    fn erase_with<F>(&self, key: &K, mut f: F) -> bool
    where
        F: FnMut(&K),
    {
        let guard = pin();
        loop {
            let (found, pred, curr) = self.search(key, &guard);
            if !found {
                return false;
            }
            let node = unsafe { curr.deref() };

            // Chain-order acquisition (pred before curr) keeps erasers on
            // adjacent nodes from deadlocking.
            let pred_commit = pred.commit.acquire();
            let node_commit = node.links.commit.acquire();
            if !pred.validate(curr, &guard) || node.links.deleted.load(Ordering::Acquire) {
                drop(node_commit);
                drop(pred_commit);
                continue;
            }

            // The visitor runs before the logical mark; both flags are
            // still held, so it runs exactly once.
            f(&node.key);
            node.links.deleted.store(true, Ordering::Release);
            let succ = node.links.next.load(Ordering::Acquire, &guard);
            pred.next.store(succ, Ordering::Release);
            node.links.unlinked.store(true, Ordering::Release);
            drop(node_commit);
            drop(pred_commit);

            unsafe { retire(curr.as_raw()) };
            return true;
        }
    }

    fn get(&self, key: &K) -> Option<Guarded<K>> {
        let guard = pin();
        let key_ptr = {
            let (found, _, curr) = self.search(key, &guard);
            if !found {
                return None;
            }
            NonNull::from(&unsafe { curr.deref() }.key)
        };
        Some(Guarded::new(guard, key_ptr))
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn len(&self) -> usize {
        let guard = pin();
        let mut count = 0;
        let mut curr = self.head.next.load(Ordering::Acquire, &guard);
        while let Some(node) = unsafe { curr.as_ref() } {
            if !node.links.deleted.load(Ordering::Acquire) {
                count += 1;
            }
            curr = node.links.next.load(Ordering::Acquire, &guard);
        }
        count
    }
}

impl<K> Drop for LazyList<K> {
    fn drop(&mut self) {
        // Exclusive access: free the remaining chain directly. Unlinked
        // nodes already belong to the reclamation system.
        let guard = pin();
        let mut curr = self.head.next.load(Ordering::Relaxed, &guard);
        while !curr.is_null() {
            let next = unsafe { curr.deref() }
                .links
                .next
                .load(Ordering::Relaxed, &guard);
            unsafe { drop(Box::from_raw(curr.as_raw())) };
            curr = next;
        }
    }
}
