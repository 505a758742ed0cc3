//! Mark-bit ordered list: the default, fully lock-free strategy.
//!
//! Logical deletion is a tag bit on the deleted node's own successor
//! pointer. Traversals that run into a marked node help splice it out, so
//! an eraser that loses the physical-unlink race leaves no debris behind.
//! Every structural change is a single CAS with retry.

use crate::list::{CollisionList, Guarded};
use bramble::{pin, retire, Atomic, Guard, Ordering, Shared};
use core::cmp;
use core::ptr::NonNull;

/// Tag value on a node's successor pointer that marks the node deleted.
const MARKED: usize = 1;

struct Node<K> {
    key: K,
    next: Atomic<Node<K>>,
}

/// Key-ordered lock-free list with mark-bit deletion.
pub struct MichaelList<K> {
    head: Atomic<Node<K>>,
}

// SAFETY: all shared mutation goes through Atomic; nodes are reclaimed via
// the guard protocol.
unsafe impl<K: Send + Sync> Send for MichaelList<K> {}
unsafe impl<K: Send + Sync> Sync for MichaelList<K> {}

/// Where a search ended: the link to CAS through and the node it holds.
struct Position<'g, K> {
    prev: &'g Atomic<Node<K>>,
    curr: Shared<'g, Node<K>>,
}

impl<K> MichaelList<K>
where
    K: Ord + Send + Sync + 'static,
{
    /// Walk to the first live node with `node.key >= key`, helping unlink
    /// any marked node encountered on the way.
    ///
    /// Returns whether an equal live node was found, plus the position.
    /// A CAS failure while helping means the neighbourhood changed under
    /// us; restart from the head.
    fn search<'g>(&'g self, key: &K, guard: &'g Guard) -> (bool, Position<'g, K>) {
        'retry: loop {
            let mut prev = &self.head;
            let mut curr = prev.load(Ordering::Acquire, guard);

            loop {
                let node = match unsafe { curr.as_ref() } {
                    Some(node) => node,
                    None => return (false, Position { prev, curr }),
                };
                let next = node.next.load(Ordering::Acquire, guard);

                if next.tag() == MARKED {
                    // curr is logically deleted: splice it out before
                    // looking at its key.
                    match prev.compare_exchange(
                        curr.with_tag(0),
                        next.with_tag(0),
                        Ordering::AcqRel,
                        Ordering::Acquire,
                        guard,
                    ) {
                        Ok(_) => {
                            // The winning unlink owns the retirement.
                            unsafe { retire(curr.as_raw()) };
                            curr = next.with_tag(0);
                        }
                        Err(_) => continue 'retry,
                    }
                    continue;
                }

                match node.key.cmp(key) {
                    cmp::Ordering::Less => {
                        prev = &node.next;
                        curr = next;
                    }
                    cmp::Ordering::Equal => return (true, Position { prev, curr }),
                    cmp::Ordering::Greater => return (false, Position { prev, curr }),
                }
            }
        }
    }
}

impl<K> CollisionList<K> for MichaelList<K>
where
    K: Ord + Send + Sync + 'static,
{
    fn new() -> Self {
        Self {
            head: Atomic::null(),
        }
    }

    fn insert(&self, key: K) -> bool {
        let guard = pin();
        let mut new = Box::new(Node {
            key,
            next: Atomic::null(),
        });

        loop {
            let (found, pos) = self.search(&new.key, &guard);
            if found {
                return false;
            }

            new.next.store(pos.curr, Ordering::Relaxed);
            let ptr = Box::into_raw(new);
            match pos.prev.compare_exchange(
                pos.curr,
                unsafe { Shared::from_raw(ptr) },
                Ordering::AcqRel,
                Ordering::Acquire,
                &guard,
            ) {
                Ok(_) => return true,
                // Lost the link race; take the allocation back and retry.
                Err(_) => new = unsafe { Box::from_raw(ptr) },
            }
        }
    }

    fn find_with<F>(&self, key: &K, mut f: F) -> bool
    where
        F: FnMut(&K, &K),
    {
        let guard = pin();
        let (found, pos) = self.search(key, &guard);
        if found {
            f(&unsafe { pos.curr.deref() }.key, key);
        }
        found
    }

    fn erase_with<F>(&self, key: &K, mut f: F) -> bool
    where
        F: FnMut(&K),
    {
        let guard = pin();
        loop {
            let (found, pos) = self.search(key, &guard);
            if !found {
                return false;
            }

            let node = unsafe { pos.curr.deref() };
            let next = node.next.load(Ordering::Acquire, &guard);
            if next.tag() == MARKED {
                // Another eraser already owns this node.
                continue;
            }

            // Logical deletion: winning this CAS decides the erase.
            if node
                .next
                .compare_exchange(
                    next,
                    next.with_tag(MARKED),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                    &guard,
                )
                .is_err()
            {
                continue;
            }

            // Only the winner reaches the visitor: exactly once per erase.
            f(&node.key);

            // Physical unlink; on failure the next traversal through this
            // spot helps out and retires the node itself.
            if pos
                .prev
                .compare_exchange(
                    pos.curr,
                    next.with_tag(0),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                    &guard,
                )
                .is_ok()
            {
                unsafe { retire(pos.curr.as_raw()) };
            }
            return true;
        }
    }

    fn get(&self, key: &K) -> Option<Guarded<K>> {
        let guard = pin();
        let key_ptr = {
            let (found, pos) = self.search(key, &guard);
            if !found {
                return None;
            }
            NonNull::from(&unsafe { pos.curr.deref() }.key)
        };
        Some(Guarded::new(guard, key_ptr))
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn len(&self) -> usize {
        let guard = pin();
        let mut count = 0;
        let mut curr = self.head.load(Ordering::Acquire, &guard);
        while let Some(node) = unsafe { curr.as_ref() } {
            let next = node.next.load(Ordering::Acquire, &guard);
            if next.tag() != MARKED {
                count += 1;
            }
            curr = next.with_tag(0);
        }
        count
    }
}

impl<K> Drop for MichaelList<K> {
    fn drop(&mut self) {
        // Exclusive access: free the chain directly. Nodes that were both
        // marked and unlinked are already owned by the reclamation system.
        let guard = pin();
        let mut curr = self.head.load(Ordering::Relaxed, &guard);
        while !curr.is_null() {
            let next = unsafe { curr.deref() }.next.load(Ordering::Relaxed, &guard);
            unsafe { drop(Box::from_raw(curr.as_raw())) };
            curr = next.with_tag(0);
        }
    }
}
