//! Array-chunked list strategy.
//!
//! Keys live in fixed-size chunks chained by CAS, so a bucket's elements sit
//! on a handful of cache lines and iteration never chases per-node links.
//! A slot is empty, pending (tagged claim, invisible to readers), or live.
//! Chunks are appended but never unlinked; erased slots are reused.
//!
//! Duplicate freedom under concurrency: an inserter claims an empty slot as
//! pending, then rescans. A live duplicate anywhere, or a pending duplicate
//! at an earlier slot, wins; the loser withdraws its claim. Slot positions
//! are totally ordered and stable, so every same-key race has exactly one
//! winner.

use crate::list::{CollisionList, Guarded};
use bramble::{pin, retire, Atomic, Guard, Ordering, Shared};
use core::ptr::NonNull;

/// Slots per chunk.
const CHUNK_CAP: usize = 8;

/// Tag on a claimed-but-unpublished slot.
const PENDING: usize = 1;

/// Slot entry. The alignment floor keeps the low pointer bit free for the
/// pending tag even when `K` is a one-byte type.
#[repr(align(4))]
struct Entry<K> {
    key: K,
}

struct Chunk<K> {
    slots: [Atomic<Entry<K>>; CHUNK_CAP],
    next: Atomic<Chunk<K>>,
}

impl<K> Chunk<K> {
    fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| Atomic::null()),
            next: Atomic::null(),
        }
    }
}

/// Chunked duplicate-free key container.
pub struct ChunkList<K> {
    head: Chunk<K>,
}

// SAFETY: shared mutation is all CAS on slot and chain pointers; entries
// are reclaimed via the guard protocol.
unsafe impl<K: Send + Sync> Send for ChunkList<K> {}
unsafe impl<K: Send + Sync> Sync for ChunkList<K> {}

impl<K> ChunkList<K>
where
    K: Ord + Send + Sync + 'static,
{
    /// Scan every slot in chain order. The callback gets the slot, its
    /// loaded entry and its position; returning `Some` stops the walk.
    fn scan<'g, R>(
        &'g self,
        guard: &'g Guard,
        mut f: impl FnMut(&'g Atomic<Entry<K>>, Shared<'g, Entry<K>>, usize) -> Option<R>,
    ) -> Option<R> {
        let mut chunk = &self.head;
        let mut pos = 0;
        loop {
            for slot in &chunk.slots {
                let entry = slot.load(Ordering::Acquire, guard);
                if let Some(result) = f(slot, entry, pos) {
                    return Some(result);
                }
                pos += 1;
            }
            let next = chunk.next.load(Ordering::Acquire, guard);
            match unsafe { next.as_ref() } {
                Some(c) => chunk = c,
                None => return None,
            }
        }
    }

    /// The last chunk in the chain right now.
    fn tail<'g>(&'g self, guard: &'g Guard) -> &'g Chunk<K> {
        let mut chunk = &self.head;
        loop {
            let next = chunk.next.load(Ordering::Acquire, guard);
            match unsafe { next.as_ref() } {
                Some(c) => chunk = c,
                None => return chunk,
            }
        }
    }
}

impl<K> CollisionList<K> for ChunkList<K>
where
    K: Ord + Send + Sync + 'static,
{
    fn new() -> Self {
        Self { head: Chunk::new() }
    }

    fn insert(&self, key: K) -> bool {
        let guard = pin();
        let mut new = Box::new(Entry { key });

        'retry: loop {
            // Pass 1: bail on a live duplicate, remember the first opening.
            let mut open: Option<(&Atomic<Entry<K>>, usize)> = None;
            let live_dup = self.scan(&guard, |slot, entry, pos| {
                if entry.is_null() {
                    if open.is_none() {
                        open = Some((slot, pos));
                    }
                } else if entry.tag() != PENDING && unsafe { &entry.deref().key } == &new.key {
                    return Some(());
                }
                None::<()>
            });
            if live_dup.is_some() {
                return false;
            }

            let (slot, my_pos) = match open {
                Some(found) => found,
                None => {
                    // Every slot occupied: grow the chain. The CAS loser
                    // frees its shell and rescans; either way a fresh chunk
                    // is there now.
                    let fresh = Box::into_raw(Box::new(Chunk::new()));
                    let tail = self.tail(&guard);
                    if tail
                        .next
                        .compare_exchange(
                            Shared::null(),
                            unsafe { Shared::from_raw(fresh) },
                            Ordering::AcqRel,
                            Ordering::Acquire,
                            &guard,
                        )
                        .is_err()
                    {
                        unsafe { drop(Box::from_raw(fresh)) };
                    }
                    continue 'retry;
                }
            };

            // Claim the slot; pending entries are invisible to readers.
            let ptr = Box::into_raw(new);
            let claim = unsafe { Shared::from_raw(ptr) }.with_tag(PENDING);
            if slot
                .compare_exchange(
                    Shared::null(),
                    claim,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                    &guard,
                )
                .is_err()
            {
                new = unsafe { Box::from_raw(ptr) };
                continue 'retry;
            }

            // Pass 2: validate the claim. A live duplicate, or a pending
            // one earlier in slot order, beats us.
            let key_ref = unsafe { &(*ptr).key };
            let beaten = self.scan(&guard, |_, entry, pos| {
                if !entry.is_null()
                    && entry.as_raw() != ptr
                    && unsafe { &entry.deref().key } == key_ref
                    && (entry.tag() != PENDING || pos < my_pos)
                {
                    return Some(());
                }
                None::<()>
            });

            if beaten.is_some() {
                // Withdraw: readers never saw the claim, but a concurrent
                // validator may still be comparing against it, so the entry
                // goes through reclamation rather than a direct free.
                slot.store(Shared::null(), Ordering::Release);
                unsafe { retire(ptr) };
                return false;
            }

            slot.store(claim.with_tag(0), Ordering::Release);
            return true;
        }
    }

    fn find_with<F>(&self, key: &K, mut f: F) -> bool
    where
        F: FnMut(&K, &K),
    {
        let guard = pin();
        self.scan(&guard, |_, entry, _| {
            if !entry.is_null() && entry.tag() != PENDING {
                let item = &unsafe { entry.deref() }.key;
                if item == key {
                    f(item, key);
                    return Some(());
                }
            }
            None::<()>
        })
        .is_some()
    }

    fn erase_with<F>(&self, key: &K, mut f: F) -> bool
    where
        F: FnMut(&K),
    {
        let guard = pin();
        'retry: loop {
            let attempt = self.scan(&guard, |slot, entry, _| {
                if !entry.is_null() && entry.tag() != PENDING && &unsafe { entry.deref() }.key == key {
                    // Emptying the slot decides the erase.
                    return Some(
                        slot.compare_exchange(
                            entry,
                            Shared::null(),
                            Ordering::AcqRel,
                            Ordering::Acquire,
                            &guard,
                        )
                        .map(|_| entry),
                    );
                }
                None
            });

            match attempt {
                None => return false,
                Some(Ok(entry)) => {
                    // Only the winner reaches the visitor.
                    f(&unsafe { entry.deref() }.key);
                    unsafe { retire(entry.as_raw()) };
                    return true;
                }
                // Lost the removal race; the key may live elsewhere now.
                Some(Err(_)) => continue 'retry,
            }
        }
    }

    fn get(&self, key: &K) -> Option<Guarded<K>> {
        let guard = pin();
        let key_ptr = {
            match self.scan(&guard, |_, entry, _| {
                if !entry.is_null() && entry.tag() != PENDING && &unsafe { entry.deref() }.key == key
                {
                    Some(NonNull::from(&unsafe { entry.deref() }.key))
                } else {
                    None
                }
            }) {
                Some(ptr) => ptr,
                None => return None,
            }
        };
        Some(Guarded::new(guard, key_ptr))
    }

    fn is_empty(&self) -> bool {
        let guard = pin();
        self.scan(&guard, |_, entry, _| {
            if !entry.is_null() && entry.tag() != PENDING {
                Some(())
            } else {
                None
            }
        })
        .is_none()
    }

    fn len(&self) -> usize {
        let guard = pin();
        let mut count = 0;
        self.scan(&guard, |_, entry, _| {
            if !entry.is_null() && entry.tag() != PENDING {
                count += 1;
            }
            None::<()>
        });
        count
    }
}

impl<K> Drop for ChunkList<K> {
    fn drop(&mut self) {
        // Exclusive access: free entries and spare chunks directly.
        let guard = pin();
        let mut entries = Vec::new();
        let mut chunks = Vec::new();
        let mut chunk = &self.head;
        loop {
            for slot in &chunk.slots {
                let entry = slot.load(Ordering::Relaxed, &guard);
                if !entry.is_null() {
                    entries.push(entry.as_raw());
                }
            }
            let next = chunk.next.load(Ordering::Relaxed, &guard);
            if next.is_null() {
                break;
            }
            chunks.push(next.as_raw());
            chunk = unsafe { next.deref() };
        }
        for entry in entries {
            unsafe { drop(Box::from_raw(entry)) };
        }
        for chunk in chunks {
            unsafe { drop(Box::from_raw(chunk)) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_find_erase() {
        let list = ChunkList::new();
        assert!(list.insert(1));
        assert!(list.insert(2));
        assert!(!list.insert(1));
        assert!(list.find(&1));
        assert!(!list.find(&3));
        assert_eq!(list.len(), 2);

        assert!(list.erase(&1));
        assert!(!list.erase(&1));
        assert!(list.insert(1));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_grows_past_one_chunk() {
        let list = ChunkList::new();
        for i in 0..50 {
            assert!(list.insert(i));
        }
        assert_eq!(list.len(), 50);
        for i in 0..50 {
            assert!(list.find(&i));
        }
        // Freed slots are reused before the chain grows again.
        assert!(list.erase(&0));
        assert!(list.insert(100));
        assert!(list.find(&100));
    }

    #[test]
    fn test_get_and_visitors() {
        let list = ChunkList::new();
        list.insert(6);
        assert_eq!(*list.get(&6).expect("present"), 6);
        assert!(list.get(&7).is_none());

        let mut sum = 0;
        assert!(list.find_with(&6, |item, _| sum += *item));
        assert!(list.erase_with(&6, |item| sum += *item));
        assert_eq!(sum, 12);
        assert!(list.is_empty());
    }
}
