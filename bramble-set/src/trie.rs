//! Hash-indexed bucket trie.
//!
//! An array-mapped trie keyed by the full 64-bit hash value. The root table
//! consumes the low 8 bits; each deeper level consumes 4 more, so two
//! distinct hashes always part ways before the bits run out. A cell holds
//! null, a leaf (hash plus its owning collision list), or a tagged pointer
//! to a child table.
//!
//! Leaves are created once per distinct hash ever inserted and never freed
//! while the trie lives: an expansion re-hangs the resident leaf one level
//! down instead of replacing it. That is what lets `get_or_create` hand out
//! plain `&L` references at `&self` lifetime, with no per-access guard.

use bramble::{pin, Atomic, Guard, Ordering, Shared};

/// Bits consumed by the root table.
const HEAD_BITS: u32 = 8;
/// Bits consumed by each deeper table.
const LEVEL_BITS: u32 = 4;
/// Deepest level at which two distinct hashes can still collide.
const MAX_LEVEL: u32 = (64 - HEAD_BITS) / LEVEL_BITS;

/// Tag on a cell that points at a child table rather than a leaf.
const CHILD: usize = 1;

/// One bucket: a hash value and the collision list owning its keys.
struct Leaf<L> {
    hash: u64,
    list: L,
}

/// A run of cells; the root is sized `1 << HEAD_BITS`, children
/// `1 << LEVEL_BITS`.
struct Table<L> {
    cells: Box<[Atomic<Leaf<L>>]>,
}

impl<L> Table<L> {
    fn new(len: usize) -> Self {
        Self {
            cells: (0..len).map(|_| Atomic::null()).collect(),
        }
    }
}

/// Per-level structural occupancy, for diagnostics only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LevelStats {
    /// Cells pointing at a deeper table.
    pub array_cells: usize,
    /// Cells holding a bucket leaf.
    pub data_cells: usize,
    /// Unoccupied cells.
    pub empty_cells: usize,
}

/// Lock-free map from hash value to collision list.
pub(crate) struct BucketTrie<L> {
    head: Table<L>,
}

// SAFETY: cells are only mutated by CAS; leaves and tables are freed only
// under `&mut self` in Drop.
unsafe impl<L: Send + Sync> Send for BucketTrie<L> {}
unsafe impl<L: Send + Sync> Sync for BucketTrie<L> {}

impl<L> BucketTrie<L> {
    pub(crate) fn new() -> Self {
        Self {
            head: Table::new(1 << HEAD_BITS),
        }
    }

    /// Cell index of `hash` at `level`.
    #[inline]
    fn index(hash: u64, level: u32) -> usize {
        debug_assert!(level <= MAX_LEVEL);
        if level == 0 {
            (hash & ((1 << HEAD_BITS) - 1)) as usize
        } else {
            let shift = HEAD_BITS + (level - 1) * LEVEL_BITS;
            ((hash >> shift) & ((1 << LEVEL_BITS) - 1)) as usize
        }
    }

    /// Reinterpret a `CHILD`-tagged cell value as a table reference.
    ///
    /// # Safety
    ///
    /// `cur` must carry the `CHILD` tag and the table must outlive `'g`
    /// (tables are only freed in Drop, so any cell value qualifies).
    unsafe fn as_table<'g>(cur: Shared<'g, Leaf<L>>) -> &'g Table<L> {
        debug_assert_eq!(cur.tag(), CHILD);
        unsafe { &*(cur.as_raw() as *const Table<L>) }
    }

    /// Number of cells in the root table.
    pub(crate) fn head_size(&self) -> usize {
        1 << HEAD_BITS
    }

    /// Number of cells in each interior table.
    pub(crate) fn array_node_size(&self) -> usize {
        1 << LEVEL_BITS
    }

    /// The bucket for `hash`, installing an empty one if absent.
    ///
    /// Exactly one list instance is ever visible for a given hash: a thread
    /// that loses an installation race frees its speculative allocation and
    /// adopts whatever the winner put there.
    pub(crate) fn get_or_create(&self, hash: u64, make: impl Fn() -> L) -> &L {
        let guard = pin();
        let mut table = &self.head;
        let mut level = 0u32;
        let mut spare: Option<Box<Leaf<L>>> = None;

        loop {
            let cell = &table.cells[Self::index(hash, level)];
            let cur = cell.load(Ordering::Acquire, &guard);

            if cur.is_null() {
                let leaf = spare.take().unwrap_or_else(|| {
                    Box::new(Leaf {
                        hash,
                        list: make(),
                    })
                });
                let ptr = Box::into_raw(leaf);
                match cell.compare_exchange(
                    Shared::null(),
                    unsafe { Shared::from_raw(ptr) },
                    Ordering::AcqRel,
                    Ordering::Acquire,
                    &guard,
                ) {
                    // SAFETY: leaves are never freed while &self lives.
                    Ok(_) => return unsafe { &(*ptr).list },
                    Err(_) => spare = Some(unsafe { Box::from_raw(ptr) }),
                }
            } else if cur.tag() == CHILD {
                table = unsafe { Self::as_table(cur) };
                level += 1;
            } else {
                // SAFETY: leaves are never freed while &self lives, so the
                // reference may outlive the guard.
                let leaf: &Leaf<L> = unsafe { &*cur.as_raw() };
                if leaf.hash == hash {
                    return &leaf.list;
                }
                // True level collision: push the resident leaf one level
                // down, then race to hang the new table in its place.
                let child = Table::new(1 << LEVEL_BITS);
                child.cells[Self::index(leaf.hash, level + 1)].store(cur, Ordering::Relaxed);
                let child_ptr = Box::into_raw(Box::new(child));
                let tagged =
                    unsafe { Shared::from_raw(child_ptr as *mut Leaf<L>) }.with_tag(CHILD);
                match cell.compare_exchange(
                    cur,
                    tagged,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                    &guard,
                ) {
                    Ok(_) => {
                        table = unsafe { &*child_ptr };
                        level += 1;
                    }
                    // The shell holds no owned pointees, so dropping it
                    // cannot touch the resident leaf.
                    Err(_) => unsafe { drop(Box::from_raw(child_ptr)) },
                }
            }
        }
    }

    /// The bucket for `hash`, if one was ever created.
    pub(crate) fn lookup(&self, hash: u64) -> Option<&L> {
        let guard = pin();
        let mut table = &self.head;
        let mut level = 0u32;

        loop {
            let cur = table.cells[Self::index(hash, level)].load(Ordering::Acquire, &guard);
            if cur.is_null() {
                return None;
            }
            if cur.tag() == CHILD {
                table = unsafe { Self::as_table(cur) };
                level += 1;
                continue;
            }
            // SAFETY: leaves are never freed while &self lives, so the
            // reference may outlive the guard.
            let leaf: &Leaf<L> = unsafe { &*cur.as_raw() };
            return (leaf.hash == hash).then(|| &leaf.list);
        }
    }

    /// Visit every bucket's list.
    pub(crate) fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&L),
    {
        let guard = pin();
        Self::walk(&self.head, &guard, &mut |leaf| f(&leaf.list));
    }

    fn walk<'g, F>(table: &'g Table<L>, guard: &'g Guard, f: &mut F)
    where
        F: FnMut(&'g Leaf<L>),
    {
        for cell in table.cells.iter() {
            let cur = cell.load(Ordering::Acquire, guard);
            if cur.is_null() {
                continue;
            }
            if cur.tag() == CHILD {
                Self::walk(unsafe { Self::as_table(cur) }, guard, f);
            } else {
                f(unsafe { cur.deref() });
            }
        }
    }

    /// Structural occupancy per level. Approximate under concurrent
    /// insertion, like every diagnostic here.
    pub(crate) fn level_statistics(&self) -> Vec<LevelStats> {
        let guard = pin();
        let mut stats = Vec::new();
        Self::collect_stats(&self.head, 0, &mut stats, &guard);
        stats
    }

    fn collect_stats(table: &Table<L>, level: usize, stats: &mut Vec<LevelStats>, guard: &Guard) {
        if stats.len() <= level {
            stats.resize(level + 1, LevelStats::default());
        }
        for cell in table.cells.iter() {
            let cur = cell.load(Ordering::Acquire, guard);
            if cur.is_null() {
                stats[level].empty_cells += 1;
            } else if cur.tag() == CHILD {
                stats[level].array_cells += 1;
                Self::collect_stats(unsafe { Self::as_table(cur) }, level + 1, stats, guard);
            } else {
                stats[level].data_cells += 1;
            }
        }
    }
}

impl<L> Drop for BucketTrie<L> {
    fn drop(&mut self) {
        // Exclusive access; every leaf (and its list) plus every interior
        // table is freed exactly once.
        let guard = pin();
        Self::drop_cells(&self.head, &guard);
    }
}

impl<L> BucketTrie<L> {
    fn drop_cells(table: &Table<L>, guard: &Guard) {
        for cell in table.cells.iter() {
            let cur = cell.load(Ordering::Relaxed, guard);
            if cur.is_null() {
                continue;
            }
            if cur.tag() == CHILD {
                let child = cur.as_raw() as *mut Table<L>;
                Self::drop_cells(unsafe { &*child }, guard);
                unsafe { drop(Box::from_raw(child)) };
            } else {
                unsafe { drop(Box::from_raw(cur.as_raw())) };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::michael_list::MichaelList;
    use crate::CollisionList;

    #[test]
    fn test_one_list_per_hash() {
        let trie: BucketTrie<MichaelList<u32>> = BucketTrie::new();
        let a = trie.get_or_create(99, MichaelList::new) as *const _;
        let b = trie.get_or_create(99, MichaelList::new) as *const _;
        assert_eq!(a, b);
        assert!(trie.lookup(99).is_some());
        assert!(trie.lookup(98).is_none());
    }

    #[test]
    fn test_colliding_low_bits_split() {
        let trie: BucketTrie<MichaelList<u32>> = BucketTrie::new();
        // Same root cell (low 8 bits), different hashes.
        let h1 = 0x0000_0042u64;
        let h2 = 0x0001_0042u64;
        let a = trie.get_or_create(h1, MichaelList::new) as *const MichaelList<u32>;
        let b = trie.get_or_create(h2, MichaelList::new) as *const MichaelList<u32>;
        assert_ne!(a, b);
        // The resident leaf survived the expansion.
        assert_eq!(trie.lookup(h1).unwrap() as *const _, a);
        assert_eq!(trie.lookup(h2).unwrap() as *const _, b);

        let stats = trie.level_statistics();
        assert!(stats.len() > 1);
        assert!(stats.iter().map(|s| s.array_cells).sum::<usize>() >= 1);
        assert_eq!(stats.iter().map(|s| s.data_cells).sum::<usize>(), 2);
    }

    #[test]
    fn test_for_each_sees_every_bucket() {
        let trie: BucketTrie<MichaelList<u32>> = BucketTrie::new();
        for hash in [1u64, 2, 3, 0x100, 0x101] {
            trie.get_or_create(hash, MichaelList::new).insert(hash as u32);
        }
        let mut buckets = 0;
        let mut keys = 0;
        trie.for_each(|list| {
            buckets += 1;
            keys += list.len();
        });
        assert_eq!(buckets, 5);
        assert_eq!(keys, 5);
    }
}
