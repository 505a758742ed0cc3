//! Thread slots and global collector state.
//!
//! Every participating thread owns one cache-line-aligned slot in a fixed
//! table. A slot publishes the epoch the thread pinned at (with the low bit
//! as the active flag); `try_advance` scans the table and moves the global
//! epoch forward only when no active slot lags behind. Thread ids are
//! recycled through a small free list so long-running processes that churn
//! threads never exhaust the table.

use crate::retired::SealedBag;
use crate::ttas::TTas;
use core::sync::atomic::{fence, AtomicUsize, Ordering};
use portable_atomic::AtomicU64;

/// Maximum number of threads supported.
pub(crate) const MAX_THREADS: usize = 128;

/// Low bit of a slot word: set while the thread holds at least one guard.
pub(crate) const ACTIVE: u64 = 1;

/// Per-thread slot.
///
/// The word packs `(epoch << 1) | ACTIVE` while pinned and is zero while
/// quiescent (or unregistered). Padded to its own cache line so pin/unpin
/// traffic from one thread never invalidates a neighbour's line.
#[repr(align(128))]
pub(crate) struct ThreadSlot {
    state: AtomicU64,
}

impl ThreadSlot {
    const fn new() -> Self {
        Self {
            state: AtomicU64::new(0),
        }
    }

    /// Announce `epoch` and mark the slot active.
    #[inline]
    pub(crate) fn announce(&self, epoch: u64) {
        self.state.store((epoch << 1) | ACTIVE, Ordering::SeqCst);
    }

    /// Mark the slot quiescent.
    #[inline]
    pub(crate) fn release(&self) {
        self.state.store(0, Ordering::Release);
    }
}

/// Global collector state: the slot table, the epoch counter, the garbage
/// queue, and the thread-id allocator.
pub(crate) struct Collector {
    slots: Box<[ThreadSlot]>,
    /// Global epoch counter (starts at 1).
    epoch: AtomicU64,
    /// Sealed bags awaiting their grace period.
    garbage: TTas<Vec<SealedBag>>,
    /// Thread ID allocator (next never-used ID).
    next_tid: AtomicUsize,
    /// Recycled thread IDs.
    free_tids: TTas<Vec<usize>>,
}

impl Collector {
    fn new() -> Self {
        let mut slots = Vec::with_capacity(MAX_THREADS);
        for _ in 0..MAX_THREADS {
            slots.push(ThreadSlot::new());
        }
        Self {
            slots: slots.into_boxed_slice(),
            epoch: AtomicU64::new(1),
            garbage: TTas::new(Vec::new()),
            next_tid: AtomicUsize::new(0),
            free_tids: TTas::new(Vec::new()),
        }
    }

    #[inline]
    pub(crate) fn slot(&self, tid: usize) -> &ThreadSlot {
        &self.slots[tid]
    }

    /// Current global epoch.
    #[inline]
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Try to move the global epoch one step forward.
    ///
    /// Fails if any active slot still announces an older epoch. A thread
    /// parked inside a long critical section only delays reclamation; it
    /// never blocks readers or writers of the protected structures.
    pub(crate) fn try_advance(&self) -> bool {
        let epoch = self.epoch.load(Ordering::SeqCst);
        fence(Ordering::SeqCst);
        for slot in self.slots.iter() {
            let state = slot.state.load(Ordering::SeqCst);
            if state & ACTIVE != 0 && state >> 1 != epoch {
                return false;
            }
        }
        self.epoch
            .compare_exchange(epoch, epoch + 1, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok()
    }

    /// Queue a sealed bag for later destruction.
    pub(crate) fn push_bag(&self, bag: SealedBag) {
        self.garbage.lock().push(bag);
    }

    /// Destroy every queued bag whose grace period has passed.
    ///
    /// Contended calls back off instead of queueing behind the lock; the
    /// next seal will collect on their behalf.
    pub(crate) fn collect(&self) {
        let expired: Vec<SealedBag> = {
            let mut queue = match self.garbage.try_lock() {
                Some(queue) => queue,
                None => return,
            };
            let epoch = self.epoch();
            let mut kept = Vec::with_capacity(queue.len());
            let mut expired = Vec::new();
            for bag in queue.drain(..) {
                if bag.expired(epoch) {
                    expired.push(bag);
                } else {
                    kept.push(bag);
                }
            }
            *queue = kept;
            expired
        };
        // Destructors run outside the lock.
        for bag in expired {
            // SAFETY: expired() held under the current epoch.
            unsafe { bag.reclaim_all() }
        }
    }

    /// Allocate a thread ID.
    pub(crate) fn alloc_tid(&self) -> usize {
        // Try recycled IDs first
        {
            let mut free = self.free_tids.lock();
            if let Some(tid) = free.pop() {
                return tid;
            }
        }
        let tid = self.next_tid.fetch_add(1, Ordering::Relaxed);
        assert!(
            tid < MAX_THREADS,
            "bramble: exceeded maximum thread count ({MAX_THREADS})"
        );
        tid
    }

    /// Release a thread ID for recycling.
    pub(crate) fn free_tid(&self, tid: usize) {
        self.slots[tid].release();
        self.free_tids.lock().push(tid);
    }
}

use once_cell::race::OnceBox;

/// Global singleton instance.
static GLOBAL: OnceBox<Collector> = OnceBox::new();

/// Get reference to the global collector.
#[inline]
pub(crate) fn global() -> &'static Collector {
    GLOBAL.get_or_init(|| Box::new(Collector::new()))
}
