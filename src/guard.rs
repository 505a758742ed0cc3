//! Guard, registration, and the thread-local reclamation handle.
//!
//! The protocol per thread:
//! - `pin()` announces the current global epoch in the thread's slot and
//!   returns a `Guard`; nested pins share the outermost announcement.
//! - `retire()` pushes the allocation into a thread-local bag; a full bag is
//!   sealed with the current epoch and moved to the global queue.
//! - Sealing tries to advance the epoch (twice, so a quiescent process can
//!   ripen its own garbage) and then collects expired bags.

use crate::retired::Retired;
use crate::slot::{self, Collector};
use core::cell::{Cell, RefCell};
use core::marker::PhantomData;
use core::sync::atomic::{fence, Ordering};

/// Retired allocations accumulated per thread before a bag is sealed.
const BATCH_SIZE: usize = 64;

/// RAII guard representing an active critical section.
///
/// While a Guard exists, the thread's slot announces an epoch and any
/// [`Shared`](crate::Shared) pointers loaded through it are guaranteed to
/// remain valid. Nested `pin()` calls are cheap: only the outermost guard
/// touches the slot.
pub struct Guard {
    // !Send + !Sync: the guard is tied to this thread's slot.
    _marker: PhantomData<*mut ()>,
}

impl Drop for Guard {
    #[inline]
    fn drop(&mut self) {
        // try_with: a guard parked in another thread-local can be dropped
        // after the handle during thread teardown; the slot was already
        // released by Handle::drop at that point.
        let _ = HANDLE.try_with(|handle| handle.unpin());
    }
}

/// Scoped thread registration.
///
/// [`attach`] acquires the thread's slot eagerly; dropping the registration
/// seals and collects whatever the thread retired, so a worker that exits a
/// work scope does not sit on garbage until thread exit. Registration is
/// optional: `pin()` attaches lazily on first use.
pub struct Registration {
    _marker: PhantomData<*mut ()>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let _ = HANDLE.try_with(|handle| handle.flush());
    }
}

/// Thread-local reclamation state.
struct Handle {
    /// Thread ID (lazily allocated, recycled on thread exit).
    tid: Cell<Option<usize>>,
    /// Number of live Guard instances on this thread.
    pin_depth: Cell<usize>,
    /// Bag of retirements not yet sealed.
    bag: RefCell<Vec<Retired>>,
}

impl Handle {
    const fn new() -> Self {
        Self {
            tid: Cell::new(None),
            pin_depth: Cell::new(0),
            bag: RefCell::new(Vec::new()),
        }
    }

    /// Get or allocate this thread's slot id.
    #[inline]
    fn tid(&self, global: &'static Collector) -> usize {
        match self.tid.get() {
            Some(tid) => tid,
            None => {
                let tid = global.alloc_tid();
                self.tid.set(Some(tid));
                tid
            }
        }
    }

    fn pin(&self) -> Guard {
        let depth = self.pin_depth.get();
        self.pin_depth.set(depth + 1);

        if depth == 0 {
            let global = slot::global();
            let tid = self.tid(global);
            // Announce before any protected load. The SeqCst fence pairs
            // with the scan in try_advance: once a retirer observes this
            // slot, it must also observe the announced epoch.
            global.slot(tid).announce(global.epoch());
            fence(Ordering::SeqCst);
        }

        Guard {
            _marker: PhantomData,
        }
    }

    fn unpin(&self) {
        let depth = self.pin_depth.get();
        debug_assert!(depth > 0, "Guard dropped with pin_depth == 0");
        self.pin_depth.set(depth - 1);

        if depth == 1 {
            if let Some(tid) = self.tid.get() {
                slot::global().slot(tid).release();
            }
        }
    }

    fn defer(&self, retired: Retired) {
        let mut bag = self.bag.borrow_mut();
        bag.push(retired);
        if bag.len() >= BATCH_SIZE {
            let items = core::mem::take(&mut *bag);
            drop(bag); // Release borrow before sealing
            self.seal(items);
        }
    }

    /// Seal a bag at the current epoch, then advance and collect.
    fn seal(&self, items: Vec<Retired>) {
        let global = slot::global();
        let epoch = global.epoch();
        global.push_bag(crate::retired::SealedBag::new(epoch, items));

        // Two successful advances ripen the bag we just sealed when no
        // other thread is mid-critical-section.
        for _ in 0..2 {
            if !global.try_advance() {
                break;
            }
        }
        global.collect();
    }

    /// Seal whatever is pending, even a partial bag.
    fn flush(&self) {
        let items = core::mem::take(&mut *self.bag.borrow_mut());
        if !items.is_empty() {
            self.seal(items);
        } else {
            let global = slot::global();
            for _ in 0..2 {
                if !global.try_advance() {
                    break;
                }
            }
            global.collect();
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.flush();
        if let Some(tid) = self.tid.get() {
            slot::global().free_tid(tid);
        }
    }
}

std::thread_local! {
    static HANDLE: Handle = const { Handle::new() };
}

/// Enter a critical section.
///
/// Returns a [`Guard`]; while it is alive, every pointer loaded through an
/// [`Atomic`](crate::Atomic) stays valid even if another thread retires it.
/// The calling thread is registered on first use.
#[inline]
pub fn pin() -> Guard {
    HANDLE.with(|handle| handle.pin())
}

/// Register the current thread eagerly.
///
/// The returned [`Registration`] seals and collects this thread's pending
/// retirements when dropped. Purely an eagerness/lifecycle knob: `pin()`
/// alone is always safe.
#[inline]
pub fn attach() -> Registration {
    HANDLE.with(|handle| {
        let global = slot::global();
        let _ = handle.tid(global);
    });
    Registration {
        _marker: PhantomData,
    }
}

/// Retire an allocation for deferred destruction.
///
/// The destructor runs once every thread that could have loaded `ptr` under
/// a guard has dropped that guard.
///
/// # Safety
///
/// - `ptr` must come from `Box::into_raw` and must not be retired twice.
/// - `ptr` must already be unlinked: no new guard may be able to reach it
///   through any `Atomic`.
/// - The caller must not touch `*ptr` after this call.
#[inline]
pub unsafe fn retire<T: 'static>(ptr: *mut T) {
    // SAFETY: forwarded to the caller's contract.
    let retired = unsafe { Retired::new(ptr) };
    HANDLE.with(|handle| handle.defer(retired));
}
