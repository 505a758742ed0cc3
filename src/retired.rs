//! Deferred-destruction records for retired allocations.

/// A single retired allocation: the pointer plus a type-erased destructor.
///
/// The destructor is monomorphized at [`Retired::new`] so the global garbage
/// queue can hold retirements of arbitrary node types side by side.
pub(crate) struct Retired {
    ptr: *mut u8,
    drop_fn: unsafe fn(*mut u8),
}

// SAFETY: Retired is an inert (pointer, fn) pair; the pointee is unreachable
// by the time the record crosses threads inside the garbage queue.
unsafe impl Send for Retired {}

impl Retired {
    /// Capture `ptr` for deferred destruction.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `Box::into_raw` and must not be retired twice.
    pub(crate) unsafe fn new<T: 'static>(ptr: *mut T) -> Self {
        unsafe fn drop_boxed<T>(ptr: *mut u8) {
            // SAFETY: `ptr` was produced by Box::into_raw::<T> and reclaim()
            // is called exactly once.
            unsafe {
                drop(Box::from_raw(ptr as *mut T));
            }
        }
        Self {
            ptr: ptr.cast(),
            drop_fn: drop_boxed::<T>,
        }
    }

    /// Run the destructor.
    ///
    /// # Safety
    ///
    /// No thread may still hold a guard pinned at or before the epoch the
    /// containing bag was sealed with.
    pub(crate) unsafe fn reclaim(self) {
        // SAFETY: forwarded to the caller's contract.
        unsafe { (self.drop_fn)(self.ptr) }
    }
}

/// A batch of retirements stamped with the epoch it was sealed at.
///
/// Safe to drain once the global epoch has advanced two steps past `epoch`:
/// by then every guard that could have loaded one of these pointers has been
/// dropped.
pub(crate) struct SealedBag {
    epoch: u64,
    items: Vec<Retired>,
}

impl SealedBag {
    pub(crate) fn new(epoch: u64, items: Vec<Retired>) -> Self {
        Self { epoch, items }
    }

    /// Whether the two-epoch grace period has passed.
    #[inline]
    pub(crate) fn expired(&self, global_epoch: u64) -> bool {
        self.epoch + 2 <= global_epoch
    }

    /// Destroy every allocation in the bag.
    ///
    /// # Safety
    ///
    /// `expired()` must hold for the current global epoch.
    pub(crate) unsafe fn reclaim_all(self) {
        for item in self.items {
            // SAFETY: the grace period has passed for the whole bag.
            unsafe { item.reclaim() }
        }
    }
}
