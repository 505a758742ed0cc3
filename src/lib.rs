//! Bramble: epoch-based memory reclamation for lock-free data structures.
//!
//! Bramble defers physical destruction of memory that concurrent readers may
//! still be touching. A reader enters a critical section with [`pin`]; any
//! pointer loaded through an [`Atomic`] while the guard is alive stays valid
//! until the guard is dropped, no matter which thread unlinks and retires it
//! in the meantime.
//!
//! # Key Features
//!
//! - **Guard-Scoped Protection**: one `pin()` covers every load in the
//!   critical section, no per-pointer bookkeeping
//! - **Batched Retirement**: retired allocations are sealed per epoch and
//!   freed in bulk once no reader can hold them
//! - **Slot-Based Registry**: fixed thread slots, recycled on thread exit
//! - **Tagged Pointers**: a low mark bit on [`Shared`] for logical deletion
//!   schemes
//!
//! # Example
//!
//! ```rust
//! use bramble::{attach, pin, retire, Atomic, Ordering, Shared};
//!
//! let _reg = attach();
//! let atomic = Atomic::new(Box::into_raw(Box::new(42)));
//!
//! let guard = pin();
//! let ptr = atomic.load(Ordering::Acquire, &guard);
//! unsafe {
//!     if let Some(value) = ptr.as_ref() {
//!         assert_eq!(*value, 42);
//!     }
//!     // Unlink, then hand the allocation to the reclamation system.
//!     atomic.store(Shared::null(), Ordering::Release);
//!     retire(ptr.as_raw());
//! }
//! drop(guard);
//! ```

#![warn(missing_docs)]

mod atomic;
mod guard;
mod retired;
mod slot;
mod ttas;

pub use atomic::{Atomic, Shared};
pub use guard::{attach, pin, Guard, Registration};

// Re-export retire from guard (it's the public API)
pub use guard::retire;

// Re-export for convenience
pub use core::sync::atomic::Ordering;
