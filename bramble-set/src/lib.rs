//! Lock-free concurrent hash set that tolerates degenerate hash functions.
//!
//! Two lock-free layers compose into one set: a hash-indexed bucket trie
//! locates the bucket for a hash value in O(1) amortized steps, and a
//! per-bucket collision list resolves the keys that truly share that hash.
//! Both layers sit on [`bramble`] memory reclamation, so readers racing a
//! concurrent erase never touch freed memory.
//!
//! # Key Features
//!
//! - **Collision-Tolerant**: correctness never depends on hash quality;
//!   colliding keys cost a scan of their own bucket only
//! - **Lock-Free**: CAS-with-retry mutation, no global lock
//! - **Pluggable Resolution**: three collision-list strategies behind one
//!   trait, chosen at compile time
//! - **Guarded Reads**: `get` hands out a handle that blocks reclamation of
//!   its element for the handle's lifetime
//!
//! # Example
//!
//! ```rust
//! use bramble_set::HashSet;
//!
//! let set: HashSet<u64> = HashSet::new();
//!
//! // Insert from multiple threads safely
//! set.insert(42);
//! set.insert(100);
//!
//! // Visitors observe matched elements in place
//! let mut sum = 0;
//! set.find_with(&42, |item, _| sum += *item);
//! assert_eq!(sum, 42);
//!
//! assert!(set.erase(&100));
//! assert_eq!(set.len(), 1);
//! ```

#![warn(missing_docs)]

mod chunk_list;
mod lazy_list;
mod list;
mod michael_list;
mod set;
mod trie;

pub use chunk_list::ChunkList;
pub use lazy_list::LazyList;
pub use list::{CollisionList, Guarded};
pub use michael_list::MichaelList;
pub use set::HashSet;
pub use trie::LevelStats;
