//! Demo: the set under an adversarial hash function.
//!
//! Every key hashes to its parity, so the whole population lands in two
//! buckets, and the structure still resolves each key independently.

use bramble_set::{HashSet, MichaelList};
use std::hash::{BuildHasher, Hasher};
use std::sync::Arc;
use std::thread;

#[derive(Clone, Default)]
struct ParityState;

struct ParityHasher {
    acc: u64,
}

impl Hasher for ParityHasher {
    fn finish(&self) -> u64 {
        self.acc % 2
    }

    fn write(&mut self, bytes: &[u8]) {
        for b in bytes {
            self.acc = self.acc.wrapping_add(u64::from(*b));
        }
    }
}

impl BuildHasher for ParityState {
    type Hasher = ParityHasher;

    fn build_hasher(&self) -> ParityHasher {
        ParityHasher { acc: 0 }
    }
}

fn main() {
    let set: Arc<HashSet<u64, MichaelList<u64>, ParityState>> =
        Arc::new(HashSet::with_hasher(ParityState));

    let mut handles = vec![];
    for t in 0..4u64 {
        let s = Arc::clone(&set);
        handles.push(thread::spawn(move || {
            for i in 0..1000 {
                s.insert(t * 1000 + i);
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    println!("inserted {} keys into a two-bucket set", set.len());

    if let Some(handle) = set.get(&1234) {
        println!("get(1234) -> {}", *handle);
    }

    println!("head table cells: {}", set.head_size());
    println!("interior table cells: {}", set.array_node_size());
    for (level, stats) in set.level_statistics().iter().enumerate() {
        println!(
            "level {level}: {} buckets, {} child tables, {} empty cells",
            stats.data_cells, stats.array_cells, stats.empty_cells
        );
    }
}
