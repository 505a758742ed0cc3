use bramble_set::{ChunkList, CollisionList, HashSet, LazyList, MichaelList};
use rand::seq::SliceRandom;
use rand::thread_rng;
use std::hash::{BuildHasher, Hasher};
use std::sync::Arc;
use std::thread;

/// Degenerate two-valued hash, shared with set_test.
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

fn disjoint_inserts<L: CollisionList<u64> + 'static>(threads: u64, per_thread: u64) {
    let set: Arc<HashSet<u64, L>> = Arc::new(HashSet::new());

    let mut handles = vec![];
    for t in 0..threads {
        let s = Arc::clone(&set);
        handles.push(thread::spawn(move || {
            let mut keys: Vec<u64> = (0..per_thread).map(|i| t * per_thread + i).collect();
            keys.shuffle(&mut thread_rng());
            for key in keys {
                assert!(s.insert(key));
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(set.len(), (threads * per_thread) as usize);
    for key in 0..threads * per_thread {
        assert!(set.find(&key), "missing key {key}");
    }
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_concurrent_disjoint_inserts() {
    disjoint_inserts::<MichaelList<u64>>(8, 1000);
    disjoint_inserts::<LazyList<u64>>(8, 1000);
    disjoint_inserts::<ChunkList<u64>>(8, 500);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_heavy_contention_same_key() {
    let set: Arc<HashSet<u64>> = Arc::new(HashSet::new());

    let mut handles = vec![];
    for _ in 0..8 {
        let s = Arc::clone(&set);
        handles.push(thread::spawn(move || {
            for _ in 0..5000 {
                s.insert(0);
                let _ = s.get(&0);
                s.erase(&0);
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    // Every successful insert was matched by at most one successful erase,
    // so the counter lands on the true residue.
    let residue = set.len();
    assert!(residue <= 1);
    assert_eq!(set.find(&0), residue == 1);
}

fn collision_storm<L: CollisionList<u64> + 'static>() {
    const THREADS: u64 = 4;
    const PER_THREAD: u64 = 250;

    // Two buckets total; every thread hammers both.
    let set: Arc<HashSet<u64, L, ParityState>> =
        Arc::new(HashSet::with_hasher(ParityState));

    let mut handles = vec![];
    for t in 0..THREADS {
        let s = Arc::clone(&set);
        handles.push(thread::spawn(move || {
            for i in 0..PER_THREAD {
                let key = t * PER_THREAD + i;
                assert!(s.insert(key));
                assert!(s.find(&key));
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(set.len(), (THREADS * PER_THREAD) as usize);
    for key in 0..THREADS * PER_THREAD {
        assert!(set.find(&key));
    }

    // The whole population sits in two bucket slots.
    let stats = set.level_statistics();
    let data: usize = stats.iter().map(|s| s.data_cells).sum();
    assert_eq!(data, 2);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_collision_storm_all_strategies() {
    collision_storm::<MichaelList<u64>>();
    collision_storm::<LazyList<u64>>();
    collision_storm::<ChunkList<u64>>();
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_insert_erase_cycles_converge() {
    let set: Arc<HashSet<u64, MichaelList<u64>, ParityState>> =
        Arc::new(HashSet::with_hasher(ParityState));

    let mut handles = vec![];
    for t in 0..4u64 {
        let s = Arc::clone(&set);
        handles.push(thread::spawn(move || {
            for i in 0..2000 {
                let key = t * 2000 + i;
                assert!(s.insert(key));
                if i % 2 == 0 {
                    assert!(s.erase(&key));
                }
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    // Mutation has ceased: the counter must have converged exactly.
    assert_eq!(set.len(), 4 * 1000);
    for t in 0..4u64 {
        for i in 0..2000 {
            let key = t * 2000 + i;
            assert_eq!(set.find(&key), i % 2 == 1);
        }
    }
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_guarded_reads_under_churn() {
    let set: Arc<HashSet<u64>> = Arc::new(HashSet::new());
    for key in 0..64 {
        set.insert(key);
    }

    let mut handles = vec![];

    // Writers churn every key.
    for _ in 0..2 {
        let s = Arc::clone(&set);
        handles.push(thread::spawn(move || {
            for round in 0..200 {
                for key in 0..64 {
                    if round % 2 == 0 {
                        s.erase(&key);
                    } else {
                        s.insert(key);
                    }
                }
            }
        }));
    }

    // Readers hold handles across the churn; a handle, once obtained, must
    // keep dereferencing to its key.
    for _ in 0..4 {
        let s = Arc::clone(&set);
        handles.push(thread::spawn(move || {
            for _ in 0..2000 {
                for key in 0..64 {
                    if let Some(handle) = s.get(&key) {
                        assert_eq!(*handle, key);
                    }
                }
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }
}
