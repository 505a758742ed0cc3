//! Benchmark: collision-list strategies under the hash set facade.

use bramble_set::{ChunkList, CollisionList, HashSet, LazyList, MichaelList};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::thread;

const OPS: usize = 10_000;
const THREAD_COUNTS: &[usize] = &[1, 2, 4, 8];

fn bench_insert_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_thread_insert");
    group.throughput(Throughput::Elements(OPS as u64));

    group.bench_function("michael", |b| {
        b.iter(|| {
            let set: HashSet<u64, MichaelList<u64>> = HashSet::new();
            for i in 0..OPS as u64 {
                set.insert(black_box(i));
            }
            set
        });
    });
    group.bench_function("lazy", |b| {
        b.iter(|| {
            let set: HashSet<u64, LazyList<u64>> = HashSet::new();
            for i in 0..OPS as u64 {
                set.insert(black_box(i));
            }
            set
        });
    });
    group.bench_function("chunk", |b| {
        b.iter(|| {
            let set: HashSet<u64, ChunkList<u64>> = HashSet::new();
            for i in 0..OPS as u64 {
                set.insert(black_box(i));
            }
            set
        });
    });

    group.finish();
}

fn bench_find(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_thread_find");
    group.throughput(Throughput::Elements(OPS as u64));

    let set: HashSet<u64> = HashSet::new();
    for i in 0..OPS as u64 {
        set.insert(i);
    }

    group.bench_function("hit", |b| {
        b.iter(|| {
            for i in 0..OPS as u64 {
                black_box(set.find(black_box(&i)));
            }
        });
    });
    group.bench_function("miss", |b| {
        b.iter(|| {
            for i in OPS as u64..2 * OPS as u64 {
                black_box(set.find(black_box(&i)));
            }
        });
    });

    group.finish();
}

fn scaling<L: CollisionList<u64> + 'static>(threads: usize) {
    let set: Arc<HashSet<u64, L>> = Arc::new(HashSet::new());
    let per_thread = (OPS / threads) as u64;

    let mut handles = vec![];
    for t in 0..threads as u64 {
        let s = Arc::clone(&set);
        handles.push(thread::spawn(move || {
            for i in 0..per_thread {
                let key = t * per_thread + i;
                s.insert(key);
                s.find(&key);
                s.erase(&key);
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
}

fn bench_thread_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixed_ops_scaling");
    group.throughput(Throughput::Elements(OPS as u64));

    for &threads in THREAD_COUNTS {
        group.bench_with_input(
            BenchmarkId::new("michael", threads),
            &threads,
            |b, &threads| b.iter(|| scaling::<MichaelList<u64>>(threads)),
        );
        group.bench_with_input(BenchmarkId::new("lazy", threads), &threads, |b, &threads| {
            b.iter(|| scaling::<LazyList<u64>>(threads))
        });
        group.bench_with_input(
            BenchmarkId::new("chunk", threads),
            &threads,
            |b, &threads| b.iter(|| scaling::<ChunkList<u64>>(threads)),
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_insert_strategies,
    bench_find,
    bench_thread_scaling
);
criterion_main!(benches);
