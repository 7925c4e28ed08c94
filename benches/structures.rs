//! Benchmarks for the index-addressed structures, with standard library
//! collections as reference points where a fair comparison exists.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::collections::{BinaryHeap, HashMap};

use flatidx::hash::{HashRemap, HashState};
use flatidx::{FibHeap, Hash, Hasher, HasherKey, Heap, Index, ObjectPool, NO_INDEX};

#[derive(Default)]
struct KeyTable {
    keys: Vec<u64>,
}

impl Hasher for KeyTable {
    fn hash_index(&self, s: &mut HashState, i: Index) {
        s.hash_slice(&self.keys[i as usize].to_le_bytes());
    }

    fn hash_resize(&mut self, new_cap: usize, remaps: &[HashRemap]) {
        let mut keys = vec![0u64; new_cap];
        for r in remaps {
            keys[r.dst as usize] = self.keys[r.src as usize];
        }
        self.keys = keys;
    }
}

impl HasherKey<KeyTable> for u64 {
    fn hash_key(&self, s: &mut HashState) {
        s.hash_slice(&self.to_le_bytes());
    }

    fn hash_key_equal(&self, h: &KeyTable, i: Index) -> bool {
        h.keys[i as usize] == *self
    }
}

fn bench_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool");

    group.bench_function("alloc_free_churn", |b| {
        b.iter(|| {
            let mut p: ObjectPool<u64> = ObjectPool::default();
            let mut ids = Vec::with_capacity(1024);
            for i in 0..1024u64 {
                let id = p.get_index();
                p[id] = i;
                ids.push(id);
            }
            for id in ids.drain(512..) {
                p.put_index(id);
            }
            for i in 0..512u64 {
                let id = p.get_index();
                p[id] = i;
            }
            black_box(p)
        });
    });

    group.finish();
}

fn bench_heap(c: &mut Criterion) {
    let mut group = c.benchmark_group("heap");

    group.bench_function("get_put_churn", |b| {
        b.iter(|| {
            let mut h = Heap::default();
            let mut live = Vec::with_capacity(512);
            for i in 0..512u32 {
                let size = 1 + (i * 7) % 61;
                let (id, _) = h.get(size);
                live.push(id);
                if i % 2 == 0 {
                    let id = live.swap_remove((i as usize * 13) % live.len());
                    h.put(id).unwrap();
                }
            }
            black_box(h)
        });
    });

    group.finish();
}

fn bench_hash(c: &mut Criterion) {
    let mut group = c.benchmark_group("hash");

    for size in [1_000u64, 100_000] {
        group.bench_with_input(BenchmarkId::new("insert", size), &size, |b, &n| {
            b.iter(|| {
                let mut h = Hash::new_seeded(KeyTable::default(), 1);
                for k in 0..n {
                    let (i, _) = h.set(&k);
                    h.hasher_mut().keys[i as usize] = k;
                }
                black_box(h)
            });
        });

        group.bench_with_input(BenchmarkId::new("insert_std", size), &size, |b, &n| {
            b.iter(|| {
                let mut m: HashMap<u64, ()> = HashMap::new();
                for k in 0..n {
                    m.insert(k, ());
                }
                black_box(m)
            });
        });

        let mut h = Hash::new_seeded(KeyTable::default(), 1);
        for k in 0..size {
            let (i, _) = h.set(&k);
            h.hasher_mut().keys[i as usize] = k;
        }
        group.bench_with_input(BenchmarkId::new("lookup", size), &size, |b, &n| {
            b.iter(|| {
                let mut found = 0u64;
                for k in 0..n {
                    if h.get(&k).is_some() {
                        found += 1;
                    }
                }
                black_box(found)
            });
        });
    }

    group.finish();
}

fn bench_fibheap(c: &mut Criterion) {
    let mut group = c.benchmark_group("fibheap");
    let n = 10_000u32;
    let prios: Vec<i64> = (0..n).map(|i| ((i as i64) * 2654435761) % 1_000_003 + 1).collect();

    group.bench_function("add_drain", |b| {
        b.iter(|| {
            let mut f = FibHeap::default();
            for i in 0..n {
                f.add(i);
            }
            let mut last = NO_INDEX;
            loop {
                let m = f.min(&prios[..]);
                if m == NO_INDEX {
                    break;
                }
                f.del(m);
                last = m;
            }
            black_box(last)
        });
    });

    group.bench_function("add_drain_std", |b| {
        b.iter(|| {
            let mut q: BinaryHeap<std::cmp::Reverse<i64>> = BinaryHeap::new();
            for &p in &prios {
                q.push(std::cmp::Reverse(p));
            }
            let mut last = 0i64;
            while let Some(std::cmp::Reverse(p)) = q.pop() {
                last = p;
            }
            black_box(last)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_pool, bench_heap, bench_hash, bench_fibheap);
criterion_main!(benches);
