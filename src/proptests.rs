use super::*;

use proptest::prelude::*;
use std::collections::BTreeMap;

use crate::hash::{HashRemap, HashState};

#[derive(Clone, Debug)]
enum PoolOp {
    Alloc(u64),
    Free(usize),
}

fn pool_ops_strategy() -> impl Strategy<Value = Vec<PoolOp>> {
    let op = prop_oneof![
        3 => any::<u64>().prop_map(PoolOp::Alloc),
        2 => any::<usize>().prop_map(PoolOp::Free),
    ];
    prop::collection::vec(op, 0..=500)
}

#[derive(Clone, Debug)]
enum HeapOp {
    Get(u32),
    Put(usize),
}

fn heap_ops_strategy() -> impl Strategy<Value = Vec<HeapOp>> {
    let op = prop_oneof![
        3 => (1u32..=64).prop_map(HeapOp::Get),
        2 => any::<usize>().prop_map(HeapOp::Put),
    ];
    prop::collection::vec(op, 0..=400)
}

#[derive(Clone, Debug)]
enum HashOp {
    Set(u64),
    Unset(u64),
    Get(u64),
}

fn hash_ops_strategy() -> impl Strategy<Value = Vec<HashOp>> {
    // A small key universe keeps collisions, re-sets and unset/set cycles
    // frequent.
    let key = 0u64..64;
    let op = prop_oneof![
        3 => key.clone().prop_map(HashOp::Set),
        2 => key.clone().prop_map(HashOp::Unset),
        2 => key.prop_map(HashOp::Get),
    ];
    prop::collection::vec(op, 0..=600)
}

#[derive(Clone, Debug)]
enum FibOp {
    Touch(Index, i64),
    Remove(Index),
}

fn fib_ops_strategy() -> impl Strategy<Value = Vec<FibOp>> {
    let idx = 0u32..24;
    let op = prop_oneof![
        3 => (idx.clone(), 1i64..1_000_000).prop_map(|(i, p)| FibOp::Touch(i, p)),
        2 => idx.prop_map(FibOp::Remove),
    ];
    prop::collection::vec(op, 0..=500)
}

/// Key storage for the hash model: a flat vector of keys kept in step
/// with the table via resize remaps.
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

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_pool_matches_map(ops in pool_ops_strategy()) {
        let mut p: ObjectPool<u64> = ObjectPool::default();
        let mut m: BTreeMap<Index, u64> = BTreeMap::new();

        for op in ops {
            match op {
                PoolOp::Alloc(v) => {
                    let i = p.get_index();
                    prop_assert!(!m.contains_key(&i), "pool handed out a live index");
                    p[i] = v;
                    m.insert(i, v);
                }
                PoolOp::Free(pick) => {
                    let Some(&i) = m.keys().nth(pick % m.len().max(1)) else {
                        continue;
                    };
                    prop_assert!(p.put_index(i));
                    prop_assert!(!p.put_index(i), "double free must be rejected");
                    m.remove(&i);
                }
            }
            prop_assert_eq!(p.elts(), m.len());
        }

        for (&i, &v) in &m {
            prop_assert!(!p.is_free(i));
            prop_assert_eq!(p[i], v);
        }
    }

    #[test]
    fn prop_heap_blocks_never_overlap(ops in heap_ops_strategy()) {
        let mut h = Heap::default();
        // Live blocks as (id, offset, size).
        let mut live: Vec<(Index, u32, u32)> = Vec::new();

        for op in ops {
            match op {
                HeapOp::Get(size) => {
                    let (id, offset) = h.get(size);
                    for &(_, o, s) in &live {
                        prop_assert!(
                            offset + size <= o || o + s <= offset,
                            "block [{}, {}) overlaps live [{}, {})",
                            offset, offset + size, o, o + s
                        );
                    }
                    prop_assert_eq!(h.len_of(id), size);
                    prop_assert_eq!(h.offset_of(id), offset);
                    live.push((id, offset, size));
                }
                HeapOp::Put(pick) => {
                    if live.is_empty() {
                        continue;
                    }
                    let (id, _, _) = live.swap_remove(pick % live.len());
                    h.put(id).unwrap();
                    prop_assert_eq!(h.put(id), Err(HeapError::DoubleFree(id)));
                }
            }

            h.validate().unwrap();
            let total: u64 = live.iter().map(|&(_, _, s)| s as u64).sum();
            prop_assert_eq!(h.usage().used, total);
        }
    }

    #[test]
    fn prop_hash_matches_map(ops in hash_ops_strategy()) {
        let mut h = Hash::new_seeded(KeyTable::default(), 0x1234_5678);
        let mut m: BTreeMap<u64, ()> = BTreeMap::new();

        for op in ops {
            match op {
                HashOp::Set(k) => {
                    let (i, existed) = h.set(&k);
                    prop_assert_eq!(existed, m.contains_key(&k));
                    h.hasher_mut().keys[i as usize] = k;
                    m.insert(k, ());
                }
                HashOp::Unset(k) => {
                    prop_assert_eq!(h.unset(&k).is_some(), m.remove(&k).is_some());
                }
                HashOp::Get(k) => {
                    prop_assert_eq!(h.get(&k).is_some(), m.contains_key(&k));
                }
            }
            prop_assert_eq!(h.elts() as usize, m.len());
        }

        let mut stored: Vec<u64> = Vec::new();
        h.foreach_index(|i| stored.push(h.hasher().keys[i as usize]));
        stored.sort_unstable();
        let expected: Vec<u64> = m.keys().copied().collect();
        prop_assert_eq!(stored, expected);
    }

    #[test]
    fn prop_fibheap_min_matches_scan(ops in fib_ops_strategy()) {
        let mut f = FibHeap::default();
        // 0 means absent.
        let mut objs = vec![0i64; 24];

        for op in ops {
            match op {
                FibOp::Touch(x, p) => {
                    if objs[x as usize] == 0 {
                        objs[x as usize] = p;
                        f.add(x);
                    } else {
                        objs[x as usize] = p;
                        f.update(x);
                    }
                }
                FibOp::Remove(x) => {
                    if objs[x as usize] == 0 {
                        continue;
                    }
                    objs[x as usize] = 0;
                    f.del(x);
                }
            }

            f.validate().unwrap();
            let fmin = f.min(&objs[..]);
            let omin = objs
                .iter()
                .enumerate()
                .filter(|(_, &v)| v != 0)
                .min_by_key(|&(_, &v)| v)
                .map_or(NO_INDEX, |(i, _)| i as Index);
            if omin == NO_INDEX {
                prop_assert_eq!(fmin, NO_INDEX);
            } else {
                prop_assert_ne!(fmin, NO_INDEX);
                prop_assert_eq!(objs[fmin as usize], objs[omin as usize]);
            }
        }
    }
}
