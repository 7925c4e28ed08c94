//! Open-addressing hash table storing 1-byte short-hash tags.
//!
//! The table itself never stores keys or values. Callers keep key storage
//! indexed by the same slot indices the table hands out and wire it in via
//! the [`Hasher`] / [`HasherKey`] traits. Per slot the table keeps only a
//! tag recording the slot's distance from its bucket base, so a lookup can
//! skip most key comparisons and the whole table stays one flat byte
//! vector.
//!
//! Capacity is a sum of two powers of two (see [`Cap`]), realized as two
//! power-of-two sub-tables; `limit0` splits the 32-bit hash space between
//! them in proportion to their sizes. Within a bucket, slots probe by XOR
//! of the base index with the probe distance. When a bucket fills, the
//! whole table grows and every element rehashes under a fresh seed; the
//! resulting old-slot to new-slot mapping is handed to the caller as a
//! batch of [`HashRemap`]s so key storage can follow.

use std::fmt;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::bits::Cap;
use crate::Index;

/// 128 bits of running hash state.
///
/// The mixing function follows the SpookyHash short-input construction:
/// four 64-bit lanes, rotate-add-xor mix rounds while absorbing input,
/// then a final avalanche. Only two lanes survive as output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HashState(pub [u64; 2]);

#[inline]
fn mix_step(a: u64, b: u64, c: u64, n: u32) -> (u64, u64, u64) {
    let a = a.rotate_left(n).wrapping_add(b);
    (a, b, c ^ a)
}

#[inline]
fn mix(h0: u64, h1: u64, h2: u64, h3: u64) -> (u64, u64, u64, u64) {
    let (h2, h3, h0) = mix_step(h2, h3, h0, 50);
    let (h3, h0, h1) = mix_step(h3, h0, h1, 52);
    let (h0, h1, h2) = mix_step(h0, h1, h2, 30);
    let (h1, h2, h3) = mix_step(h1, h2, h3, 41);

    let (h2, h3, h0) = mix_step(h2, h3, h0, 54);
    let (h3, h0, h1) = mix_step(h3, h0, h1, 48);
    let (h0, h1, h2) = mix_step(h0, h1, h2, 38);
    let (h1, h2, h3) = mix_step(h1, h2, h3, 37);

    let (h2, h3, h0) = mix_step(h2, h3, h0, 62);
    let (h3, h0, h1) = mix_step(h3, h0, h1, 34);
    let (h0, h1, h2) = mix_step(h0, h1, h2, 5);
    let (h1, h2, h3) = mix_step(h1, h2, h3, 36);

    (h0, h1, h2, h3)
}

#[inline]
fn fin_step(a: u64, b: u64, n: u32) -> (u64, u64) {
    let a = a ^ b;
    let b = b.rotate_left(n);
    (a.wrapping_add(b), b)
}

fn finalize(h0: u64, h1: u64, h2: u64, h3: u64) -> (u64, u64, u64, u64) {
    let (h3, h2) = fin_step(h3, h2, 15);
    let (h0, h3) = fin_step(h0, h3, 52);
    let (h1, h0) = fin_step(h1, h0, 26);
    let (h2, h1) = fin_step(h2, h1, 51);

    let (h3, h2) = fin_step(h3, h2, 28);
    let (h0, h3) = fin_step(h0, h3, 9);
    let (h1, h0) = fin_step(h1, h0, 47);
    let (h2, h1) = fin_step(h2, h1, 54);

    let (h3, h2) = fin_step(h3, h2, 32);
    let (h0, h3) = fin_step(h0, h3, 25);
    let (h1, h0) = fin_step(h1, h0, 63);

    (h0, h1, h2, h3)
}

#[inline]
fn get64(b: &[u8], i: usize) -> u64 {
    u64::from_le_bytes(b[i..i + 8].try_into().unwrap())
}

#[inline]
fn get32(b: &[u8], i: usize) -> u64 {
    u32::from_le_bytes(b[i..i + 4].try_into().unwrap()) as u64
}

#[inline]
fn get16(b: &[u8], i: usize) -> u64 {
    u16::from_le_bytes(b[i..i + 2].try_into().unwrap()) as u64
}

impl HashState {
    pub fn seed(&mut self, h0: u64, h1: u64) {
        self.0 = [h0, h1];
    }

    fn mix_slice(
        mut h0: u64,
        mut h1: u64,
        mut h2: u64,
        mut h3: u64,
        b: &[u8],
    ) -> (u64, u64, u64, u64) {
        let n = b.len();
        let mut i = 0;

        let n8 = n & !7;

        while i + 4 * 8 <= n8 {
            h2 = h2.wrapping_add(get64(b, i));
            h3 = h3.wrapping_add(get64(b, i + 8));
            (h0, h1, h2, h3) = mix(h0, h1, h2, h3);
            h0 = h0.wrapping_add(get64(b, i + 16));
            h1 = h1.wrapping_add(get64(b, i + 24));
            i += 4 * 8;
        }

        if i + 2 * 8 <= n8 {
            h2 = h2.wrapping_add(get64(b, i));
            h3 = h3.wrapping_add(get64(b, i + 8));
            (h0, h1, h2, h3) = mix(h0, h1, h2, h3);
            i += 2 * 8;
        }

        if i + 8 <= n8 {
            h2 = h2.wrapping_add(get64(b, i));
            i += 8;
        }

        if (n - i) >= 4 {
            h3 = h3.wrapping_add(get32(b, i));
            i += 4;
        }

        if (n - i) >= 2 {
            h3 = h3.wrapping_add(get16(b, i) << 32);
            i += 2;
        }

        if i < n {
            h3 = h3.wrapping_add((b[i] as u64) << (32 + 16));
        }

        (h0, h1, h2, h3)
    }

    /// Mixes `b` into the state. Call repeatedly to hash a multi-part key.
    pub fn hash_slice(&mut self, b: &[u8]) {
        // A constant which is not zero, is odd, and is a not-very-regular
        // mix of ones and zeros. No other mathematical properties needed.
        const SEED_CONST: u64 = 0xdead_beef_dead_beef;

        let (mut h0, h1) = (self.0[0], self.0[1]);
        let (h2, h3) = (SEED_CONST, SEED_CONST);

        // Mix in data length.
        h0 = h0.wrapping_add(b.len() as u64);

        let (h0, h1, h2, h3) = Self::mix_slice(h0, h1, h2, h3, b);
        let (h0, h1, _, _) = finalize(h0, h1, h2, h3);

        self.0 = [h0, h1];
    }

    #[inline]
    fn offset(&self) -> u64 {
        self.0[1]
    }
}

/// Probe distance plus 1; 0 means the slot is empty.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct BitDiff(u8);

impl BitDiff {
    #[inline]
    fn is_valid(self) -> bool {
        self.0 != 0
    }

    #[inline]
    fn matches(self, diff: u32) -> bool {
        diff + 1 == self.0 as u32
    }
}

/// One element move produced by a grow/copy cycle: the element in old
/// slot `src` now lives in new slot `dst`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HashRemap {
    pub src: Index,
    pub dst: Index,
}

/// Caller-side key storage, indexed by table slot.
pub trait Hasher {
    /// Mixes the key stored at slot `i` into `s`.
    fn hash_index(&self, s: &mut HashState, i: Index);

    /// The table has grown to `new_cap` slots and every surviving element
    /// moved per `remaps`. Key storage must follow; slots not named as a
    /// `dst` are empty afterwards.
    fn hash_resize(&mut self, new_cap: usize, remaps: &[HashRemap]);
}

/// A key to look up or insert, bound to the [`Hasher`] holding stored keys.
pub trait HasherKey<H: Hasher> {
    /// Mixes this key into `s`.
    fn hash_key(&self, s: &mut HashState);

    /// True if this key equals the key stored at slot `i`.
    fn hash_key_equal(&self, h: &H, i: Index) -> bool;
}

/// Per-operation counters: searches and key compares per call.
#[derive(Clone, Copy, Debug, Default)]
pub struct OpStats {
    pub calls: u64,
    pub searches: u64,
    pub compares: u64,
}

impl OpStats {
    fn record(&mut self, searches: u64, compares: u64) {
        self.calls += 1;
        self.searches += searches;
        self.compares += compares;
    }
}

impl fmt::Display for OpStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.calls == 0 {
            return Ok(());
        }
        write!(
            f,
            "search/call {:.2}, cmp/call {:.2}",
            self.searches as f64 / self.calls as f64,
            self.compares as f64 / self.calls as f64
        )
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct HashStats {
    pub grows: u64,
    pub copies: u64,
    pub get: OpStats,
    pub set: OpStats,
    pub unset: OpStats,
}

/// Open-addressing hash table over caller-owned key storage `H`.
#[derive(Debug)]
pub struct Hash<H: Hasher> {
    hasher: H,
    seed: HashState,
    cap: Cap,
    log2_cap: [u8; 2],
    log2_elts_per_bucket: u8,
    limit0: u32,
    bit_diffs: Vec<BitDiff>,
    /// Largest valid tag per bucket; bounds the probe scan.
    max_bucket_bit_diffs: Vec<BitDiff>,
    n_elts: u32,
    resize_remaps: Vec<HashRemap>,
    stats: HashStats,
    rng: SmallRng,
}

impl<H: Hasher> Hash<H> {
    pub fn new(hasher: H) -> Self {
        Self::with_rng(hasher, SmallRng::from_entropy())
    }

    /// Like [`Hash::new`] but with a fixed seed for the per-grow rehash
    /// seeds. Deterministic runs for tests and benchmarks.
    pub fn new_seeded(hasher: H, seed: u64) -> Self {
        Self::with_rng(hasher, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(hasher: H, rng: SmallRng) -> Self {
        Self {
            hasher,
            seed: HashState::default(),
            cap: Cap(0),
            log2_cap: [0; 2],
            log2_elts_per_bucket: 0,
            limit0: 0,
            bit_diffs: Vec::new(),
            max_bucket_bit_diffs: Vec::new(),
            n_elts: 0,
            resize_remaps: Vec::new(),
            stats: HashStats::default(),
            rng,
        }
    }

    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    pub fn hasher_mut(&mut self) -> &mut H {
        &mut self.hasher
    }

    /// Number of elements currently stored.
    pub fn elts(&self) -> u32 {
        self.n_elts
    }

    /// Number of slots, occupied or not.
    pub fn cap(&self) -> u32 {
        self.cap.0
    }

    pub fn stats(&self) -> &HashStats {
        &self.stats
    }

    /// Calls `f` with every occupied slot index.
    pub fn foreach_index(&self, mut f: impl FnMut(Index)) {
        for (i, bd) in self.bit_diffs.iter().enumerate() {
            if bd.is_valid() {
                f(i as Index);
            }
        }
    }

    #[inline]
    fn cap_mask(&self, table: u32) -> u32 {
        (1u32 << self.log2_cap[table as usize]) - 1
    }

    /// Slot where a key with final hash state `s` starts probing.
    ///
    /// The low 32 bits of lane 0 pick the sub-table; lane 1 picks the
    /// offset within it.
    fn base_index(&self, s: &HashState) -> Index {
        let table = (s.0[0] as u32 > self.limit0) as u32;
        (s.offset() as u32 & self.cap_mask(table)) + (table << self.log2_cap[0])
    }

    fn base_index_for_key<K: HasherKey<H>>(&self, s: &mut HashState, k: &K) -> Index {
        *s = self.seed;
        k.hash_key(s);
        self.base_index(s)
    }

    fn base_index_for_index(&self, s: &mut HashState, i: Index) -> Index {
        *s = self.seed;
        self.hasher.hash_index(s, i);
        self.base_index(s)
    }

    fn is_empty_table(&self) -> bool {
        self.bit_diffs.is_empty()
    }

    /// Probes the bucket at `base` for `k`. Returns the matching probe
    /// distance plus (searches, compares) counts for the stats.
    fn search_base<K: HasherKey<H>>(&self, base: Index, k: &K) -> (Option<u32>, u64, u64) {
        let n = 1u32 << self.log2_elts_per_bucket;
        let bucket = base >> self.log2_elts_per_bucket;
        let max_valid = self.max_bucket_bit_diffs[bucket as usize].0 as u32;
        let mut compares = 0u64;
        let mut diff = 0u32;
        let mut found = None;
        while diff < n {
            let i = base ^ diff;
            if self.bit_diffs[i as usize].matches(diff) {
                compares += 1;
                if k.hash_key_equal(&self.hasher, i) {
                    found = Some(diff);
                    break;
                }
            } else if diff + 1 >= max_valid {
                break;
            }
            diff += 1;
        }
        (found, diff as u64, compares)
    }

    fn set_bit_diff(&mut self, i: Index, base: Index, diff: u32) {
        let bd = BitDiff((1 + diff) as u8);
        let bucket = (base >> self.log2_elts_per_bucket) as usize;
        if bd.0 > self.max_bucket_bit_diffs[bucket].0 {
            self.max_bucket_bit_diffs[bucket] = bd;
        }
        self.bit_diffs[i as usize] = bd;
    }

    /// Claims the first empty slot in the bucket at `base`, tagging it.
    fn search_free_index(&mut self, base: Index) -> Option<Index> {
        let n = 1u32 << self.log2_elts_per_bucket;
        for diff in 0..n {
            let i = base ^ diff;
            if !self.bit_diffs[i as usize].is_valid() {
                self.set_bit_diff(i, base, diff);
                return Some(i);
            }
        }
        None
    }

    /// Finds a new slot for the element previously stored at old slot `ki`.
    fn search_index(&mut self, s: &mut HashState, ki: Index) -> Option<Index> {
        let base = self.base_index_for_index(s, ki);
        self.search_free_index(base)
    }

    /// Looks up `k`, returning its slot index if present.
    pub fn get<K: HasherKey<H>>(&mut self, k: &K) -> Option<Index> {
        if self.is_empty_table() {
            return None;
        }
        let mut s = HashState::default();
        let base = self.base_index_for_key(&mut s, k);
        let (m, searches, compares) = self.search_base(base, k);
        self.stats.get.record(searches, compares);
        m.map(|diff| base ^ diff)
    }

    /// Inserts `k`, growing as needed. Returns the slot index and whether
    /// the key was already present. On a fresh insert the caller must
    /// store the key at the returned slot before the next table operation.
    pub fn set<K: HasherKey<H>>(&mut self, k: &K) -> (Index, bool) {
        let mut s = HashState::default();
        let mut non_empty = !self.is_empty_table();
        loop {
            if non_empty {
                let base = self.base_index_for_key(&mut s, k);
                let (m, searches, compares) = self.search_base(base, k);
                self.stats.set.record(searches, compares);
                if let Some(diff) = m {
                    return (base ^ diff, true);
                }
                if let Some(i) = self.search_free_index(base) {
                    self.n_elts += 1;
                    return (i, false);
                }
            }

            // Bucket full (or empty table): grow until every surviving
            // element finds a slot under the new seed.
            let save = std::mem::take(&mut self.bit_diffs);
            loop {
                self.grow();
                if self.copy(&mut s, &save) {
                    break;
                }
            }
            non_empty = true;
        }
    }

    /// Removes `k` if present, returning the slot it occupied.
    ///
    /// The table never shrinks on removal; freed slots are reused by later
    /// inserts.
    pub fn unset<K: HasherKey<H>>(&mut self, k: &K) -> Option<Index> {
        if self.is_empty_table() {
            return None;
        }
        let mut s = HashState::default();
        let base = self.base_index_for_key(&mut s, k);
        let (m, searches, compares) = self.search_base(base, k);
        self.stats.unset.record(searches, compares);
        m.map(|diff| {
            let i = base ^ diff;
            self.bit_diffs[i as usize] = BitDiff(0);
            self.n_elts -= 1;
            i
        })
    }

    fn grow(&mut self) {
        self.stats.grows += 1;
        self.cap = self.cap.next();

        let (log2c0, log2c1) = self.cap.log2();
        self.log2_cap[0] = log2c0 as u8;
        self.log2_cap[1] = log2c1.unwrap_or(0) as u8;

        // For occupancy around 1/2, the probability that a bucket of 2^M
        // slots is full is about 2^-(1+M); with 2^l0 / 2^M buckets the
        // chance that some bucket is full stays bounded when l0 = 2M + 1.
        let mut log2_bucket = (log2c0 - 1) / 2;
        // Tags are probe-distance-plus-1 in one byte, so buckets cap at 128.
        if log2_bucket > 7 {
            log2_bucket = 7;
        }
        self.log2_elts_per_bucket = log2_bucket as u8;

        match log2c1 {
            None => {
                // Single table: no hash value exceeds the limit.
                self.limit0 = u32::MAX;
            }
            Some(mut log2c1) => {
                // Each sub-table must hold a whole number of buckets.
                if log2_bucket > log2c1 {
                    log2c1 = log2_bucket;
                    self.cap = Cap((1u32 << log2c0) | (1u32 << log2c1));
                    self.log2_cap[1] = log2c1 as u8;
                }

                // 2^32 * 2^l0 / (2^l0 + 2^l1).
                self.limit0 = ((1u64 << (32 + log2c0)) / self.cap.0 as u64) as u32;
            }
        }

        self.seed.0 = [self.rng.gen(), self.rng.gen()];

        self.bit_diffs = vec![BitDiff(0); self.cap.as_usize()];
        let n_buckets = self.cap.0 >> self.log2_elts_per_bucket;
        self.max_bucket_bit_diffs = vec![BitDiff(0); n_buckets as usize];
        self.n_elts = 0;
    }

    /// Re-inserts every element tagged in `saved` into the freshly grown
    /// table, recording the slot moves. False if some bucket overflows, in
    /// which case the caller grows again; key storage is untouched on
    /// failure.
    fn copy(&mut self, s: &mut HashState, saved: &[BitDiff]) -> bool {
        self.stats.copies += 1;
        self.resize_remaps.clear();
        for (src, bd) in saved.iter().enumerate() {
            if !bd.is_valid() {
                continue;
            }
            match self.search_index(s, src as Index) {
                Some(dst) => self.resize_remaps.push(HashRemap {
                    src: src as Index,
                    dst,
                }),
                None => return false,
            }
        }
        let n = self.resize_remaps.len() as u32;
        self.hasher.hash_resize(self.cap.as_usize(), &self.resize_remaps);
        self.n_elts = n;
        true
    }
}

impl<H: Hasher> fmt::Display for Hash<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "elts {}, cap {}, bucket: 2^{}, grows {}, copies {}\n    get: {}\n    set: {}\n  unset: {}",
            self.elts(),
            self.cap(),
            self.log2_elts_per_bucket,
            self.stats.grows,
            self.stats.copies,
            self.stats.get,
            self.stats.set,
            self.stats.unset
        )
    }
}
