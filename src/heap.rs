//! Variable-size block allocator over one contiguous index space.
//!
//! A [`Heap`] maintains an allocator for arbitrary-sized blocks of an
//! underlying array. The array itself is not part of the heap: the heap
//! hands out `(id, offset)` pairs and the caller backs the offsets with
//! whatever flat storage it likes (see [`MemHeap`](crate::mem_heap::MemHeap)
//! for a byte-backed example).
//!
//! Blocks form one doubly linked list ordered by address with no gaps;
//! adjacent free blocks are coalesced immediately on [`Heap::put`], so no
//! two free blocks are ever neighbors. Free blocks are filed in free lists
//! keyed by exact size, with one catch-all list (class 0) for blocks larger
//! than the biggest size ever requested.

use std::fmt;

use thiserror::Error;

use crate::{Index, NO_INDEX};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct HeapElt {
    /// Starting offset of this block within the address space.
    index: Index,
    /// Slot in the free list for this block's size class, or `NO_INDEX`
    /// when the block is allocated.
    free: Index,
    /// Neighbors in address order.
    next: Index,
    prev: Index,
}

const POISON: HeapElt = HeapElt {
    index: NO_INDEX,
    free: NO_INDEX,
    next: NO_INDEX,
    prev: NO_INDEX,
};

impl HeapElt {
    #[inline]
    fn is_free(&self) -> bool {
        self.free != NO_INDEX
    }
}

/// Errors reported by [`Heap::put`] and [`Heap::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeapError {
    #[error("duplicate free of block {0}")]
    DoubleFree(Index),
    #[error("heap corrupt: {0}")]
    Corrupt(String),
}

/// Used/free unit counts for a heap, as reported by [`Heap::usage`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapUsage {
    pub used: u64,
    pub free: u64,
}

/// Allocator for arbitrary-sized blocks of an underlying array.
#[derive(Clone, Debug)]
pub struct Heap {
    elts: Vec<HeapElt>,

    /// Free element indices grouped by exact size; class 0 holds blocks
    /// larger than `max_size`.
    free: Vec<Vec<Index>>,

    /// Recycled element slots, so `elts` grows with peak live blocks
    /// rather than with total allocation calls.
    removed: Vec<Index>,

    head: Index,
    tail: Index,

    /// Total number of units ever brought into the address space.
    len: Index,

    /// Largest size ever requested.
    max_size: Index,

    /// Hard bound on `len`; 0 means unbounded.
    max_len: Index,
}

impl Default for Heap {
    fn default() -> Self {
        Self {
            elts: Vec::new(),
            free: Vec::new(),
            removed: Vec::new(),
            head: NO_INDEX,
            tail: NO_INDEX,
            len: 0,
            max_size: 0,
            max_len: 0,
        }
    }
}

impl Heap {
    /// Bounds the address space at `n` units. A `get` that would push past
    /// the bound panics: no recovery protocol exists for overflow.
    pub fn set_max_len(&mut self, n: Index) {
        self.max_len = n;
    }

    pub fn max_len(&self) -> Index {
        self.max_len
    }

    /// Total units in the address space (allocated plus free).
    pub fn address_len(&self) -> Index {
        self.len
    }

    fn size(&self, ei: Index) -> Index {
        let e = &self.elts[ei as usize];
        let end = if e.next != NO_INDEX {
            self.elts[e.next as usize].index
        } else {
            self.len
        };
        end - e.index
    }

    /// Size of the block with id `ei`.
    pub fn len_of(&self, ei: Index) -> Index {
        self.size(ei)
    }

    /// Starting offset of the block with id `ei`.
    pub fn offset_of(&self, ei: Index) -> Index {
        self.elts[ei as usize].index
    }

    /// Offset and size of the block with id `ei`.
    pub fn get_id(&self, ei: Index) -> (Index, Index) {
        (self.elts[ei as usize].index, self.size(ei))
    }

    /// Recycle previously removed element slots.
    fn new_elt(&mut self) -> Index {
        match self.removed.pop() {
            Some(ei) => {
                self.elts[ei as usize] = POISON;
                ei
            }
            None => {
                self.elts.push(POISON);
                (self.elts.len() - 1) as Index
            }
        }
    }

    fn free_elt(&mut self, ei: Index, size: Index) {
        let class = if size > self.max_size { 0 } else { size as usize };
        if class >= self.free.len() {
            self.free.resize_with(class + 1, Vec::new);
        }
        self.elts[ei as usize].free = self.free[class].len() as Index;
        self.free[class].push(ei);
    }

    /// Checks that `ei` sits where its `free` field claims within `class`,
    /// and unlinks it by swap-removal if so.
    fn try_remove_from_class(&mut self, ei: Index, class: usize) -> bool {
        let fi = self.elts[ei as usize].free;
        let l = self.free[class].len() as Index;
        if fi >= l || self.free[class][fi as usize] != ei {
            return false;
        }
        if fi + 1 < l {
            let gi = self.free[class][l as usize - 1];
            self.free[class][fi as usize] = gi;
            self.elts[gi as usize].free = fi;
        }
        self.free[class].pop();
        true
    }

    fn remove_free_elt(&mut self, ei: Index, size: Index) {
        let mut class = size as usize;
        if size > self.max_size || class >= self.free.len() {
            class = 0;
        }
        // A block filed before max_size grew past its size lives in class 0
        // even though an exact list exists now.
        let removed = self.try_remove_from_class(ei, class)
            || (class != 0 && !self.free.is_empty() && self.try_remove_from_class(ei, 0));
        if !removed {
            panic!("heap: corrupt free list entry for block {ei}");
        }
        self.elts[ei as usize] = POISON;
        self.removed.push(ei);
    }

    /// Allocates a block of `size` units, returning its id and offset.
    ///
    /// Panics on `size == 0` and on exceeding a configured `max_len`; both
    /// are contract violations, not recoverable conditions.
    pub fn get(&mut self, size: Index) -> (Index, Index) {
        assert!(size > 0, "heap: zero size block request");
        if size > self.max_size {
            self.max_size = size;
        }

        // Search order: exact-size class, then the catch-all class, then
        // larger exact classes (splitting), then extend at the tail.
        // Exact-size free list first.
        if (size as usize) < self.free.len() {
            if let Some(ei) = self.free[size as usize].pop() {
                let e = &mut self.elts[ei as usize];
                e.free = NO_INDEX;
                return (ei, e.index);
            }
        }

        // First fit among oversized free blocks, splitting any remainder.
        if !self.free.is_empty() {
            let l = self.free[0].len();
            for fi in 0..l {
                let ei = self.free[0][fi];
                let es = self.size(ei);
                if es < size {
                    continue;
                }
                if fi + 1 < l {
                    let gi = self.free[0][l - 1];
                    self.free[0][fi] = gi;
                    self.elts[gi as usize].free = fi as Index;
                }
                self.free[0].pop();

                let offset = self.elts[ei as usize].index;
                self.elts[ei as usize].free = NO_INDEX;
                if es > size {
                    self.free_after(ei, es, es - size);
                }
                return (ei, offset);
            }
        }

        // First fit over larger exact classes; blocks in class c have size
        // exactly c, so the remainder split is c - size.
        for class in (size as usize + 1)..self.free.len() {
            let Some(&ei) = self.free[class].last() else {
                continue;
            };
            self.free[class].pop();
            let offset = self.elts[ei as usize].index;
            self.elts[ei as usize].free = NO_INDEX;
            self.free_after(ei, class as Index, class as Index - size);
            return (ei, offset);
        }

        // Nothing reusable: extend the address range at the tail.
        if self.max_len != 0 && self.len.checked_add(size).map_or(true, |l| l > self.max_len) {
            panic!(
                "heap: address space overflow, {} + {} exceeds max len {}",
                self.len, size, self.max_len
            );
        }
        if self.len == 0 {
            self.head = 0;
            self.tail = NO_INDEX;
        }

        let ei = self.new_elt();
        let offset = self.len;
        self.len += size;
        let prev = self.tail;
        {
            let e = &mut self.elts[ei as usize];
            e.index = offset;
            e.next = NO_INDEX;
            e.prev = prev;
            e.free = NO_INDEX;
        }
        self.tail = ei;
        if prev != NO_INDEX {
            self.elts[prev as usize].next = ei;
        }
        (ei, offset)
    }

    /// Splits the trailing `d` units off block `ei` (of total `size`) into
    /// a new free block directly after it.
    fn free_after(&mut self, ei: Index, size: Index, d: Index) {
        let fi = self.new_elt();
        let (e_index, e_next) = {
            let e = &self.elts[ei as usize];
            (e.index, e.next)
        };
        {
            let f = &mut self.elts[fi as usize];
            f.index = e_index + (size - d);
            f.next = e_next;
            f.prev = ei;
        }
        if e_next != NO_INDEX {
            self.elts[e_next as usize].prev = fi;
        }
        self.elts[ei as usize].next = fi;
        if ei == self.tail {
            self.tail = fi;
        }
        self.free_elt(fi, d);
    }

    /// Frees the block with id `ei`, coalescing with free neighbors.
    pub fn put(&mut self, ei: Index) -> Result<(), HeapError> {
        if self.elts[ei as usize].is_free() {
            return Err(HeapError::DoubleFree(ei));
        }

        // Absorb a free predecessor.
        let pi = self.elts[ei as usize].prev;
        if pi != NO_INDEX && self.elts[pi as usize].is_free() {
            let prev_index = self.elts[pi as usize].index;
            let ps = self.elts[ei as usize].index - prev_index;
            let new_prev = self.elts[pi as usize].prev;
            {
                let e = &mut self.elts[ei as usize];
                e.index = prev_index;
                e.prev = new_prev;
            }
            if new_prev != NO_INDEX {
                self.elts[new_prev as usize].next = ei;
            }
            self.remove_free_elt(pi, ps);
            if pi == self.head {
                self.head = ei;
            }
        }

        // Absorb a free successor.
        let ni = self.elts[ei as usize].next;
        if ni != NO_INDEX && self.elts[ni as usize].is_free() {
            let ns = self.size(ni);
            let new_next = self.elts[ni as usize].next;
            self.elts[ei as usize].next = new_next;
            if new_next != NO_INDEX {
                self.elts[new_next as usize].prev = ei;
            }
            self.remove_free_elt(ni, ns);
            if ni == self.tail {
                self.tail = ei;
            }
        }

        let es = self.size(ei);
        self.free_elt(ei, es);
        Ok(())
    }

    /// Sums free units across all free lists; used = total - free.
    pub fn usage(&self) -> HeapUsage {
        let mut free = 0u64;
        for list in &self.free {
            for &ei in list {
                free += self.size(ei) as u64;
            }
        }
        HeapUsage {
            used: self.len as u64 - free,
            free,
        }
    }

    /// Full consistency walk. Not for the hot path: meant for test
    /// harnesses and debugging.
    ///
    /// Verifies address contiguity (no gaps, no overlaps), prev/next
    /// linkage, head/tail anchoring, the correspondence between every free
    /// block and its free-list slot, and that recycled slots are accounted
    /// for.
    pub fn validate(&self) -> Result<(), HeapError> {
        let corrupt = |msg: String| Err(HeapError::Corrupt(msg));

        #[derive(Clone, Copy, PartialEq)]
        enum Visit {
            Unvisited,
            Alloc,
            Free,
            Removed,
        }
        let mut visited = vec![Visit::Unvisited; self.elts.len()];

        let mut ei = self.head;
        let mut prev = NO_INDEX;
        let mut index = 0 as Index;
        let mut prev_free = false;
        while ei != NO_INDEX {
            let e = &self.elts[ei as usize];

            if visited[ei as usize] != Visit::Unvisited {
                return corrupt(format!("block {ei} visited twice"));
            }
            if e.prev != prev {
                return corrupt(format!("block {ei}: prev {} != {}", e.prev, prev));
            }
            if e.index != index {
                return corrupt(format!("block {ei}: index {} != {}", e.index, index));
            }

            let size = self.size(ei);
            if size == 0 {
                return corrupt(format!("block {ei}: zero size"));
            }
            index += size;

            visited[ei as usize] = Visit::Alloc;

            if e.is_free() {
                visited[ei as usize] = Visit::Free;
                if prev_free {
                    return corrupt(format!("block {ei}: adjacent free blocks not coalesced"));
                }
                let mut class = size as usize;
                if size > self.max_size || class >= self.free.len() {
                    class = 0;
                }
                let in_class = |c: usize| {
                    (e.free as usize) < self.free[c].len()
                        && self.free[c][e.free as usize] == ei
                };
                if self.free.is_empty() || (!in_class(class) && !(class != 0 && in_class(0))) {
                    return corrupt(format!(
                        "block {ei}: free slot {} not found in class {} list",
                        e.free, class
                    ));
                }
            }
            prev_free = e.is_free();

            prev = ei;
            ei = e.next;
        }
        if prev != self.tail {
            return corrupt(format!("tail {} != last block {}", self.tail, prev));
        }

        for &ei in &self.removed {
            if visited[ei as usize] != Visit::Unvisited {
                return corrupt(format!("removed slot {ei} still reachable"));
            }
            visited[ei as usize] = Visit::Removed;
        }

        for (ei, v) in visited.iter().enumerate() {
            if *v == Visit::Unvisited {
                return corrupt(format!("slot {ei} neither reachable nor removed"));
            }
        }

        Ok(())
    }
}

impl fmt::Display for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let u = self.usage();
        write!(
            f,
            "{} elts, {} units used, {} units free",
            self.elts.len(),
            u.used,
            u.free
        )
    }
}
