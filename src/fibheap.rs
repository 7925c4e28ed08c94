//! Fibonacci heap over externally stored priorities.
//!
//! The heap never sees keys. Callers pick the element indices, store the
//! priorities wherever they like, and hand the heap an [`Ordered`]
//! comparator when asking for the minimum. Everything else (add, delete,
//! update) is pure structure maintenance on index-linked nodes, so those
//! operations never compare keys at all.
//!
//! Consolidation is lazy: root trees pile up across adds and deletes and
//! are only paired by degree inside [`FibHeap::min`], whose result is
//! cached until the next mutation.

use std::cmp::Ordering;
use std::fmt;

use thiserror::Error;

use crate::bits::{next_resize_cap, next_set};
use crate::{Index, NO_INDEX};

/// Index of the root-list sentinel, distinct from both real node indices
/// and `NO_INDEX`.
const FIB_ROOT_INDEX: Index = NO_INDEX - 1;

/// Upper bound on tree degree; 2^32 elements keep degrees well below this.
const MAX_N_SUB: usize = 32;

/// Caller-side priority storage.
pub trait Ordered {
    /// Orders element `i` relative to element `j`.
    fn compare(&self, i: Index, j: Index) -> Ordering;
}

impl<T: Ord> Ordered for [T] {
    fn compare(&self, i: Index, j: Index) -> Ordering {
        self[i as usize].cmp(&self[j as usize])
    }
}

#[derive(Clone, Copy, Debug)]
struct FibNode {
    /// Parent, or `NO_INDEX` for a root.
    sup: Index,

    /// Circular doubly linked sibling list.
    next: Index,
    prev: Index,

    /// First child, or `NO_INDEX` if none.
    sub: Index,

    /// Number of children.
    n_sub: u16,

    /// Set when a child has been cut since this node last became a child.
    is_marked: bool,
}

impl Default for FibNode {
    fn default() -> Self {
        Self {
            sup: NO_INDEX,
            next: NO_INDEX,
            prev: NO_INDEX,
            sub: NO_INDEX,
            n_sub: 0,
            is_marked: false,
        }
    }
}

impl FibNode {
    /// Shifts all link fields by `d`, leaving sentinels alone. Used when
    /// splicing one heap's node array onto another's.
    fn reloc(&mut self, d: Index) {
        for f in [
            &mut self.sup,
            &mut self.sub,
            &mut self.next,
            &mut self.prev,
        ] {
            if *f != NO_INDEX && *f != FIB_ROOT_INDEX {
                *f += d;
            }
        }
    }
}

/// Errors reported by [`FibHeap::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FibHeapError {
    #[error("fibheap corrupt: {0}")]
    Corrupt(String),
}

/// Fibonacci heap addressed by caller-chosen element indices.
#[derive(Clone, Debug, Default)]
pub struct FibHeap {
    root: FibNode,
    nodes: Vec<FibNode>,

    min_index: Index,
    min_valid: bool,
}

impl FibHeap {
    fn node(&self, ni: Index) -> &FibNode {
        if ni == FIB_ROOT_INDEX {
            &self.root
        } else {
            &self.nodes[ni as usize]
        }
    }

    fn node_mut(&mut self, ni: Index) -> &mut FibNode {
        if ni == FIB_ROOT_INDEX {
            &mut self.root
        } else {
            &mut self.nodes[ni as usize]
        }
    }

    fn init_root(&mut self) {
        self.root.next = FIB_ROOT_INDEX;
        self.root.prev = FIB_ROOT_INDEX;
        self.root.sup = NO_INDEX;
        self.root.sub = NO_INDEX;
    }

    fn link_after(&mut self, pi: Index, xi: Index) {
        let ni = self.node(pi).next;
        self.node_mut(pi).next = xi;
        {
            let x = self.node_mut(xi);
            x.prev = pi;
            x.next = ni;
        }
        self.node_mut(ni).prev = xi;
    }

    fn add_root(&mut self, xi: Index) {
        self.link_after(FIB_ROOT_INDEX, xi);
    }

    fn unlink(&mut self, xi: Index) {
        let (pi, ni) = {
            let x = &self.nodes[xi as usize];
            (x.prev, x.next)
        };
        self.node_mut(pi).next = ni;
        self.node_mut(ni).prev = pi;
    }

    /// Grows the node array so index `xi` is addressable.
    fn ensure_node(&mut self, xi: Index) {
        let need = xi as usize + 1;
        if need > self.nodes.len() {
            if need > self.nodes.capacity() {
                let cap = next_resize_cap(need as Index) as usize;
                self.nodes.reserve(cap - self.nodes.len());
            }
            self.nodes.resize_with(need, FibNode::default);
        }
    }

    /// Adds index `xi` to the heap as a fresh root.
    ///
    /// `xi` must not already be in the heap.
    pub fn add(&mut self, xi: Index) {
        if self.nodes.is_empty() {
            self.init_root();
        }
        self.min_valid = false;
        self.ensure_node(xi);
        {
            let x = &mut self.nodes[xi as usize];
            x.sup = NO_INDEX;
            x.sub = NO_INDEX;
            x.n_sub = 0;
            x.is_marked = false;
        }
        self.add_root(xi);
    }

    /// Promotes all children of `xi` to roots.
    fn cut_children(&mut self, xi: Index) {
        let bi = self.nodes[xi as usize].sub;
        if bi == NO_INDEX {
            return;
        }
        let mut ci = bi;
        loop {
            let ni = self.nodes[ci as usize].next;
            self.nodes[ci as usize].sup = NO_INDEX;
            self.add_root(ci);
            if ni == bi {
                break;
            }
            ci = ni;
        }
    }

    /// Removes index `xi` from the heap, cascading cuts up through marked
    /// ancestors.
    ///
    /// `xi` must currently be in the heap.
    pub fn del(&mut self, xi: Index) {
        self.unlink(xi);
        self.cut_children(xi);

        self.min_valid = self.min_valid && xi != self.min_index;
        let mut supi = self.nodes[xi as usize].sup;
        if supi == NO_INDEX {
            return;
        }

        // Adjust ancestors for the lost child; a marked parent is cut to
        // the root list and the walk continues above it.
        let mut ni = self.nodes[xi as usize].next;
        loop {
            let sup = &mut self.nodes[supi as usize];
            sup.n_sub -= 1;
            let was_marked = sup.is_marked;
            sup.is_marked = true;
            sup.sub = if sup.n_sub == 0 { NO_INDEX } else { ni };
            let sup2 = sup.sup;
            if !was_marked || sup2 == NO_INDEX {
                break;
            }
            ni = sup.next;
            self.unlink(supi);
            self.nodes[supi as usize].sup = NO_INDEX;
            self.add_root(supi);
            supi = sup2;
        }
    }

    /// Re-files `xi` after its priority changed.
    pub fn update(&mut self, xi: Index) {
        self.del(xi);
        self.add(xi);
    }

    /// Returns the minimum element per `data`, or `NO_INDEX` if the heap
    /// is empty. Consolidates the root list as a side effect; the result
    /// is cached until the next add, del or update.
    pub fn min<D: Ordered + ?Sized>(&mut self, data: &D) -> Index {
        if self.min_valid {
            return self.min_index;
        }
        if self.root.next == NO_INDEX {
            // Never had an element.
            self.min_valid = true;
            self.min_index = NO_INDEX;
            return NO_INDEX;
        }

        // Roots by degree seen so far, with a validity bitmap.
        let mut deg = [0 as Index; MAX_N_SUB];
        let mut deg_valid: u64 = 0;

        let mut ri = self.root.next;
        let mut ni = self.node(ri).next;

        while ri != FIB_ROOT_INDEX {
            let ns = self.nodes[ri as usize].n_sub as usize;
            let m = 1u64 << ns;
            let ns_seen = deg_valid & m != 0;
            deg_valid ^= m;
            if !ns_seen {
                deg[ns] = ri;
                ri = ni;
                ni = self.node(ri).next;
            } else {
                // Two trees of equal degree: the smaller root adopts the
                // larger, then `ri` is re-examined at the next degree.
                let mut ri0 = deg[ns];
                if data.compare(ri0, ri) != Ordering::Greater {
                    std::mem::swap(&mut ri0, &mut ri);
                }
                self.unlink(ri0);
                {
                    let r0 = &mut self.nodes[ri0 as usize];
                    r0.is_marked = false;
                    r0.sup = ri;
                }
                let sub = self.nodes[ri as usize].sub;
                if sub != NO_INDEX {
                    self.nodes[ri as usize].n_sub += 1;
                    self.link_after(sub, ri0);
                } else {
                    {
                        let r = &mut self.nodes[ri as usize];
                        r.sub = ri0;
                        r.n_sub = 1;
                        r.is_marked = false;
                    }
                    let r0 = &mut self.nodes[ri0 as usize];
                    r0.next = ri0;
                    r0.prev = ri0;
                }
            }
        }

        let mut min = NO_INDEX;
        while deg_valid != 0 {
            let (rest, ns) = next_set(deg_valid);
            deg_valid = rest;
            let ri = deg[ns as usize];
            if min == NO_INDEX || data.compare(ri, min) == Ordering::Less {
                min = ri;
            }
        }

        self.min_valid = true;
        self.min_index = min;
        min
    }

    /// Absorbs all of `other`'s elements, trees intact. Element `i` of
    /// `other` becomes element `i + offset` of `self`, where `offset` is
    /// the returned value; callers shift their priority storage to match.
    pub fn merge(&mut self, other: &FibHeap) -> Index {
        let l = self.nodes.len() as Index;
        if other.nodes.is_empty() {
            return l;
        }
        if self.nodes.is_empty() {
            self.init_root();
        }

        // Collect the source roots before splicing; their sibling links
        // are rewritten as each one joins our root list.
        let mut roots = Vec::new();
        let mut ri = other.root.next;
        while ri != FIB_ROOT_INDEX {
            roots.push(ri + l);
            ri = other.nodes[ri as usize].next;
        }

        self.nodes.extend(other.nodes.iter().map(|n| {
            let mut n = *n;
            n.reloc(l);
            n
        }));
        for ri in roots {
            self.add_root(ri);
        }

        self.min_valid = false;
        l
    }

    fn validate_node(&self, xi: Index) -> Result<(), FibHeapError> {
        let x = &self.nodes[xi as usize];
        if x.sub == NO_INDEX {
            if x.n_sub != 0 {
                return Err(FibHeapError::Corrupt(format!(
                    "node {xi}: n children {} with empty child list",
                    x.n_sub
                )));
            }
            return Ok(());
        }
        let mut n_sub = 0u16;
        let mut subi = x.sub;
        loop {
            let sub = &self.nodes[subi as usize];
            if sub.sup != xi {
                return Err(FibHeapError::Corrupt(format!(
                    "node.sub.sup {} != node {}",
                    sub.sup, xi
                )));
            }
            let n = &self.nodes[sub.next as usize];
            let p = &self.nodes[sub.prev as usize];
            if n.prev != subi {
                return Err(FibHeapError::Corrupt(format!(
                    "next.prev {} != node {}",
                    n.prev, subi
                )));
            }
            if p.next != subi {
                return Err(FibHeapError::Corrupt(format!(
                    "prev.next {} != node {}",
                    p.next, subi
                )));
            }
            self.validate_node(subi)?;
            n_sub += 1;
            subi = sub.next;
            if subi == x.sub {
                break;
            }
        }
        if n_sub != x.n_sub {
            return Err(FibHeapError::Corrupt(format!(
                "node {xi}: n children {n_sub} != {}",
                x.n_sub
            )));
        }
        Ok(())
    }

    /// Full structural walk of every tree. For test harnesses and
    /// debugging.
    pub fn validate(&self) -> Result<(), FibHeapError> {
        if self.root.next == NO_INDEX {
            return Ok(());
        }
        let mut ri = self.root.next;
        while ri != FIB_ROOT_INDEX {
            let r = &self.nodes[ri as usize];
            let n = self.node(r.next);
            if n.prev != ri {
                return Err(FibHeapError::Corrupt(format!(
                    "root next.prev {} != {}",
                    n.prev, ri
                )));
            }
            if r.sup != NO_INDEX {
                return Err(FibHeapError::Corrupt(format!("root {ri} has a parent")));
            }
            self.validate_node(ri)?;
            ri = r.next;
        }
        Ok(())
    }
}

impl fmt::Display for FibHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} elts", self.nodes.len())
    }
}
