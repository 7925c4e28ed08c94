//! # flatidx
//!
//! Index-addressed element storage. A family of data structures that manage
//! dense collections of fixed- or variable-size elements inside flat backing
//! arrays, addressed by 32-bit integer handles instead of pointers:
//!
//! - [`Pool`]: a free-index allocator recycling small integer indices.
//! - [`Heap`]: a variable-size block allocator over one contiguous index
//!   space, with size-classed free lists and immediate coalescing.
//! - [`Hash`]: an open-addressing hash table storing only 1-byte short-hash
//!   tags; key storage and equality live with the caller.
//! - [`FibHeap`]: a Fibonacci heap over externally stored priorities.
//!
//! All four share one design: relationships (free lists, sibling/parent
//! links, hash buckets) are stored as indices into vectors that grow
//! geometrically and never shrink, so handles stay stable until freed.
//! Payload data is owned by the caller and reached purely through the
//! shared index space.
//!
//! ## Example
//!
//! ```rust
//! use flatidx::Heap;
//!
//! let mut heap = Heap::default();
//! let (a, off_a) = heap.get(10);
//! let (_b, off_b) = heap.get(20);
//! assert_eq!((off_a, off_b), (0, 10));
//!
//! heap.put(a).unwrap();
//! // Freed space at offset 0 is reused for the next fitting request;
//! // the 5 leftover units become a new free block.
//! let (_c, off_c) = heap.get(5);
//! assert_eq!(off_c, 0);
//! ```
//!
//! None of the structures is internally synchronized; callers serialize
//! access to an instance themselves. The one lock-wrapped consumer is
//! [`MemHeap`], a byte-backed heap of cache lines behind a single mutex.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]

pub mod bitmap;
pub mod bits;
pub mod fibheap;
pub mod hash;
pub mod heap;
pub mod mem_heap;
pub mod pool;

pub use bitmap::Bitmap;
pub use fibheap::{FibHeap, FibHeapError, Ordered};
pub use hash::{Hash, HashRemap, HashState, Hasher, HasherKey};
pub use heap::{Heap, HeapError, HeapUsage};
pub use mem_heap::MemHeap;
pub use pool::{ObjectPool, Pool};

/// Common type for indices into pools, heaps and hash tables.
pub type Index = u32;

/// Sentinel meaning "no such index".
pub const NO_INDEX: Index = u32::MAX;

#[cfg(test)]
mod proptests;
