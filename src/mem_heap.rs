//! Byte-backed heap of cache lines.
//!
//! [`MemHeap`] pairs a [`Heap`] with an anonymous memory map and deals in
//! cache-line units, so every allocation is cache-line aligned and sized.
//! Unlike the raw structures in this crate it is internally synchronized:
//! one mutex guards the allocator and the mapping together.

use std::fmt;
use std::io;

use memmap2::MmapMut;
use parking_lot::Mutex;

use crate::bits::round_pow2;
use crate::heap::{Heap, HeapError, HeapUsage};
use crate::Index;

pub const LOG2_CACHE_LINE_BYTES: u32 = 6;
pub const CACHE_LINE_BYTES: usize = 1 << LOG2_CACHE_LINE_BYTES;

/// Size the heap maps when a caller allocates without calling
/// [`MemHeap::init`] first.
const DEFAULT_SIZE: usize = 64 << 20;

#[derive(Default)]
struct Inner {
    heap: Heap,
    data: Option<MmapMut>,
}

impl Inner {
    fn init(&mut self, n: usize) -> io::Result<()> {
        if self.data.is_some() {
            return Ok(());
        }
        let n = round_pow2(n as u64, CACHE_LINE_BYTES as u64) as usize;
        self.data = Some(MmapMut::map_anon(n)?);
        self.heap.set_max_len((n >> LOG2_CACHE_LINE_BYTES) as Index);
        Ok(())
    }

    fn put(&mut self, id: Index) -> Result<(), HeapError> {
        self.heap.put(id)
    }

    fn data(&self) -> &MmapMut {
        match &self.data {
            Some(d) => d,
            None => panic!("mem heap not initialized"),
        }
    }
}

/// Allocation heap of cache lines over anonymous mapped memory.
#[derive(Default)]
pub struct MemHeap {
    inner: Mutex<Inner>,
}

impl MemHeap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `n` bytes (rounded up to a whole cache line) of anonymous
    /// memory backing the heap. Only the first call has any effect.
    pub fn init(&self, n: usize) -> io::Result<()> {
        self.inner.lock().init(n)
    }

    /// Allocates at least `n` bytes, returning the block id, its byte
    /// offset and its rounded-up byte capacity.
    ///
    /// Maps a default-sized region if [`MemHeap::init`] was never called.
    /// Panics on `n == 0` and when the mapped region is exhausted.
    pub fn alloc(&self, n: usize) -> io::Result<(Index, usize, usize)> {
        let mut inner = self.inner.lock();
        inner.init(DEFAULT_SIZE)?;
        let cap = round_pow2(n as u64, CACHE_LINE_BYTES as u64) as usize;
        let (id, line) = inner.heap.get((cap >> LOG2_CACHE_LINE_BYTES) as Index);
        Ok((id, (line as usize) << LOG2_CACHE_LINE_BYTES, cap))
    }

    /// Frees the block with id `id`.
    pub fn free(&self, id: Index) -> Result<(), HeapError> {
        self.inner.lock().put(id)
    }

    /// Calls `f` with the bytes of block `id`.
    pub fn with_slice<R>(&self, id: Index, f: impl FnOnce(&[u8]) -> R) -> R {
        let inner = self.inner.lock();
        let offset = (inner.heap.offset_of(id) as usize) << LOG2_CACHE_LINE_BYTES;
        let len = (inner.heap.len_of(id) as usize) << LOG2_CACHE_LINE_BYTES;
        f(&inner.data()[offset..offset + len])
    }

    /// Calls `f` with the bytes of block `id`, mutably.
    pub fn with_slice_mut<R>(&self, id: Index, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut inner = self.inner.lock();
        let offset = (inner.heap.offset_of(id) as usize) << LOG2_CACHE_LINE_BYTES;
        let len = (inner.heap.len_of(id) as usize) << LOG2_CACHE_LINE_BYTES;
        let data = match &mut inner.data {
            Some(d) => d,
            None => panic!("mem heap not initialized"),
        };
        f(&mut data[offset..offset + len])
    }

    /// True if byte offset `o` falls within the mapped region.
    pub fn offset_valid(&self, o: usize) -> bool {
        self.inner
            .lock()
            .data
            .as_ref()
            .is_some_and(|d| o < d.len())
    }

    pub fn usage(&self) -> HeapUsage {
        self.inner.lock().heap.usage()
    }
}

impl fmt::Display for MemHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        let max = inner.heap.max_len() as u64;
        if max == 0 {
            return write!(f, "empty");
        }
        let u = inner.heap.usage();
        write!(
            f,
            "used {}, free {}, capacity {}",
            MemorySize(u.used << LOG2_CACHE_LINE_BYTES),
            MemorySize(u.free << LOG2_CACHE_LINE_BYTES),
            MemorySize(max << LOG2_CACHE_LINE_BYTES)
        )
    }
}

/// Byte count formatted with a binary unit suffix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemorySize(pub u64);

impl fmt::Display for MemorySize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.0;
        let (unit, suffix) = match n {
            _ if n >= 1 << 30 => (1u64 << 30, "G"),
            _ if n >= 1 << 20 => (1u64 << 20, "M"),
            _ if n >= 1 << 10 => (1u64 << 10, "K"),
            _ => (1, ""),
        };
        if n % unit == 0 {
            write!(f, "{}{}", n / unit, suffix)
        } else {
            write!(f, "{:.2}{}", n as f64 / unit as f64, suffix)
        }
    }
}
