//! Free-index allocators.
//!
//! [`Pool`] hands out and recycles small integer indices into a backing
//! array the caller owns. [`ObjectPool`] fuses a `Pool` with its backing
//! vector for the common case where the pool and the storage grow together.

use std::ops;

use crate::bitmap::Bitmap;
use crate::bits::next_resize_cap;
use crate::Index;

/// Tracks which indices of some caller-owned backing array are free.
///
/// The free stack supplies O(1) reuse; the free bitmap exists only to
/// reject double frees. The two are kept mutually consistent: every index
/// on the stack is marked free in the bitmap and vice versa.
#[derive(Clone, Debug, Default)]
pub struct Pool {
    free_indices: Vec<Index>,
    free_bitmap: Bitmap,
}

impl Pool {
    /// Returns a free index if one is available, else `len` itself,
    /// signaling the caller to grow its backing array by one slot.
    pub fn get_index(&mut self, len: Index) -> Index {
        match self.free_indices.pop() {
            Some(i) => {
                self.free_bitmap.clear(i);
                i
            }
            None => len,
        }
    }

    /// Frees `i`. Returns false if `i` was already free; callers should
    /// treat that as a double-free bug, not a normal outcome.
    pub fn put_index(&mut self, i: Index) -> bool {
        if self.free_bitmap.get(i) {
            return false;
        }
        self.free_indices.push(i);
        self.free_bitmap.set(i);
        true
    }

    #[inline]
    pub fn is_free(&self, i: Index) -> bool {
        self.free_bitmap.get(i)
    }

    /// Number of currently free indices.
    #[inline]
    pub fn free_len(&self) -> usize {
        self.free_indices.len()
    }
}

/// A [`Pool`] together with the vector it indexes.
///
/// Freed slots are reset to `T::default()` so stale data cannot leak
/// through a recycled index.
#[derive(Clone, Debug, Default)]
pub struct ObjectPool<T> {
    pool: Pool,
    data: Vec<T>,
}

impl<T: Default> ObjectPool<T> {
    /// Allocates a slot and returns its index. The slot starts out as
    /// `T::default()`.
    pub fn get_index(&mut self) -> Index {
        let i = self.pool.get_index(self.data.len() as Index);
        let need = i as usize + 1;
        if need > self.data.len() {
            if need > self.data.capacity() {
                let cap = next_resize_cap(need as Index) as usize;
                self.data.reserve(cap - self.data.len());
            }
            self.data.resize_with(need, T::default);
        } else {
            self.data[i as usize] = T::default();
        }
        i
    }

    /// Frees slot `i`, resetting it. Returns false on double free.
    pub fn put_index(&mut self, i: Index) -> bool {
        if !self.pool.put_index(i) {
            return false;
        }
        self.data[i as usize] = T::default();
        true
    }

    #[inline]
    pub fn is_free(&self, i: Index) -> bool {
        self.pool.is_free(i)
    }

    /// Total slots, free and allocated.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of allocated (non-free) slots.
    #[inline]
    pub fn elts(&self) -> usize {
        self.data.len() - self.pool.free_len()
    }
}

impl<T> ops::Index<Index> for ObjectPool<T> {
    type Output = T;

    fn index(&self, i: Index) -> &T {
        &self.data[i as usize]
    }
}

impl<T> ops::IndexMut<Index> for ObjectPool<T> {
    fn index_mut(&mut self, i: Index) -> &mut T {
        &mut self.data[i as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_indices_come_from_len() {
        let mut p = Pool::default();
        assert_eq!(p.get_index(0), 0);
        assert_eq!(p.get_index(1), 1);
        assert_eq!(p.get_index(2), 2);
    }

    #[test]
    fn freed_indices_are_reused_lifo() {
        let mut p = Pool::default();
        for i in 0..4 {
            assert_eq!(p.get_index(i), i);
        }
        assert!(p.put_index(1));
        assert!(p.put_index(3));
        assert_eq!(p.get_index(4), 3);
        assert_eq!(p.get_index(4), 1);
        assert_eq!(p.get_index(4), 4);
    }

    #[test]
    fn double_free_is_rejected() {
        let mut p = Pool::default();
        assert_eq!(p.get_index(0), 0);
        assert!(p.put_index(0));
        assert!(!p.put_index(0));
        assert!(p.is_free(0));
        // State must survive the rejected free intact.
        assert_eq!(p.get_index(1), 0);
        assert!(!p.is_free(0));
    }

    #[test]
    fn object_pool_recycles_and_resets_slots() {
        let mut p: ObjectPool<u64> = ObjectPool::default();
        let a = p.get_index();
        let b = p.get_index();
        p[a] = 17;
        p[b] = 23;
        assert_eq!(p.elts(), 2);

        assert!(p.put_index(a));
        assert!(!p.put_index(a));
        assert_eq!(p.elts(), 1);

        let c = p.get_index();
        assert_eq!(c, a);
        assert_eq!(p[c], 0, "recycled slot must be reset");
        assert_eq!(p[b], 23);
    }
}
