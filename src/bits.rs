//! Machine-word bit primitives and the capacity growth policy shared by all
//! backing arrays in this crate.

use crate::Index;

/// Floor of log2. `x` must be non-zero.
#[inline]
pub fn min_log2(x: u64) -> u32 {
    debug_assert!(x != 0);
    63 - x.leading_zeros()
}

/// Ceiling of log2. `x` must be non-zero.
#[inline]
pub fn max_log2(x: u64) -> u32 {
    let l = min_log2(x);
    if x > 1u64 << l {
        l + 1
    } else {
        l
    }
}

#[inline]
pub fn is_pow2(x: u64) -> bool {
    x & x.wrapping_sub(1) == 0
}

/// Rounds `x` up to a multiple of `p`, which must be a power of two.
#[inline]
pub fn round_pow2(x: u64, p: u64) -> u64 {
    debug_assert!(is_pow2(p) && p != 0);
    (x + p - 1) & !(p - 1)
}

/// Isolates the lowest set bit of `x`.
#[inline]
pub fn first_set(x: u64) -> u64 {
    x & x.wrapping_neg()
}

/// Clears the lowest set bit of `x` and returns (remaining bits, bit index).
/// `x` must be non-zero.
#[inline]
pub fn next_set(x: u64) -> (u64, u32) {
    debug_assert!(x != 0);
    let f = first_set(x);
    (x ^ f, f.trailing_zeros())
}

/// Vector capacities of the form 2^i + 2^j.
///
/// Growing by such "nice" sizes rather than strict doubling keeps the
/// amortized cost of repeated growth low without doubling the waste; the
/// multipliers below step capacity by sqrt(2) for small arrays and by
/// progressively finer roots of two as arrays get large.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Cap(pub u32);

impl Cap {
    /// True if removing the lowest set bit leaves a power of two.
    pub fn is_valid(self) -> bool {
        let c = self.0;
        let f = c & c.wrapping_neg();
        is_pow2((c ^ f) as u64)
    }

    /// Rounds up to the nearest 2^i + 2^j capacity that is a multiple of
    /// `2^log2_unit`.
    pub fn round(self, log2_unit: u32) -> Cap {
        let n = self.0;
        if is_pow2(n as u64) {
            return self;
        }
        let u = (1u32 << log2_unit) - 1;
        let w = (n + u) & !u;
        let l0 = min_log2(w as u64);
        let rest = w ^ (1u32 << l0);
        if rest == 0 {
            Cap(1u32 << l0)
        } else {
            Cap((1u32 << l0) + (1u32 << max_log2(rest as u64)))
        }
    }

    /// Splits into the log2 of the two component powers, larger first.
    /// The second component is absent when the capacity is a power of two.
    pub fn log2(self) -> (u32, Option<u32>) {
        let c = self.0;
        let j = c & c.wrapping_neg();
        let i = c ^ j;
        if i == 0 {
            (min_log2(j as u64), None)
        } else {
            (min_log2(i as u64), Some(min_log2(j as u64)))
        }
    }

    /// Next larger capacity, at least `2^log2_min - 1` and a multiple of
    /// `2^log2_unit`.
    pub fn next_unit(self, log2_min: u32, log2_unit: u32) -> Cap {
        let n = self.0;
        let min = (1u32 << log2_min) - 1;
        let n = if n < min {
            min
        } else if n < 256 {
            (n as f64 * 1.414_213_562_373_095_05) as u32 /* exp(log2 / 2) */
        } else if n < 1024 {
            (n as f64 * 1.090_507_732_665_257_66) as u32 /* exp(log2 / 8) */
        } else {
            (n as f64 * 1.044_273_782_427_413_84) as u32 /* exp(log2 / 16) */
        };
        Cap(n).round(log2_unit)
    }

    pub fn next(self) -> Cap {
        self.next_unit(3, 2)
    }

    #[inline]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Next larger resizeable-array capacity for an array of length `x`.
#[inline]
pub fn next_resize_cap(x: Index) -> Index {
    Cap(x).next().0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log2_bounds() {
        assert_eq!(min_log2(1), 0);
        assert_eq!(min_log2(2), 1);
        assert_eq!(min_log2(3), 1);
        assert_eq!(min_log2(1 << 20), 20);
        assert_eq!(max_log2(1), 0);
        assert_eq!(max_log2(2), 1);
        assert_eq!(max_log2(3), 2);
        assert_eq!(max_log2((1 << 20) + 1), 21);
    }

    #[test]
    fn pow2_rounding() {
        assert!(is_pow2(0));
        assert!(is_pow2(64));
        assert!(!is_pow2(65));
        assert_eq!(round_pow2(1, 64), 64);
        assert_eq!(round_pow2(64, 64), 64);
        assert_eq!(round_pow2(65, 64), 128);
    }

    #[test]
    fn next_set_walks_bits() {
        let mut x = 0b1010_0100u64;
        let mut seen = Vec::new();
        while x != 0 {
            let (rest, i) = next_set(x);
            x = rest;
            seen.push(i);
        }
        assert_eq!(seen, vec![2, 5, 7]);
    }

    #[test]
    fn cap_growth_is_monotonic_and_valid() {
        let mut c = Cap(0);
        for _ in 0..64 {
            let n = c.next();
            assert!(n.0 > c.0, "capacity must strictly grow: {} -> {}", c.0, n.0);
            assert!(n.is_valid(), "capacity {} not of form 2^i + 2^j", n.0);
            c = n;
        }
    }

    #[test]
    fn cap_log2_split() {
        assert_eq!(Cap(8).log2(), (3, None));
        assert_eq!(Cap(12).log2(), (3, Some(2)));
        assert_eq!(Cap(0x8000_0001).log2(), (31, Some(0)));
    }
}
