//! Growable bitmap over 64-bit words.

/// A bitmap that grows on demand. Bits past the end read as zero.
#[derive(Clone, Debug, Default)]
pub struct Bitmap {
    words: Vec<u64>,
}

const LOG2_WORD_BITS: u32 = 6;

impl Bitmap {
    #[inline]
    fn split(i: u32) -> (usize, u64) {
        ((i >> LOG2_WORD_BITS) as usize, 1u64 << (i & 63))
    }

    #[inline]
    pub fn get(&self, i: u32) -> bool {
        let (w, m) = Self::split(i);
        self.words.get(w).is_some_and(|&x| x & m != 0)
    }

    /// Sets bit `i`, growing as needed. Returns the previous value.
    pub fn set(&mut self, i: u32) -> bool {
        let (w, m) = Self::split(i);
        if w >= self.words.len() {
            self.words.resize(w + 1, 0);
        }
        let was = self.words[w] & m != 0;
        self.words[w] |= m;
        was
    }

    /// Clears bit `i`. Returns the previous value.
    pub fn clear(&mut self, i: u32) -> bool {
        let (w, m) = Self::split(i);
        match self.words.get_mut(w) {
            Some(x) => {
                let was = *x & m != 0;
                *x &= !m;
                was
            }
            None => false,
        }
    }
}
