//! Out-of-band occupancy tracking for the slot arrays.

use alloc::boxed::Box;
use alloc::vec;

const WORD_BITS: usize = u64::BITS as usize;

/// A fixed-length bitset; bit `i` is set iff slot `i` holds a live entry.
///
/// The length always matches the capacity of the slot arrays it describes
/// and never changes after construction. Resizing builds a new set.
#[derive(Clone)]
pub(crate) struct PresenceSet {
    words: Box<[u64]>,
    len: usize,
}

impl PresenceSet {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            words: vec![0u64; len.div_ceil(WORD_BITS)].into_boxed_slice(),
            len,
        }
    }

    #[inline(always)]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub(crate) fn get(&self, index: usize) -> bool {
        debug_assert!(index < self.len);
        self.words[index / WORD_BITS] & (1 << (index % WORD_BITS)) != 0
    }

    #[inline(always)]
    pub(crate) fn set(&mut self, index: usize) {
        debug_assert!(index < self.len);
        self.words[index / WORD_BITS] |= 1 << (index % WORD_BITS);
    }

    #[inline(always)]
    pub(crate) fn clear(&mut self, index: usize) {
        debug_assert!(index < self.len);
        self.words[index / WORD_BITS] &= !(1 << (index % WORD_BITS));
    }

    pub(crate) fn clear_all(&mut self) {
        self.words.fill(0);
    }

    /// Number of set bits.
    pub(crate) fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Returns an iterator over the indices of set bits, in ascending order.
    pub(crate) fn ones(&self) -> Ones<'_> {
        Ones {
            words: &self.words,
            word_index: 0,
            current: self.words.first().copied().unwrap_or(0),
        }
    }

    /// Finds any clear bit, searching downward from the top of the set.
    pub(crate) fn last_zero(&self) -> Option<usize> {
        (0..self.len).rev().find(|&index| !self.get(index))
    }
}

/// Iterator over set bit indices, produced by [`PresenceSet::ones`].
#[derive(Clone)]
pub(crate) struct Ones<'a> {
    words: &'a [u64],
    word_index: usize,
    current: u64,
}

impl Iterator for Ones<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        loop {
            if self.current != 0 {
                let bit = self.current.trailing_zeros() as usize;
                self.current &= self.current - 1;
                return Some(self.word_index * WORD_BITS + bit);
            }

            self.word_index += 1;
            self.current = *self.words.get(self.word_index)?;
        }
    }
}
