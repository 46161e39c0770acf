// Copyright 2025 Anapaya Systems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Free-slot pools over host offsets `0..len`.
//!
//! Both pools hand out the lowest free offset first, so the choice between
//! them is invisible to callers.

use wgd_utils::rangeset::RangeSet;

/// How a pool tracks its free slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    /// One bit per host offset.
    Bitmap,
    /// Sorted list of free offset intervals.
    Ranges,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Pool {
    Bitmap(BitmapPool),
    Ranges(RangePool),
}

impl Pool {
    pub(crate) fn new(kind: PoolKind, len: u32) -> Self {
        match kind {
            PoolKind::Bitmap => Pool::Bitmap(BitmapPool::new(len)),
            PoolKind::Ranges => Pool::Ranges(RangePool::new(len)),
        }
    }

    pub(crate) fn kind(&self) -> PoolKind {
        match self {
            Pool::Bitmap(_) => PoolKind::Bitmap,
            Pool::Ranges(_) => PoolKind::Ranges,
        }
    }

    /// Takes the lowest free offset.
    pub(crate) fn take_lowest(&mut self) -> Option<u32> {
        match self {
            Pool::Bitmap(pool) => pool.take_lowest(),
            Pool::Ranges(pool) => pool.free.pop_first(),
        }
    }

    /// Takes a specific offset; false if it was not free.
    pub(crate) fn take(&mut self, offset: u32) -> bool {
        match self {
            Pool::Bitmap(pool) => pool.take(offset),
            Pool::Ranges(pool) => pool.free.remove(offset).is_ok(),
        }
    }

    /// Returns an offset to the pool; false if it was already free.
    pub(crate) fn release(&mut self, offset: u32) -> bool {
        match self {
            Pool::Bitmap(pool) => pool.release(offset),
            Pool::Ranges(pool) => offset < pool.len && pool.free.insert(offset).is_ok(),
        }
    }

    pub(crate) fn is_free(&self, offset: u32) -> bool {
        match self {
            Pool::Bitmap(pool) => pool.is_free(offset),
            Pool::Ranges(pool) => pool.free.contains(offset),
        }
    }

    pub(crate) fn free_count(&self) -> u32 {
        match self {
            Pool::Bitmap(pool) => pool.free,
            Pool::Ranges(pool) => pool.free.len(),
        }
    }
}

/// Bit `i` set means offset `i` is taken. Bits past `len` in the last word
/// are permanently set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BitmapPool {
    words: Vec<u64>,
    len: u32,
    free: u32,
    /// No word before this index has a free bit.
    lowest_candidate: usize,
}

impl BitmapPool {
    fn new(len: u32) -> Self {
        let word_count = (len as usize).div_ceil(64);
        let mut words = vec![0u64; word_count];
        let tail = len % 64;
        if tail != 0 {
            if let Some(last) = words.last_mut() {
                *last = !0u64 << tail;
            }
        }
        Self {
            words,
            len,
            free: len,
            lowest_candidate: 0,
        }
    }

    fn take_lowest(&mut self) -> Option<u32> {
        let (index, word) = self
            .words
            .iter()
            .enumerate()
            .skip(self.lowest_candidate)
            .find(|(_, word)| **word != u64::MAX)?;
        let offset = index as u32 * 64 + word.trailing_ones();
        self.lowest_candidate = index;
        self.take(offset).then_some(offset)
    }

    fn take(&mut self, offset: u32) -> bool {
        if offset >= self.len || !self.is_free(offset) {
            return false;
        }
        self.words[offset as usize / 64] |= 1 << (offset % 64);
        self.free -= 1;
        true
    }

    fn release(&mut self, offset: u32) -> bool {
        if offset >= self.len || self.is_free(offset) {
            return false;
        }
        let index = offset as usize / 64;
        self.words[index] &= !(1 << (offset % 64));
        self.free += 1;
        self.lowest_candidate = self.lowest_candidate.min(index);
        true
    }

    fn is_free(&self, offset: u32) -> bool {
        offset < self.len && self.words[offset as usize / 64] & (1 << (offset % 64)) == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RangePool {
    free: RangeSet<u32>,
    len: u32,
}

impl RangePool {
    fn new(len: u32) -> Self {
        Self {
            free: RangeSet::full(0, len),
            len,
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn bitmap_tail_bits_are_never_handed_out() {
        let mut pool = Pool::new(PoolKind::Bitmap, 70);
        let taken: Vec<u32> = std::iter::from_fn(|| pool.take_lowest()).collect();
        assert_eq!(taken, (0..70).collect::<Vec<_>>());
        assert_eq!(pool.free_count(), 0);
        assert!(!pool.release(70), "offset past the end must be rejected");
    }

    #[test]
    fn release_moves_lowest_candidate_back() {
        let mut pool = Pool::new(PoolKind::Bitmap, 256);
        for _ in 0..200 {
            pool.take_lowest().unwrap();
        }
        assert!(pool.release(3));
        assert!(!pool.release(3));
        assert_eq!(pool.take_lowest(), Some(3));
        assert_eq!(pool.take_lowest(), Some(200));
    }

    #[test]
    fn both_kinds_agree_under_random_operations() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let len = 1000;
        let mut bitmap = Pool::new(PoolKind::Bitmap, len);
        let mut ranges = Pool::new(PoolKind::Ranges, len);

        for _ in 0..5000 {
            match rng.random_range(0..3) {
                0 => assert_eq!(bitmap.take_lowest(), ranges.take_lowest()),
                1 => {
                    let offset = rng.random_range(0..len + 5);
                    assert_eq!(bitmap.take(offset), ranges.take(offset), "take {offset}");
                }
                _ => {
                    let offset = rng.random_range(0..len + 5);
                    assert_eq!(
                        bitmap.release(offset),
                        ranges.release(offset),
                        "release {offset}"
                    );
                }
            }
            assert_eq!(bitmap.free_count(), ranges.free_count());
        }
        for offset in 0..len {
            assert_eq!(bitmap.is_free(offset), ranges.is_free(offset), "offset {offset}");
        }
    }
}
