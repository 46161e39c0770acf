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
//! A sorted set of disjoint half-open ranges of unsigned integers.
//!
//! The set keeps adjacent ranges merged, so the number of stored ranges is
//! bounded by the fragmentation of the set and not by its cardinality. This
//! makes it suitable as a free list for large address pools.

use std::{cmp::Ordering, iter::Sum};

use num_traits::{ConstOne, PrimInt, Unsigned};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Marker for the integer types a [RangeSet] can hold.
pub trait RangeValue: PrimInt + ConstOne + Unsigned + Sum<Self> {}

impl<T: PrimInt + ConstOne + Unsigned + Sum<T>> RangeValue for T {}

/// Errors returned by [RangeSet] mutations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RangeSetError<T> {
    /// The value is already part of the set.
    #[error("value {0} already in set")]
    AlreadyPresent(T),
    /// The value is not part of the set.
    #[error("value {0} not in set")]
    NotPresent(T),
}

/// A sorted set of disjoint half-open ranges.
#[derive(Debug, Eq, PartialEq, Serialize, Deserialize, Clone)]
pub struct RangeSet<T: RangeValue> {
    ranges: Vec<Range<T>>,
}

impl<T: RangeValue> RangeSet<T> {
    /// Creates a set holding every value in `start..end`.
    pub fn full(start: T, end: T) -> Self {
        if start >= end {
            return Self { ranges: Vec::new() };
        }
        Self {
            ranges: vec![Range::new(start, end)],
        }
    }

    /// Returns true if the set holds no values.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Returns the number of values in the set.
    pub fn len(&self) -> T {
        self.ranges.iter().map(Range::len).sum()
    }

    /// Returns true if the value is part of the set.
    pub fn contains(&self, value: T) -> bool {
        self.position(value).is_ok()
    }

    /// Removes and returns the smallest value of the set.
    pub fn pop_first(&mut self) -> Option<T> {
        let first = self.ranges.first_mut()?;
        let value = first.start;
        first.start = value + T::ONE;
        if first.is_empty() {
            self.ranges.remove(0);
        }
        Some(value)
    }

    /// Adds a value to the set, merging it with adjacent ranges.
    pub fn insert(&mut self, value: T) -> Result<(), RangeSetError<T>> {
        // `i` is the index of the first range starting after `value`.
        let i = match self.position(value) {
            Ok(_) => return Err(RangeSetError::AlreadyPresent(value)),
            Err(i) => i,
        };
        let joins_prev = i > 0 && self.ranges[i - 1].end == value;
        let joins_next = i < self.ranges.len() && self.ranges[i].start == value + T::ONE;
        match (joins_prev, joins_next) {
            (true, true) => {
                self.ranges[i - 1].end = self.ranges[i].end;
                self.ranges.remove(i);
            }
            (true, false) => self.ranges[i - 1].end = value + T::ONE,
            (false, true) => self.ranges[i].start = value,
            (false, false) => self.ranges.insert(i, Range::new(value, value + T::ONE)),
        }
        Ok(())
    }

    /// Removes a value from the set, splitting the range that holds it if
    /// needed.
    pub fn remove(&mut self, value: T) -> Result<(), RangeSetError<T>> {
        let i = self
            .position(value)
            .map_err(|_| RangeSetError::NotPresent(value))?;
        let range = self.ranges[i].clone();
        if range.start == value {
            self.ranges[i].start = value + T::ONE;
            if self.ranges[i].is_empty() {
                self.ranges.remove(i);
            }
        } else if range.end - T::ONE == value {
            self.ranges[i].end = value;
        } else {
            self.ranges[i].start = value + T::ONE;
            self.ranges.insert(i, Range::new(range.start, value));
        }
        Ok(())
    }

    fn position(&self, value: T) -> Result<usize, usize> {
        self.ranges.binary_search_by(|range| range.compare(&value))
    }
}

impl<T: RangeValue> Default for RangeSet<T> {
    fn default() -> Self {
        Self { ranges: Vec::new() }
    }
}

/// A half-open range `start..end`.
#[derive(Debug, Eq, PartialEq, Serialize, Deserialize, Clone)]
pub struct Range<T: RangeValue> {
    /// First value of the range.
    pub start: T,
    /// One past the last value of the range.
    pub end: T,
}

impl<T: RangeValue> Range<T> {
    /// Creates a new range.
    pub fn new(start: T, end: T) -> Self {
        Self { start, end }
    }

    /// Orders the range relative to a value; `Equal` if it holds the value.
    pub fn compare(&self, value: &T) -> Ordering {
        if self.start > *value {
            Ordering::Greater
        } else if self.end <= *value {
            Ordering::Less
        } else {
            Ordering::Equal
        }
    }

    /// Number of values in the range.
    pub fn len(&self) -> T {
        self.end - self.start
    }

    /// Returns true if the range holds no values.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng, seq::SliceRandom};
    use rand_chacha::ChaCha8Rng;

    use super::*;

    fn check_rangeset_invariants<T: RangeValue + std::fmt::Debug>(set: &RangeSet<T>) {
        for range in &set.ranges {
            assert!(range.start < range.end, "empty range stored: {range:?}");
        }
        for pair in set.ranges.windows(2) {
            assert!(
                pair[0].end < pair[1].start,
                "ranges not sorted, disjoint and merged: {:?} and {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn pop_first_yields_ascending_values() {
        let mut set = RangeSet::full(2u32, 9);
        for value in 4..7 {
            set.remove(value).unwrap();
        }
        let popped: Vec<u32> = std::iter::from_fn(|| set.pop_first()).collect();
        assert_eq!(popped, vec![2, 3, 7, 8]);
        assert!(set.is_empty());
        assert_eq!(set.pop_first(), None);
    }

    #[test]
    fn reinserted_value_is_first_again() {
        let mut set = RangeSet::full(1u32, 100);
        for expected in 1..=10 {
            assert_eq!(set.pop_first(), Some(expected));
        }
        set.insert(4).unwrap();
        check_rangeset_invariants(&set);
        assert!(set.contains(4));
        assert_eq!(set.pop_first(), Some(4));
        assert_eq!(set.pop_first(), Some(11));
    }

    #[test]
    fn insert_and_remove_report_membership_errors() {
        let mut set = RangeSet::full(1u32, 5);
        assert_eq!(set.insert(3), Err(RangeSetError::AlreadyPresent(3)));
        assert_eq!(set.remove(5), Err(RangeSetError::NotPresent(5)));
        set.remove(3).unwrap();
        assert_eq!(set.remove(3), Err(RangeSetError::NotPresent(3)));
        assert_eq!(set.ranges, [Range::new(1, 3), Range::new(4, 5)]);
    }

    #[test]
    fn removing_middle_splits_and_inserting_merges() {
        let mut set = RangeSet::full(1u32, 10);
        set.remove(5).unwrap();
        assert_eq!(set.ranges, [Range::new(1, 5), Range::new(6, 10)]);
        set.remove(9).unwrap();
        set.remove(1).unwrap();
        check_rangeset_invariants(&set);
        assert_eq!(set.ranges, [Range::new(2, 5), Range::new(6, 9)]);
        set.insert(5).unwrap();
        assert_eq!(set.ranges, [Range::new(2, 9)]);
    }

    #[test]
    fn random_remove_then_insert_restores_full_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut set = RangeSet::full(1u32, 1 << 20);
        let capacity = set.len();

        let mut taken = Vec::new();
        while taken.len() < 2000 {
            let value = rng.random_range(1..1 << 20);
            if !set.contains(value) {
                assert_eq!(set.remove(value), Err(RangeSetError::NotPresent(value)));
                continue;
            }
            set.remove(value).unwrap();
            check_rangeset_invariants(&set);
            assert!(!set.contains(value));
            taken.push(value);
        }
        assert_eq!(set.len(), capacity - 2000);

        taken.shuffle(&mut rng);
        for value in taken {
            set.insert(value).unwrap();
            check_rangeset_invariants(&set);
        }
        assert_eq!(set, RangeSet::full(1, 1 << 20));
    }
}
