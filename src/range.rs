//! Key ranges and range sets.
//!
//! Keys are discrete (`i64`), so every range is normalized to a closed
//! interval `[start, end]`. A [`RangeSet`] keeps its ranges disjoint and
//! coalesces adjacent ones, which makes equality structural.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Bound, RangeBounds};

use serde::{Deserialize, Serialize};

use crate::types::Key;

/// A closed, non-empty interval of keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyRange {
    pub start: Key,
    pub end: Key,
}

impl KeyRange {
    /// Returns `None` when `start > end`
    pub fn new(start: Key, end: Key) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn all() -> Self {
        Self {
            start: Key::MIN,
            end: Key::MAX,
        }
    }

    pub fn point(key: Key) -> Self {
        Self {
            start: key,
            end: key,
        }
    }

    /// Normalize any std range over keys. Empty ranges yield `None`.
    pub fn from_bounds(bounds: impl RangeBounds<Key>) -> Option<Self> {
        let start = match bounds.start_bound() {
            Bound::Included(&s) => s,
            Bound::Excluded(&s) => s.checked_add(1)?,
            Bound::Unbounded => Key::MIN,
        };
        let end = match bounds.end_bound() {
            Bound::Included(&e) => e,
            Bound::Excluded(&e) => e.checked_sub(1)?,
            Bound::Unbounded => Key::MAX,
        };
        Self::new(start, end)
    }

    pub fn contains(&self, key: Key) -> bool {
        self.start <= key && key <= self.end
    }

    pub fn intersects(&self, other: &KeyRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn encloses(&self, other: &KeyRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn intersection(&self, other: &KeyRange) -> Option<KeyRange> {
        KeyRange::new(self.start.max(other.start), self.end.min(other.end))
    }

    /// Smallest range covering both
    pub fn span(&self, other: &KeyRange) -> KeyRange {
        KeyRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// A set of disjoint, coalesced key ranges
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeSet {
    /// start -> end, both inclusive
    ranges: BTreeMap<Key, Key>,
}

impl RangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self::from(KeyRange::all())
    }

    pub fn from_range(bounds: impl RangeBounds<Key>) -> Self {
        let mut set = Self::new();
        if let Some(range) = KeyRange::from_bounds(bounds) {
            set.add(range);
        }
        set
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn is_all(&self) -> bool {
        self.ranges.get(&Key::MIN) == Some(&Key::MAX)
    }

    pub fn iter(&self) -> impl Iterator<Item = KeyRange> + '_ {
        self.ranges
            .iter()
            .map(|(&start, &end)| KeyRange { start, end })
    }

    /// Union a range into the set
    pub fn add(&mut self, range: KeyRange) {
        let mut start = range.start;
        let mut end = range.end;

        // Absorb a predecessor that overlaps or touches the new range
        if let Some((&prev_start, &prev_end)) = self.ranges.range(..=start).next_back() {
            if prev_end >= start.saturating_sub(1) {
                start = prev_start;
                end = end.max(prev_end);
                self.ranges.remove(&prev_start);
            }
        }

        // Absorb every successor starting inside or right after the range
        let upper = end.saturating_add(1);
        let absorbed: Vec<(Key, Key)> = self
            .ranges
            .range(start..=upper)
            .map(|(&s, &e)| (s, e))
            .collect();
        for (s, e) in absorbed {
            end = end.max(e);
            self.ranges.remove(&s);
        }

        self.ranges.insert(start, end);
    }

    pub fn add_all(&mut self, other: &RangeSet) {
        for range in other.iter() {
            self.add(range);
        }
    }

    /// Subtract a range from the set
    pub fn remove(&mut self, range: KeyRange) {
        let overlapping: Vec<(Key, Key)> = self
            .ranges
            .range(..=range.end)
            .rev()
            .take_while(|(_, e)| **e >= range.start)
            .map(|(&s, &e)| (s, e))
            .collect();

        for (s, e) in overlapping {
            self.ranges.remove(&s);
            if s < range.start {
                self.ranges.insert(s, range.start - 1);
            }
            if e > range.end {
                self.ranges.insert(range.end + 1, e);
            }
        }
    }

    pub fn remove_all(&mut self, other: &RangeSet) {
        for range in other.iter() {
            self.remove(range);
        }
    }

    pub fn contains(&self, key: Key) -> bool {
        self.ranges
            .range(..=key)
            .next_back()
            .is_some_and(|(_, &end)| end >= key)
    }

    pub fn intersects(&self, range: &KeyRange) -> bool {
        self.ranges
            .range(..=range.end)
            .next_back()
            .is_some_and(|(_, &end)| end >= range.start)
    }

    pub fn intersects_set(&self, other: &RangeSet) -> bool {
        other.iter().any(|range| self.intersects(&range))
    }

    pub fn encloses(&self, range: &KeyRange) -> bool {
        self.ranges
            .range(..=range.start)
            .next_back()
            .is_some_and(|(_, &end)| end >= range.end)
    }

    pub fn intersection(&self, other: &RangeSet) -> RangeSet {
        let mut result = RangeSet::new();
        let mut left = self.iter().peekable();
        let mut right = other.iter().peekable();
        while let (Some(a), Some(b)) = (left.peek(), right.peek()) {
            if let Some(common) = a.intersection(b) {
                result.ranges.insert(common.start, common.end);
            }
            if a.end < b.end {
                left.next();
            } else {
                right.next();
            }
        }
        result
    }

    /// Intersection with a single range
    pub fn sub_range_set(&self, range: &KeyRange) -> RangeSet {
        self.intersection(&RangeSet::from(*range))
    }

    pub fn difference(&self, other: &RangeSet) -> RangeSet {
        let mut result = self.clone();
        result.remove_all(other);
        result
    }

    pub fn complement(&self) -> RangeSet {
        let mut result = RangeSet::all();
        result.remove_all(self);
        result
    }

    /// Smallest single range covering the whole set
    pub fn span(&self) -> Option<KeyRange> {
        let (&start, _) = self.ranges.iter().next()?;
        let (_, &end) = self.ranges.iter().next_back()?;
        Some(KeyRange { start, end })
    }
}

impl From<KeyRange> for RangeSet {
    fn from(range: KeyRange) -> Self {
        let mut set = RangeSet::new();
        set.add(range);
        set
    }
}

impl FromIterator<KeyRange> for RangeSet {
    fn from_iter<I: IntoIterator<Item = KeyRange>>(iter: I) -> Self {
        let mut set = RangeSet::new();
        for range in iter {
            set.add(range);
        }
        set
    }
}

impl fmt::Display for RangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, range) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", range)?;
        }
        f.write_str("}")
    }
}
