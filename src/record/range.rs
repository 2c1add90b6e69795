//! Key ranges for scans.

use std::ops::{Bound, RangeBounds};

/// A range of user keys with owned bounds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub start: Bound<Vec<u8>>,
    pub end: Bound<Vec<u8>>,
}

impl KeyRange {
    pub fn new(start: Bound<Vec<u8>>, end: Bound<Vec<u8>>) -> Self {
        Self { start, end }
    }

    /// Every key
    pub fn all() -> Self {
        Self::new(Bound::Unbounded, Bound::Unbounded)
    }

    /// `[start, end]`
    pub fn inclusive(start: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>) -> Self {
        Self::new(Bound::Included(start.into()), Bound::Included(end.into()))
    }

    /// Build from any standard range over owned keys (`a..b`, `a..=b`, `..`)
    pub fn from_bounds<R: RangeBounds<Vec<u8>>>(range: R) -> Self {
        Self::new(range.start_bound().cloned(), range.end_bound().cloned())
    }

    /// Whether `key` lies before the start bound
    pub fn before_start(&self, key: &[u8]) -> bool {
        match &self.start {
            Bound::Included(s) => key < s.as_slice(),
            Bound::Excluded(s) => key <= s.as_slice(),
            Bound::Unbounded => false,
        }
    }

    /// Whether `key` lies past the end bound
    pub fn past_end(&self, key: &[u8]) -> bool {
        match &self.end {
            Bound::Included(e) => key > e.as_slice(),
            Bound::Excluded(e) => key >= e.as_slice(),
            Bound::Unbounded => false,
        }
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        !self.before_start(key) && !self.past_end(key)
    }

    /// Whether any key in `[min, max]` could fall inside this range
    pub fn overlaps(&self, min: &[u8], max: &[u8]) -> bool {
        !self.before_start(max) && !self.past_end(min)
    }
}

impl Default for KeyRange {
    fn default() -> Self {
        Self::all()
    }
}
