//! A `RangeSet` which contains non-overlapping, sorted sets of
//! inclusive page frame ranges. The chimera allocator uses it to remember which
//! frames are managed by the Fibonacci engine.

use crate::page::Pfn;
use core::{cmp, fmt, slice};

/// The number of ranges inside a fixed-size [`RangeSet`].
pub const RANGE_COUNT: usize = 32;

/// Any error that can occurr while operating on a [`RangeSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The range was invalid, meaning that `start > end`.
    InvalidRange,
    /// All [`RANGE_COUNT`] slots of the set are in use.
    Full,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidRange => f.write_str("the start of the range is after its end"),
            Error::Full => write!(f, "the range set can't hold more than {} ranges", RANGE_COUNT),
        }
    }
}

/// An inclusive range of page frames that implements [`Copy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    /// The first frame of this range.
    pub start: Pfn,
    /// The last frame of this range.
    pub end: Pfn,
}

impl Range {
    /// Create a new `Range` that goes from `start..=end`.
    pub const fn new(start: Pfn, end: Pfn) -> Self {
        Self { start, end }
    }

    /// Create the inclusive range for the `count` frames starting at `start`.
    ///
    /// Returns `None` if `count` is zero.
    pub fn from_count(start: Pfn, count: usize) -> Option<Self> {
        let last = count.checked_sub(1)?;
        Some(Self::new(start, start + last))
    }

    /// Check if `pfn` is part of this range.
    pub fn contains(&self, pfn: Pfn) -> bool {
        self.start <= pfn && pfn <= self.end
    }

    /// Check if two ranges share at least one frame.
    pub fn overlaps(&self, other: Range) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Check if two ranges overlap or directly follow each other.
    fn touches(&self, other: Range) -> bool {
        self.start.as_usize() <= other.end.as_usize().saturating_add(1)
            && other.start.as_usize() <= self.end.as_usize().saturating_add(1)
    }
}

/// A fixed-size set of inclusive [ranges](Range).
#[derive(Clone)]
pub struct RangeSet {
    /// The fixed array of ranges.
    ranges: [Range; RANGE_COUNT],

    /// The number of ranges in use.
    len: usize,
}

impl RangeSet {
    /// Create a new empty rangeset.
    pub const fn new() -> Self {
        Self {
            ranges: [Range::new(Pfn::new(0), Pfn::new(0)); RANGE_COUNT],
            len: 0,
        }
    }

    /// Remove the range at the given index.
    fn remove(&mut self, idx: usize) {
        // move the removed range out of bounds, so it gets overwritten
        self.ranges[idx..self.len].rotate_left(1);
        self.len -= 1;
    }

    /// Insert a new range into this rangeset.
    ///
    /// If the range overlaps with or touches other ranges inside this set,
    /// all of them will be collapsed into a single range.
    pub fn insert(&mut self, mut range: Range) -> Result<(), Error> {
        if range.start > range.end {
            return Err(Error::InvalidRange);
        }

        self.merge_blocks(&mut range);

        // merging only ever frees slots, so nothing was changed if we are full here
        if self.len == RANGE_COUNT {
            return Err(Error::Full);
        }

        let idx = self
            .iter()
            .position(|other| other.start > range.start)
            .unwrap_or(self.len);

        self.len += 1;
        self.ranges[idx..self.len].rotate_right(1);
        self.ranges[idx] = range;

        Ok(())
    }

    /// Loop through all ranges and merge all blocks that either touch
    /// or overlap with `range`.
    fn merge_blocks(&mut self, range: &mut Range) {
        let mut idx = 0;
        while idx < self.len {
            let other = self.ranges[idx];
            if !range.touches(other) {
                idx += 1;
                continue;
            }

            range.start = cmp::min(range.start, other.start);
            range.end = cmp::max(range.end, other.end);
            self.remove(idx);

            // the range grew, so previous ranges may touch it now
            idx = 0;
        }
    }

    /// Check if `pfn` is inside any range of this set.
    pub fn contains(&self, pfn: Pfn) -> bool {
        self.iter().any(|range| range.contains(pfn))
    }

    /// Return the first range of this set that overlaps `range`.
    pub fn overlapping(&self, range: Range) -> Option<Range> {
        self.iter().copied().find(|other| other.overlaps(range))
    }

    /// Return a slice that contains all ranges.
    #[inline]
    pub fn as_slice(&self) -> &[Range] {
        &self.ranges[..self.len]
    }

    /// Return an iterator over all ranges of this set.
    pub fn iter(&self) -> slice::Iter<'_, Range> {
        self.as_slice().iter()
    }

    /// Return the number of ranges inside this rangeset.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if this range set is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RangeSet {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RangeSet")
            .field("ranges", &self.as_slice())
            .field("len", &self.len)
            .finish()
    }
}
