//! Ranges over the flat byte-key space.

use std::ops::{Bound, RangeBounds};

use bytes::Bytes;

/// Computes the tightest exclusive upper bound for a prefix scan: the
/// smallest byte string greater than every key starting with `prefix`.
///
/// The bound is the prefix with its rightmost non-`0xFF` byte incremented
/// and everything after that byte cut off. When no such byte exists (the
/// prefix is empty or all `0xFF`) the scan has no finite upper bound and
/// `None` is returned.
pub(crate) fn prefix_successor(prefix: &[u8]) -> Option<Bytes> {
    let pivot = prefix.iter().rposition(|&b| b != 0xFF)?;
    let mut bound = prefix[..=pivot].to_vec();
    bound[pivot] += 1;
    Some(Bytes::from(bound))
}

/// A range of byte keys, with an inclusive, exclusive or open bound on
/// either side.
#[derive(Clone, Debug)]
pub struct BytesRange {
    pub start: Bound<Bytes>,
    pub end: Bound<Bytes>,
}

impl BytesRange {
    pub fn new(start: Bound<Bytes>, end: Bound<Bytes>) -> Self {
        Self { start, end }
    }

    /// The half-open range `[begin, end)`.
    pub fn half_open(begin: Bytes, end: Bytes) -> Self {
        Self::new(Bound::Included(begin), Bound::Excluded(end))
    }

    /// Every key starting with `prefix`.
    pub fn prefix(prefix: Bytes) -> Self {
        if prefix.is_empty() {
            return Self::unbounded();
        }
        let end = match prefix_successor(&prefix) {
            Some(bound) => Bound::Excluded(bound),
            None => Bound::Unbounded,
        };
        Self::new(Bound::Included(prefix), end)
    }

    /// The whole key space.
    pub fn unbounded() -> Self {
        Self::new(Bound::Unbounded, Bound::Unbounded)
    }

    /// Whether `key` falls inside the range.
    pub fn contains(&self, key: &[u8]) -> bool {
        let above_start = match &self.start {
            Bound::Included(s) => key >= s.as_ref(),
            Bound::Excluded(s) => key > s.as_ref(),
            Bound::Unbounded => true,
        };
        let below_end = match &self.end {
            Bound::Included(e) => key <= e.as_ref(),
            Bound::Excluded(e) => key < e.as_ref(),
            Bound::Unbounded => true,
        };
        above_start && below_end
    }

    /// True when no key can possibly fall inside the range.
    ///
    /// Range scans over a moving boundary routinely produce inverted
    /// bounds on their final iteration; those read as empty rather than
    /// being an error.
    pub fn is_degenerate(&self) -> bool {
        let (start, start_inclusive) = match &self.start {
            Bound::Included(s) => (s, true),
            Bound::Excluded(s) => (s, false),
            Bound::Unbounded => return false,
        };
        match &self.end {
            Bound::Included(e) if start_inclusive => start > e,
            Bound::Included(e) => start >= e,
            Bound::Excluded(e) => start >= e,
            Bound::Unbounded => false,
        }
    }
}

impl RangeBounds<Bytes> for BytesRange {
    fn start_bound(&self) -> Bound<&Bytes> {
        self.start.as_ref()
    }
    fn end_bound(&self) -> Bound<&Bytes> {
        self.end.as_ref()
    }
}
