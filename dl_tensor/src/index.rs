//! Subscript selectors.

use std::ops::{Range, RangeFrom, RangeFull, RangeTo};

use crate::error::{Result, TensorError};

/// Selects part of one axis.
///
/// Negative positions count from the end of the axis, so `At(-1)` is the last
/// element and `Range { start: -2, end: None }` the last two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Index {
    /// The whole axis; the axis is kept.
    All,
    /// A single position; the axis is removed.
    At(isize),
    /// Half-open range `start..end`; `None` runs to the end. The axis is kept,
    /// and is empty when `start == end`.
    Range { start: isize, end: Option<isize> },
}

/// Axis selection after negative indices have been resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resolved {
    All,
    At(usize),
    Range(usize, usize),
}

impl Index {
    pub fn range(range: Range<isize>) -> Self {
        Index::Range {
            start: range.start,
            end: Some(range.end),
        }
    }

    fn normalize(idx: isize, size: usize) -> isize {
        if idx < 0 {
            size as isize + idx
        } else {
            idx
        }
    }

    /// Resolve against an axis of `size` elements.
    pub(crate) fn resolve(&self, axis: usize, size: usize) -> Result<Resolved> {
        match *self {
            Index::All => Ok(Resolved::All),
            Index::At(idx) => {
                let i = Self::normalize(idx, size);
                if i < 0 || i as usize >= size {
                    return Err(TensorError::IndexOutOfBounds {
                        axis,
                        index: idx,
                        size,
                    });
                }
                Ok(Resolved::At(i as usize))
            }
            Index::Range { start, end } => {
                let lo = Self::normalize(start, size);
                let hi = end.map_or(size as isize, |e| Self::normalize(e, size));
                if lo < 0 || lo as usize > size {
                    return Err(TensorError::IndexOutOfBounds {
                        axis,
                        index: start,
                        size,
                    });
                }
                if hi < lo || hi as usize > size {
                    return Err(TensorError::IndexOutOfBounds {
                        axis,
                        index: end.unwrap_or(size as isize),
                        size,
                    });
                }
                Ok(Resolved::Range(lo as usize, hi as usize))
            }
        }
    }
}

/// Selectors that apply `index` to `axis` and keep every axis before it.
pub(crate) fn along(axis: usize, index: Index) -> Vec<Index> {
    let mut selectors = vec![Index::All; axis];
    selectors.push(index);
    selectors
}

impl From<isize> for Index {
    fn from(idx: isize) -> Self {
        Index::At(idx)
    }
}

impl From<i32> for Index {
    fn from(idx: i32) -> Self {
        Index::At(idx as isize)
    }
}

impl From<RangeFull> for Index {
    fn from(_: RangeFull) -> Self {
        Index::All
    }
}

impl From<Range<isize>> for Index {
    fn from(r: Range<isize>) -> Self {
        Index::range(r)
    }
}

impl From<Range<i32>> for Index {
    fn from(r: Range<i32>) -> Self {
        Index::range(r.start as isize..r.end as isize)
    }
}

impl From<RangeFrom<i32>> for Index {
    fn from(r: RangeFrom<i32>) -> Self {
        Index::Range {
            start: r.start as isize,
            end: None,
        }
    }
}

impl From<RangeTo<i32>> for Index {
    fn from(r: RangeTo<i32>) -> Self {
        Index::Range {
            start: 0,
            end: Some(r.end as isize),
        }
    }
}

/// Build a `Vec<Index>` from mixed selectors: `s![0, 1..3, ..]`.
#[macro_export]
macro_rules! s {
    ($($idx:expr),* $(,)?) => {
        vec![$($crate::Index::from($idx)),*]
    };
}
