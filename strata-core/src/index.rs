//! Index operations addressing one scope of a tensor.
//!
//! An index expression is a slice of [`IndexOp`]s, normally built with the
//! [`ix!`](crate::ix) macro. Semantics follow the usual array-language rules:
//! integers drop an axis, slices keep it (negative and omitted bounds count
//! from the end), [`Ellipsis`] stands for "all unaddressed axes here", and
//! [`NewAxis`] inserts a unit axis.

use crate::error::ShapeError;

/// Marker for inserting a unit axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewAxis;

/// Marker filling in all axes not otherwise addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ellipsis;

/// A slice of one axis with optional bounds and a nonzero step.
///
/// `start`/`end` default to the whole axis (respecting the step sign) and may
/// be negative to count from the end. Out-of-range bounds clamp instead of
/// failing, so `Slice::from(..).step_by(2)` reads every other element of any
/// axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slice {
    /// First index, `None` for the step-dependent default.
    pub start: Option<isize>,
    /// One-past-last index, `None` for the step-dependent default.
    pub end: Option<isize>,
    /// Step between taken indices; negative steps walk backwards.
    pub step: isize,
}

impl Slice {
    /// Build a slice from raw parts.
    pub fn new(start: Option<isize>, end: Option<isize>, step: isize) -> Self {
        Self { start, end, step }
    }

    /// Replace the step, keeping the bounds.
    pub fn step_by(mut self, step: isize) -> Self {
        self.step = step;
        self
    }

    /// Resolve against an axis of size `size` into `(first, len)`.
    ///
    /// `first` is the index of the first taken element (meaningless when
    /// `len == 0`).
    pub(crate) fn resolve(&self, size: usize, axis: usize) -> Result<(usize, usize), ShapeError> {
        let n = size as isize;
        if self.step == 0 {
            return Err(ShapeError::ZeroStep { axis });
        }
        if self.step > 0 {
            let mut start = self.start.unwrap_or(0);
            if start < 0 {
                start += n;
            }
            let mut end = self.end.unwrap_or(n);
            if end < 0 {
                end += n;
            }
            let start = start.clamp(0, n);
            let end = end.clamp(0, n);
            let len = if end > start {
                ((end - start + self.step - 1) / self.step) as usize
            } else {
                0
            };
            Ok((start as usize, len))
        } else {
            let mut start = self.start.unwrap_or(n - 1);
            if start < 0 {
                start += n;
            }
            let start = start.min(n - 1);
            let end = match self.end {
                Some(e) => {
                    let e = if e < 0 { e + n } else { e };
                    e.clamp(-1, n)
                }
                None => -1,
            };
            let len = if n > 0 && start > end {
                ((start - end - 1) / -self.step) as usize + 1
            } else {
                0
            };
            Ok((start.max(0) as usize, len))
        }
    }
}

impl From<std::ops::RangeFull> for Slice {
    fn from(_: std::ops::RangeFull) -> Self {
        Slice::new(None, None, 1)
    }
}

/// One element of an index expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOp {
    /// Take a single position, dropping the axis.
    At(isize),
    /// Take a sub-range of the axis.
    Range(Slice),
    /// Insert a unit axis.
    Insert,
    /// Fill in all unaddressed axes.
    Fill,
}

impl From<NewAxis> for IndexOp {
    fn from(_: NewAxis) -> Self {
        IndexOp::Insert
    }
}

impl From<Ellipsis> for IndexOp {
    fn from(_: Ellipsis) -> Self {
        IndexOp::Fill
    }
}

impl From<Slice> for IndexOp {
    fn from(s: Slice) -> Self {
        IndexOp::Range(s)
    }
}

impl From<std::ops::RangeFull> for IndexOp {
    fn from(_: std::ops::RangeFull) -> Self {
        IndexOp::Range(Slice::new(None, None, 1))
    }
}

macro_rules! impl_index_from_int {
    ($($t:ty),*) => {$(
        impl From<$t> for IndexOp {
            fn from(i: $t) -> Self {
                IndexOp::At(i as isize)
            }
        }
        impl From<std::ops::Range<$t>> for IndexOp {
            fn from(r: std::ops::Range<$t>) -> Self {
                IndexOp::Range(Slice::new(Some(r.start as isize), Some(r.end as isize), 1))
            }
        }
        impl From<std::ops::RangeFrom<$t>> for IndexOp {
            fn from(r: std::ops::RangeFrom<$t>) -> Self {
                IndexOp::Range(Slice::new(Some(r.start as isize), None, 1))
            }
        }
        impl From<std::ops::RangeTo<$t>> for IndexOp {
            fn from(r: std::ops::RangeTo<$t>) -> Self {
                IndexOp::Range(Slice::new(None, Some(r.end as isize), 1))
            }
        }
        impl From<std::ops::Range<$t>> for Slice {
            fn from(r: std::ops::Range<$t>) -> Self {
                Slice::new(Some(r.start as isize), Some(r.end as isize), 1)
            }
        }
        impl From<std::ops::RangeFrom<$t>> for Slice {
            fn from(r: std::ops::RangeFrom<$t>) -> Self {
                Slice::new(Some(r.start as isize), None, 1)
            }
        }
        impl From<std::ops::RangeTo<$t>> for Slice {
            fn from(r: std::ops::RangeTo<$t>) -> Self {
                Slice::new(None, Some(r.end as isize), 1)
            }
        }
    )*};
}

impl_index_from_int!(i32, isize, usize);

/// Build an index expression from a comma-separated list of index operands.
///
/// Accepts integers, ranges, [`Slice`]s, [`NewAxis`] and [`Ellipsis`]:
///
/// ```
/// use strata_core::{ix, Ellipsis, NewAxis, Slice};
///
/// let _ = ix![0, .., NewAxis];
/// let _ = ix![Slice::from(..).step_by(2), Ellipsis];
/// ```
#[macro_export]
macro_rules! ix {
    ($($x:expr),* $(,)?) => {
        &[$($crate::IndexOp::from($x)),*][..]
    };
}
