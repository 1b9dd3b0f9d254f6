//! Size-group arithmetic: right-aligned broadcasting and iteration order.

use crate::error::ShapeError;

/// Right-aligned broadcast of two size groups.
///
/// Groups align at their trailing end; a missing or size-1 dim stretches to
/// the other side's size. Used independently for the dynamic, intmd and base
/// groups of a binary operation, so `group` names which one failed.
pub fn broadcast(lhs: &[usize], rhs: &[usize], group: &'static str) -> Result<Vec<usize>, ShapeError> {
    let rank = lhs.len().max(rhs.len());
    let mut out = vec![0usize; rank];
    for k in 0..rank {
        let l = dim_from_end(lhs, rank - 1 - k);
        let r = dim_from_end(rhs, rank - 1 - k);
        out[k] = match (l, r) {
            (l, r) if l == r => l,
            (1, r) => r,
            (l, 1) => l,
            _ => {
                return Err(ShapeError::BroadcastMismatch {
                    group,
                    lhs: lhs.to_vec(),
                    rhs: rhs.to_vec(),
                })
            }
        };
    }
    Ok(out)
}

/// Dim at `back` positions from the trailing end, 1 when absent.
fn dim_from_end(sizes: &[usize], back: usize) -> usize {
    if back < sizes.len() {
        sizes[sizes.len() - 1 - back]
    } else {
        1
    }
}

/// Total element count of a shape.
pub fn numel(sizes: &[usize]) -> usize {
    sizes.iter().product()
}

/// Row-major contiguous strides for a shape.
pub fn contiguous_strides(sizes: &[usize]) -> Vec<isize> {
    let mut strides = vec![0isize; sizes.len()];
    let mut acc = 1isize;
    for k in (0..sizes.len()).rev() {
        strides[k] = acc;
        acc *= sizes[k] as isize;
    }
    strides
}

/// Visit every multi-index of `sizes` in row-major order.
///
/// A rank-0 shape is visited exactly once (with the empty index); a shape
/// containing a zero dim is not visited at all.
pub(crate) fn for_each_index(sizes: &[usize], mut f: impl FnMut(&[usize])) {
    if sizes.iter().any(|&s| s == 0) {
        return;
    }
    let mut idx = vec![0usize; sizes.len()];
    loop {
        f(&idx);
        let mut axis = sizes.len();
        loop {
            if axis == 0 {
                return;
            }
            axis -= 1;
            idx[axis] += 1;
            if idx[axis] < sizes[axis] {
                break;
            }
            idx[axis] = 0;
        }
    }
}
