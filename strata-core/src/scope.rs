//! Addressable scopes: the dynamic, batch and base views of a tensor.

use crate::error::ShapeError;
use crate::index::IndexOp;
use crate::tensor::{Region, Tensor};
use crate::Element;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Dynamic,
    Batch,
    Base,
}

/// A borrowed window onto one size group of a tensor.
///
/// Index operations written against a scope only see that group's axes; all
/// other axes pass through untouched. `dynamic()` addresses the dynamic
/// group, `batch()` the dynamic + intmd groups together, and `base()` the
/// base group.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a, E> {
    tensor: &'a Tensor<E>,
    kind: ScopeKind,
}

impl<'a, E: Element> Scope<'a, E> {
    pub(crate) fn dynamic(tensor: &'a Tensor<E>) -> Self {
        Self {
            tensor,
            kind: ScopeKind::Dynamic,
        }
    }

    pub(crate) fn batch(tensor: &'a Tensor<E>) -> Self {
        Self {
            tensor,
            kind: ScopeKind::Batch,
        }
    }

    pub(crate) fn base(tensor: &'a Tensor<E>) -> Self {
        Self {
            tensor,
            kind: ScopeKind::Base,
        }
    }

    /// Absolute axis range `[start, end)` this scope addresses.
    fn bounds(&self) -> (usize, usize) {
        let t = self.tensor;
        match self.kind {
            ScopeKind::Dynamic => (0, t.dynamic_dim()),
            ScopeKind::Batch => (0, t.batch_dim()),
            ScopeKind::Base => (t.batch_dim(), t.dim()),
        }
    }

    fn label(&self) -> &'static str {
        match self.kind {
            ScopeKind::Dynamic => "dynamic",
            ScopeKind::Batch => "batch",
            ScopeKind::Base => "base",
        }
    }

    /// Number of axes in this scope.
    pub fn dim(&self) -> usize {
        let (s, e) = self.bounds();
        e - s
    }

    /// Sizes of the axes in this scope.
    pub fn shape(&self) -> &[usize] {
        let (s, e) = self.bounds();
        &self.tensor.sizes()[s..e]
    }

    /// Index this scope, returning an aliasing view.
    ///
    /// Integers drop an axis (and decrement the owning dim counter), slices
    /// keep it, `NewAxis` inserts a unit axis into the scope (incrementing
    /// the counter), and `Ellipsis` fills all axes not otherwise addressed.
    /// Axes outside the scope are untouched.
    pub fn index(&self, ops: &[IndexOp]) -> Result<Tensor<E>, ShapeError> {
        let t = self.tensor;
        let (s0, e0) = self.bounds();
        let scope_len = e0 - s0;

        let consuming = ops
            .iter()
            .filter(|op| matches!(op, IndexOp::At(_) | IndexOp::Range(_)))
            .count();
        let fills = ops.iter().filter(|op| matches!(op, IndexOp::Fill)).count();
        if fills > 1 {
            return Err(ShapeError::MultipleEllipsis);
        }
        if consuming > scope_len {
            return Err(ShapeError::TooManyIndices {
                given: consuming,
                addressable: scope_len,
            });
        }

        let mut sizes = Vec::with_capacity(t.dim() + ops.len());
        let mut strides = Vec::with_capacity(t.dim() + ops.len());
        let mut offset = t.offset as isize;
        let mut dynamic_out = 0usize;
        let mut intmd_out = 0usize;
        let mut bump = |region: Region| match region {
            Region::Dynamic => dynamic_out += 1,
            Region::Intmd => intmd_out += 1,
            Region::Base => {}
        };

        // axes before the scope pass through
        for axis in 0..s0 {
            sizes.push(t.sizes[axis]);
            strides.push(t.strides[axis]);
            bump(t.region_of(axis));
        }

        let mut src = s0;
        let mut apply = |op: &IndexOp,
                         src: &mut usize,
                         sizes: &mut Vec<usize>,
                         strides: &mut Vec<isize>,
                         offset: &mut isize|
         -> Result<(), ShapeError> {
            match op {
                IndexOp::At(raw) => {
                    let size = t.sizes[*src];
                    let i = if *raw < 0 { *raw + size as isize } else { *raw };
                    if i < 0 || i >= size as isize {
                        return Err(ShapeError::IndexOutOfRange {
                            axis: *src,
                            index: *raw,
                            size,
                        });
                    }
                    *offset += i * t.strides[*src];
                    *src += 1;
                }
                IndexOp::Range(slice) => {
                    let size = t.sizes[*src];
                    let (first, len) = slice.resolve(size, *src)?;
                    if len > 0 {
                        *offset += first as isize * t.strides[*src];
                    }
                    sizes.push(len);
                    strides.push(t.strides[*src] * slice.step);
                    bump(t.region_of(*src));
                    *src += 1;
                }
                IndexOp::Insert => {
                    sizes.push(1);
                    strides.push(0);
                    let region = match self.kind {
                        ScopeKind::Dynamic => Region::Dynamic,
                        ScopeKind::Base => Region::Base,
                        ScopeKind::Batch => {
                            if *src < t.dynamic_dim() {
                                Region::Dynamic
                            } else {
                                Region::Intmd
                            }
                        }
                    };
                    bump(region);
                }
                IndexOp::Fill => unreachable!("expanded before application"),
            }
            Ok(())
        };

        for op in ops {
            if matches!(op, IndexOp::Fill) {
                for _ in 0..scope_len - consuming {
                    apply(
                        &IndexOp::Range(crate::index::Slice::new(None, None, 1)),
                        &mut src,
                        &mut sizes,
                        &mut strides,
                        &mut offset,
                    )?;
                }
            } else {
                apply(op, &mut src, &mut sizes, &mut strides, &mut offset)?;
            }
        }

        // unaddressed scope axes and axes after the scope pass through
        for axis in src..t.dim() {
            sizes.push(t.sizes[axis]);
            strides.push(t.strides[axis]);
            bump(t.region_of(axis));
        }

        Ok(Tensor {
            arena: t.arena.clone(),
            offset: offset as usize,
            sizes,
            strides,
            dynamic_dim: dynamic_out,
            intmd_dim: intmd_out,
        })
    }

    /// Insert a unit axis at the front of this scope.
    pub fn unsqueeze(&self) -> Result<Tensor<E>, ShapeError> {
        self.index(&[IndexOp::Insert, IndexOp::Fill])
    }

    /// Stride-0 expansion of this scope to a target shape.
    ///
    /// The scope's sizes right-align against `target`: size-1 axes stretch
    /// and new leading axes may appear in the dynamic and batch scopes. The
    /// base scope can only stretch existing size-1 axes; growing or altering
    /// any other base dimension fails with [`ShapeError::ExpandMismatch`].
    /// New batch-scope axes join the dynamic group.
    pub fn expand(&self, target: &[usize]) -> Result<Tensor<E>, ShapeError> {
        let t = self.tensor;
        let (s0, e0) = self.bounds();
        let cur = &t.sizes[s0..e0];
        if target.len() < cur.len() || (self.kind == ScopeKind::Base && target.len() != cur.len()) {
            return Err(ShapeError::DimCount {
                group: self.label(),
                expected: cur.len(),
                got: target.len(),
            });
        }
        let lead = target.len() - cur.len();

        let mut sizes = t.sizes[..s0].to_vec();
        let mut strides = t.strides[..s0].to_vec();
        for (k, &want) in target.iter().enumerate() {
            if k < lead {
                sizes.push(want);
                strides.push(0);
            } else {
                let have = cur[k - lead];
                if have == want {
                    sizes.push(want);
                    strides.push(t.strides[s0 + k - lead]);
                } else if have == 1 {
                    sizes.push(want);
                    strides.push(0);
                } else {
                    return Err(ShapeError::ExpandMismatch {
                        group: self.label(),
                        from: have,
                        to: want,
                    });
                }
            }
        }
        sizes.extend_from_slice(&t.sizes[e0..]);
        strides.extend_from_slice(&t.strides[e0..]);

        let dynamic_dim = match self.kind {
            ScopeKind::Dynamic | ScopeKind::Batch => t.dynamic_dim() + lead,
            ScopeKind::Base => t.dynamic_dim(),
        };
        Ok(Tensor {
            arena: t.arena.clone(),
            offset: t.offset,
            sizes,
            strides,
            dynamic_dim,
            intmd_dim: t.intmd_dim(),
        })
    }
}
