//! The hierarchically batched tensor.

use ndarray::{ArrayD, IxDyn};
use rand::distributions::{Distribution, Standard};
use rand::Rng;

use crate::error::ShapeError;
use crate::scope::Scope;
use crate::shape::{broadcast, contiguous_strides, for_each_index, numel};
use crate::storage::Arena;
use crate::Element;

/// Which size group an axis belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Region {
    Dynamic,
    Intmd,
    Base,
}

/// A tensor whose axes split into three consecutive groups.
///
/// The first `dynamic_dim` axes form the *dynamic* group (open-ended batch
/// extent such as time steps or ensembles), the next `intmd_dim` axes form
/// the *intermediate* group (fixed structural batching), and the remaining
/// axes form the *base* group (the intrinsic per-sample shape). Derived
/// groupings follow: the batch shape is dynamic + intmd, the static shape is
/// intmd + base.
///
/// In practice a tensor is a `(offset, strides, sizes)` descriptor borrowing
/// a shared [`Arena`]. Indexing, slicing and expansion return descriptors
/// over the same arena, so writes through one view are observed by every
/// other view of the same elements. Arithmetic always allocates a fresh
/// arena and therefore never aliases.
///
/// `Clone` is shallow: the clone is another view of the same arena. Use
/// [`Tensor::to_owned`] for a deep copy.
#[derive(Debug, Clone)]
pub struct Tensor<E> {
    pub(crate) arena: Arena<E>,
    pub(crate) offset: usize,
    pub(crate) sizes: Vec<usize>,
    pub(crate) strides: Vec<isize>,
    pub(crate) dynamic_dim: usize,
    pub(crate) intmd_dim: usize,
}

impl<E: Element> Tensor<E> {
    /// Wrap a raw buffer into a tensor of the given shape and split.
    pub fn from_vec(
        data: Vec<E>,
        sizes: &[usize],
        dynamic_dim: usize,
        intmd_dim: usize,
    ) -> Result<Self, ShapeError> {
        Self::from_raw(Arena::new(data), sizes, dynamic_dim, intmd_dim)
    }

    /// Wrap an existing arena into a contiguous tensor of the given shape
    /// and split.
    ///
    /// The new tensor views the arena from offset 0 with row-major strides;
    /// it aliases every other view of the same arena.
    pub fn from_raw(
        arena: Arena<E>,
        sizes: &[usize],
        dynamic_dim: usize,
        intmd_dim: usize,
    ) -> Result<Self, ShapeError> {
        check_split(sizes.len(), dynamic_dim, intmd_dim)?;
        if arena.len() != numel(sizes) {
            return Err(ShapeError::BufferMismatch {
                len: arena.len(),
                sizes: sizes.to_vec(),
            });
        }
        Ok(Self {
            offset: 0,
            sizes: sizes.to_vec(),
            strides: contiguous_strides(sizes),
            dynamic_dim,
            intmd_dim,
            arena,
        })
    }

    /// Tensor of the given shape filled with one value.
    pub fn full(
        sizes: &[usize],
        dynamic_dim: usize,
        intmd_dim: usize,
        value: E,
    ) -> Result<Self, ShapeError> {
        Self::from_vec(vec![value; numel(sizes)], sizes, dynamic_dim, intmd_dim)
    }

    /// Tensor of zeros.
    pub fn zeros(sizes: &[usize], dynamic_dim: usize, intmd_dim: usize) -> Result<Self, ShapeError> {
        Self::full(sizes, dynamic_dim, intmd_dim, E::zero())
    }

    /// Tensor of ones.
    pub fn ones(sizes: &[usize], dynamic_dim: usize, intmd_dim: usize) -> Result<Self, ShapeError> {
        Self::full(sizes, dynamic_dim, intmd_dim, E::one())
    }

    /// Tensor of uniform random values in `[0, 1)`.
    pub fn random<R: Rng + ?Sized>(
        sizes: &[usize],
        dynamic_dim: usize,
        intmd_dim: usize,
        rng: &mut R,
    ) -> Result<Self, ShapeError>
    where
        Standard: Distribution<E>,
    {
        let data = (0..numel(sizes)).map(|_| rng.sample(Standard)).collect();
        Self::from_vec(data, sizes, dynamic_dim, intmd_dim)
    }

    /// Rank-1 base tensor of `n` evenly spaced values from `start` to `end`
    /// inclusive.
    pub fn linspace(start: E, end: E, n: usize) -> Result<Self, ShapeError> {
        let data = if n == 1 {
            vec![start]
        } else {
            let step = (end - start) / E::from(n - 1).unwrap_or_else(E::one);
            (0..n)
                .map(|i| start + step * E::from(i).unwrap_or_else(E::zero))
                .collect()
        };
        Self::from_vec(data, &[n], 0, 0)
    }

    /// Identity matrix with base shape `(n, n)` and no batch axes.
    pub fn eye(n: usize) -> Result<Self, ShapeError> {
        let mut data = vec![E::zero(); n * n];
        for i in 0..n {
            data[i * n + i] = E::one();
        }
        Self::from_vec(data, &[n, n], 0, 0)
    }

    /// Zeros with the shape and split of `other`.
    pub fn zeros_like(other: &Self) -> Self {
        // shape and split of an existing tensor are always valid
        Self::from_vec(
            vec![E::zero(); other.numel()],
            &other.sizes,
            other.dynamic_dim,
            other.intmd_dim,
        )
        .unwrap()
    }

    /// Ones with the shape and split of `other`.
    pub fn ones_like(other: &Self) -> Self {
        Self::from_vec(
            vec![E::one(); other.numel()],
            &other.sizes,
            other.dynamic_dim,
            other.intmd_dim,
        )
        .unwrap()
    }

    /// Constant tensor with the shape and split of `other`.
    pub fn full_like(other: &Self, value: E) -> Self {
        Self::from_vec(
            vec![value; other.numel()],
            &other.sizes,
            other.dynamic_dim,
            other.intmd_dim,
        )
        .unwrap()
    }

    /// Wrap an `ndarray` array, splitting its axes at the given dims.
    pub fn from_array(
        arr: ArrayD<E>,
        dynamic_dim: usize,
        intmd_dim: usize,
    ) -> Result<Self, ShapeError> {
        let arr = if arr.is_standard_layout() {
            arr
        } else {
            arr.as_standard_layout().into_owned()
        };
        let sizes = arr.shape().to_vec();
        let (data, _) = arr.into_raw_vec_and_offset();
        Self::from_vec(data, &sizes, dynamic_dim, intmd_dim)
    }

    /// Gather into a freshly allocated `ndarray` array.
    pub fn to_array(&self) -> ArrayD<E> {
        // the gathered buffer always matches the shape
        ArrayD::from_shape_vec(IxDyn(&self.sizes), self.to_vec()).unwrap()
    }

    /// Gather all elements into a new row-major buffer.
    pub fn to_vec(&self) -> Vec<E> {
        let buf = self.arena.read();
        let mut out = Vec::with_capacity(self.numel());
        for_each_index(&self.sizes, |idx| out.push(buf[self.pos(idx)]));
        out
    }

    /// Deep copy into a fresh contiguous arena.
    pub fn to_owned(&self) -> Self {
        Self::from_vec(self.to_vec(), &self.sizes, self.dynamic_dim, self.intmd_dim).unwrap()
    }

    /// Elementwise map into a fresh tensor, keeping shape and split.
    pub fn map(&self, f: impl FnMut(E) -> E) -> Self {
        let arr = self.to_array().mapv(f);
        Self::from_array(arr, self.dynamic_dim, self.intmd_dim).unwrap()
    }

    /// Elementwise power.
    pub fn powf(&self, exponent: E) -> Self {
        self.map(|x| x.powf(exponent))
    }

    /// Total rank.
    pub fn dim(&self) -> usize {
        self.sizes.len()
    }

    /// Number of dynamic axes.
    pub fn dynamic_dim(&self) -> usize {
        self.dynamic_dim
    }

    /// Number of intermediate axes.
    pub fn intmd_dim(&self) -> usize {
        self.intmd_dim
    }

    /// Number of base axes.
    pub fn base_dim(&self) -> usize {
        self.sizes.len() - self.dynamic_dim - self.intmd_dim
    }

    /// Number of batch (dynamic + intmd) axes.
    pub fn batch_dim(&self) -> usize {
        self.dynamic_dim + self.intmd_dim
    }

    /// Number of static (intmd + base) axes.
    pub fn static_dim(&self) -> usize {
        self.sizes.len() - self.dynamic_dim
    }

    /// All axis sizes.
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// Sizes of the dynamic group.
    pub fn dynamic_shape(&self) -> &[usize] {
        &self.sizes[..self.dynamic_dim]
    }

    /// Sizes of the intermediate group.
    pub fn intmd_shape(&self) -> &[usize] {
        &self.sizes[self.dynamic_dim..self.dynamic_dim + self.intmd_dim]
    }

    /// Sizes of the base group.
    pub fn base_shape(&self) -> &[usize] {
        &self.sizes[self.dynamic_dim + self.intmd_dim..]
    }

    /// Sizes of the batch (dynamic + intmd) group.
    pub fn batch_shape(&self) -> &[usize] {
        &self.sizes[..self.dynamic_dim + self.intmd_dim]
    }

    /// Sizes of the static (intmd + base) group.
    pub fn static_shape(&self) -> &[usize] {
        &self.sizes[self.dynamic_dim..]
    }

    /// Total element count.
    pub fn numel(&self) -> usize {
        numel(&self.sizes)
    }

    /// Element count of the base group.
    pub fn base_numel(&self) -> usize {
        numel(self.base_shape())
    }

    /// Whether this tensor shares its arena with `other`.
    pub fn aliases(&self, other: &Self) -> bool {
        self.arena.shares(&other.arena)
    }

    /// The dynamic scope of this tensor.
    pub fn dynamic(&self) -> Scope<'_, E> {
        Scope::dynamic(self)
    }

    /// The batch (dynamic + intmd) scope of this tensor.
    pub fn batch(&self) -> Scope<'_, E> {
        Scope::batch(self)
    }

    /// The base scope of this tensor.
    pub fn base(&self) -> Scope<'_, E> {
        Scope::base(self)
    }

    /// Read one element by its full multi-index.
    pub fn get(&self, idx: &[usize]) -> Result<E, ShapeError> {
        if idx.len() != self.dim() {
            return Err(ShapeError::TooManyIndices {
                given: idx.len(),
                addressable: self.dim(),
            });
        }
        for (axis, (&i, &s)) in idx.iter().zip(&self.sizes).enumerate() {
            if i >= s {
                return Err(ShapeError::IndexOutOfRange {
                    axis,
                    index: i as isize,
                    size: s,
                });
            }
        }
        Ok(self.arena.read()[self.pos(idx)])
    }

    /// Re-split the same view into a new `(dynamic_dim, intmd_dim)` pair.
    pub fn reinterpret(&self, dynamic_dim: usize, intmd_dim: usize) -> Result<Self, ShapeError> {
        check_split(self.sizes.len(), dynamic_dim, intmd_dim)?;
        let mut out = self.clone();
        out.dynamic_dim = dynamic_dim;
        out.intmd_dim = intmd_dim;
        Ok(out)
    }

    /// Reshape the base group, keeping the element count.
    ///
    /// When the base axes of this view are contiguous the result aliases
    /// this tensor; otherwise the elements are gathered first.
    pub fn base_reshape(&self, new_base: &[usize]) -> Result<Self, ShapeError> {
        if numel(new_base) != self.base_numel() {
            return Err(ShapeError::ReshapeMismatch {
                from: self.base_shape().to_vec(),
                to: new_base.to_vec(),
            });
        }
        let t = if self.base_is_contiguous() {
            self.clone()
        } else {
            self.to_owned()
        };
        let batch = t.batch_dim();
        let mut sizes = t.sizes[..batch].to_vec();
        sizes.extend_from_slice(new_base);
        let mut strides = t.strides[..batch].to_vec();
        strides.extend(contiguous_strides(new_base));
        Ok(Self {
            arena: t.arena,
            offset: t.offset,
            sizes,
            strides,
            dynamic_dim: t.dynamic_dim,
            intmd_dim: t.intmd_dim,
        })
    }

    /// Flatten the base group to a single axis.
    pub fn base_flatten(&self) -> Self {
        // the flattened size always matches
        self.base_reshape(&[self.base_numel()]).unwrap()
    }

    /// Group-wise broadcast of two tensors onto their common shape.
    ///
    /// Both results are stride-0 views of the inputs. Fails with
    /// [`ShapeError::BroadcastMismatch`] naming the offending group.
    pub fn broadcast_with(&self, other: &Self) -> Result<(Self, Self), ShapeError> {
        let dynamic = broadcast(self.dynamic_shape(), other.dynamic_shape(), "dynamic")?;
        let intmd = broadcast(self.intmd_shape(), other.intmd_shape(), "intmd")?;
        let base = broadcast(self.base_shape(), other.base_shape(), "base")?;
        Ok((
            self.broadcast_to_groups(&dynamic, &intmd, &base)?,
            other.broadcast_to_groups(&dynamic, &intmd, &base)?,
        ))
    }

    /// Stride-0 view of this tensor with each size group grown to a target.
    ///
    /// Within each group the existing sizes right-align against the target;
    /// absent and size-1 dims stretch, anything else fails.
    pub fn broadcast_to_groups(
        &self,
        dynamic: &[usize],
        intmd: &[usize],
        base: &[usize],
    ) -> Result<Self, ShapeError> {
        let (mut sizes, mut strides) = expand_axes(
            self.dynamic_shape(),
            &self.strides[..self.dynamic_dim],
            dynamic,
            "dynamic",
        )?;
        let (s, t) = expand_axes(
            self.intmd_shape(),
            &self.strides[self.dynamic_dim..self.dynamic_dim + self.intmd_dim],
            intmd,
            "intmd",
        )?;
        sizes.extend(s);
        strides.extend(t);
        let (s, t) = expand_axes(
            self.base_shape(),
            &self.strides[self.dynamic_dim + self.intmd_dim..],
            base,
            "base",
        )?;
        sizes.extend(s);
        strides.extend(t);
        Ok(Self {
            arena: self.arena.clone(),
            offset: self.offset,
            sizes,
            strides,
            dynamic_dim: dynamic.len(),
            intmd_dim: intmd.len(),
        })
    }

    /// Write `src` (broadcast right-aligned over the full shape) through this
    /// view into shared storage.
    pub fn assign(&mut self, src: &Self) -> Result<(), ShapeError> {
        self.write_from(src, false)
    }

    /// Add `src` (broadcast right-aligned over the full shape) onto the
    /// elements addressed by this view.
    pub fn accumulate(&mut self, src: &Self) -> Result<(), ShapeError> {
        self.write_from(src, true)
    }

    /// Fill every addressed element with one value.
    pub fn fill(&mut self, value: E) {
        let mut buf = self.arena.write();
        let offset = self.offset;
        let strides = &self.strides;
        for_each_index(&self.sizes, |idx| {
            buf[pos_of(offset, strides, idx)] = value;
        });
    }

    /// Stack tensors of one shape along a new leading dynamic axis.
    pub fn stack(parts: &[&Self]) -> Result<Self, ShapeError> {
        let first = parts.first().ok_or(ShapeError::EmptyOperands)?;
        for p in parts {
            if p.sizes != first.sizes
                || p.dynamic_dim != first.dynamic_dim
                || p.intmd_dim != first.intmd_dim
            {
                return Err(ShapeError::StackMismatch);
            }
        }
        let mut data = Vec::with_capacity(parts.len() * first.numel());
        for p in parts {
            data.extend(p.to_vec());
        }
        let mut sizes = vec![parts.len()];
        sizes.extend_from_slice(&first.sizes);
        Self::from_vec(data, &sizes, first.dynamic_dim + 1, first.intmd_dim)
    }

    /// Approximate elementwise comparison with an absolute tolerance.
    ///
    /// Shapes must match exactly; splits are not compared.
    pub fn allclose(&self, other: &Self, atol: E) -> bool {
        self.sizes == other.sizes
            && self
                .to_vec()
                .into_iter()
                .zip(other.to_vec())
                .all(|(a, b)| (a - b).abs() <= atol)
    }

    fn write_from(&mut self, src: &Self, accumulate: bool) -> Result<(), ShapeError> {
        let src = src.expand_full(&self.sizes)?;
        // gather first so that self-overlapping assignments stay well defined
        let data = src.to_vec();
        let mut buf = self.arena.write();
        let offset = self.offset;
        let strides = &self.strides;
        let mut i = 0;
        for_each_index(&self.sizes, |idx| {
            let p = pos_of(offset, strides, idx);
            buf[p] = if accumulate { buf[p] + data[i] } else { data[i] };
            i += 1;
        });
        Ok(())
    }

    /// Stride-0 view broadcast right-aligned over the full shape, ignoring
    /// size groups. Used by write ops, where the target's split governs.
    fn expand_full(&self, target: &[usize]) -> Result<Self, ShapeError> {
        let (sizes, strides) = expand_axes(&self.sizes, &self.strides, target, "full")?;
        Ok(Self {
            arena: self.arena.clone(),
            offset: self.offset,
            sizes,
            strides,
            dynamic_dim: 0,
            intmd_dim: 0,
        })
    }

    fn base_is_contiguous(&self) -> bool {
        let batch = self.batch_dim();
        self.strides[batch..] == contiguous_strides(self.base_shape())
    }

    pub(crate) fn pos(&self, idx: &[usize]) -> usize {
        pos_of(self.offset, &self.strides, idx)
    }

    pub(crate) fn region_of(&self, axis: usize) -> Region {
        if axis < self.dynamic_dim {
            Region::Dynamic
        } else if axis < self.dynamic_dim + self.intmd_dim {
            Region::Intmd
        } else {
            Region::Base
        }
    }
}

fn pos_of(offset: usize, strides: &[isize], idx: &[usize]) -> usize {
    let mut p = offset as isize;
    for (i, s) in idx.iter().zip(strides) {
        p += *i as isize * s;
    }
    p as usize
}

fn check_split(rank: usize, dynamic_dim: usize, intmd_dim: usize) -> Result<(), ShapeError> {
    if dynamic_dim + intmd_dim > rank {
        return Err(ShapeError::SplitMismatch {
            dynamic_dim,
            intmd_dim,
            rank,
        });
    }
    Ok(())
}

fn expand_axes(
    sizes: &[usize],
    strides: &[isize],
    target: &[usize],
    group: &'static str,
) -> Result<(Vec<usize>, Vec<isize>), ShapeError> {
    if target.len() < sizes.len() {
        return Err(ShapeError::BroadcastMismatch {
            group,
            lhs: sizes.to_vec(),
            rhs: target.to_vec(),
        });
    }
    let lead = target.len() - sizes.len();
    let mut out_sizes = Vec::with_capacity(target.len());
    let mut out_strides = Vec::with_capacity(target.len());
    for (k, &t) in target.iter().enumerate() {
        if k < lead {
            out_sizes.push(t);
            out_strides.push(0);
        } else {
            let (c, s) = (sizes[k - lead], strides[k - lead]);
            if c == t {
                out_sizes.push(t);
                out_strides.push(s);
            } else if c == 1 {
                out_sizes.push(t);
                out_strides.push(0);
            } else {
                return Err(ShapeError::BroadcastMismatch {
                    group,
                    lhs: sizes.to_vec(),
                    rhs: target.to_vec(),
                });
            }
        }
    }
    Ok((out_sizes, out_strides))
}
