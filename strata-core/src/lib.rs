//! Core crate of strata: hierarchically batched tensors.
//!
//! A [`Tensor`] splits its axes into three consecutive groups. The leading
//! *dynamic* group is the open-ended batch extent (time, ensembles), the
//! *intermediate* group is fixed structural batching, and the trailing *base*
//! group is a variable's intrinsic per-sample shape. Broadcasting, indexing
//! and expansion all operate per group, so batched code never has to know how
//! many batch axes its operands carry.
//!
//! Tensors are `(offset, strides, sizes)` descriptors over shared storage
//! [`Arena`]s. Indexing and expansion return aliasing views; arithmetic
//! allocates. The contiguous elementwise kernels are delegated to
//! [`ndarray`].

#![warn(missing_docs)]

mod arith;
mod error;
mod index;
mod scope;
mod shape;
mod storage;
mod tensor;

pub use error::ShapeError;
pub use index::{Ellipsis, IndexOp, NewAxis, Slice};
pub use scope::Scope;
pub use shape::{broadcast, contiguous_strides, numel};
pub use storage::Arena;
pub use tensor::Tensor;

use std::fmt::Debug;

use num_traits::Float;

/// Element types tensors can hold.
///
/// Blanket-implemented for every floating point type with the required
/// numeric surface; in practice `f64` and `f32`.
pub trait Element: Float + Debug + 'static {}
impl<E: Float + Debug + 'static> Element for E {}

pub mod prelude {
    //! A prelude re-exporting the commonly used items.

    pub use crate::ix;
    pub use crate::{Element, Ellipsis, IndexOp, NewAxis, ShapeError, Slice, Tensor};
}
