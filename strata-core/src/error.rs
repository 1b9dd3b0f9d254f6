//! Shape-level error type shared by all tensor operations.

use thiserror::Error;

/// Error raised by shape-level tensor operations: construction, broadcasting,
/// indexing, expansion and reshaping.
///
/// Every variant is a caller precondition. No operation in this crate retries
/// or recovers internally; the caller fixes its inputs and re-invokes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    /// Two size groups cannot be broadcast against each other.
    #[error("cannot broadcast {group} sizes {lhs:?} and {rhs:?}")]
    BroadcastMismatch {
        /// Which size group failed (`dynamic`, `intmd` or `base`).
        group: &'static str,
        /// Left-hand group sizes.
        lhs: Vec<usize>,
        /// Right-hand group sizes.
        rhs: Vec<usize>,
    },

    /// A buffer does not hold exactly as many elements as the shape requires.
    #[error("buffer of length {len} cannot hold shape {sizes:?}")]
    BufferMismatch {
        /// Buffer length.
        len: usize,
        /// Requested sizes.
        sizes: Vec<usize>,
    },

    /// The `(dynamic_dim, intmd_dim)` split does not fit the tensor rank.
    #[error("dynamic dim {dynamic_dim} plus intmd dim {intmd_dim} exceeds rank {rank}")]
    SplitMismatch {
        /// Requested number of dynamic dimensions.
        dynamic_dim: usize,
        /// Requested number of intermediate dimensions.
        intmd_dim: usize,
        /// Total rank of the tensor.
        rank: usize,
    },

    /// An integer index falls outside an axis.
    #[error("index {index} out of range for axis {axis} with size {size}")]
    IndexOutOfRange {
        /// Addressed axis (absolute, within the full shape).
        axis: usize,
        /// Offending index as given (possibly negative).
        index: isize,
        /// Size of the axis.
        size: usize,
    },

    /// A slice has a zero step.
    #[error("slice step must be nonzero on axis {axis}")]
    ZeroStep {
        /// Addressed axis.
        axis: usize,
    },

    /// More indices were given than the addressed scope has axes.
    #[error("{given} indices address a scope with only {addressable} axes")]
    TooManyIndices {
        /// Number of consuming index operations.
        given: usize,
        /// Number of axes in the scope.
        addressable: usize,
    },

    /// More than one ellipsis appeared in a single index expression.
    #[error("at most one ellipsis is allowed per index expression")]
    MultipleEllipsis,

    /// An `expand` would alter a non-degenerate dimension.
    #[error("cannot expand axis of size {from} to size {to} in the {group} scope")]
    ExpandMismatch {
        /// Which scope was addressed.
        group: &'static str,
        /// Existing size.
        from: usize,
        /// Requested size.
        to: usize,
    },

    /// A base reshape would change the element count.
    #[error("cannot reshape base {from:?} into {to:?}")]
    ReshapeMismatch {
        /// Existing base shape.
        from: Vec<usize>,
        /// Requested base shape.
        to: Vec<usize>,
    },

    /// Tensors with differing shapes or splits were stacked.
    #[error("stacked tensors must share one shape and one (dynamic, intmd) split")]
    StackMismatch,

    /// An operation requiring at least one operand received none.
    #[error("operation requires at least one tensor")]
    EmptyOperands,

    /// A tensor did not have the expected number of dims in one group.
    #[error("expected {expected} {group} dims, got {got}")]
    DimCount {
        /// Which size group was checked.
        group: &'static str,
        /// Expected dim count.
        expected: usize,
        /// Actual dim count.
        got: usize,
    },
}
