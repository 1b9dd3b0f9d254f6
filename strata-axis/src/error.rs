//! Errors raised while building axes and (dis)assembling blocks.

use strata_core::ShapeError;
use thiserror::Error;

use crate::name::VariableName;

/// Error raised by axis construction, layout derivation and block assembly.
///
/// Construction-time variants are fatal: an axis that fails to build is
/// unusable and the caller must fix its declarations. Assembly variants are
/// caller preconditions on the provided values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AxisError {
    /// A variable or sub-axis name collides with an existing sibling.
    #[error("duplicate variable or sub-axis name `{0}`")]
    DuplicateVariable(VariableName),

    /// A variable was declared with no elements.
    #[error("variable `{0}` declares a zero-element base shape")]
    ZeroSizeVariable(VariableName),

    /// The empty name cannot label a variable or sub-axis.
    #[error("variable name is empty")]
    EmptyName,

    /// A requested sub-axis does not exist.
    #[error("unknown sub-axis `{0}`")]
    UnknownSubaxis(String),

    /// A requested variable does not exist.
    #[error("unknown variable `{0}`")]
    UnknownVariable(VariableName),

    /// The number of values does not match the layout's slot count.
    #[error("layout has {expected} slots but {got} values were provided")]
    ValueCount {
        /// Slots in the layout.
        expected: usize,
        /// Values provided.
        got: usize,
    },

    /// A value's base size does not match its slot.
    #[error("variable `{name}` holds {declared} base elements but its slot expects {expected}")]
    SizeMismatch {
        /// Slot name.
        name: VariableName,
        /// Base elements in the provided value.
        declared: usize,
        /// Base elements the layout expects.
        expected: usize,
    },

    /// A flat tensor does not match the layout it is disassembled against.
    #[error("flat tensor with base shape {got:?} does not match layout of size {expected}")]
    FlatMismatch {
        /// Total size of the layout.
        expected: usize,
        /// Base shape of the provided tensor.
        got: Vec<usize>,
    },

    /// A matrix block addresses a slot outside its layouts.
    #[error("block ({row}, {col}) is outside a {rows} x {cols} slot grid")]
    BlockSlot {
        /// Row slot of the block.
        row: usize,
        /// Column slot of the block.
        col: usize,
        /// Row slots available.
        rows: usize,
        /// Column slots available.
        cols: usize,
    },

    /// A matrix block's base size does not match its slot pair.
    #[error("block ({row}, {col}) holds {got} base elements, expected {expected}")]
    BlockMismatch {
        /// Row slot of the block.
        row: usize,
        /// Column slot of the block.
        col: usize,
        /// Base elements in the provided block.
        got: usize,
        /// Base elements the slot pair expects.
        expected: usize,
    },

    /// An underlying tensor operation failed.
    #[error(transparent)]
    Shape(#[from] ShapeError),
}
