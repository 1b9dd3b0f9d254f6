//! Errors raised while wrapping models and driving them from a solver.

use strata_axis::AxisError;
use strata_core::ShapeError;
use thiserror::Error;

/// Error raised by system construction and evaluation.
///
/// `Configuration` and `UnsupportedLookback` are fatal construction-time
/// failures: the wrapped model violates an adapter precondition and must be
/// fixed, not retried. `InternalConsistency` and `Assembly` are defensive
/// bug checks that should never fire on a validated system.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SystemError {
    /// The model's axes or parameters violate an adapter precondition.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A lookback other than 1 was requested.
    #[error("only a lookback of 1 is supported, got {0}")]
    UnsupportedLookback(usize),

    /// An internal invariant was violated; a bug, not a user error.
    #[error("internal consistency violation: {0}")]
    InternalConsistency(String),

    /// Assembled results failed a structural assertion.
    #[error("assembly error: {0}")]
    Assembly(String),

    /// An underlying axis or layout operation failed.
    #[error(transparent)]
    Axis(#[from] AxisError),

    /// An underlying tensor operation failed.
    #[error(transparent)]
    Shape(#[from] ShapeError),
}
