//! Structured nonlinear systems over named, batched tensors.
//!
//! A [`Model`] evaluates a residual and its derivative blocks from named
//! inputs split over the reserved sub-axes `forces`, `old_forces`,
//! `old_state` and `state`. [`ModelSystem`] views such a model as the
//! nonlinear system `b(u, g) = 0` in its unknowns `u` and given variables
//! `g`, and [`RecursiveAdapter`] exposes that system to an external
//! recursive nonlinear-equation solver working purely on flat state and
//! forces vectors with a leading time-history axis.

mod adapter;
mod error;
mod model;
mod system;

pub mod reserved;

pub use adapter::RecursiveAdapter;
pub use error::SystemError;
pub use model::{DerivMap, Model, ValueMap};
pub use system::{Blocks, ModelSystem};

pub mod prelude {
    //! A prelude re-exporting the commonly used items.

    pub use crate::reserved::{FORCES, OLD_FORCES, OLD_STATE, RESIDUAL, STATE};
    pub use crate::{DerivMap, Model, ModelSystem, RecursiveAdapter, SystemError, ValueMap};
}
