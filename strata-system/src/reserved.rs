//! Reserved sub-axis names of a wrappable model.

/// Driving forces at the current step.
pub const FORCES: &str = "forces";

/// Driving forces at the previous step.
pub const OLD_FORCES: &str = "old_forces";

/// State at the previous step.
pub const OLD_STATE: &str = "old_state";

/// Unknown state at the current step.
pub const STATE: &str = "state";

/// Residual of the implicit update, one component per unknown.
pub const RESIDUAL: &str = "residual";
