//! The structured nonlinear system defined by a model.

use std::collections::BTreeSet;

use strata_axis::{Layout, VariableName};
use strata_core::{Element, Tensor};

use crate::error::SystemError;
use crate::model::{Model, ValueMap};
use crate::reserved::{FORCES, OLD_FORCES, OLD_STATE, RESIDUAL, STATE};

/// Jacobian blocks keyed by `(row slot, column slot)`.
pub type Blocks<E> = Vec<((usize, usize), Tensor<E>)>;

/// A model viewed as the nonlinear system `b(u, g) = 0`.
///
/// The unknowns `u` are the model's `state` variables; the given variables
/// `g` collect everything else the residual depends on: the old state, the
/// driving forces and the old forces. The system holds the current values of
/// both groups and evaluates the residual `b` and its Jacobian blocks
/// `A = ∂b/∂u` and `B = ∂b/∂g` on demand.
///
/// Construction validates the wrapped model once, fail-fast:
///
/// 1. the input sub-axes are exactly `[forces, old_forces, old_state, state]`;
/// 2. the output sub-axis is exactly `[residual]`;
/// 3. `state` and `residual` declare the same variable names;
/// 4. `old_state` variables are a subset of `state` variables;
/// 5. `old_forces` variables are a subset of `forces` variables.
pub struct ModelSystem<E: Element, M: Model<E>> {
    model: M,
    u_layout: Layout,
    forces_layout: Layout,
    old_state_layout: Layout,
    old_forces_layout: Layout,
    g_layout: Layout,
    u: Option<Vec<Tensor<E>>>,
    g: Option<Vec<Tensor<E>>>,
}

impl<E: Element, M: Model<E>> ModelSystem<E, M> {
    /// Wrap a model, validating its axes.
    pub fn new(model: M) -> Result<Self, SystemError> {
        let input = model.input_axis();
        let output = model.output_axis();

        let expected_input = [FORCES, OLD_FORCES, OLD_STATE, STATE];
        if input.subaxis_names() != expected_input || input.has_direct_variables() {
            return Err(SystemError::Configuration(format!(
                "wrapped model must have {:?} as (the only) input sub-axes, got {:?}",
                expected_input,
                input.subaxis_names()
            )));
        }
        let expected_output = [RESIDUAL];
        if output.subaxis_names() != expected_output || output.has_direct_variables() {
            return Err(SystemError::Configuration(format!(
                "wrapped model must have {:?} as (the only) output sub-axes, got {:?}",
                expected_output,
                output.subaxis_names()
            )));
        }

        let state_vars = input.expect_subaxis(STATE)?.variable_names();
        let residual_vars = output.expect_subaxis(RESIDUAL)?.variable_names();
        let state_set: BTreeSet<&VariableName> = state_vars.iter().collect();
        let residual_set: BTreeSet<&VariableName> = residual_vars.iter().collect();
        if state_set != residual_set {
            return Err(SystemError::Configuration(format!(
                "state variables {state_vars:?} must match residual variables {residual_vars:?}"
            )));
        }

        let old_state_vars = input.expect_subaxis(OLD_STATE)?.variable_names();
        if !old_state_vars.iter().all(|v| state_set.contains(v)) {
            return Err(SystemError::Configuration(format!(
                "old state variables {old_state_vars:?} must be a subset of state variables {state_vars:?}"
            )));
        }
        let forces_vars = input.expect_subaxis(FORCES)?.variable_names();
        let forces_set: BTreeSet<&VariableName> = forces_vars.iter().collect();
        let old_forces_vars = input.expect_subaxis(OLD_FORCES)?.variable_names();
        if !old_forces_vars.iter().all(|v| forces_set.contains(v)) {
            return Err(SystemError::Configuration(format!(
                "old forces {old_forces_vars:?} must be a subset of forces {forces_vars:?}"
            )));
        }

        let u_layout = input.expect_subaxis(STATE)?.layout().clone();
        let forces_layout = input.expect_subaxis(FORCES)?.layout().clone();
        let old_state_layout = input.expect_subaxis(OLD_STATE)?.layout().clone();
        let old_forces_layout = input.expect_subaxis(OLD_FORCES)?.layout().clone();

        check_old_shapes(&old_state_layout, &u_layout, OLD_STATE, STATE)?;
        check_old_shapes(&old_forces_layout, &forces_layout, OLD_FORCES, FORCES)?;

        // the given variables, in (old_state, forces, old_forces) order,
        // keyed by their full input paths
        let g_layout = Layout::from_parts(
            prefixed(&old_state_layout, OLD_STATE)
                .chain(prefixed(&forces_layout, FORCES))
                .chain(prefixed(&old_forces_layout, OLD_FORCES)),
        )?;

        Ok(Self {
            model,
            u_layout,
            forces_layout,
            old_state_layout,
            old_forces_layout,
            g_layout,
            u: None,
            g: None,
        })
    }

    /// The wrapped model.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// The wrapped model, mutably.
    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    /// Layout of the unknowns, relative to the `state` sub-axis.
    pub fn u_layout(&self) -> &Layout {
        &self.u_layout
    }

    /// Layout of the driving forces, relative to the `forces` sub-axis.
    pub fn forces_layout(&self) -> &Layout {
        &self.forces_layout
    }

    /// Layout of the old state, relative to the `old_state` sub-axis.
    pub fn old_state_layout(&self) -> &Layout {
        &self.old_state_layout
    }

    /// Layout of the old forces, relative to the `old_forces` sub-axis.
    pub fn old_forces_layout(&self) -> &Layout {
        &self.old_forces_layout
    }

    /// Layout of the given variables, keyed by full input paths.
    pub fn g_layout(&self) -> &Layout {
        &self.g_layout
    }

    /// Set the unknowns, one value per `u` slot.
    pub fn set_u(&mut self, u: Vec<Tensor<E>>) -> Result<(), SystemError> {
        check_values(&u, &self.u_layout)?;
        self.u = Some(u);
        Ok(())
    }

    /// Set the given variables, one value per `g` slot.
    pub fn set_g(&mut self, g: Vec<Tensor<E>>) -> Result<(), SystemError> {
        check_values(&g, &self.g_layout)?;
        self.g = Some(g);
        Ok(())
    }

    /// The current unknowns, if set.
    pub fn u(&self) -> Option<&[Tensor<E>]> {
        self.u.as_deref()
    }

    /// The current given variables, if set.
    pub fn g(&self) -> Option<&[Tensor<E>]> {
        self.g.as_deref()
    }

    /// Evaluate the residual `b`, one block per `u` slot.
    pub fn residual(&self) -> Result<Vec<Tensor<E>>, SystemError> {
        let outputs = self.model.value(&self.inputs()?)?;
        self.collect_residual(&outputs)
    }

    /// Evaluate `b` together with the Jacobian blocks `A = ∂b/∂u` and
    /// `B = ∂b/∂g`, keyed by `(u slot, u slot)` and `(u slot, g slot)`.
    ///
    /// Blocks the model does not provide are zero.
    pub fn residual_and_jacobians(
        &self,
    ) -> Result<(Vec<Tensor<E>>, Blocks<E>, Blocks<E>), SystemError> {
        let (outputs, derivs) = self.model.value_and_derivatives(&self.inputs()?)?;
        let b = self.collect_residual(&outputs)?;

        let residual = VariableName::from(RESIDUAL);
        let state = VariableName::from(STATE);
        let mut a_blocks = Blocks::new();
        let mut b_blocks = Blocks::new();
        for ((out_name, in_name), block) in derivs {
            let row = out_name
                .start_with(&residual)
                .then(|| self.u_layout.slot_of(&out_name.peel(1)))
                .flatten()
                .ok_or_else(|| {
                    SystemError::InternalConsistency(format!(
                        "derivative row `{out_name}` is not a declared residual"
                    ))
                })?;
            if in_name.start_with(&state) {
                let col = self.u_layout.slot_of(&in_name.peel(1)).ok_or_else(|| {
                    SystemError::InternalConsistency(format!(
                        "derivative column `{in_name}` is not a declared unknown"
                    ))
                })?;
                a_blocks.push(((row, col), block));
            } else {
                let col = self.g_layout.slot_of(&in_name).ok_or_else(|| {
                    SystemError::InternalConsistency(format!(
                        "derivative column `{in_name}` is not a declared given variable"
                    ))
                })?;
                b_blocks.push(((row, col), block));
            }
        }
        Ok((b, a_blocks, b_blocks))
    }

    /// Assemble the model input map from the current `u` and `g`.
    fn inputs(&self) -> Result<ValueMap<E>, SystemError> {
        let u = self.u.as_ref().ok_or_else(|| {
            SystemError::InternalConsistency("unknowns queried before set_u".to_string())
        })?;
        let g = self.g.as_ref().ok_or_else(|| {
            SystemError::InternalConsistency("given variables queried before set_g".to_string())
        })?;

        let state = VariableName::from(STATE);
        let mut inputs = ValueMap::new();
        for (entry, value) in self.u_layout.entries().iter().zip(u) {
            inputs.insert(entry.name.prepend(&state), value.clone());
        }
        for (entry, value) in self.g_layout.entries().iter().zip(g) {
            inputs.insert(entry.name.clone(), value.clone());
        }
        Ok(inputs)
    }

    fn collect_residual(&self, outputs: &ValueMap<E>) -> Result<Vec<Tensor<E>>, SystemError> {
        let residual = VariableName::from(RESIDUAL);
        self.u_layout
            .names()
            .map(|name| {
                let path = name.prepend(&residual);
                outputs.get(&path).cloned().ok_or_else(|| {
                    SystemError::InternalConsistency(format!(
                        "model did not produce declared residual `{path}`"
                    ))
                })
            })
            .collect()
    }
}

/// Full paths of a sub-axis layout, for building the `g` layout.
fn prefixed<'a>(
    layout: &'a Layout,
    subaxis: &'a str,
) -> impl Iterator<Item = (VariableName, Vec<usize>)> + 'a {
    layout.entries().iter().map(move |entry| {
        (
            entry.name.prepend(&VariableName::from(subaxis)),
            entry.base_shape.clone(),
        )
    })
}

/// Old variables must declare the same base shapes as their current
/// counterparts, or the flat history vector cannot be re-used for both.
fn check_old_shapes(
    old: &Layout,
    current: &Layout,
    old_axis: &str,
    current_axis: &str,
) -> Result<(), SystemError> {
    for entry in old.entries() {
        let counterpart = current
            .slot_of(&entry.name)
            .and_then(|slot| current.get(slot));
        if let Some(counterpart) = counterpart {
            if counterpart.base_shape != entry.base_shape {
                return Err(SystemError::Configuration(format!(
                    "variable `{}` declares base shape {:?} on `{old_axis}` but {:?} on `{current_axis}`",
                    entry.name, entry.base_shape, counterpart.base_shape
                )));
            }
        }
    }
    Ok(())
}

fn check_values<E: Element>(values: &[Tensor<E>], layout: &Layout) -> Result<(), SystemError> {
    if values.len() != layout.len() {
        return Err(strata_axis::AxisError::ValueCount {
            expected: layout.len(),
            got: values.len(),
        }
        .into());
    }
    for (value, entry) in values.iter().zip(layout.entries()) {
        if value.base_numel() != entry.size {
            return Err(strata_axis::AxisError::SizeMismatch {
                name: entry.name.clone(),
                declared: value.base_numel(),
                expected: entry.size,
            }
            .into());
        }
    }
    Ok(())
}
