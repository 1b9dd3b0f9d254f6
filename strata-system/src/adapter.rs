//! The recursive-solver adapter.

use std::collections::BTreeMap;

use strata_axis::assembly::{assemble, assemble_matrix, disassemble};
use strata_axis::AxisError;
use strata_core::{ix, Element, Ellipsis, Slice, Tensor};

use crate::error::SystemError;
use crate::model::Model;
use crate::system::{Blocks, ModelSystem};

/// Adapts a structured model to a recursive nonlinear-equation solver.
///
/// The solver side sees two flat vectors per call: `state` and `forces`,
/// each carrying an explicit leading time-history axis of `lookback + 1`
/// steps (lookback is fixed at 1). [`RecursiveAdapter::forward`] splits off
/// the previous and current steps, scatters them into the wrapped system's
/// unknowns and given variables, and assembles the flat residual and the
/// stacked `[J_old, J_current]` Jacobian the solver expects.
///
/// Index maps routing disassembled values into `g` slots are built once at
/// construction; a slot entry of `None` marks a variable with no old
/// counterpart. The union of mapped slots must cover `[0, |g|)` exactly,
/// which is asserted defensively.
///
/// Model parameters are mirrored into an explicit name → value registry so
/// an external optimizer can read and update them; cached values are written
/// back into the model before every `forward`.
pub struct RecursiveAdapter<E: Element, M: Model<E>> {
    system: ModelSystem<E, M>,
    lookback: usize,
    old_state_to_g: Vec<Option<usize>>,
    forces_to_g: Vec<Option<usize>>,
    old_forces_to_g: Vec<Option<usize>>,
    g_to_old_state: Vec<Option<usize>>,
    parameters: BTreeMap<String, Tensor<E>>,
}

impl<E: Element, M: Model<E>> RecursiveAdapter<E, M> {
    /// Wrap a model, mirroring every parameter.
    pub fn new(model: M) -> Result<Self, SystemError> {
        Self::with_excluded(model, &[])
    }

    /// Wrap a model, leaving the named parameters out of the mirror.
    pub fn with_excluded(model: M, exclude_parameters: &[&str]) -> Result<Self, SystemError> {
        let system = ModelSystem::new(model)?;

        let n_old = system.old_state_layout().len();
        let n_forces = system.forces_layout().len();
        let ng = system.g_layout().len();

        let old_state_to_g: Vec<Option<usize>> = system
            .u_layout()
            .names()
            .map(|name| system.old_state_layout().slot_of(name))
            .collect();
        let forces_to_g: Vec<Option<usize>> = (0..n_forces).map(|j| Some(n_old + j)).collect();
        let old_forces_to_g: Vec<Option<usize>> = system
            .forces_layout()
            .names()
            .map(|name| {
                system
                    .old_forces_layout()
                    .slot_of(name)
                    .map(|p| n_old + n_forces + p)
            })
            .collect();

        let mut g_to_old_state = vec![None; ng];
        for (j, entry) in system.old_state_layout().entries().iter().enumerate() {
            let k = system.u_layout().slot_of(&entry.name).ok_or_else(|| {
                SystemError::InternalConsistency(format!(
                    "old state variable `{}` has no unknown slot",
                    entry.name
                ))
            })?;
            g_to_old_state[j] = Some(k);
        }

        // every g slot must be claimed by exactly one map entry
        let mut seen = vec![false; ng];
        for &j in old_state_to_g
            .iter()
            .chain(&forces_to_g)
            .chain(&old_forces_to_g)
            .flatten()
        {
            if seen[j] {
                return Err(SystemError::InternalConsistency(format!(
                    "given slot {j} is claimed twice"
                )));
            }
            seen[j] = true;
        }
        if let Some(j) = seen.iter().position(|claimed| !claimed) {
            return Err(SystemError::InternalConsistency(format!(
                "given slot {j} is never claimed"
            )));
        }

        let mut parameters = BTreeMap::new();
        for name in system.model().parameter_names() {
            if name.contains('/') {
                return Err(SystemError::Configuration(format!(
                    "parameter name `{name}` contains the path separator `/`, \
                     which the flat parameter namespace cannot represent"
                )));
            }
            if exclude_parameters.contains(&name.as_str()) {
                continue;
            }
            let value = system.model().parameter(&name).ok_or_else(|| {
                SystemError::InternalConsistency(format!(
                    "model lists parameter `{name}` but does not provide a value"
                ))
            })?;
            parameters.insert(name, value);
        }

        Ok(Self {
            system,
            lookback: 1,
            old_state_to_g,
            forces_to_g,
            old_forces_to_g,
            g_to_old_state,
            parameters,
        })
    }

    /// The wrapped system.
    pub fn system(&self) -> &ModelSystem<E, M> {
        &self.system
    }

    /// Flat size of the unknown state.
    pub fn nstate(&self) -> usize {
        self.system.u_layout().total_size()
    }

    /// Flat size of the driving forces.
    pub fn nforce(&self) -> usize {
        self.system.forces_layout().total_size()
    }

    /// Number of historical steps a call depends on. Always 1.
    pub fn lookback(&self) -> usize {
        self.lookback
    }

    /// Request a different lookback. Anything but 1 is unsupported.
    pub fn set_lookback(&mut self, lookback: usize) -> Result<(), SystemError> {
        if lookback != 1 {
            return Err(SystemError::UnsupportedLookback(lookback));
        }
        self.lookback = lookback;
        Ok(())
    }

    /// Names of the mirrored parameters.
    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.parameters.keys().map(String::as_str)
    }

    /// Cached value of a mirrored parameter.
    pub fn parameter_value(&self, name: &str) -> Option<&Tensor<E>> {
        self.parameters.get(name)
    }

    /// Update a mirrored parameter; the model sees the new value on the
    /// next [`RecursiveAdapter::forward`].
    pub fn set_parameter_value(&mut self, name: &str, value: Tensor<E>) -> Result<(), SystemError> {
        match self.parameters.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(SystemError::Configuration(format!(
                "no mirrored parameter named `{name}`"
            ))),
        }
    }

    /// Evaluate the flat residual and the stacked Jacobian pair.
    ///
    /// `state` and `forces` carry `lookback + 1` time steps on their leading
    /// dynamic axis and one flat base axis of size [`nstate`](Self::nstate)
    /// and [`nforce`](Self::nforce) respectively. The result is
    /// `(r, stack([J_old, J_current]))` where `r = -b` and both Jacobians
    /// have square `nstate x nstate` trailing base dims, broadcast (without
    /// copying) to `r`'s batch shape.
    pub fn forward(
        &mut self,
        state: &Tensor<E>,
        forces: &Tensor<E>,
    ) -> Result<(Tensor<E>, Tensor<E>), SystemError> {
        self.sync_parameters()?;

        if state.base_dim() != 1 || state.base_numel() != self.nstate() {
            return Err(AxisError::FlatMismatch {
                expected: self.nstate(),
                got: state.base_shape().to_vec(),
            }
            .into());
        }
        if forces.base_dim() != 1 || forces.base_numel() != self.nforce() {
            return Err(AxisError::FlatMismatch {
                expected: self.nforce(),
                got: forces.base_shape().to_vec(),
            }
            .into());
        }
        if state.batch_shape() != forces.batch_shape() {
            return Err(SystemError::Assembly(format!(
                "state batch shape {:?} and forces batch shape {:?} must match",
                state.batch_shape(),
                forces.batch_shape()
            )));
        }
        let steps = state.dynamic_shape().first().copied().unwrap_or(0);
        if steps < self.lookback + 1 {
            return Err(SystemError::Assembly(format!(
                "state and forces must carry a leading time axis of at least {} steps, got {steps}",
                self.lookback + 1
            )));
        }

        let lb = self.lookback as isize;
        let current = |t: &Tensor<E>| t.dynamic().index(ix![Slice::new(Some(lb), None, 1), Ellipsis]);
        let previous =
            |t: &Tensor<E>| t.dynamic().index(ix![Slice::new(None, Some(-lb), 1), Ellipsis]);

        // unknowns from the current state slice
        let u = disassemble(&current(state)?, self.system.u_layout())?;
        self.system.set_u(u)?;

        // given variables scattered from the previous state and both force
        // slices, one value per g slot
        let mut g: Vec<Option<Tensor<E>>> = vec![None; self.system.g_layout().len()];
        scatter(
            &mut g,
            disassemble(&previous(state)?, self.system.u_layout())?,
            &self.old_state_to_g,
        )?;
        scatter(
            &mut g,
            disassemble(&current(forces)?, self.system.forces_layout())?,
            &self.forces_to_g,
        )?;
        scatter(
            &mut g,
            disassemble(&previous(forces)?, self.system.forces_layout())?,
            &self.old_forces_to_g,
        )?;
        let g: Vec<Tensor<E>> = g
            .into_iter()
            .enumerate()
            .map(|(j, value)| {
                value.ok_or_else(|| {
                    SystemError::InternalConsistency(format!("given slot {j} was never filled"))
                })
            })
            .collect::<Result<_, _>>()?;
        self.system.set_g(g)?;

        let (b, a_blocks, b_blocks) = self.system.residual_and_jacobians()?;

        // sign convention: the model's b is the negative residual
        let r = -&assemble(&b, self.system.u_layout())?;

        let j = assemble_matrix(&a_blocks, self.system.u_layout(), self.system.u_layout())?;

        // re-route ∂b/∂g columns that correspond to old state slots; forces
        // and old forces columns contribute nothing to the old Jacobian
        let jn_blocks: Blocks<E> = b_blocks
            .into_iter()
            .filter_map(|((row, col), block)| {
                self.g_to_old_state[col].map(|k| ((row, k), block))
            })
            .collect();
        let jn = assemble_matrix(&jn_blocks, self.system.u_layout(), self.system.u_layout())?;

        let j = j.batch().expand(r.batch_shape())?;
        let jn = jn.batch().expand(r.batch_shape())?;

        let n = self.nstate();
        if j.base_shape() != &[n, n][..] || jn.base_shape() != &[n, n][..] {
            return Err(SystemError::Assembly(format!(
                "Jacobians must be square over {n} unknowns, got {:?} and {:?}",
                jn.base_shape(),
                j.base_shape()
            )));
        }

        let jacobian = Tensor::stack(&[&jn, &j])?;
        Ok((r, jacobian))
    }

    /// Write the cached parameter values back into the model, inserting
    /// broadcast dims as needed. Dimensions are only ever added, never
    /// dropped.
    fn sync_parameters(&mut self) -> Result<(), SystemError> {
        for (name, value) in &self.parameters {
            let current = self.system.model().parameter(name).ok_or_else(|| {
                SystemError::InternalConsistency(format!(
                    "parameter `{name}` disappeared from the model"
                ))
            })?;
            let static_dim = current.intmd_dim() + current.base_dim();
            if value.dim() < static_dim {
                return Err(SystemError::Configuration(format!(
                    "parameter `{name}` update of rank {} cannot cover its intrinsic rank {static_dim}",
                    value.dim()
                )));
            }
            let update = value.reinterpret(value.dim() - static_dim, current.intmd_dim())?;
            self.system.model_mut().set_parameter(name, update)?;
        }
        Ok(())
    }
}

/// Move disassembled values into their mapped `g` slots; `None` map entries
/// are variables with no slot and are dropped.
fn scatter<E: Element>(
    g: &mut [Option<Tensor<E>>],
    values: Vec<Tensor<E>>,
    map: &[Option<usize>],
) -> Result<(), SystemError> {
    for (value, slot) in values.into_iter().zip(map) {
        if let Some(j) = slot {
            if g[*j].replace(value).is_some() {
                return Err(SystemError::InternalConsistency(format!(
                    "given slot {j} was filled twice"
                )));
            }
        }
    }
    Ok(())
}
