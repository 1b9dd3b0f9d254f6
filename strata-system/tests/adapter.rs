use anyhow::Error;
use approx::assert_relative_eq;
use strata_axis::{Axis, VariableName};
use strata_core::prelude::*;
use strata_system::prelude::*;
use strata_system::SystemError;

const EPS: f64 = 1e-12;

fn fetch<'a>(inputs: &'a ValueMap<f64>, path: &str) -> &'a Tensor<f64> {
    inputs
        .get(&VariableName::from(path))
        .unwrap_or_else(|| panic!("missing input `{path}`"))
}

/// Linear kinematic update of a flattened symmetric stress: the new stress
/// follows the strain increment scaled by a trainable rate.
///
/// Residual (as the model's internal `b`):
/// `b = S - S_old - R * (E - E_old)`.
struct LinearKinematics {
    input: Axis,
    output: Axis,
    rate: Tensor<f64>,
}

impl LinearKinematics {
    fn new(rate: f64) -> Self {
        let mut input = Axis::new();
        input.add_variable("forces/E", &[6]).unwrap();
        input.add_variable("forces/t", &[1]).unwrap();
        input.add_variable("old_forces/E", &[6]).unwrap();
        input.add_variable("old_forces/t", &[1]).unwrap();
        input.add_variable("old_state/S", &[6]).unwrap();
        input.add_variable("state/S", &[6]).unwrap();

        let mut output = Axis::new();
        output.add_variable("residual/S", &[6]).unwrap();

        Self {
            input,
            output,
            rate: Tensor::full(&[], 0, 0, rate).unwrap(),
        }
    }
}

impl Model<f64> for LinearKinematics {
    fn input_axis(&self) -> &Axis {
        &self.input
    }

    fn output_axis(&self) -> &Axis {
        &self.output
    }

    fn value(&self, inputs: &ValueMap<f64>) -> Result<ValueMap<f64>, SystemError> {
        let ds = (fetch(inputs, "state/S") - fetch(inputs, "old_state/S"))?;
        let de = (fetch(inputs, "forces/E") - fetch(inputs, "old_forces/E"))?;
        let b = (&ds - &(&self.rate * &de)?)?;

        let mut outputs = ValueMap::new();
        outputs.insert(VariableName::from("residual/S"), b);
        Ok(outputs)
    }

    fn value_and_derivatives(
        &self,
        inputs: &ValueMap<f64>,
    ) -> Result<(ValueMap<f64>, DerivMap<f64>), SystemError> {
        let outputs = self.value(inputs)?;

        let eye = Tensor::eye(6)?;
        let row = VariableName::from("residual/S");
        let mut derivs = DerivMap::new();
        derivs.insert((row.clone(), VariableName::from("state/S")), eye.clone());
        derivs.insert((row.clone(), VariableName::from("old_state/S")), -&eye);
        derivs.insert(
            (row.clone(), VariableName::from("forces/E")),
            -&(&eye * &self.rate)?,
        );
        derivs.insert(
            (row, VariableName::from("old_forces/E")),
            (&eye * &self.rate)?,
        );
        // the residual does not depend on time; those blocks stay zero
        Ok((outputs, derivs))
    }

    fn parameter_names(&self) -> Vec<String> {
        vec!["rate".to_string()]
    }

    fn parameter(&self, name: &str) -> Option<Tensor<f64>> {
        (name == "rate").then(|| self.rate.clone())
    }

    fn set_parameter(&mut self, name: &str, value: Tensor<f64>) -> Result<(), SystemError> {
        if name != "rate" {
            return Err(SystemError::Configuration(format!(
                "model has no parameter `{name}`"
            )));
        }
        self.rate = value;
        Ok(())
    }
}

/// State tensor with `steps` time steps over a `(5,)` batch: every stress
/// component at step `k` equals `k`.
fn staircase_state(steps: usize) -> Tensor<f64> {
    let data = (0..steps)
        .flat_map(|k| std::iter::repeat(k as f64).take(5 * 6))
        .collect();
    Tensor::from_vec(data, &[steps, 5, 6], 2, 0).unwrap()
}

/// Forces tensor matching [`staircase_state`]: the strain components at step
/// `k` equal `3k`, time equals `k`.
fn staircase_forces(steps: usize) -> Tensor<f64> {
    let mut data = Vec::new();
    for k in 0..steps {
        for _ in 0..5 {
            data.extend(std::iter::repeat(3.0 * k as f64).take(6));
            data.push(k as f64);
        }
    }
    Tensor::from_vec(data, &[steps, 5, 7], 2, 0).unwrap()
}

#[test]
fn forward_shapes_follow_the_batch() -> Result<(), Error> {
    let mut adapter = RecursiveAdapter::new(LinearKinematics::new(2.0))?;
    assert_eq!(adapter.nstate(), 6);
    assert_eq!(adapter.nforce(), 7);
    assert_eq!(adapter.lookback(), 1);

    let (r, jacobian) = adapter.forward(&staircase_state(3), &staircase_forces(3))?;
    assert_eq!(r.sizes(), &[2, 5, 6]);
    assert_eq!(jacobian.sizes(), &[2, 2, 5, 6, 6]);
    Ok(())
}

#[test]
fn forward_matches_the_hand_computed_update() -> Result<(), Error> {
    let mut adapter = RecursiveAdapter::new(LinearKinematics::new(2.0))?;
    let (r, jacobian) = adapter.forward(&staircase_state(3), &staircase_forces(3))?;

    // b = dS - R dE = 1 - 2 * 3 = -5, and r = -b
    for t in 0..2 {
        for batch in 0..5 {
            for i in 0..6 {
                assert_relative_eq!(r.get(&[t, batch, i])?, 5.0, epsilon = EPS);
                for j in 0..6 {
                    let expect = if i == j { 1.0 } else { 0.0 };
                    // leading axis stacks [J_old, J_current]
                    assert_relative_eq!(
                        jacobian.get(&[1, t, batch, i, j])?,
                        expect,
                        epsilon = EPS
                    );
                    assert_relative_eq!(
                        jacobian.get(&[0, t, batch, i, j])?,
                        -expect,
                        epsilon = EPS
                    );
                }
            }
        }
    }
    Ok(())
}

#[test]
fn jacobians_expand_to_the_residual_batch_without_copying() -> Result<(), Error> {
    let mut adapter = RecursiveAdapter::new(LinearKinematics::new(2.0))?;
    let (r, jacobian) = adapter.forward(&staircase_state(4), &staircase_forces(4))?;
    assert_eq!(r.sizes(), &[3, 5, 6]);
    assert_eq!(jacobian.sizes(), &[2, 3, 5, 6, 6]);
    Ok(())
}

#[test]
fn malformed_solver_calls_are_rejected() -> Result<(), Error> {
    let mut adapter = RecursiveAdapter::new(LinearKinematics::new(2.0))?;

    // base size mismatch
    let bad_state = Tensor::<f64>::zeros(&[3, 5, 7], 2, 0)?;
    assert!(matches!(
        adapter.forward(&bad_state, &staircase_forces(3)),
        Err(SystemError::Axis(_))
    ));

    // batch shapes must agree
    let offbatch = Tensor::<f64>::zeros(&[3, 4, 7], 2, 0)?;
    assert!(matches!(
        adapter.forward(&staircase_state(3), &offbatch),
        Err(SystemError::Assembly(_))
    ));

    // the time axis must carry lookback + 1 steps
    assert!(matches!(
        adapter.forward(&staircase_state(1), &staircase_forces(1)),
        Err(SystemError::Assembly(_))
    ));
    Ok(())
}

#[test]
fn lookback_other_than_one_is_unsupported() -> Result<(), Error> {
    let mut adapter = RecursiveAdapter::new(LinearKinematics::new(2.0))?;
    adapter.set_lookback(1)?;
    assert!(matches!(
        adapter.set_lookback(2),
        Err(SystemError::UnsupportedLookback(2))
    ));
    Ok(())
}

#[test]
fn parameters_mirror_into_the_model() -> Result<(), Error> {
    let mut adapter = RecursiveAdapter::new(LinearKinematics::new(2.0))?;
    assert_eq!(adapter.parameter_names().collect::<Vec<_>>(), vec!["rate"]);

    // r = 3 R - 1 on the staircase inputs
    adapter.set_parameter_value("rate", Tensor::full(&[], 0, 0, 4.0)?)?;
    let (r, _) = adapter.forward(&staircase_state(3), &staircase_forces(3))?;
    assert_relative_eq!(r.get(&[0, 0, 0])?, 11.0, epsilon = EPS);

    assert!(matches!(
        adapter.set_parameter_value("nope", Tensor::full(&[], 0, 0, 0.0)?),
        Err(SystemError::Configuration(_))
    ));
    Ok(())
}

#[test]
fn batched_parameters_gain_dynamic_dims_only() -> Result<(), Error> {
    let mut adapter = RecursiveAdapter::new(LinearKinematics::new(2.0))?;

    // one rate per batch column; rank 1 against an intrinsic rank of 0
    let rates = Tensor::from_vec(vec![0.0, 1.0, 2.0, 3.0, 4.0], &[5], 0, 0)?;
    adapter.set_parameter_value("rate", rates)?;

    let (r, jacobian) = adapter.forward(&staircase_state(3), &staircase_forces(3))?;
    assert_eq!(r.sizes(), &[2, 5, 6]);
    for batch in 0..5 {
        assert_relative_eq!(r.get(&[1, batch, 0])?, 3.0 * batch as f64 - 1.0, epsilon = EPS);
        // the old-state block is rate independent
        assert_relative_eq!(jacobian.get(&[0, 1, batch, 2, 2])?, -1.0, epsilon = EPS);
    }

    // the mirrored value kept its rank inside the model
    let inner = adapter.system().model().parameter("rate").unwrap();
    assert_eq!(inner.dynamic_shape(), &[5]);
    assert_eq!(inner.base_dim(), 0);
    Ok(())
}

#[test]
fn excluded_parameters_are_not_mirrored() -> Result<(), Error> {
    let adapter = RecursiveAdapter::with_excluded(LinearKinematics::new(2.0), &["rate"])?;
    assert_eq!(adapter.parameter_names().count(), 0);
    assert!(adapter.parameter_value("rate").is_none());
    Ok(())
}

/// A model whose axes are declared directly, for construction checks. Its
/// evaluation methods are never reached.
struct ShapeOnly {
    input: Axis,
    output: Axis,
}

impl Model<f64> for ShapeOnly {
    fn input_axis(&self) -> &Axis {
        &self.input
    }

    fn output_axis(&self) -> &Axis {
        &self.output
    }

    fn value(&self, _inputs: &ValueMap<f64>) -> Result<ValueMap<f64>, SystemError> {
        unimplemented!()
    }

    fn value_and_derivatives(
        &self,
        _inputs: &ValueMap<f64>,
    ) -> Result<(ValueMap<f64>, DerivMap<f64>), SystemError> {
        unimplemented!()
    }
}

fn well_formed_axes() -> (Axis, Axis) {
    let mut input = Axis::new();
    input.add_variable("forces/f", &[1]).unwrap();
    input.add_subaxis("old_forces", Axis::new()).unwrap();
    input.add_variable("old_state/y", &[1]).unwrap();
    input.add_variable("state/x", &[1]).unwrap();
    input.add_variable("state/y", &[1]).unwrap();

    let mut output = Axis::new();
    output.add_variable("residual/x", &[1]).unwrap();
    output.add_variable("residual/y", &[1]).unwrap();
    (input, output)
}

#[test]
fn extra_output_subaxes_fail_construction() {
    let (input, mut output) = well_formed_axes();
    output.add_variable("extra/z", &[1]).unwrap();
    match RecursiveAdapter::new(ShapeOnly { input, output }).err() {
        Some(SystemError::Configuration(message)) => {
            assert!(message.contains("output sub-axes"), "got: {message}")
        }
        other => panic!("expected a configuration failure, got {other:?}"),
    }
}

#[test]
fn input_subaxes_must_come_in_canonical_order() {
    let mut input = Axis::new();
    input.add_variable("state/x", &[1]).unwrap();
    input.add_variable("forces/f", &[1]).unwrap();
    input.add_subaxis("old_forces", Axis::new()).unwrap();
    input.add_variable("old_state/x", &[1]).unwrap();
    let mut output = Axis::new();
    output.add_variable("residual/x", &[1]).unwrap();

    assert!(matches!(
        RecursiveAdapter::new(ShapeOnly { input, output }),
        Err(SystemError::Configuration(_))
    ));
}

#[test]
fn state_and_residual_variables_must_match() {
    let (input, _) = well_formed_axes();
    let mut output = Axis::new();
    output.add_variable("residual/x", &[1]).unwrap();
    output.add_variable("residual/z", &[1]).unwrap();

    assert!(matches!(
        RecursiveAdapter::new(ShapeOnly { input, output }),
        Err(SystemError::Configuration(_))
    ));
}

#[test]
fn old_variables_must_be_subsets() {
    let (_, output) = well_formed_axes();
    let mut input = Axis::new();
    input.add_variable("forces/f", &[1]).unwrap();
    input.add_subaxis("old_forces", Axis::new()).unwrap();
    input.add_variable("old_state/q", &[1]).unwrap();
    input.add_variable("state/x", &[1]).unwrap();
    input.add_variable("state/y", &[1]).unwrap();

    assert!(matches!(
        RecursiveAdapter::new(ShapeOnly { input, output }),
        Err(SystemError::Configuration(_))
    ));

    let (mut input, output) = well_formed_axes();
    // old_forces/g is not a force
    input.add_variable("old_forces/g", &[1]).unwrap();
    assert!(matches!(
        RecursiveAdapter::new(ShapeOnly { input, output }),
        Err(SystemError::Configuration(_))
    ));
}

/// Mixed history: `x` has no old counterpart, `y` does; the forces carry no
/// history at all.
///
/// `b_x = x - f`, `b_y = y - y_old - f`.
struct PartialHistory {
    input: Axis,
    output: Axis,
}

impl PartialHistory {
    fn new() -> Self {
        let (input, output) = well_formed_axes();
        Self { input, output }
    }
}

impl Model<f64> for PartialHistory {
    fn input_axis(&self) -> &Axis {
        &self.input
    }

    fn output_axis(&self) -> &Axis {
        &self.output
    }

    fn value(&self, inputs: &ValueMap<f64>) -> Result<ValueMap<f64>, SystemError> {
        let x = fetch(inputs, "state/x");
        let y = fetch(inputs, "state/y");
        let y_old = fetch(inputs, "old_state/y");
        let f = fetch(inputs, "forces/f");

        let mut outputs = ValueMap::new();
        outputs.insert(VariableName::from("residual/x"), (x - f)?);
        outputs.insert(VariableName::from("residual/y"), (&(y - y_old)? - f)?);
        Ok(outputs)
    }

    fn value_and_derivatives(
        &self,
        inputs: &ValueMap<f64>,
    ) -> Result<(ValueMap<f64>, DerivMap<f64>), SystemError> {
        let outputs = self.value(inputs)?;
        let one = Tensor::ones(&[1, 1], 0, 0)?;

        let mut derivs = DerivMap::new();
        derivs.insert(
            (VariableName::from("residual/x"), VariableName::from("state/x")),
            one.clone(),
        );
        derivs.insert(
            (VariableName::from("residual/x"), VariableName::from("forces/f")),
            -&one,
        );
        derivs.insert(
            (VariableName::from("residual/y"), VariableName::from("state/y")),
            one.clone(),
        );
        derivs.insert(
            (
                VariableName::from("residual/y"),
                VariableName::from("old_state/y"),
            ),
            -&one,
        );
        derivs.insert(
            (VariableName::from("residual/y"), VariableName::from("forces/f")),
            -&one,
        );
        Ok((outputs, derivs))
    }
}

#[test]
fn unmapped_slots_route_around_missing_history() -> Result<(), Error> {
    let mut adapter = RecursiveAdapter::new(PartialHistory::new())?;
    assert_eq!(adapter.nstate(), 2);
    assert_eq!(adapter.nforce(), 1);

    // time steps: state (x, y) goes (1, 2) -> (4, 6); f goes 10 -> 20
    let state = Tensor::from_vec(vec![1.0, 2.0, 4.0, 6.0], &[2, 2], 1, 0)?;
    let forces = Tensor::from_vec(vec![10.0, 20.0], &[2, 1], 1, 0)?;
    let (r, jacobian) = adapter.forward(&state, &forces)?;

    assert_eq!(r.sizes(), &[1, 2]);
    // b_x = 4 - 20, b_y = (6 - 2) - 20
    assert_relative_eq!(r.get(&[0, 0])?, 16.0, epsilon = EPS);
    assert_relative_eq!(r.get(&[0, 1])?, 16.0, epsilon = EPS);

    assert_eq!(jacobian.sizes(), &[2, 1, 2, 2]);
    // current Jacobian is the identity
    assert_relative_eq!(jacobian.get(&[1, 0, 0, 0])?, 1.0, epsilon = EPS);
    assert_relative_eq!(jacobian.get(&[1, 0, 1, 1])?, 1.0, epsilon = EPS);
    assert_relative_eq!(jacobian.get(&[1, 0, 0, 1])?, 0.0, epsilon = EPS);
    // only y carries history into the old Jacobian
    assert_relative_eq!(jacobian.get(&[0, 0, 0, 0])?, 0.0, epsilon = EPS);
    assert_relative_eq!(jacobian.get(&[0, 0, 1, 1])?, -1.0, epsilon = EPS);
    Ok(())
}

#[test]
fn system_refuses_evaluation_before_values_are_set() {
    let system = ModelSystem::new(LinearKinematics::new(2.0)).unwrap();
    assert!(matches!(
        system.residual(),
        Err(SystemError::InternalConsistency(_))
    ));
}

#[test]
fn system_residual_matches_the_model() -> Result<(), Error> {
    let mut system = ModelSystem::new(LinearKinematics::new(2.0))?;
    assert_eq!(system.u_layout().total_size(), 6);
    assert_eq!(system.g_layout().len(), 5);

    system.set_u(vec![Tensor::full(&[6], 0, 0, 3.0)?])?;
    system.set_g(vec![
        Tensor::full(&[6], 0, 0, 1.0)?, // old_state/S
        Tensor::full(&[6], 0, 0, 5.0)?, // forces/E
        Tensor::full(&[1], 0, 0, 1.0)?, // forces/t
        Tensor::full(&[6], 0, 0, 4.0)?, // old_forces/E
        Tensor::full(&[1], 0, 0, 0.0)?, // old_forces/t
    ])?;

    // b = (3 - 1) - 2 * (5 - 4) = 0
    let b = system.residual()?;
    assert_eq!(b.len(), 1);
    for i in 0..6 {
        assert_relative_eq!(b[0].get(&[i])?, 0.0, epsilon = EPS);
    }
    Ok(())
}

#[test]
fn slash_in_parameter_names_fails_setup() {
    struct BadParam(LinearKinematics);

    impl Model<f64> for BadParam {
        fn input_axis(&self) -> &Axis {
            self.0.input_axis()
        }
        fn output_axis(&self) -> &Axis {
            self.0.output_axis()
        }
        fn value(&self, inputs: &ValueMap<f64>) -> Result<ValueMap<f64>, SystemError> {
            self.0.value(inputs)
        }
        fn value_and_derivatives(
            &self,
            inputs: &ValueMap<f64>,
        ) -> Result<(ValueMap<f64>, DerivMap<f64>), SystemError> {
            self.0.value_and_derivatives(inputs)
        }
        fn parameter_names(&self) -> Vec<String> {
            vec!["nested/rate".to_string()]
        }
        fn parameter(&self, _name: &str) -> Option<Tensor<f64>> {
            Some(self.0.rate.clone())
        }
    }

    match RecursiveAdapter::new(BadParam(LinearKinematics::new(2.0))).err() {
        Some(SystemError::Configuration(message)) => {
            assert!(message.contains("path separator"), "got: {message}")
        }
        other => panic!("expected a configuration failure, got {other:?}"),
    }
}
