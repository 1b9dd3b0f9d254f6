//! The model evaluation interface.

use std::collections::BTreeMap;

use strata_axis::{Axis, VariableName};
use strata_core::{Element, Tensor};

use crate::error::SystemError;

/// Named values flowing in and out of a model, keyed by full variable path.
pub type ValueMap<E> = BTreeMap<VariableName, Tensor<E>>;

/// Derivative blocks keyed by `(output path, input path)`.
///
/// A block's base shape is the output variable's base shape followed by the
/// input variable's base shape. Pairs with no entry are identically zero.
pub type DerivMap<E> = BTreeMap<(VariableName, VariableName), Tensor<E>>;

/// A structured model evaluating named outputs from named inputs.
///
/// The axes declare which variables the model consumes and produces; the
/// evaluation methods operate purely on named tensors and are free to batch
/// over any dynamic or intermediate shape. Parameters are optional: models
/// without trainable values keep the default empty surface.
pub trait Model<E: Element> {
    /// The tree of input variables.
    fn input_axis(&self) -> &Axis;

    /// The tree of output variables.
    fn output_axis(&self) -> &Axis;

    /// Evaluate the output values.
    fn value(&self, inputs: &ValueMap<E>) -> Result<ValueMap<E>, SystemError>;

    /// Evaluate the output values together with their derivative blocks.
    fn value_and_derivatives(
        &self,
        inputs: &ValueMap<E>,
    ) -> Result<(ValueMap<E>, DerivMap<E>), SystemError>;

    /// Names of the model's trainable parameters.
    fn parameter_names(&self) -> Vec<String> {
        Vec::new()
    }

    /// Current value of a parameter.
    fn parameter(&self, _name: &str) -> Option<Tensor<E>> {
        None
    }

    /// Overwrite a parameter value.
    fn set_parameter(&mut self, name: &str, _value: Tensor<E>) -> Result<(), SystemError> {
        Err(SystemError::Configuration(format!(
            "model has no parameter `{name}`"
        )))
    }
}
