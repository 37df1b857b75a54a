pub mod centering;
pub mod dense;
pub mod dropout;

use std::{fmt, rc::Rc};

use thiserror::Error;

use crate::{
    config::NetworkConfig,
    graph::{Expr, GraphError, Placeholder, Shared, Tensor, Update},
};

pub use centering::Centering;
pub use dense::Dense;
pub use dropout::Dropout;

/// Zero-argument hook run once per training step, testing step or epoch.
pub type Callback = Rc<dyn Fn()>;

/// Named scalar diagnostic evaluated next to a network's output.
#[derive(Clone)]
pub struct Monitor {
    pub label: String,
    pub expr: Expr,
}

impl Monitor {
    pub fn new(label: impl Into<String>, expr: Expr) -> Self {
        Self {
            label: label.into(),
            expr,
        }
    }
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label, self.expr)
    }
}

#[derive(Debug, Error)]
pub enum LayerError {
    #[error("layer `{layer}` needs a positive {side} dimension")]
    ZeroDimension { layer: String, side: &'static str },
    #[error("layer `{layer}` got invalid {what} {value}")]
    Invalid {
        layer: String,
        what: &'static str,
        value: f32,
    },
    #[error("layer `{0}` is used before `connect`")]
    NotConnected(String),
    #[error("layer `{layer}` cannot read option `{key}`: {source}")]
    Option {
        layer: String,
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Bookkeeping shared by every layer: naming, dimensions and the parameter, update, monitor and
/// callback lists a network collects when the layer is stacked.
#[derive(Default)]
pub struct LayerBase {
    name: String,
    input_dim: usize,
    output_dim: usize,
    connected: bool,
    parameter_count: usize,
    parameters: Vec<Shared>,
    free_parameters: Vec<Shared>,
    updates: Vec<Update>,
    training_updates: Vec<Update>,
    training_monitors: Vec<Monitor>,
    testing_monitors: Vec<Monitor>,
    training_callbacks: Vec<Callback>,
    testing_callbacks: Vec<Callback>,
    epoch_callbacks: Vec<Callback>,
    external_inputs: Vec<Placeholder>,
}

impl LayerBase {
    pub fn new(name: impl Into<String>, output_dim: usize) -> Self {
        Self {
            name: name.into(),
            output_dim,
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    /// Record the input dimension and mark the layer as connected.
    pub fn connect(&mut self, input_dim: usize) -> Result<(), LayerError> {
        if input_dim == 0 {
            return Err(LayerError::ZeroDimension {
                layer: self.name.clone(),
                side: "input",
            });
        }
        self.input_dim = input_dim;
        self.connected = true;
        Ok(())
    }

    pub fn set_output_dim(&mut self, output_dim: usize) {
        self.output_dim = output_dim;
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn ensure_connected(&self) -> Result<(), LayerError> {
        if self.connected {
            Ok(())
        } else {
            Err(LayerError::NotConnected(self.name.clone()))
        }
    }

    /// Create a shared variable named `<prefix>_<layer name>`.
    pub fn create_shared(&self, prefix: &str, value: Tensor) -> Shared {
        Shared::new(format!("{}_{}", prefix, self.name), value)
    }

    /// Register trainable parameters. Their element counts add to `parameter_count`.
    pub fn register_parameters(&mut self, parameters: impl IntoIterator<Item = Shared>) {
        for parameter in parameters {
            self.parameter_count += parameter.size();
            self.parameters.push(parameter);
        }
    }

    /// Register parameters that are persisted but left alone by the optimizer.
    pub fn register_free_parameters(&mut self, parameters: impl IntoIterator<Item = Shared>) {
        self.free_parameters.extend(parameters);
    }

    pub fn register_updates(&mut self, updates: impl IntoIterator<Item = Update>) {
        self.updates.extend(updates);
    }

    pub fn register_training_updates(&mut self, updates: impl IntoIterator<Item = Update>) {
        self.training_updates.extend(updates);
    }

    pub fn register_training_monitors(&mut self, monitors: impl IntoIterator<Item = Monitor>) {
        self.training_monitors.extend(monitors);
    }

    pub fn register_testing_monitors(&mut self, monitors: impl IntoIterator<Item = Monitor>) {
        self.testing_monitors.extend(monitors);
    }

    pub fn register_training_callbacks(&mut self, callbacks: impl IntoIterator<Item = Callback>) {
        self.training_callbacks.extend(callbacks);
    }

    pub fn register_testing_callbacks(&mut self, callbacks: impl IntoIterator<Item = Callback>) {
        self.testing_callbacks.extend(callbacks);
    }

    pub fn register_epoch_callbacks(&mut self, callbacks: impl IntoIterator<Item = Callback>) {
        self.epoch_callbacks.extend(callbacks);
    }

    /// Register extra symbolic inputs the layer reads, e.g. targets of an auxiliary loss.
    pub fn register_external_inputs(&mut self, inputs: impl IntoIterator<Item = Placeholder>) {
        self.external_inputs.extend(inputs);
    }
}

/// Unit of computation a `Network` can stack.
///
/// A network drives every layer through the same sequence: `connect` with the incoming
/// dimension, `setup` to create parameters, then `output` and `test_output` on the expression
/// built so far. Only after that does it read the aggregate lists, so a layer may register
/// updates or monitors that depend on its input expression while building its output.
pub trait Layer {
    fn base(&self) -> &LayerBase;

    fn base_mut(&mut self) -> &mut LayerBase;

    /// Learn the incoming dimension. `previous` is the layer stacked right before this one, if
    /// any, and is only meant for inspection.
    fn connect(
        &mut self,
        input_dim: usize,
        previous: Option<&dyn Layer>,
        config: &NetworkConfig,
    ) -> Result<(), LayerError>;

    /// Create parameters now that the input dimension is known.
    fn setup(&mut self) -> Result<(), LayerError>;

    /// Training-mode transform of `input`.
    fn output(&mut self, input: &Expr) -> Result<Expr, LayerError>;

    /// Inference-mode transform of `input`.
    fn test_output(&mut self, input: &Expr) -> Result<Expr, LayerError> {
        self.output(input)
    }

    fn name(&self) -> &str {
        self.base().name()
    }

    fn set_name(&mut self, name: String) {
        self.base_mut().set_name(name);
    }

    fn output_dim(&self) -> usize {
        self.base().output_dim()
    }

    fn parameter_count(&self) -> usize {
        self.base().parameter_count
    }

    fn parameters(&self) -> &[Shared] {
        &self.base().parameters
    }

    fn free_parameters(&self) -> &[Shared] {
        &self.base().free_parameters
    }

    fn updates(&self) -> &[Update] {
        &self.base().updates
    }

    fn training_updates(&self) -> &[Update] {
        &self.base().training_updates
    }

    fn training_monitors(&self) -> &[Monitor] {
        &self.base().training_monitors
    }

    fn testing_monitors(&self) -> &[Monitor] {
        &self.base().testing_monitors
    }

    fn training_callbacks(&self) -> &[Callback] {
        &self.base().training_callbacks
    }

    fn testing_callbacks(&self) -> &[Callback] {
        &self.base().testing_callbacks
    }

    fn epoch_callbacks(&self) -> &[Callback] {
        &self.base().epoch_callbacks
    }

    fn external_inputs(&self) -> &[Placeholder] {
        &self.base().external_inputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use ndarray::{IxDyn, Zip};

    #[test]
    fn register_parameters_counts_elements() {
        let mut base = LayerBase::new("dense1", 3);
        let w = base.create_shared("W", Tensor::zeros(IxDyn(&[4, 3])));
        let b = base.create_shared("b", Tensor::zeros(IxDyn(&[3])));
        let mean = base.create_shared("mean", Tensor::zeros(IxDyn(&[3])));
        base.register_parameters(vec![w, b]);
        base.register_free_parameters(vec![mean]);

        assert_eq!(15, base.parameter_count);
        assert_eq!("W_dense1", base.parameters[0].name());
        assert_eq!("b_dense1", base.parameters[1].name());
        assert_eq!(1, base.free_parameters.len());
        Zip::from(&*base.parameters[0].value()).for_each(|&v| assert_eq!(0.0, v));
    }

    #[test]
    fn connect_rejects_zero_input() {
        let mut base = LayerBase::new("dense", 3);
        assert!(base.ensure_connected().is_err());
        let err = base.connect(0).unwrap_err();
        assert!(matches!(err, LayerError::ZeroDimension { side: "input", .. }));
        base.connect(4).unwrap();
        assert!(base.is_connected());
        assert_eq!(4, base.input_dim());
    }
}
