mod params;
mod regressor;

use once_cell::unsync::OnceCell;
use tracing::{debug, dispatcher, info, Dispatch};

use crate::{
    config::NetworkConfig,
    error::{Error, Result},
    graph::{
        abs, less_than, mean, scale, Expr, Function, GraphError, Input, Placeholder, Shared, Tensor,
        Update,
    },
    layer::{Callback, Layer, Monitor},
};

pub use regressor::Regressor;

const BANNER: &str = "strata =============================>";
const SATURATION_THRESHOLDS: [f32; 2] = [0.1, 0.9];

/// Training objective attached to a network.
pub trait Objective {
    fn cost(&self) -> Expr;

    fn test_cost(&self) -> Expr {
        self.cost()
    }
}

/// Summary produced by [`Network::report`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub inputs: Vec<String>,
    pub targets: Vec<String>,
    pub parameters: Vec<String>,
    pub parameter_count: usize,
}

/// Ordered stack of layers together with everything they contribute: parameters, update
/// rules, monitors, callbacks and the composed training and inference expressions.
///
/// Layers can only be appended. Once the network is frozen, by [`Network::freeze`] or the first
/// [`Network::compute`], its graph is fixed and stacking fails with [`Error::Frozen`].
///
/// The network holds `Rc` handles and is neither `Send` nor `Sync`, so the compiled function
/// is initialized at most once without locking.
pub struct Network {
    input_dim: usize,
    config: NetworkConfig,
    logger: Dispatch,
    layers: Vec<Box<dyn Layer>>,
    parameter_count: usize,
    parameters: Vec<Shared>,
    free_parameters: Vec<Shared>,
    updates: Vec<Update>,
    training_updates: Vec<Update>,
    input_variables: Vec<Placeholder>,
    target_variables: Vec<Placeholder>,
    training_monitors: Vec<Monitor>,
    testing_monitors: Vec<Monitor>,
    training_callbacks: Vec<Callback>,
    testing_callbacks: Vec<Callback>,
    epoch_callbacks: Vec<Callback>,
    hidden_outputs: Vec<Expr>,
    output: Expr,
    test_output: Expr,
    compiled: OnceCell<Function>,
}

impl Network {
    /// Create a network reading rank-2 inputs of `input_dim` features and stack the layers
    /// listed in `config`.
    pub fn new(input_dim: usize, config: NetworkConfig) -> Result<Self> {
        let input = Placeholder::matrix(config.input_name.clone());
        Self::with_input(input_dim, config, input)
    }

    /// Same as [`Network::new`] but reads from an existing placeholder, so several networks
    /// can share one input.
    pub fn with_input(
        input_dim: usize,
        mut config: NetworkConfig,
        input: Placeholder,
    ) -> Result<Self> {
        let layers = std::mem::take(&mut config.layers);
        let logger = config
            .logger
            .take()
            .unwrap_or_else(|| dispatcher::get_default(Dispatch::clone));
        let output = Expr::from(&input);

        let mut network = Self {
            input_dim,
            config,
            logger,
            layers: Vec::new(),
            parameter_count: 0,
            parameters: Vec::new(),
            free_parameters: Vec::new(),
            updates: Vec::new(),
            training_updates: Vec::new(),
            input_variables: vec![input],
            target_variables: Vec::new(),
            training_monitors: Vec::new(),
            testing_monitors: Vec::new(),
            training_callbacks: Vec::new(),
            testing_callbacks: Vec::new(),
            epoch_callbacks: Vec::new(),
            hidden_outputs: Vec::new(),
            output: output.clone(),
            test_output: output,
            compiled: OnceCell::new(),
        };
        network.logged(|| info!(input_dim, "{}", BANNER));
        network.stack_layers(layers)?;
        Ok(network)
    }

    /// Run `f` with this network's log sink installed.
    fn logged<T>(&self, f: impl FnOnce() -> T) -> T {
        dispatcher::with_default(&self.logger, f)
    }

    /// Append `layer` to the end of the stack.
    pub fn stack<L: Layer + 'static>(&mut self, layer: L) -> Result<()> {
        self.stack_boxed(Box::new(layer))
    }

    /// Append a boxed layer. On error the network is left as it was.
    pub fn stack_boxed(&mut self, mut layer: Box<dyn Layer>) -> Result<()> {
        if self.is_frozen() {
            return Err(Error::Frozen);
        }
        let logger = self.logger.clone();
        dispatcher::with_default(&logger, || -> Result<()> {
            let name = format!("{}{}", layer.name(), self.layers.len() + 1);
            layer.set_name(name);

            let previous = self.layers.last().map(|previous| previous.as_ref());
            let input_dim = previous.map_or(self.input_dim, |previous| previous.output_dim());
            layer.connect(input_dim, previous, &self.config)?;
            layer.setup()?;
            let output = layer.output(&self.output)?;
            let test_output = layer.test_output(&self.test_output)?;

            debug!(
                layer = layer.name(),
                input_dim,
                output_dim = layer.output_dim(),
                parameter_count = layer.parameter_count(),
                "stacked layer"
            );
            self.output = output;
            self.test_output = test_output;
            self.hidden_outputs.push(self.output.clone());
            self.absorb(layer.as_ref());
            self.layers.push(layer);
            Ok(())
        })
    }

    /// Stack every layer in order, stopping at the first failure.
    pub fn stack_layers<I>(&mut self, layers: I) -> Result<()>
    where
        I: IntoIterator<Item = Box<dyn Layer>>,
    {
        for layer in layers {
            self.stack_boxed(layer)?;
        }
        Ok(())
    }

    fn absorb(&mut self, layer: &dyn Layer) {
        self.parameter_count += layer.parameter_count();
        self.parameters.extend_from_slice(layer.parameters());
        self.free_parameters.extend_from_slice(layer.free_parameters());
        self.training_monitors.extend_from_slice(layer.training_monitors());
        self.testing_monitors.extend_from_slice(layer.testing_monitors());
        self.updates.extend_from_slice(layer.updates());
        self.training_updates.extend_from_slice(layer.training_updates());
        self.input_variables.extend_from_slice(layer.external_inputs());
        self.training_callbacks.extend_from_slice(layer.training_callbacks());
        self.testing_callbacks.extend_from_slice(layer.testing_callbacks());
        self.epoch_callbacks.extend_from_slice(layer.epoch_callbacks());
    }

    /// Declare `target` as a target variable. Targets are inputs of the training graph but are
    /// not passed to `compute`.
    pub fn register_target(&mut self, target: Placeholder) -> Result<()> {
        if self.is_frozen() {
            return Err(Error::Frozen);
        }
        self.input_variables.push(target.clone());
        self.target_variables.push(target);
        Ok(())
    }

    /// Compile the inference function. Runs once; later calls return the same function.
    pub fn freeze(&self) -> Result<&Function> {
        let function = self.compiled.get_or_try_init(|| -> std::result::Result<_, GraphError> {
            let inputs = self
                .input_variables
                .iter()
                .filter(|variable| !self.target_variables.contains(variable))
                .cloned()
                .collect::<Vec<_>>();
            self.logged(|| {
                debug!(
                    inputs = inputs.len(),
                    updates = self.updates.len(),
                    "compiling network"
                )
            });
            let function =
                Function::compile(inputs, vec![self.test_output.clone()], self.updates.clone())?;
            Ok(function.allow_input_downcast(self.config.allow_input_downcast))
        })?;
        Ok(function)
    }

    pub fn is_frozen(&self) -> bool {
        self.compiled.get().is_some()
    }

    /// Evaluate the inference output for positional inputs (every input variable except the
    /// targets, in order), applying the update rules.
    ///
    /// All arguments share one type. Wrap them in [`Argument`](crate::graph::Argument) to mix
    /// `f32` and `f64` arrays.
    pub fn compute<I, A>(&self, inputs: A) -> Result<Tensor>
    where
        I: Input,
        A: IntoIterator<Item = I>,
    {
        let function = self.freeze()?;
        let mut outputs = function.call(inputs)?;
        let output = outputs.pop().ok_or(GraphError::Arity {
            expected: 1,
            actual: 0,
        })?;
        Ok(output)
    }

    /// Log the network's inputs, targets and parameters.
    pub fn report(&self) -> Report {
        let report = Report {
            inputs: self.input_variables.iter().map(|v| v.to_string()).collect(),
            targets: self.target_variables.iter().map(|v| v.to_string()).collect(),
            parameters: self.all_parameters().iter().map(|p| p.to_string()).collect(),
            parameter_count: self.parameter_count,
        };
        self.logged(|| {
            info!("network inputs: {}", report.inputs.join(" "));
            info!("network targets: {}", report.targets.join(" "));
            info!("network parameters: {}", report.parameters.join(" "));
            info!("parameter count: {}", report.parameter_count);
        });
        report
    }

    /// Report, then add saturation monitors for every hidden output: the percentage of
    /// activations whose magnitude is below 0.1 and below 0.9.
    pub fn prepare_training(&mut self) {
        self.report();
        for (i, hidden) in self.hidden_outputs.iter().enumerate() {
            for threshold in SATURATION_THRESHOLDS {
                let ratio = scale(&mean(&less_than(&abs(hidden), threshold)), 100.0);
                self.training_monitors
                    .push(Monitor::new(format!("h{}<{}", i + 1, threshold), ratio));
            }
        }
    }

    pub fn epoch_callback(&self) {
        for callback in &self.epoch_callbacks {
            callback();
        }
    }

    pub fn training_callback(&self) {
        for callback in &self.training_callbacks {
            callback();
        }
    }

    pub fn testing_callback(&self) {
        for callback in &self.testing_callbacks {
            callback();
        }
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    /// The config the network was built with. Its `layers` have moved into the network.
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn layers(&self) -> &[Box<dyn Layer>] {
        &self.layers
    }

    pub fn first_layer(&self) -> Option<&dyn Layer> {
        self.layers.first().map(|layer| layer.as_ref())
    }

    pub fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    pub fn parameters(&self) -> &[Shared] {
        &self.parameters
    }

    pub fn free_parameters(&self) -> &[Shared] {
        &self.free_parameters
    }

    /// `parameters` followed by `free_parameters`.
    pub fn all_parameters(&self) -> Vec<Shared> {
        self.parameters
            .iter()
            .chain(&self.free_parameters)
            .cloned()
            .collect()
    }

    pub fn updates(&self) -> &[Update] {
        &self.updates
    }

    pub fn training_updates(&self) -> &[Update] {
        &self.training_updates
    }

    pub fn input_variables(&self) -> &[Placeholder] {
        &self.input_variables
    }

    pub fn target_variables(&self) -> &[Placeholder] {
        &self.target_variables
    }

    pub fn training_monitors(&self) -> &[Monitor] {
        &self.training_monitors
    }

    pub fn testing_monitors(&self) -> &[Monitor] {
        &self.testing_monitors
    }

    /// Training-mode output of each stacked layer, in stacking order.
    pub fn hidden_outputs(&self) -> &[Expr] {
        &self.hidden_outputs
    }

    pub fn output(&self) -> &Expr {
        &self.output
    }

    pub fn test_output(&self) -> &Expr {
        &self.test_output
    }
}

impl Objective for Network {
    fn cost(&self) -> Expr {
        Expr::scalar(0.0)
    }
}
