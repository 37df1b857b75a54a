use std::{cell::RefCell, rc::Rc};

use ndarray::{arr2, Array1, Array2, ArrayView2};
use ndarray_rand::{rand_distr::Uniform, RandomExt};
use strata::{
    activation::{Relu, Sigmoid, Tanh},
    assert_rel_eq_arr,
    graph::{add, mul, Argument, Expr, Placeholder},
    layer::{Callback, Centering, Dense, Dropout, LayerError},
    Layer, LayerBase, Monitor, Network, NetworkConfig,
};

/// Scales its input by an external gate fed next to `x`, and records its hooks.
struct Gate {
    base: LayerBase,
    gate: Placeholder,
    log: Rc<RefCell<Vec<String>>>,
}

impl Gate {
    fn new(log: &Rc<RefCell<Vec<String>>>) -> Self {
        Self {
            base: LayerBase::new("gate", 0),
            gate: Placeholder::matrix("gate"),
            log: Rc::clone(log),
        }
    }

    fn hook(&self, kind: &str) -> Callback {
        let log = Rc::clone(&self.log);
        let entry = format!("{}:{}", self.base.name(), kind);
        Rc::new(move || log.borrow_mut().push(entry.clone()))
    }
}

impl Layer for Gate {
    fn base(&self) -> &LayerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut LayerBase {
        &mut self.base
    }

    fn connect(
        &mut self,
        input_dim: usize,
        _previous: Option<&dyn Layer>,
        _config: &NetworkConfig,
    ) -> Result<(), LayerError> {
        self.base.connect(input_dim)?;
        self.base.set_output_dim(input_dim);
        Ok(())
    }

    fn setup(&mut self) -> Result<(), LayerError> {
        let epoch = self.hook("epoch");
        let training = self.hook("training");
        let testing = self.hook("testing");
        self.base.register_epoch_callbacks(vec![epoch]);
        self.base.register_training_callbacks(vec![training]);
        self.base.register_testing_callbacks(vec![testing]);
        self.base.register_external_inputs(vec![self.gate.clone()]);
        Ok(())
    }

    fn output(&mut self, input: &Expr) -> Result<Expr, LayerError> {
        let output = mul(input, &Expr::from(&self.gate));
        let label = format!("{}_sum", self.base.name());
        self.base
            .register_testing_monitors(vec![Monitor::new(label, add(&output, &output))]);
        Ok(output)
    }

    fn test_output(&mut self, input: &Expr) -> Result<Expr, LayerError> {
        Ok(mul(input, &Expr::from(&self.gate)))
    }
}

fn expected_forward(x: ArrayView2<f32>, network: &Network) -> Array2<f32> {
    let matrix = |i: usize| -> Array2<f32> {
        network.parameters()[i]
            .get_value()
            .into_dimensionality()
            .unwrap()
    };
    let vector = |i: usize| -> Array1<f32> {
        network.parameters()[i]
            .get_value()
            .into_dimensionality()
            .unwrap()
    };
    let hidden = (x.dot(&matrix(0)) + &vector(1)).mapv(f32::tanh);
    (hidden.dot(&matrix(2)) + &vector(3)).mapv(|v| 1.0 / (1.0 + (-v).exp()))
}

#[test]
fn single_layer_network() {
    let mut network = Network::new(4, NetworkConfig::default()).unwrap();
    network.stack(Dense::new(2, Relu)).unwrap();
    assert_eq!(10, network.parameter_count());
    assert!(network.layers()[0].name().ends_with('1'));
    assert_eq!(1, network.hidden_outputs().len());
}

#[test]
fn prepare_training_adds_saturation_monitors() {
    let mut network = Network::new(3, NetworkConfig::default()).unwrap();
    network.stack(Dense::new(4, Tanh)).unwrap();
    network.stack(Dense::new(2, Sigmoid)).unwrap();
    let before = network.training_monitors().len();
    network.prepare_training();

    let labels = network.training_monitors()[before..]
        .iter()
        .map(|monitor| monitor.label.as_str())
        .collect::<Vec<_>>();
    assert_eq!(vec!["h1<0.1", "h1<0.9", "h2<0.1", "h2<0.9"], labels);
}

#[test]
fn callbacks_run_in_stacking_order() {
    let log = Rc::default();
    let mut network = Network::new(2, NetworkConfig::default()).unwrap();
    network.stack(Gate::new(&log)).unwrap();
    network.stack(Gate::new(&log)).unwrap();

    network.epoch_callback();
    assert_eq!(vec!["gate1:epoch", "gate2:epoch"], *log.borrow());

    log.borrow_mut().clear();
    network.training_callback();
    network.testing_callback();
    assert_eq!(
        vec![
            "gate1:training",
            "gate2:training",
            "gate1:testing",
            "gate2:testing"
        ],
        *log.borrow()
    );
    assert_eq!(2, network.testing_monitors().len());
    assert_eq!("gate2_sum", network.testing_monitors()[1].label);
}

#[test]
fn external_inputs_follow_network_input() {
    let log = Rc::default();
    let mut network = Network::new(2, NetworkConfig::default()).unwrap();
    network.stack(Gate::new(&log)).unwrap();
    let names = network
        .input_variables()
        .iter()
        .map(|variable| variable.name().to_string())
        .collect::<Vec<_>>();
    assert_eq!(vec!["x", "gate"], names);

    let x = arr2(&[[1.0f32, 2.0], [3.0, 4.0]]);
    let gate = arr2(&[[0.0f32, 1.0], [0.5, 2.0]]);
    let y = network.compute(vec![x.clone(), gate]).unwrap();
    assert_rel_eq_arr!(y, arr2(&[[0.0, 2.0], [1.5, 8.0]]));

    let gate = arr2(&[[1.0f64, 0.5], [2.0, 0.0]]);
    let y = network
        .compute(vec![Argument::from(x), Argument::from(gate)])
        .unwrap();
    assert_rel_eq_arr!(y, arr2(&[[1.0, 1.0], [6.0, 0.0]]));
}

#[test]
fn compute_uses_inference_graph() {
    let config = NetworkConfig::new()
        .with_option("init_scale", 0.5)
        .with_layer(Dense::new(5, Tanh))
        .with_layer(Dropout::new(0.5))
        .with_layer(Dense::new(1, Sigmoid));
    let network = Network::new(3, config).unwrap();

    let x = Array2::random((8, 3), Uniform::new(-1.0f32, 1.0));
    let y = network.compute(vec![x.view()]).unwrap();
    assert_rel_eq_arr!(y, expected_forward(x.view(), &network));
    // dropout is absent from inference, so results repeat
    assert_rel_eq_arr!(network.compute(vec![x.view()]).unwrap(), y);
}

#[test]
fn running_mean_tracks_batches() {
    let mut network = Network::new(2, NetworkConfig::default()).unwrap();
    network.stack(Centering::new(0.0)).unwrap();
    let first = arr2(&[[1.0f32, 1.0], [3.0, 5.0]]);
    let second = arr2(&[[0.0f32, 0.0], [0.0, 2.0]]);

    let y = network.compute(vec![first]).unwrap();
    assert_rel_eq_arr!(y, arr2(&[[1.0, 1.0], [3.0, 5.0]]));
    // momentum 0 replaces the mean with the last batch mean
    let y = network.compute(vec![second]).unwrap();
    assert_rel_eq_arr!(y, arr2(&[[-2.0, -3.0], [-2.0, -1.0]]));
}

#[test]
fn saved_parameters_restore_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json.gz");
    let build = || {
        let config = NetworkConfig::new()
            .with_layer(Dense::new(4, Tanh))
            .with_layer(Dense::new(1, Sigmoid));
        Network::new(3, config).unwrap()
    };
    let trained = build();
    trained.save_params(&path).unwrap();

    let restored = build();
    restored.load_params(&path).unwrap();
    let x = Array2::random((5, 3), Uniform::new(-1.0f32, 1.0));
    assert_rel_eq_arr!(
        restored.compute(vec![x.view()]).unwrap(),
        trained.compute(vec![x.view()]).unwrap()
    );
}
