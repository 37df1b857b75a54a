use crate::{
    config::NetworkConfig,
    error::Result,
    graph::{mean, square, sub, Expr, Input, Placeholder, Tensor},
    layer::Layer,
    network::{Network, Objective},
};

/// Network trained against a real-valued target `k` with a mean squared error cost.
pub struct Regressor {
    network: Network,
    target: Placeholder,
}

impl Regressor {
    pub fn new(input_dim: usize, config: NetworkConfig) -> Result<Self> {
        let mut network = Network::new(input_dim, config)?;
        let target = Placeholder::matrix("k");
        network.register_target(target.clone())?;
        Ok(Self { network, target })
    }

    pub fn target(&self) -> &Placeholder {
        &self.target
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut Network {
        &mut self.network
    }

    pub fn stack<L: Layer + 'static>(&mut self, layer: L) -> Result<()> {
        self.network.stack(layer)
    }

    pub fn compute<I, A>(&self, inputs: A) -> Result<Tensor>
    where
        I: Input,
        A: IntoIterator<Item = I>,
    {
        self.network.compute(inputs)
    }
}

impl Objective for Regressor {
    fn cost(&self) -> Expr {
        mean(&square(&sub(self.network.output(), &Expr::from(&self.target))))
    }

    fn test_cost(&self) -> Expr {
        mean(&square(&sub(self.network.test_output(), &Expr::from(&self.target))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{
        activation::Identity,
        assert_rel_eq_arr,
        graph::{Bindings, Evaluator},
        layer::{Dense, Dropout},
    };
    use ndarray::{arr0, arr1, arr2};

    #[test]
    fn target_is_registered_but_not_computed() {
        let mut regressor = Regressor::new(2, NetworkConfig::default()).unwrap();
        regressor.stack(Dense::new(1, Identity)).unwrap();
        let network = regressor.network();
        assert_eq!(2, network.input_variables().len());
        assert_eq!(vec![regressor.target().clone()], network.target_variables());

        network.parameters()[0].set_value(arr2(&[[1.0], [2.0]]).into_dyn());
        let y = regressor.compute(vec![arr2(&[[1.0f32, 1.0]])]).unwrap();
        assert_rel_eq_arr!(y, arr2(&[[3.0]]));
    }

    #[test]
    fn cost_is_mean_squared_error() {
        let mut regressor = Regressor::new(1, NetworkConfig::default()).unwrap();
        regressor.stack(Dense::new(1, Identity)).unwrap();
        regressor.network().parameters()[0].set_value(arr2(&[[2.0]]).into_dyn());
        regressor.network().parameters()[1].set_value(arr1(&[0.0]).into_dyn());

        let x = regressor.network().input_variables()[0].clone();
        let mut bindings = Bindings::new();
        bindings.bind(&x, arr2(&[[1.0], [2.0]]).into_dyn()).unwrap();
        bindings
            .bind(regressor.target(), arr2(&[[1.0], [4.0]]).into_dyn())
            .unwrap();
        // predictions 2 and 4 against targets 1 and 4
        let cost = Evaluator::new(&bindings).eval(&regressor.cost()).unwrap();
        assert_rel_eq_arr!(*cost, arr0(0.5));
    }

    #[test]
    fn test_cost_uses_inference_output() {
        let mut regressor = Regressor::new(3, NetworkConfig::default()).unwrap();
        regressor.stack(Dropout::new(0.5)).unwrap();
        assert_eq!("mean(sqr((dropout(x, 0.5) - k)))", regressor.cost().to_string());
        assert_eq!("mean(sqr((x - k)))", regressor.test_cost().to_string());
    }
}
