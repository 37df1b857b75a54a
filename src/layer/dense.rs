use ndarray::{Array, IxDyn};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;

use crate::{
    activation::Activation,
    config::NetworkConfig,
    graph::{add, matmul, Expr, Shared, Tensor},
    layer::{Layer, LayerBase, LayerError},
};

const DEFAULT_INIT_SCALE: f32 = 0.1;

/// Fully connected layer: `activation(dot(x, W) + b)`.
pub struct Dense {
    base: LayerBase,
    activation: Box<dyn Activation>,
    init_scale: Option<f32>,
    weights: Option<Shared>,
    bias: Option<Shared>,
}

impl Dense {
    pub fn new<A: Activation + 'static>(output_dim: usize, activation: A) -> Self {
        Self {
            base: LayerBase::new("dense", output_dim),
            activation: Box::new(activation),
            init_scale: None,
            weights: None,
            bias: None,
        }
    }

    /// Weights are drawn uniformly from `[-scale, scale)`. Without this, the `init_scale`
    /// option of the network config is used, falling back to 0.1.
    pub fn init_scale(self, scale: f32) -> Self {
        Self {
            init_scale: Some(scale),
            ..self
        }
    }

    pub fn weights(&self) -> Option<&Shared> {
        self.weights.as_ref()
    }

    pub fn bias(&self) -> Option<&Shared> {
        self.bias.as_ref()
    }

    fn resolve_init_scale(&self, config: &NetworkConfig) -> Result<f32, LayerError> {
        let scale = match self.init_scale {
            Some(scale) => scale,
            None => config
                .option::<f32>("init_scale")
                .map_err(|source| LayerError::Option {
                    layer: self.name().to_string(),
                    key: "init_scale".to_string(),
                    source,
                })?
                .unwrap_or(DEFAULT_INIT_SCALE),
        };
        if !(scale.is_finite() && scale > 0.0) {
            return Err(LayerError::Invalid {
                layer: self.name().to_string(),
                what: "init_scale",
                value: scale,
            });
        }
        Ok(scale)
    }
}

impl Layer for Dense {
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
        config: &NetworkConfig,
    ) -> Result<(), LayerError> {
        if self.base.output_dim() == 0 {
            return Err(LayerError::ZeroDimension {
                layer: self.name().to_string(),
                side: "output",
            });
        }
        self.init_scale = Some(self.resolve_init_scale(config)?);
        self.base.connect(input_dim)
    }

    fn setup(&mut self) -> Result<(), LayerError> {
        self.base.ensure_connected()?;
        if self.weights.is_some() {
            return Ok(());
        }

        let input_dim = self.base.input_dim();
        let output_dim = self.base.output_dim();
        let scale = self.init_scale.unwrap_or(DEFAULT_INIT_SCALE);
        let weights = Array::random((input_dim, output_dim), Uniform::new(-scale, scale));
        let weights = self.base.create_shared("W", weights.into_dyn());
        let bias = self
            .base
            .create_shared("b", Tensor::zeros(IxDyn(&[output_dim])));
        self.base
            .register_parameters(vec![weights.clone(), bias.clone()]);

        tracing::debug!(
            layer = self.name(),
            input_dim,
            output_dim,
            activation = self.activation.name(),
            "dense parameters created"
        );
        self.weights = Some(weights);
        self.bias = Some(bias);
        Ok(())
    }

    fn output(&mut self, input: &Expr) -> Result<Expr, LayerError> {
        match (&self.weights, &self.bias) {
            (Some(weights), Some(bias)) => {
                let affine = add(&matmul(input, &Expr::from(weights)), &Expr::from(bias));
                Ok(self.activation.apply(&affine))
            }
            _ => Err(LayerError::NotConnected(self.name().to_string())),
        }
    }
}
