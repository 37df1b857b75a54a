use ndarray::IxDyn;

use crate::{
    config::NetworkConfig,
    graph::{add, mean_rows, scale, sub, Expr, Shared, Tensor, Update},
    layer::{Layer, LayerBase, LayerError},
};

/// Subtracts a running mean of its input.
///
/// The mean is a free parameter: it is saved with the network but not trained. Every evaluation
/// step moves it towards the batch mean, `mean = momentum * mean + (1 - momentum) * batch_mean`.
pub struct Centering {
    base: LayerBase,
    momentum: f32,
    mean: Option<Shared>,
}

impl Centering {
    pub fn new(momentum: f32) -> Self {
        Self {
            base: LayerBase::new("centering", 0),
            momentum,
            mean: None,
        }
    }

    pub fn mean(&self) -> Option<&Shared> {
        self.mean.as_ref()
    }

    fn running_mean(&self) -> Result<&Shared, LayerError> {
        self.mean
            .as_ref()
            .ok_or_else(|| LayerError::NotConnected(self.name().to_string()))
    }
}

impl Layer for Centering {
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
        if !(0.0..=1.0).contains(&self.momentum) {
            return Err(LayerError::Invalid {
                layer: self.name().to_string(),
                what: "momentum",
                value: self.momentum,
            });
        }
        self.base.connect(input_dim)?;
        self.base.set_output_dim(input_dim);
        Ok(())
    }

    fn setup(&mut self) -> Result<(), LayerError> {
        self.base.ensure_connected()?;
        if self.mean.is_some() {
            return Ok(());
        }
        let mean = self
            .base
            .create_shared("mean", Tensor::zeros(IxDyn(&[self.base.input_dim()])));
        self.base.register_free_parameters(vec![mean.clone()]);
        self.mean = Some(mean);
        Ok(())
    }

    fn output(&mut self, input: &Expr) -> Result<Expr, LayerError> {
        let mean = Expr::from(self.running_mean()?);
        if self.updates().is_empty() {
            let target = self.running_mean()?.clone();
            let value = add(
                &scale(&mean, self.momentum),
                &scale(&mean_rows(input), 1.0 - self.momentum),
            );
            self.base.register_updates(vec![Update::new(&target, value)]);
        }
        Ok(sub(input, &mean))
    }

    fn test_output(&mut self, input: &Expr) -> Result<Expr, LayerError> {
        let mean = Expr::from(self.running_mean()?);
        Ok(sub(input, &mean))
    }
}
