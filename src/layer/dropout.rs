use crate::{
    config::NetworkConfig,
    graph::{dropout, Expr},
    layer::{Layer, LayerBase, LayerError},
};

/// Randomly zeroes activations while training. The inference output is the input itself.
pub struct Dropout {
    base: LayerBase,
    rate: f32,
}

impl Dropout {
    pub fn new(rate: f32) -> Self {
        Self {
            base: LayerBase::new("dropout", 0),
            rate,
        }
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }
}

impl Layer for Dropout {
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
        if !(0.0..1.0).contains(&self.rate) {
            return Err(LayerError::Invalid {
                layer: self.name().to_string(),
                what: "rate",
                value: self.rate,
            });
        }
        self.base.connect(input_dim)?;
        self.base.set_output_dim(input_dim);
        Ok(())
    }

    fn setup(&mut self) -> Result<(), LayerError> {
        self.base.ensure_connected()
    }

    fn output(&mut self, input: &Expr) -> Result<Expr, LayerError> {
        self.base.ensure_connected()?;
        Ok(dropout(input, self.rate))
    }

    fn test_output(&mut self, input: &Expr) -> Result<Expr, LayerError> {
        self.base.ensure_connected()?;
        Ok(input.clone())
    }
}
