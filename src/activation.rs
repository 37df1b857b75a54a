use crate::graph::{self, Expr};

/// Elementwise nonlinearity applied on top of a layer's affine transform.
pub trait Activation {
    fn apply(&self, x: &Expr) -> Expr;

    fn name(&self) -> &'static str;
}

pub struct Identity;

impl Activation for Identity {
    fn apply(&self, x: &Expr) -> Expr {
        x.clone()
    }

    fn name(&self) -> &'static str {
        "linear"
    }
}

pub struct Sigmoid;

impl Activation for Sigmoid {
    fn apply(&self, x: &Expr) -> Expr {
        graph::sigmoid(x)
    }

    fn name(&self) -> &'static str {
        "sigmoid"
    }
}

pub struct Relu;

impl Activation for Relu {
    fn apply(&self, x: &Expr) -> Expr {
        graph::relu(x)
    }

    fn name(&self) -> &'static str {
        "relu"
    }
}

pub struct Tanh;

impl Activation for Tanh {
    fn apply(&self, x: &Expr) -> Expr {
        graph::tanh(x)
    }

    fn name(&self) -> &'static str {
        "tanh"
    }
}
