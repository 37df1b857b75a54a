use std::rc::Rc;

use ndarray::{Array, ArrayD, ArrayView, Dimension};

use crate::graph::{Bindings, Evaluator, Expr, GraphError, Placeholder, Shared, Tensor};

/// In-place state update applied after each call of a compiled function.
#[derive(Clone, Debug)]
pub struct Update {
    pub target: Shared,
    pub value: Expr,
}

impl Update {
    pub fn new(target: &Shared, value: Expr) -> Self {
        Self {
            target: target.clone(),
            value,
        }
    }
}

/// Values accepted as positional arguments of a compiled function.
pub trait Input {
    /// Convert into a `Tensor`. Values that lose precision on the way are rejected unless
    /// `allow_downcast` is set.
    fn into_tensor(self, name: &str, allow_downcast: bool) -> Result<Tensor, GraphError>;
}

impl<D: Dimension> Input for Array<f32, D> {
    fn into_tensor(self, _name: &str, _allow_downcast: bool) -> Result<Tensor, GraphError> {
        Ok(self.into_dyn())
    }
}

impl<'a, D: Dimension> Input for ArrayView<'a, f32, D> {
    fn into_tensor(self, _name: &str, _allow_downcast: bool) -> Result<Tensor, GraphError> {
        Ok(self.to_owned().into_dyn())
    }
}

impl<D: Dimension> Input for Array<f64, D> {
    fn into_tensor(self, name: &str, allow_downcast: bool) -> Result<Tensor, GraphError> {
        if !allow_downcast {
            return Err(GraphError::Downcast(name.to_string()));
        }
        Ok(self.mapv(|v| v as f32).into_dyn())
    }
}

/// Positional argument of either precision, for calls mixing `f32` and `f64` inputs.
#[derive(Debug, Clone)]
pub enum Argument {
    Single(ArrayD<f32>),
    Double(ArrayD<f64>),
}

impl<D: Dimension> From<Array<f32, D>> for Argument {
    fn from(value: Array<f32, D>) -> Self {
        Self::Single(value.into_dyn())
    }
}

impl<D: Dimension> From<Array<f64, D>> for Argument {
    fn from(value: Array<f64, D>) -> Self {
        Self::Double(value.into_dyn())
    }
}

impl Input for Argument {
    fn into_tensor(self, name: &str, allow_downcast: bool) -> Result<Tensor, GraphError> {
        match self {
            Self::Single(value) => Ok(value),
            Self::Double(value) => value.into_tensor(name, allow_downcast),
        }
    }
}

/// Executable mapping from positional inputs to output values.
pub struct Function {
    inputs: Vec<Placeholder>,
    outputs: Vec<Expr>,
    updates: Vec<Update>,
    allow_input_downcast: bool,
}

impl Function {
    /// Every placeholder reachable from `outputs` or `updates` must be listed in `inputs`.
    pub fn compile(
        inputs: Vec<Placeholder>,
        outputs: Vec<Expr>,
        updates: Vec<Update>,
    ) -> Result<Self, GraphError> {
        let required = outputs
            .iter()
            .chain(updates.iter().map(|update| &update.value))
            .flat_map(Expr::placeholders);
        for placeholder in required {
            if !inputs.contains(&placeholder) {
                return Err(GraphError::Unbound(placeholder.name().to_string()));
            }
        }

        Ok(Self {
            inputs,
            outputs,
            updates,
            allow_input_downcast: false,
        })
    }

    /// If enabled, `f64` inputs are silently converted to `f32`.
    pub fn allow_input_downcast(self, allow_input_downcast: bool) -> Self {
        Self {
            allow_input_downcast,
            ..self
        }
    }

    pub fn inputs(&self) -> &[Placeholder] {
        &self.inputs
    }

    /// Evaluate every output for `args`, then apply the update rules.
    /// Update values are computed from the state before this call, so the order of the rules
    /// does not matter.
    pub fn call<I, A>(&self, args: A) -> Result<Vec<Tensor>, GraphError>
    where
        I: Input,
        A: IntoIterator<Item = I>,
    {
        let args = args.into_iter().collect::<Vec<_>>();
        if args.len() != self.inputs.len() {
            return Err(GraphError::Arity {
                expected: self.inputs.len(),
                actual: args.len(),
            });
        }

        let mut bindings = Bindings::new();
        for (placeholder, arg) in self.inputs.iter().zip(args) {
            let value = arg.into_tensor(placeholder.name(), self.allow_input_downcast)?;
            bindings.bind(placeholder, value)?;
        }

        let mut evaluator = Evaluator::new(&bindings);
        let outputs = self
            .outputs
            .iter()
            .map(|output| evaluator.eval(output))
            .collect::<Result<Vec<_>, _>>()?;
        let new_values = self
            .updates
            .iter()
            .map(|update| evaluator.eval(&update.value))
            .collect::<Result<Vec<_>, _>>()?;
        drop(evaluator);

        for (update, value) in self.updates.iter().zip(new_values) {
            update.target.set_value(unwrap_or_clone(value));
        }
        Ok(outputs.into_iter().map(unwrap_or_clone).collect())
    }
}

fn unwrap_or_clone(value: Rc<Tensor>) -> Tensor {
    Rc::try_unwrap(value).unwrap_or_else(|shared| (*shared).clone())
}
