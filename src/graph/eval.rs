use std::{collections::HashMap, rc::Rc};

use ndarray::{arr0, Axis, Ix2, Zip};
use ndarray_rand::{rand_distr::Uniform, RandomExt};

use crate::graph::{BinaryOp, Expr, GraphError, Node, Placeholder, Tensor, UnaryOp};

/// Concrete values for the placeholders of one evaluation.
#[derive(Default)]
pub struct Bindings {
    values: HashMap<usize, Tensor>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `value` to `placeholder`, replacing any previous binding.
    pub fn bind(&mut self, placeholder: &Placeholder, value: Tensor) -> Result<(), GraphError> {
        if value.ndim() != placeholder.rank() {
            return Err(GraphError::Rank {
                name: placeholder.name().to_string(),
                expected: placeholder.rank(),
                actual: value.ndim(),
            });
        }
        self.values.insert(placeholder.key(), value);
        Ok(())
    }

    pub fn get(&self, placeholder: &Placeholder) -> Option<&Tensor> {
        self.values.get(&placeholder.key())
    }
}

/// Evaluates expressions against fixed bindings.
/// Every node is computed at most once per evaluator, so an expression shared by several outputs
/// sees the same value (one dropout mask, one snapshot of each shared variable).
pub struct Evaluator<'a> {
    bindings: &'a Bindings,
    cache: HashMap<usize, Rc<Tensor>>,
}

impl<'a> Evaluator<'a> {
    pub fn new(bindings: &'a Bindings) -> Self {
        Self {
            bindings,
            cache: HashMap::new(),
        }
    }

    pub fn eval(&mut self, expr: &Expr) -> Result<Rc<Tensor>, GraphError> {
        if let Some(value) = self.cache.get(&expr.key()) {
            return Ok(Rc::clone(value));
        }

        let value = match expr.node() {
            Node::Input(placeholder) => self
                .bindings
                .get(placeholder)
                .cloned()
                .ok_or_else(|| GraphError::Unbound(placeholder.name().to_string()))?,
            Node::Shared(shared) => shared.get_value(),
            Node::Constant(value) => value.clone(),
            Node::Unary(op, input) => {
                let input = self.eval(input)?;
                compute_unary(*op, &input)?
            }
            Node::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                compute_binary(*op, &lhs, &rhs)?
            }
            Node::Dropout { input, rate } => {
                let input = self.eval(input)?;
                compute_dropout(&input, *rate)
            }
        };

        let value = Rc::new(value);
        self.cache.insert(expr.key(), Rc::clone(&value));
        Ok(value)
    }
}

fn compute_sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn compute_unary(op: UnaryOp, input: &Tensor) -> Result<Tensor, GraphError> {
    let output = match op {
        UnaryOp::Relu => input.mapv(|v| if v >= 0.0 { v } else { 0.0 }),
        UnaryOp::Sigmoid => input.mapv(compute_sigmoid),
        UnaryOp::Tanh => input.mapv(f32::tanh),
        UnaryOp::Abs => input.mapv(f32::abs),
        UnaryOp::Square => input.mapv(|v| v * v),
        UnaryOp::Scale(factor) => input.mapv(|v| v * factor),
        UnaryOp::LessThan(threshold) => input.mapv(|v| if v < threshold { 1.0 } else { 0.0 }),
        UnaryOp::Mean => arr0(input.mean().ok_or(GraphError::Empty("mean"))?).into_dyn(),
        UnaryOp::MeanRows => {
            if input.ndim() == 0 {
                return Err(GraphError::Empty("mean_rows"));
            }
            input
                .mean_axis(Axis(0))
                .ok_or(GraphError::Empty("mean_rows"))?
        }
    };
    Ok(output)
}

fn shape_error(op: &'static str, lhs: &Tensor, rhs: &Tensor) -> GraphError {
    GraphError::Shape {
        op,
        lhs: lhs.shape().to_vec(),
        rhs: rhs.shape().to_vec(),
    }
}

/// Result shape of broadcasting `lhs` against `rhs`, aligning trailing axes.
fn broadcast_shape(lhs: &[usize], rhs: &[usize]) -> Option<Vec<usize>> {
    let ndim = lhs.len().max(rhs.len());
    let mut shape = vec![0; ndim];
    for (i, dim) in shape.iter_mut().enumerate() {
        let l = (i + lhs.len()).checked_sub(ndim).map_or(1, |j| lhs[j]);
        let r = (i + rhs.len()).checked_sub(ndim).map_or(1, |j| rhs[j]);
        *dim = match (l, r) {
            (l, r) if l == r => l,
            (1, r) => r,
            (l, 1) => l,
            _ => return None,
        };
    }
    Some(shape)
}

fn zip_broadcast<F>(op: &'static str, lhs: &Tensor, rhs: &Tensor, f: F) -> Result<Tensor, GraphError>
where
    F: Fn(f32, f32) -> f32,
{
    let shape =
        broadcast_shape(lhs.shape(), rhs.shape()).ok_or_else(|| shape_error(op, lhs, rhs))?;
    match (lhs.broadcast(shape.clone()), rhs.broadcast(shape)) {
        (Some(l), Some(r)) => Ok(Zip::from(&l).and(&r).map_collect(|&l, &r| f(l, r))),
        _ => Err(shape_error(op, lhs, rhs)),
    }
}

fn compute_binary(op: BinaryOp, lhs: &Tensor, rhs: &Tensor) -> Result<Tensor, GraphError> {
    match op {
        BinaryOp::Add => zip_broadcast("add", lhs, rhs, |l, r| l + r),
        BinaryOp::Sub => zip_broadcast("sub", lhs, rhs, |l, r| l - r),
        BinaryOp::Mul => zip_broadcast("mul", lhs, rhs, |l, r| l * r),
        BinaryOp::MatMul => {
            let l = lhs
                .view()
                .into_dimensionality::<Ix2>()
                .map_err(|_| GraphError::NotAMatrix {
                    op: "dot",
                    rank: lhs.ndim(),
                })?;
            let r = rhs
                .view()
                .into_dimensionality::<Ix2>()
                .map_err(|_| GraphError::NotAMatrix {
                    op: "dot",
                    rank: rhs.ndim(),
                })?;
            if l.ncols() != r.nrows() {
                return Err(shape_error("dot", lhs, rhs));
            }
            Ok(l.dot(&r).into_dyn())
        }
    }
}

fn compute_dropout(input: &Tensor, rate: f32) -> Tensor {
    if rate <= 0.0 {
        return input.clone();
    }
    let keep = 1.0 - rate;
    let mask = Tensor::random(input.raw_dim(), Uniform::new(0.0f32, 1.0));
    Zip::from(input)
        .and(&mask)
        .map_collect(|&v, &m| if m < keep { v / keep } else { 0.0 })
}
