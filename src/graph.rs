pub mod eval;
pub mod function;
pub mod ops;

use std::{
    cell::{Ref, RefCell},
    collections::HashSet,
    fmt,
    rc::Rc,
};

use ndarray::{arr0, ArrayD};
use thiserror::Error;

pub use eval::{Bindings, Evaluator};
pub use function::{Argument, Function, Input, Update};
pub use ops::{
    abs, add, dropout, less_than, matmul, mean, mean_rows, mul, relu, scale, sigmoid, square, sub,
    tanh,
};

pub type Tensor = ArrayD<f32>;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("no value bound for input `{0}`")]
    Unbound(String),
    #[error("input `{name}` expects rank {expected}, got rank {actual}")]
    Rank {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("`{op}` cannot combine shapes {lhs:?} and {rhs:?}")]
    Shape {
        op: &'static str,
        lhs: Vec<usize>,
        rhs: Vec<usize>,
    },
    #[error("`{op}` expects a matrix, got rank {rank}")]
    NotAMatrix { op: &'static str, rank: usize },
    #[error("`{0}` applied to an empty tensor")]
    Empty(&'static str),
    #[error("expected {expected} inputs, got {actual}")]
    Arity { expected: usize, actual: usize },
    #[error("input `{0}` holds f64 values and input downcasting is disabled")]
    Downcast(String),
}

/// Named symbolic input of a fixed rank.
/// Two placeholders are the same input only if they share the handle, names are labels.
#[derive(Clone)]
pub struct Placeholder(Rc<PlaceholderInner>);

struct PlaceholderInner {
    name: String,
    rank: usize,
}

impl Placeholder {
    pub fn new(name: impl Into<String>, rank: usize) -> Self {
        Self(Rc::new(PlaceholderInner {
            name: name.into(),
            rank,
        }))
    }

    /// Rank-2 input laid out as (batch_size, n_features).
    pub fn matrix(name: impl Into<String>) -> Self {
        Self::new(name, 2)
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn rank(&self) -> usize {
        self.0.rank
    }

    pub(crate) fn key(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }
}

impl PartialEq for Placeholder {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Placeholder {}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Debug for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Placeholder({}, rank {})", self.name(), self.rank())
    }
}

/// Tensor whose storage is shared between every clone of the handle.
/// Layers keep their weights in `Shared` values so that an expression built once always reads
/// the current value.
#[derive(Clone)]
pub struct Shared(Rc<SharedInner>);

struct SharedInner {
    name: String,
    value: RefCell<Tensor>,
}

impl Shared {
    pub fn new(name: impl Into<String>, value: Tensor) -> Self {
        Self(Rc::new(SharedInner {
            name: name.into(),
            value: RefCell::new(value),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn value(&self) -> Ref<Tensor> {
        self.0.value.borrow()
    }

    /// Snapshot of the current value.
    pub fn get_value(&self) -> Tensor {
        self.value().clone()
    }

    pub fn set_value(&self, value: Tensor) {
        *self.0.value.borrow_mut() = value;
    }

    pub fn shape(&self) -> Vec<usize> {
        self.value().shape().to_vec()
    }

    /// Number of scalar elements.
    pub fn size(&self) -> usize {
        self.value().len()
    }
}

impl PartialEq for Shared {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Shared {}

impl fmt::Display for Shared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Debug for Shared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shared({}, {:?})", self.name(), self.shape())
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum UnaryOp {
    Relu,
    Sigmoid,
    Tanh,
    Abs,
    Square,
    Scale(f32),
    LessThan(f32),
    Mean,
    MeanRows,
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    MatMul,
}

pub(crate) enum Node {
    Input(Placeholder),
    Shared(Shared),
    Constant(Tensor),
    Unary(UnaryOp, Expr),
    Binary(BinaryOp, Expr, Expr),
    Dropout { input: Expr, rate: f32 },
}

/// Node of a symbolic computation. Cloning is cheap and shares the node.
#[derive(Clone)]
pub struct Expr(Rc<Node>);

impl Expr {
    pub(crate) fn from_node(node: Node) -> Self {
        Self(Rc::new(node))
    }

    pub fn input(placeholder: &Placeholder) -> Self {
        Self::from_node(Node::Input(placeholder.clone()))
    }

    pub fn shared(shared: &Shared) -> Self {
        Self::from_node(Node::Shared(shared.clone()))
    }

    pub fn constant(value: Tensor) -> Self {
        Self::from_node(Node::Constant(value))
    }

    pub fn scalar(value: f32) -> Self {
        Self::constant(arr0(value).into_dyn())
    }

    pub(crate) fn node(&self) -> &Node {
        &self.0
    }

    pub(crate) fn key(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    /// True if both handles point at the same node.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Placeholders this expression depends on, in first-visit order.
    pub fn placeholders(&self) -> Vec<Placeholder> {
        let mut found = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![self.clone()];
        while let Some(expr) = stack.pop() {
            if !visited.insert(expr.key()) {
                continue;
            }
            match expr.node() {
                Node::Input(placeholder) => {
                    if !found.contains(placeholder) {
                        found.push(placeholder.clone());
                    }
                }
                Node::Shared(_) | Node::Constant(_) => {}
                Node::Unary(_, input) | Node::Dropout { input, .. } => stack.push(input.clone()),
                Node::Binary(_, lhs, rhs) => {
                    // Push rhs first so lhs is visited first.
                    stack.push(rhs.clone());
                    stack.push(lhs.clone());
                }
            }
        }
        found
    }
}

impl From<&Placeholder> for Expr {
    fn from(placeholder: &Placeholder) -> Self {
        Self::input(placeholder)
    }
}

impl From<&Shared> for Expr {
    fn from(shared: &Shared) -> Self {
        Self::shared(shared)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node() {
            Node::Input(placeholder) => write!(f, "{}", placeholder),
            Node::Shared(shared) => write!(f, "{}", shared),
            Node::Constant(value) => match value.ndim() {
                0 => write!(f, "{}", value.sum()),
                _ => write!(f, "constant{:?}", value.shape()),
            },
            Node::Unary(op, x) => match op {
                UnaryOp::Relu => write!(f, "relu({})", x),
                UnaryOp::Sigmoid => write!(f, "sigmoid({})", x),
                UnaryOp::Tanh => write!(f, "tanh({})", x),
                UnaryOp::Abs => write!(f, "abs({})", x),
                UnaryOp::Square => write!(f, "sqr({})", x),
                UnaryOp::Scale(factor) => write!(f, "({} * {})", factor, x),
                UnaryOp::LessThan(threshold) => write!(f, "({} < {})", x, threshold),
                UnaryOp::Mean => write!(f, "mean({})", x),
                UnaryOp::MeanRows => write!(f, "mean({}, axis=0)", x),
            },
            Node::Binary(op, lhs, rhs) => match op {
                BinaryOp::Add => write!(f, "({} + {})", lhs, rhs),
                BinaryOp::Sub => write!(f, "({} - {})", lhs, rhs),
                BinaryOp::Mul => write!(f, "({} * {})", lhs, rhs),
                BinaryOp::MatMul => write!(f, "dot({}, {})", lhs, rhs),
            },
            Node::Dropout { input, rate } => write!(f, "dropout({}, {})", input, rate),
        }
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Expr({})", self)
    }
}
