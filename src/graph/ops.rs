//! Constructors for expression nodes. Shapes are only checked when the expression is evaluated,
//! since the batch size of an input is unknown until then.

use crate::graph::{BinaryOp, Expr, Node, UnaryOp};

fn unary(op: UnaryOp, input: &Expr) -> Expr {
    Expr::from_node(Node::Unary(op, input.clone()))
}

fn binary(op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Expr {
    Expr::from_node(Node::Binary(op, lhs.clone(), rhs.clone()))
}

/// Elementwise sum with broadcasting.
pub fn add(lhs: &Expr, rhs: &Expr) -> Expr {
    binary(BinaryOp::Add, lhs, rhs)
}

/// Elementwise difference with broadcasting.
pub fn sub(lhs: &Expr, rhs: &Expr) -> Expr {
    binary(BinaryOp::Sub, lhs, rhs)
}

/// Elementwise product with broadcasting.
pub fn mul(lhs: &Expr, rhs: &Expr) -> Expr {
    binary(BinaryOp::Mul, lhs, rhs)
}

/// Matrix product of two rank-2 operands.
pub fn matmul(lhs: &Expr, rhs: &Expr) -> Expr {
    binary(BinaryOp::MatMul, lhs, rhs)
}

pub fn relu(input: &Expr) -> Expr {
    unary(UnaryOp::Relu, input)
}

pub fn sigmoid(input: &Expr) -> Expr {
    unary(UnaryOp::Sigmoid, input)
}

pub fn tanh(input: &Expr) -> Expr {
    unary(UnaryOp::Tanh, input)
}

pub fn abs(input: &Expr) -> Expr {
    unary(UnaryOp::Abs, input)
}

pub fn square(input: &Expr) -> Expr {
    unary(UnaryOp::Square, input)
}

pub fn scale(input: &Expr, factor: f32) -> Expr {
    unary(UnaryOp::Scale(factor), input)
}

/// 1.0 where the element is strictly below `threshold`, 0.0 elsewhere.
pub fn less_than(input: &Expr, threshold: f32) -> Expr {
    unary(UnaryOp::LessThan(threshold), input)
}

/// Mean over every element, as a scalar.
pub fn mean(input: &Expr) -> Expr {
    unary(UnaryOp::Mean, input)
}

/// Mean along the batch axis (axis 0).
pub fn mean_rows(input: &Expr) -> Expr {
    unary(UnaryOp::MeanRows, input)
}

/// Inverted dropout: each element is zeroed with probability `rate` and survivors are scaled by
/// `1 / (1 - rate)`. A new mask is drawn on every evaluation.
pub fn dropout(input: &Expr, rate: f32) -> Expr {
    Expr::from_node(Node::Dropout {
        input: input.clone(),
        rate,
    })
}
