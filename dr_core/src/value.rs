//! Differentiable values.
//!
//! A [`Value`] is a flat `f64` payload: a scalar, an RGB triple, or a longer
//! vector such as an image. It optionally refers to a node in a [`Graph`];
//! operations on tracked values record new nodes, operations on untracked
//! values compute eagerly and touch no graph at all.

use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::graph::{Graph, NodeId};
use crate::ops::Op;

/// Link from a value to its node. Only valid while the graph's epoch matches.
#[derive(Debug, Clone)]
pub(crate) struct NodeRef {
    pub(crate) graph: Graph,
    pub(crate) id: NodeId,
    pub(crate) epoch: u64,
}

impl NodeRef {
    pub(crate) fn is_live(&self) -> bool {
        self.graph.epoch() == self.epoch
    }
}

/// A numeric payload that may participate in differentiation.
#[derive(Clone)]
pub struct Value {
    data: Vec<f64>,
    node: Option<NodeRef>,
}

impl Value {
    pub fn scalar(x: f64) -> Self {
        Value::from_vec(vec![x])
    }

    pub fn rgb(r: f64, g: f64, b: f64) -> Self {
        Value::from_vec(vec![r, g, b])
    }

    pub fn from_vec(data: Vec<f64>) -> Self {
        Value { data, node: None }
    }

    pub fn zeros(len: usize) -> Self {
        Value::full(len, 0.0)
    }

    pub fn full(len: usize, x: f64) -> Self {
        Value::from_vec(vec![x; len])
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The single element of a scalar value.
    ///
    /// # Panics
    /// If the value does not hold exactly one element.
    pub fn item(&self) -> f64 {
        assert_eq!(self.data.len(), 1, "item() called on a value of length {}", self.data.len());
        self.data[0]
    }

    /// Whether the value belongs to the current epoch of some graph.
    pub fn is_tracked(&self) -> bool {
        self.live_node().is_some()
    }

    /// The graph tracking this value, if any.
    pub fn graph(&self) -> Option<Graph> {
        self.live_node().map(|r| r.graph.clone())
    }

    /// An untracked copy of the payload.
    pub fn detach(&self) -> Value {
        Value::from_vec(self.data.clone())
    }

    pub(crate) fn node_ref(&self) -> Option<&NodeRef> {
        self.node.as_ref()
    }

    pub(crate) fn attach(&mut self, node: NodeRef) {
        self.node = Some(node);
    }

    fn live_node(&self) -> Option<&NodeRef> {
        self.node.as_ref().filter(|r| r.is_live())
    }

    /// Apply a single-input op that cannot fail.
    fn unary(&self, op: Op) -> Value {
        let data = op.eval_unary(&self.data);
        let node = self
            .live_node()
            .map(|r| r.graph.record(op, vec![r.id], data.clone()));
        Value { data, node }
    }

    fn binary(&self, op: Op, rhs: &Value) -> Result<Value> {
        let data = op.eval(&[&self.data, &rhs.data])?;
        let graph = match (self.live_node(), rhs.live_node()) {
            (Some(a), Some(b)) if !a.graph.ptr_eq(&b.graph) => return Err(Error::ForeignGraph),
            (Some(r), _) | (None, Some(r)) => r.graph.clone(),
            (None, None) => return Ok(Value::from_vec(data)),
        };
        let inputs = vec![self.input_in(&graph), rhs.input_in(&graph)];
        let node = graph.record(op, inputs, data.clone());
        Ok(Value {
            data,
            node: Some(node),
        })
    }

    /// This value's node in `graph`, recording it as a constant leaf if untracked.
    fn input_in(&self, graph: &Graph) -> NodeId {
        match self.live_node() {
            Some(r) => r.id,
            None => graph.record(Op::Leaf, Vec::new(), self.data.clone()).id,
        }
    }

    pub fn try_add(&self, rhs: &Value) -> Result<Value> {
        self.binary(Op::Add, rhs)
    }

    pub fn try_sub(&self, rhs: &Value) -> Result<Value> {
        self.binary(Op::Sub, rhs)
    }

    pub fn try_mul(&self, rhs: &Value) -> Result<Value> {
        self.binary(Op::Mul, rhs)
    }

    pub fn try_div(&self, rhs: &Value) -> Result<Value> {
        self.binary(Op::Div, rhs)
    }

    pub fn scale(&self, factor: f64) -> Value {
        self.unary(Op::Scale(factor))
    }

    pub fn powf(&self, exponent: f64) -> Value {
        self.unary(Op::Pow { exponent })
    }

    pub fn sqr(&self) -> Value {
        self.powf(2.0)
    }

    pub fn sqrt(&self) -> Value {
        self.unary(Op::Sqrt)
    }

    pub fn exp(&self) -> Value {
        self.unary(Op::Exp)
    }

    /// Natural logarithm.
    pub fn log(&self) -> Value {
        self.unary(Op::Log)
    }

    pub fn sin(&self) -> Value {
        self.unary(Op::Sin)
    }

    pub fn cos(&self) -> Value {
        self.unary(Op::Cos)
    }

    pub fn abs(&self) -> Value {
        self.unary(Op::Abs)
    }

    /// Clamp every element into `[lo, hi]`. Clamped elements pass no derivative.
    pub fn clamp(&self, lo: f64, hi: f64) -> Value {
        self.unary(Op::Clamp { lo, hi })
    }

    pub fn sum(&self) -> Value {
        self.unary(Op::Sum)
    }

    pub fn mean(&self) -> Value {
        self.unary(Op::Mean)
    }

    /// Select elements by index; indices may repeat.
    pub fn gather(&self, indices: &[usize]) -> Result<Value> {
        let op = Op::Gather {
            indices: Rc::from(indices),
        };
        let data = op.eval(&[&self.data])?;
        let node = self
            .live_node()
            .map(|r| r.graph.record(op, vec![r.id], data.clone()));
        Ok(Value { data, node })
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Value");
        s.field("data", &self.data);
        match self.live_node() {
            Some(r) => s.field("node", &r.id.index()),
            None => s.field("node", &None::<usize>),
        };
        s.finish()
    }
}

/// Values compare by payload; tracking is ignored.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::scalar(x)
    }
}

impl From<Vec<f64>> for Value {
    fn from(data: Vec<f64>) -> Self {
        Value::from_vec(data)
    }
}

impl From<[f64; 3]> for Value {
    fn from([r, g, b]: [f64; 3]) -> Self {
        Value::rgb(r, g, b)
    }
}

fn or_panic(result: Result<Value>) -> Value {
    result.unwrap_or_else(|e| panic!("{e}"))
}

// Operators panic where the `try_*` methods return an error.
macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $try:ident) => {
        impl $trait<&Value> for &Value {
            type Output = Value;
            fn $method(self, rhs: &Value) -> Value {
                or_panic(self.$try(rhs))
            }
        }

        impl $trait<Value> for Value {
            type Output = Value;
            fn $method(self, rhs: Value) -> Value {
                or_panic(self.$try(&rhs))
            }
        }

        impl $trait<&Value> for Value {
            type Output = Value;
            fn $method(self, rhs: &Value) -> Value {
                or_panic(self.$try(rhs))
            }
        }

        impl $trait<Value> for &Value {
            type Output = Value;
            fn $method(self, rhs: Value) -> Value {
                or_panic(self.$try(&rhs))
            }
        }
    };
}

impl_binary_op!(Add, add, try_add);
impl_binary_op!(Sub, sub, try_sub);
impl_binary_op!(Mul, mul, try_mul);
impl_binary_op!(Div, div, try_div);

macro_rules! impl_scalar_op {
    ($lhs:ty) => {
        impl Add<f64> for $lhs {
            type Output = Value;
            fn add(self, rhs: f64) -> Value {
                or_panic(self.try_add(&Value::scalar(rhs)))
            }
        }

        impl Sub<f64> for $lhs {
            type Output = Value;
            fn sub(self, rhs: f64) -> Value {
                or_panic(self.try_sub(&Value::scalar(rhs)))
            }
        }

        impl Mul<f64> for $lhs {
            type Output = Value;
            fn mul(self, rhs: f64) -> Value {
                self.scale(rhs)
            }
        }

        impl Div<f64> for $lhs {
            type Output = Value;
            fn div(self, rhs: f64) -> Value {
                self.scale(1.0 / rhs)
            }
        }

        impl Add<$lhs> for f64 {
            type Output = Value;
            fn add(self, rhs: $lhs) -> Value {
                or_panic(Value::scalar(self).try_add(&rhs))
            }
        }

        impl Sub<$lhs> for f64 {
            type Output = Value;
            fn sub(self, rhs: $lhs) -> Value {
                or_panic(Value::scalar(self).try_sub(&rhs))
            }
        }

        impl Mul<$lhs> for f64 {
            type Output = Value;
            fn mul(self, rhs: $lhs) -> Value {
                rhs.scale(self)
            }
        }

        impl Div<$lhs> for f64 {
            type Output = Value;
            fn div(self, rhs: $lhs) -> Value {
                or_panic(Value::scalar(self).try_div(&rhs))
            }
        }

        impl Neg for $lhs {
            type Output = Value;
            fn neg(self) -> Value {
                self.unary(Op::Neg)
            }
        }
    };
}

impl_scalar_op!(Value);
impl_scalar_op!(&Value);
