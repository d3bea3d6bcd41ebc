//! Operator kinds and their local derivative rules.
//!
//! Every recorded node carries an [`Op`]. The op knows how to evaluate itself,
//! how to push a tangent forward (JVP) and how to pull an adjoint back (VJP).
//! Binary element-wise ops broadcast a length-1 operand against the other one.

use std::rc::Rc;

use crate::error::{Error, Result};

/// The operation performed by a node.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Leaf: a value made differentiable with `enable_grad`, a constant operand,
    /// or a node whose producing edges were cut.
    Leaf,
    /// Addition: inputs[0] + inputs[1]
    Add,
    /// Subtraction: inputs[0] - inputs[1]
    Sub,
    /// Multiplication: inputs[0] * inputs[1]
    Mul,
    /// Division: inputs[0] / inputs[1]
    Div,
    /// Negation: -inputs[0]
    Neg,
    /// Multiplication by a constant factor.
    Scale(f64),
    /// Power with constant exponent: inputs[0]^exponent
    Pow { exponent: f64 },
    Exp,
    Log,
    Sin,
    Cos,
    Sqrt,
    Abs,
    /// Clamp into `[lo, hi]`; the derivative is zero outside the interval.
    Clamp { lo: f64, hi: f64 },
    /// Sum of all elements (scalar output).
    Sum,
    /// Mean of all elements (scalar output).
    Mean,
    /// Output element `k` is input element `indices[k]`.
    Gather { indices: Rc<[usize]> },
}

/// Element `i` of `x`, reading a length-1 payload as a broadcast scalar.
#[inline]
pub(crate) fn at(x: &[f64], i: usize) -> f64 {
    if x.len() == 1 {
        x[0]
    } else {
        x[i]
    }
}

/// Length of the result of a broadcasting binary op.
pub(crate) fn broadcast_len(context: &str, a: usize, b: usize) -> Result<usize> {
    match (a, b) {
        _ if a == b => Ok(a),
        (1, n) | (n, 1) => Ok(n),
        _ => Err(Error::shape_mismatch(context, a, b)),
    }
}

/// Repeat a length-1 payload to `len`, or check that it already has that length.
pub(crate) fn expand(data: &[f64], len: usize, context: &str) -> Result<Vec<f64>> {
    match data.len() {
        n if n == len => Ok(data.to_vec()),
        1 => Ok(vec![data[0]; len]),
        n => Err(Error::shape_mismatch(context, len, n)),
    }
}

/// Sum a broadcast adjoint back down to the operand's length.
fn reduce_to(adjoint: Vec<f64>, len: usize) -> Vec<f64> {
    if adjoint.len() == len {
        adjoint
    } else {
        vec![adjoint.iter().sum()]
    }
}

impl Op {
    /// Number of inputs the op consumes.
    pub fn arity(&self) -> usize {
        match self {
            Op::Leaf => 0,
            Op::Add | Op::Sub | Op::Mul | Op::Div => 2,
            _ => 1,
        }
    }

    /// Whether the op maps each element independently of the others.
    fn is_elementwise_unary(&self) -> bool {
        matches!(
            self,
            Op::Neg
                | Op::Scale(_)
                | Op::Pow { .. }
                | Op::Exp
                | Op::Log
                | Op::Sin
                | Op::Cos
                | Op::Sqrt
                | Op::Abs
                | Op::Clamp { .. }
        )
    }

    fn apply_scalar(&self, x: f64) -> f64 {
        match self {
            Op::Neg => -x,
            Op::Scale(c) => c * x,
            Op::Pow { exponent } => x.powf(*exponent),
            Op::Exp => x.exp(),
            Op::Log => x.ln(),
            Op::Sin => x.sin(),
            Op::Cos => x.cos(),
            Op::Sqrt => x.sqrt(),
            Op::Abs => x.abs(),
            Op::Clamp { lo, hi } => x.clamp(*lo, *hi),
            _ => x,
        }
    }

    /// d(output)/d(input) for element-wise unary ops, given input `x` and output `y`.
    fn unary_derivative(&self, x: f64, y: f64) -> f64 {
        match self {
            Op::Neg => -1.0,
            Op::Scale(c) => *c,
            Op::Pow { exponent } => exponent * x.powf(exponent - 1.0),
            Op::Exp => y,
            Op::Log => 1.0 / x,
            Op::Sin => x.cos(),
            Op::Cos => -x.sin(),
            Op::Sqrt => 0.5 / y,
            Op::Abs => {
                if x == 0.0 {
                    0.0
                } else {
                    x.signum()
                }
            }
            Op::Clamp { lo, hi } => {
                if (*lo..=*hi).contains(&x) {
                    1.0
                } else {
                    0.0
                }
            }
            _ => 0.0,
        }
    }

    /// Evaluate the op on its input payloads.
    pub fn eval(&self, inputs: &[&[f64]]) -> Result<Vec<f64>> {
        match self {
            Op::Leaf => Ok(inputs.first().map_or_else(Vec::new, |x| x.to_vec())),
            Op::Add => eval_binary("add", inputs, |a, b| a + b),
            Op::Sub => eval_binary("sub", inputs, |a, b| a - b),
            Op::Mul => eval_binary("mul", inputs, |a, b| a * b),
            Op::Div => eval_binary("div", inputs, |a, b| a / b),
            Op::Gather { indices } => {
                let x = inputs[0];
                indices
                    .iter()
                    .map(|&j| {
                        x.get(j)
                            .copied()
                            .ok_or_else(|| Error::shape_mismatch("gather", x.len(), j + 1))
                    })
                    .collect()
            }
            _ => Ok(self.eval_unary(inputs[0])),
        }
    }

    /// Evaluate a single-input op that cannot fail (everything but `Gather`).
    pub(crate) fn eval_unary(&self, x: &[f64]) -> Vec<f64> {
        match self {
            Op::Sum => vec![x.iter().sum()],
            Op::Mean => vec![x.iter().sum::<f64>() / x.len().max(1) as f64],
            _ => x.iter().map(|&x| self.apply_scalar(x)).collect(),
        }
    }

    /// Forward-mode rule: the output tangent given input tangents.
    ///
    /// `tangents[k]` is `None` when input `k` carries no derivative (an
    /// untracked operand or a cut edge). Returns `None` when no input does.
    pub fn jvp(
        &self,
        inputs: &[&[f64]],
        output: &[f64],
        tangents: &[Option<&[f64]>],
    ) -> Option<Vec<f64>> {
        if tangents.iter().all(Option::is_none) {
            return None;
        }
        let n = output.len();
        let t = |k: usize, i: usize| tangents[k].map_or(0.0, |t| at(t, i));

        let tangent: Vec<f64> = match self {
            Op::Leaf => return None,
            Op::Add => (0..n).map(|i| t(0, i) + t(1, i)).collect(),
            Op::Sub => (0..n).map(|i| t(0, i) - t(1, i)).collect(),
            Op::Mul => {
                let (a, b) = (inputs[0], inputs[1]);
                (0..n)
                    .map(|i| t(0, i) * at(b, i) + at(a, i) * t(1, i))
                    .collect()
            }
            Op::Div => {
                let (a, b) = (inputs[0], inputs[1]);
                (0..n)
                    .map(|i| {
                        let b_i = at(b, i);
                        t(0, i) / b_i - at(a, i) * t(1, i) / (b_i * b_i)
                    })
                    .collect()
            }
            Op::Sum => vec![(0..inputs[0].len()).map(|i| t(0, i)).sum::<f64>()],
            Op::Mean => {
                let len = inputs[0].len().max(1);
                vec![(0..inputs[0].len()).map(|i| t(0, i)).sum::<f64>() / len as f64]
            }
            Op::Gather { indices } => indices.iter().map(|&j| t(0, j)).collect(),
            _ => {
                debug_assert!(self.is_elementwise_unary());
                let x = inputs[0];
                (0..n)
                    .map(|i| self.unary_derivative(x[i], output[i]) * t(0, i))
                    .collect()
            }
        };
        Some(tangent)
    }

    /// Reverse-mode rule: one adjoint per input, each shaped like that input.
    pub fn vjp(&self, inputs: &[&[f64]], output: &[f64], adjoint: &[f64]) -> Vec<Vec<f64>> {
        let n = output.len();
        match self {
            Op::Leaf => vec![],
            Op::Add => {
                let (la, lb) = (inputs[0].len(), inputs[1].len());
                vec![
                    reduce_to(adjoint.to_vec(), la),
                    reduce_to(adjoint.to_vec(), lb),
                ]
            }
            Op::Sub => {
                let (la, lb) = (inputs[0].len(), inputs[1].len());
                vec![
                    reduce_to(adjoint.to_vec(), la),
                    reduce_to(adjoint.iter().map(|g| -g).collect(), lb),
                ]
            }
            Op::Mul => {
                let (a, b) = (inputs[0], inputs[1]);
                vec![
                    reduce_to((0..n).map(|i| adjoint[i] * at(b, i)).collect(), a.len()),
                    reduce_to((0..n).map(|i| adjoint[i] * at(a, i)).collect(), b.len()),
                ]
            }
            Op::Div => {
                let (a, b) = (inputs[0], inputs[1]);
                vec![
                    reduce_to((0..n).map(|i| adjoint[i] / at(b, i)).collect(), a.len()),
                    reduce_to(
                        (0..n)
                            .map(|i| {
                                let b_i = at(b, i);
                                -adjoint[i] * at(a, i) / (b_i * b_i)
                            })
                            .collect(),
                        b.len(),
                    ),
                ]
            }
            Op::Sum => vec![vec![adjoint[0]; inputs[0].len()]],
            Op::Mean => {
                let len = inputs[0].len();
                vec![vec![adjoint[0] / len.max(1) as f64; len]]
            }
            Op::Gather { indices } => {
                let mut grad = vec![0.0; inputs[0].len()];
                for (k, &j) in indices.iter().enumerate() {
                    grad[j] += adjoint[k];
                }
                vec![grad]
            }
            _ => {
                let x = inputs[0];
                vec![(0..n)
                    .map(|i| adjoint[i] * self.unary_derivative(x[i], output[i]))
                    .collect()]
            }
        }
    }
}

fn eval_binary(context: &str, inputs: &[&[f64]], f: impl Fn(f64, f64) -> f64) -> Result<Vec<f64>> {
    let (a, b) = (inputs[0], inputs[1]);
    let n = broadcast_len(context, a.len(), b.len())?;
    Ok((0..n).map(|i| f(at(a, i), at(b, i))).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_len() {
        assert_eq!(broadcast_len("t", 3, 3).unwrap(), 3);
        assert_eq!(broadcast_len("t", 1, 4).unwrap(), 4);
        assert_eq!(broadcast_len("t", 4, 1).unwrap(), 4);
        assert!(matches!(
            broadcast_len("t", 2, 3),
            Err(Error::ShapeMismatch { expected: 2, found: 3, .. })
        ));
    }

    #[test]
    fn test_mul_vjp_reduces_broadcast_operand() {
        // z = s * [1, 2, 3] with scalar s: dz/ds summed over the broadcast = 6
        let s = [2.0];
        let v = [1.0, 2.0, 3.0];
        let out = Op::Mul.eval(&[&s, &v]).unwrap();
        let grads = Op::Mul.vjp(&[&s, &v], &out, &[1.0, 1.0, 1.0]);
        assert_eq!(grads[0], vec![6.0]);
        assert_eq!(grads[1], vec![2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_gather_scatter_adds() {
        let idx: Rc<[usize]> = Rc::from(vec![0, 1, 0, 2]);
        let op = Op::Gather { indices: idx };
        let x = [10.0, 20.0, 30.0];
        let out = op.eval(&[&x]).unwrap();
        assert_eq!(out, vec![10.0, 20.0, 10.0, 30.0]);
        let grads = op.vjp(&[&x], &out, &[1.0, 1.0, 1.0, 1.0]);
        assert_eq!(grads[0], vec![2.0, 1.0, 1.0]);
    }

    #[test]
    fn test_gather_out_of_range() {
        let op = Op::Gather {
            indices: Rc::from(vec![5]),
        };
        assert!(op.eval(&[&[1.0, 2.0]]).is_err());
    }

    #[test]
    fn test_jvp_without_tangents_is_none() {
        let out = Op::Add.eval(&[&[1.0], &[2.0]]).unwrap();
        assert!(Op::Add.jvp(&[&[1.0], &[2.0]], &out, &[None, None]).is_none());
    }

    #[test]
    fn test_clamp_derivative_masks_outside() {
        let op = Op::Clamp { lo: 0.0, hi: 1.0 };
        let x = [-0.5, 0.5, 1.5];
        let out = op.eval(&[&x]).unwrap();
        assert_eq!(out, vec![0.0, 0.5, 1.0]);
        let grads = op.vjp(&[&x], &out, &[1.0, 1.0, 1.0]);
        assert_eq!(grads[0], vec![0.0, 1.0, 0.0]);
    }
}
