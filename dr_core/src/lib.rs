//! # dr_core - Differentiation substrate for inverse rendering
//!
//! This crate records the operations a renderer performs on tracked scene
//! parameters into an arena-backed computation graph and differentiates that
//! graph in either direction:
//!
//! - **forward mode** pushes a tangent from one seed to every dependent value
//!   (e.g. "how does every pixel change when this reflectance changes?")
//! - **backward mode** pulls the adjoint of one output back to every input
//!   (e.g. "how should every parameter move to reduce this loss?")
//!
//! ## Quick Start
//!
//! ```
//! use dr_core::{AdFlags, Graph, Value};
//!
//! let graph = Graph::new();
//!
//! // A reflectance and a fixed irradiance
//! let mut albedo = Value::rgb(0.2, 0.5, 0.8);
//! graph.enable_grad(&mut albedo)?;
//! let irradiance = Value::rgb(2.0, 2.0, 1.0);
//!
//! let radiance = &albedo * &irradiance;
//! let loss = (&radiance - 1.0).sqr().sum();
//!
//! graph.backward(&loss, AdFlags::NONE)?;
//! // d loss / d albedo = 2 (albedo * irradiance - 1) * irradiance
//! let grad = graph.grad(&albedo)?;
//! assert!((grad.data()[0] - 2.0 * (0.4 - 1.0) * 2.0).abs() < 1e-12);
//! # Ok::<(), dr_core::Error>(())
//! ```
//!
//! ## Forward mode with a shared seed
//!
//! ```
//! use dr_core::{AdFlags, Graph, Value};
//!
//! let graph = Graph::new();
//! let mut theta = Value::scalar(0.5);
//! graph.enable_grad(&mut theta)?;
//!
//! let color = &theta * &Value::rgb(0.2, 0.5, 0.8);
//! graph.forward(&theta, AdFlags::CLEAR_EDGES)?;
//! assert_eq!(graph.grad(&color)?.data(), &[0.2, 0.5, 0.8]);
//!
//! // The seed's edges are gone, so a later pass starting from `color`
//! // sees its tangent exactly once.
//! let doubled = &color * 2.0;
//! let grad = graph.forward_to(&doubled, AdFlags::NONE)?;
//! assert!((grad.data()[2] - 1.6).abs() < 1e-12);
//! # Ok::<(), dr_core::Error>(())
//! ```
//!
//! ## Supported Operations
//!
//! | Category | Operations |
//! |----------|------------|
//! | Arithmetic | `+`, `-`, `*`, `/`, unary `-`, [`Value::scale`] |
//! | Power | [`Value::powf`], [`Value::sqr`], [`Value::sqrt`] |
//! | Transcendental | [`Value::exp`], [`Value::log`], [`Value::sin`], [`Value::cos`] |
//! | Piecewise | [`Value::abs`], [`Value::clamp`] |
//! | Reductions | [`Value::sum`], [`Value::mean`] |
//! | Indexing | [`Value::gather`] |
//!
//! Binary operations broadcast a length-1 operand against the other operand.
//!
//! ## Architecture
//!
//! - **[`Value`]**: flat `f64` payload with an optional link to a graph node.
//! - **[`Graph`]**: shared handle to the node arena; owns gradient slots and
//!   runs the passes. [`Graph::reset`] drops every node at once.
//! - **[`ParamKey`]**: validated dot-separated parameter path.
//! - **[`finite_diff_grad`]**: numerical reference for validating both modes.

mod error;
mod finite_diff;
mod graph;
mod key;
mod ops;
mod value;

pub use error::{Error, Result};
pub use finite_diff::{directional_derivative, finite_diff_grad, max_abs_error};
pub use graph::{AdFlags, GradPolicy, Graph, GraphConfig, NodeId};
pub use key::ParamKey;
pub use ops::Op;
pub use value::Value;
