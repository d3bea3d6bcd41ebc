//! # dr_optim - First-order optimizers for scene parameters
//!
//! Optimizers hold their own copy of every parameter, keyed by [`ParamKey`].
//! One iteration tracks the parameters on a fresh graph, renders, computes a
//! loss, runs the backward pass and steps:
//!
//! ```
//! use dr_core::{AdFlags, Graph, ParamKey, Value};
//! use dr_optim::{mse, Adam, Optimizer};
//!
//! let key = ParamKey::parse("green.reflectance.value")?;
//! let target = Value::rgb(0.2, 0.5, 0.8);
//!
//! let mut opt = Adam::new(0.05);
//! opt.add(key.clone(), Value::rgb(0.5, 0.5, 0.5));
//!
//! let graph = Graph::new();
//! for _ in 0..100 {
//!     let params = opt.track(&graph)?;
//!     let loss = mse(&params[0].1, &target)?;
//!     graph.backward(&loss, AdFlags::NONE)?;
//!     opt.step(&graph)?;
//!     graph.reset();
//! }
//! let recovered = opt.get(key.as_str())?;
//! assert!((recovered.data()[0] - 0.2).abs() < 0.05);
//! # Ok::<(), dr_core::Error>(())
//! ```

pub mod loss;
pub mod optim;

pub use dr_core::ParamKey;
pub use loss::{mse, squared_error};
pub use optim::{Adam, AdamConfig, Optimizer, Sgd};
