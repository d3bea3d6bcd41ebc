//! Optimizers over named scene parameters.

mod adam;
mod sgd;

pub use adam::{Adam, AdamConfig};
pub use sgd::Sgd;

use dr_core::{Error, Graph, ParamKey, Result, Value};

/// A first-order optimizer holding its own copy of each parameter.
///
/// Parameters are read back through [`Optimizer::get`] after a step and
/// pushed into the scene by the parameter registry.
pub trait Optimizer {
    /// Keys of every held parameter, in sorted order.
    fn keys(&self) -> Vec<ParamKey>;

    fn get(&self, key: &str) -> Result<&Value>;

    /// Replace a parameter's value. Existing optimizer state is kept; a new
    /// key starts with fresh state.
    fn set(&mut self, key: ParamKey, value: Value);

    fn remove(&mut self, key: &str) -> Option<Value>;

    /// Apply one update using the gradients `graph` holds for each parameter.
    ///
    /// A parameter the graph does not track has a zero gradient. Afterwards
    /// every parameter is an untracked value holding the new payload.
    fn step(&mut self, graph: &Graph) -> Result<()>;

    fn learning_rate(&self) -> f64;

    fn set_learning_rate(&mut self, lr: f64);

    /// Enable gradients on every held parameter and return the tracked values.
    fn track(&mut self, graph: &Graph) -> Result<Vec<(ParamKey, Value)>> {
        let mut tracked = Vec::new();
        for key in self.keys() {
            let mut value = self.get(key.as_str())?.clone();
            graph.enable_grad(&mut value)?;
            self.set(key.clone(), value.clone());
            tracked.push((key, value));
        }
        Ok(tracked)
    }
}

/// Gradient of a held parameter, zero when the graph does not track it.
pub(crate) fn gradient_of(graph: &Graph, key: &ParamKey, value: &Value) -> Result<Vec<f64>> {
    if graph.node_of(value).is_none() {
        return Ok(vec![0.0; value.len()]);
    }
    let grad = graph.grad(value)?;
    if grad.len() != value.len() {
        return Err(Error::shape_mismatch(
            format!("gradient of '{key}'"),
            value.len(),
            grad.len(),
        ));
    }
    Ok(grad.into_vec())
}
