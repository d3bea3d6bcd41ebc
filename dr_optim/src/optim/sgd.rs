//! Stochastic Gradient Descent optimizer.

use std::collections::BTreeMap;

use dr_core::{Error, Graph, ParamKey, Result, Value};

use super::{gradient_of, Optimizer};

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    velocity: Vec<f64>,
}

/// SGD optimizer with optional momentum.
#[derive(Debug, Clone)]
pub struct Sgd {
    /// Learning rate.
    pub lr: f64,
    /// Momentum coefficient.
    pub momentum: f64,
    params: BTreeMap<ParamKey, Entry>,
}

impl Sgd {
    pub fn new(lr: f64) -> Self {
        Sgd::with_momentum(lr, 0.0)
    }

    pub fn with_momentum(lr: f64, momentum: f64) -> Self {
        Sgd {
            lr,
            momentum,
            params: BTreeMap::new(),
        }
    }

    /// Register a parameter with a zero velocity, replacing any previous state.
    pub fn add(&mut self, key: ParamKey, value: Value) {
        let velocity = vec![0.0; value.len()];
        self.params.insert(
            key,
            Entry {
                value: value.detach(),
                velocity,
            },
        );
    }
}

impl Optimizer for Sgd {
    fn keys(&self) -> Vec<ParamKey> {
        self.params.keys().cloned().collect()
    }

    fn get(&self, key: &str) -> Result<&Value> {
        self.params
            .get(key)
            .map(|entry| &entry.value)
            .ok_or_else(|| Error::KeyNotFound(key.to_string()))
    }

    fn set(&mut self, key: ParamKey, value: Value) {
        match self.params.get_mut(key.as_str()) {
            Some(entry) => entry.value = value,
            None => self.add(key, value),
        }
    }

    fn remove(&mut self, key: &str) -> Option<Value> {
        self.params.remove(key).map(|entry| entry.value)
    }

    fn step(&mut self, graph: &Graph) -> Result<()> {
        let mut grads = Vec::with_capacity(self.params.len());
        for (key, entry) in &self.params {
            if entry.velocity.len() != entry.value.len() {
                return Err(Error::shape_mismatch(
                    format!("optimizer state of '{key}'"),
                    entry.velocity.len(),
                    entry.value.len(),
                ));
            }
            grads.push(gradient_of(graph, key, &entry.value)?);
        }

        for (entry, grad) in self.params.values_mut().zip(grads) {
            let mut data = entry.value.data().to_vec();
            if self.momentum > 0.0 {
                // v = momentum * v + grad; param = param - lr * v
                for ((x, v), g) in data.iter_mut().zip(&mut entry.velocity).zip(&grad) {
                    *v = self.momentum * *v + g;
                    *x -= self.lr * *v;
                }
            } else {
                for (x, g) in data.iter_mut().zip(&grad) {
                    *x -= self.lr * g;
                }
            }
            entry.value = Value::from_vec(data);
        }
        log::debug!("sgd step over {} parameters", self.params.len());
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.lr
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.lr = lr;
    }
}
