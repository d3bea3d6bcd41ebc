//! Adam optimizer.

use std::collections::BTreeMap;

use dr_core::{Error, Graph, ParamKey, Result, Value};

use super::{gradient_of, Optimizer};

/// Hyperparameters for [`Adam`].
#[derive(Debug, Clone, PartialEq)]
pub struct AdamConfig {
    /// Learning rate.
    pub lr: f64,
    /// Exponential decay rate for first moment.
    pub beta1: f64,
    /// Exponential decay rate for second moment.
    pub beta2: f64,
    /// Small constant for numerical stability.
    pub epsilon: f64,
    /// Leave entries with a zero gradient untouched: their moments and value
    /// keep their previous state. The step counter advances either way. With
    /// `false`, stale momentum keeps moving entries whose gradient vanished.
    pub mask_updates: bool,
}

impl Default for AdamConfig {
    fn default() -> Self {
        AdamConfig {
            lr: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            mask_updates: true,
        }
    }
}

/// Per-parameter moment estimates and step counter.
#[derive(Debug, Clone, PartialEq)]
struct MomentState {
    m: Vec<f64>,
    v: Vec<f64>,
    t: u32,
}

impl MomentState {
    fn zeros(n: usize) -> Self {
        MomentState {
            m: vec![0.0; n],
            v: vec![0.0; n],
            t: 0,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    state: MomentState,
    lr: Option<f64>,
}

/// Adam optimizer (Adaptive Moment Estimation) keyed by parameter path.
#[derive(Debug, Clone)]
pub struct Adam {
    config: AdamConfig,
    params: BTreeMap<ParamKey, Entry>,
}

impl Adam {
    /// Create a new Adam optimizer with default hyperparameters.
    pub fn new(lr: f64) -> Self {
        Adam::with_config(AdamConfig {
            lr,
            ..AdamConfig::default()
        })
    }

    pub fn with_config(config: AdamConfig) -> Self {
        Adam {
            config,
            params: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &AdamConfig {
        &self.config
    }

    /// Register a parameter with zeroed moments, replacing any previous state.
    pub fn add(&mut self, key: ParamKey, value: Value) {
        let state = MomentState::zeros(value.len());
        self.params.insert(
            key,
            Entry {
                value: value.detach(),
                state,
                lr: None,
            },
        );
    }

    /// Override the learning rate of a single parameter.
    pub fn set_learning_rate_for(&mut self, key: &str, lr: f64) -> Result<()> {
        self.entry_mut(key)?.lr = Some(lr);
        Ok(())
    }

    /// Number of steps taken since the parameter was added.
    pub fn step_count(&self, key: &str) -> Result<u32> {
        Ok(self.entry(key)?.state.t)
    }

    /// Zero every moment estimate and step counter, keeping the values.
    pub fn reset(&mut self) {
        for entry in self.params.values_mut() {
            entry.state = MomentState::zeros(entry.value.len());
        }
    }

    fn entry(&self, key: &str) -> Result<&Entry> {
        self.params
            .get(key)
            .ok_or_else(|| Error::KeyNotFound(key.to_string()))
    }

    fn entry_mut(&mut self, key: &str) -> Result<&mut Entry> {
        self.params
            .get_mut(key)
            .ok_or_else(|| Error::KeyNotFound(key.to_string()))
    }
}

impl Optimizer for Adam {
    fn keys(&self) -> Vec<ParamKey> {
        self.params.keys().cloned().collect()
    }

    fn get(&self, key: &str) -> Result<&Value> {
        Ok(&self.entry(key)?.value)
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
        // Validate everything before touching any state.
        let mut grads = Vec::with_capacity(self.params.len());
        for (key, entry) in &self.params {
            if entry.state.m.len() != entry.value.len() {
                return Err(Error::shape_mismatch(
                    format!("optimizer state of '{key}'"),
                    entry.state.m.len(),
                    entry.value.len(),
                ));
            }
            grads.push(gradient_of(graph, key, &entry.value)?);
        }

        let AdamConfig {
            lr,
            beta1,
            beta2,
            epsilon,
            mask_updates,
        } = self.config;

        for ((key, entry), grad) in self.params.iter_mut().zip(grads) {
            let lr = entry.lr.unwrap_or(lr);
            let state = &mut entry.state;
            state.t += 1;

            // Bias correction factors
            let bias_correction1 = 1.0 - beta1.powi(state.t as i32);
            let bias_correction2 = 1.0 - beta2.powi(state.t as i32);

            let mut data = entry.value.data().to_vec();
            for (i, &g) in grad.iter().enumerate() {
                if mask_updates && g == 0.0 {
                    continue;
                }
                state.m[i] = beta1 * state.m[i] + (1.0 - beta1) * g;
                state.v[i] = beta2 * state.v[i] + (1.0 - beta2) * g * g;

                let m_hat = state.m[i] / bias_correction1;
                let v_hat = state.v[i] / bias_correction2;
                data[i] -= lr * m_hat / (v_hat.sqrt() + epsilon);
            }
            log::debug!("adam step {} for '{key}'", state.t);
            entry.value = Value::from_vec(data);
        }
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.config.lr
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.config.lr = lr;
    }
}
