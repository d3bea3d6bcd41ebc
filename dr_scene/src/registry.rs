//! Parameter registry: named scene attributes as differentiable values.

use std::collections::{BTreeMap, BTreeSet};

use dr_core::{Error, Graph, ParamKey, Result, Value};
use dr_optim::Optimizer;

use crate::scene::Scene;

/// Differentiable attributes of a scene, addressable by key.
///
/// Edits are buffered until [`SceneParameters::update`], which writes the
/// changed entries into the scene and lets it refresh derived state.
#[derive(Debug)]
pub struct SceneParameters<S> {
    scene: S,
    entries: BTreeMap<ParamKey, Value>,
    /// Lengths reported by the scene at traversal.
    shapes: BTreeMap<ParamKey, usize>,
    dirty: BTreeSet<ParamKey>,
}

impl<S: Scene> SceneParameters<S> {
    /// Take ownership of `scene` and enumerate its differentiable attributes.
    pub fn traverse(scene: S) -> Self {
        let entries: BTreeMap<_, _> = scene.traverse().into_iter().collect();
        let shapes = entries.iter().map(|(k, v)| (k.clone(), v.len())).collect();
        log::debug!("traversed scene: {} differentiable parameters", entries.len());
        SceneParameters {
            scene,
            entries,
            shapes,
            dirty: BTreeSet::new(),
        }
    }

    fn check_shape(&self, context: &str, key: &str, len: usize) -> Result<()> {
        let expected = *self
            .shapes
            .get(key)
            .ok_or_else(|| Error::KeyNotFound(key.to_string()))?;
        if expected != len {
            return Err(Error::shape_mismatch(format!("{context} '{key}'"), expected, len));
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<&Value> {
        self.entries
            .get(key)
            .ok_or_else(|| Error::KeyNotFound(key.to_string()))
    }

    /// Mutable access to an entry, e.g. for [`Graph::enable_grad`]. The entry
    /// is pushed on the next update.
    pub fn get_mut(&mut self, key: &str) -> Result<&mut Value> {
        let (key, value) = self
            .entries
            .iter_mut()
            .find(|(k, _)| k.as_str() == key)
            .ok_or_else(|| Error::KeyNotFound(key.to_string()))?;
        self.dirty.insert(key.clone());
        Ok(value)
    }

    /// Replace an entry. The value must have the length the scene reported.
    pub fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.check_shape("parameter", key, value.len())?;
        *self.get_mut(key)? = value;
        Ok(())
    }

    pub fn keys(&self) -> impl Iterator<Item = &ParamKey> {
        self.entries.keys()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Synchronise edits into the scene.
    ///
    /// With an optimizer, every key it holds is pulled into the registry
    /// first; values the optimizer holds untracked are tracked on `graph` so
    /// the next render can be differentiated with respect to them. Returns
    /// the keys written into the scene.
    ///
    /// Shapes are checked for every pending key before anything is pulled or
    /// written. If the scene rejects a write, the keys written so far are
    /// still reported to [`Scene::parameters_changed`] and the rest stay
    /// pending for the next update.
    pub fn update(
        &mut self,
        graph: &Graph,
        optimizer: Option<&mut dyn Optimizer>,
    ) -> Result<Vec<ParamKey>> {
        let pulled = match &optimizer {
            Some(opt) => opt.keys(),
            None => Vec::new(),
        };
        if let Some(opt) = &optimizer {
            for key in &pulled {
                let value = opt.get(key.as_str())?;
                self.check_shape("optimizer value of", key.as_str(), value.len())?;
                if value.graph().is_some_and(|g| !g.ptr_eq(graph)) {
                    return Err(Error::ForeignGraph);
                }
            }
        }
        for key in self.dirty.iter().filter(|k| !pulled.contains(*k)) {
            self.check_shape("parameter", key.as_str(), self.get(key.as_str())?.len())?;
        }

        if let Some(opt) = optimizer {
            for key in pulled {
                let mut value = opt.get(key.as_str())?.clone();
                if graph.node_of(&value).is_none() {
                    graph.enable_grad(&mut value)?;
                    opt.set(key.clone(), value.clone());
                }
                self.entries.insert(key.clone(), value);
                self.dirty.insert(key);
            }
        }

        let staged = self
            .dirty
            .iter()
            .map(|key| Ok((key.clone(), self.get(key.as_str())?.clone())))
            .collect::<Result<Vec<_>>>()?;
        self.dirty.clear();

        let mut written = Vec::with_capacity(staged.len());
        let mut failure = None;
        let mut staged = staged.into_iter();
        for (key, value) in staged.by_ref() {
            if let Err(e) = self.scene.write_parameter(&key, value) {
                log::warn!("scene rejected '{key}': {e}");
                self.dirty.insert(key);
                failure = Some(e);
                break;
            }
            written.push(key);
        }
        self.dirty.extend(staged.map(|(key, _)| key));

        if !written.is_empty() {
            self.scene.parameters_changed(&written);
        }
        log::debug!("pushed {} parameters into the scene", written.len());
        match failure {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn into_scene(self) -> S {
        self.scene
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dr_optim::Adam;

    /// Records every write and invalidation it receives.
    #[derive(Debug, Default)]
    struct RecordingScene {
        albedo: Vec<f64>,
        writes: Vec<String>,
        invalidations: usize,
    }

    fn albedo_key() -> ParamKey {
        ParamKey::parse("box.albedo.value").unwrap()
    }

    impl Scene for RecordingScene {
        fn traverse(&self) -> Vec<(ParamKey, Value)> {
            vec![(albedo_key(), Value::from_vec(self.albedo.clone()))]
        }

        fn write_parameter(&mut self, key: &ParamKey, value: Value) -> Result<()> {
            self.albedo = value.into_vec();
            self.writes.push(key.to_string());
            Ok(())
        }

        fn parameters_changed(&mut self, _keys: &[ParamKey]) {
            self.invalidations += 1;
        }
    }

    /// Three scalar attributes; rejects the first `failures` writes of `b.value`.
    #[derive(Debug, Default)]
    struct FlakyScene {
        values: BTreeMap<String, f64>,
        failures: usize,
        changed: Vec<Vec<String>>,
    }

    impl Scene for FlakyScene {
        fn traverse(&self) -> Vec<(ParamKey, Value)> {
            ["a.value", "b.value", "c.value"]
                .iter()
                .map(|k| (ParamKey::parse(k).unwrap(), Value::scalar(0.0)))
                .collect()
        }

        fn write_parameter(&mut self, key: &ParamKey, value: Value) -> Result<()> {
            if key.as_str() == "b.value" && self.failures > 0 {
                self.failures -= 1;
                return Err(Error::KeyNotFound(key.to_string()));
            }
            self.values.insert(key.to_string(), value.item());
            Ok(())
        }

        fn parameters_changed(&mut self, keys: &[ParamKey]) {
            self.changed.push(keys.iter().map(|k| k.to_string()).collect());
        }
    }

    fn params() -> SceneParameters<RecordingScene> {
        SceneParameters::traverse(RecordingScene {
            albedo: vec![0.5, 0.5, 0.5],
            ..Default::default()
        })
    }

    #[test]
    fn test_unknown_key() {
        let mut params = params();
        assert_eq!(
            params.get("nonexistent.key").unwrap_err(),
            Error::KeyNotFound("nonexistent.key".to_string())
        );
        assert!(params.set("nonexistent.key", Value::scalar(1.0)).is_err());
        assert!(!params.contains("nonexistent.key"));
    }

    #[test]
    fn test_set_checks_shape() {
        let mut params = params();
        assert!(matches!(
            params.set("box.albedo.value", Value::scalar(1.0)),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_update_pushes_only_dirty_keys() {
        let graph = Graph::new();
        let mut params = params();
        assert!(params.update(&graph, None).unwrap().is_empty());
        assert_eq!(params.scene().invalidations, 0);

        params.set("box.albedo.value", Value::rgb(0.1, 0.2, 0.3)).unwrap();
        let changed = params.update(&graph, None).unwrap();
        assert_eq!(changed, vec![albedo_key()]);
        assert_eq!(params.scene().albedo, vec![0.1, 0.2, 0.3]);
        assert_eq!(params.scene().invalidations, 1);

        // nothing left to push
        assert!(params.update(&graph, None).unwrap().is_empty());
    }

    #[test]
    fn test_update_pulls_and_tracks_optimizer_values() {
        let graph = Graph::new();
        let mut params = params();
        let mut opt = Adam::new(0.05);
        opt.add(albedo_key(), Value::rgb(0.9, 0.9, 0.9));

        params.update(&graph, Some(&mut opt)).unwrap();
        let value = params.get("box.albedo.value").unwrap();
        assert_eq!(value.data(), &[0.9, 0.9, 0.9]);
        assert!(value.is_tracked());
        assert!(graph.node_of(opt.get("box.albedo.value").unwrap()).is_some());
        assert_eq!(params.scene().writes.len(), 1);
    }

    #[test]
    fn test_update_rejects_unknown_optimizer_key() {
        let graph = Graph::new();
        let mut params = params();
        let mut opt = Adam::new(0.05);
        opt.add(ParamKey::parse("ghost.value").unwrap(), Value::scalar(1.0));
        assert!(matches!(
            params.update(&graph, Some(&mut opt)),
            Err(Error::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_invalid_entry_blocks_whole_update() {
        let graph = Graph::new();
        let mut params = params();
        *params.get_mut("box.albedo.value").unwrap() = Value::scalar(1.0);
        for _ in 0..2 {
            assert!(matches!(
                params.update(&graph, None),
                Err(Error::ShapeMismatch { .. })
            ));
        }
        assert!(params.scene().writes.is_empty());
        assert_eq!(params.scene().invalidations, 0);

        params.set("box.albedo.value", Value::rgb(0.1, 0.2, 0.3)).unwrap();
        assert_eq!(params.update(&graph, None).unwrap(), vec![albedo_key()]);
        assert_eq!(params.scene().albedo, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_mismatched_optimizer_value_commits_nothing() {
        let graph = Graph::new();
        let mut params = params();
        let mut opt = Adam::new(0.05);
        opt.add(albedo_key(), Value::scalar(0.9));

        assert!(matches!(
            params.update(&graph, Some(&mut opt)),
            Err(Error::ShapeMismatch { .. })
        ));
        assert_eq!(params.get("box.albedo.value").unwrap().data(), &[0.5, 0.5, 0.5]);
        assert!(graph.node_of(opt.get("box.albedo.value").unwrap()).is_none());
        assert!(params.scene().writes.is_empty());
    }

    #[test]
    fn test_rejected_write_keeps_rest_pending() {
        let graph = Graph::new();
        let mut params = SceneParameters::traverse(FlakyScene {
            failures: 1,
            ..Default::default()
        });
        for (key, x) in [("a.value", 1.0), ("b.value", 2.0), ("c.value", 3.0)] {
            params.set(key, Value::scalar(x)).unwrap();
        }

        assert!(params.update(&graph, None).is_err());
        // the write that landed is still invalidated
        assert_eq!(params.scene().changed, vec![vec!["a.value".to_string()]]);
        assert_eq!(params.scene().values.len(), 1);

        let changed = params.update(&graph, None).unwrap();
        let changed: Vec<&str> = changed.iter().map(|k| k.as_str()).collect();
        assert_eq!(changed, ["b.value", "c.value"]);
        assert_eq!(params.scene().values["b.value"], 2.0);
        assert_eq!(params.scene().values["c.value"], 3.0);
        assert_eq!(params.scene().changed.len(), 2);
    }
}
