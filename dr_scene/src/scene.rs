//! Collaborator traits implemented by scene representations and renderers.

use dr_core::{ParamKey, Result, Value};

use crate::image::Image;

/// A scene exposing differentiable attributes by key.
pub trait Scene {
    /// Every differentiable attribute with its current value.
    fn traverse(&self) -> Vec<(ParamKey, Value)>;

    /// Store a new value for one attribute.
    ///
    /// Fails with `KeyNotFound` for keys outside [`Scene::traverse`] and with
    /// `ShapeMismatch` when the value has the wrong length.
    fn write_parameter(&mut self, key: &ParamKey, value: Value) -> Result<()>;

    /// Invalidate derived state that depends on `keys`.
    fn parameters_changed(&mut self, keys: &[ParamKey]);
}

/// Produces images from a scene.
///
/// When scene attributes are tracked values the render records graph nodes,
/// so the returned image can be differentiated with respect to them.
pub trait Renderer<S: Scene> {
    /// Render with `spp` samples per pixel. Equal seeds give equal noise.
    fn render(&self, scene: &S, spp: u32, seed: u64) -> Result<Image>;
}
