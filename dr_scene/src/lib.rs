//! # dr_scene - Scene parameters and renderer collaborators
//!
//! [`SceneParameters`] exposes the differentiable attributes of a [`Scene`]
//! by [`ParamKey`](dr_core::ParamKey) and writes edits back on
//! [`SceneParameters::update`]. A [`Renderer`] turns the scene into an
//! [`Image`]; when attributes are tracked the image is tracked as well.
//!
//! ```
//! use dr_core::{AdFlags, Graph};
//! use dr_scene::{PatchRenderer, PatchScene, Renderer, SceneParameters};
//!
//! let graph = Graph::new();
//! let mut params = SceneParameters::traverse(PatchScene::cornell_box(16, 16)?);
//! let key = "green.reflectance.value";
//!
//! graph.enable_grad(params.get_mut(key)?)?;
//! params.update(&graph, None)?;
//!
//! let image = PatchRenderer::default().render(params.scene(), 8, 0)?;
//! graph.forward(params.get(key)?, AdFlags::NONE)?;
//! let grad = image.grad(&graph)?;
//! // only the green wall responds to its reflectance
//! assert_eq!(grad.pixel(0, 0), [0.0; 3]);
//! assert!(grad.pixel(15, 8)[1] > 0.0);
//! # Ok::<(), dr_core::Error>(())
//! ```

pub mod image;
pub mod patch;
pub mod registry;
pub mod scene;

pub use image::Image;
pub use patch::{PatchRenderer, PatchScene, PointLight, Rect};
pub use registry::SceneParameters;
pub use scene::{Renderer, Scene};
