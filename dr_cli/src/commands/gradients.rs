//! Forward-mode gradient images.
//!
//! First the image is differentiated with respect to the configured key
//! directly. Then the key is driven by `theta * theta_color` for a tracked
//! scalar `theta`: the forward pass from `theta` clears its edges, and the
//! render is differentiated with `forward_to`. Both gradient images can be
//! included in the report as raw pixels.

use std::path::Path;

use dr_core::{AdFlags, Graph, Value};
use dr_scene::{Image, PatchRenderer, Renderer};

use super::{cornell, emit, CommandResult};
use crate::config::Config;
use crate::report::{GradientSummary, GradientsReport, ImageDump};

pub fn execute(config: &Config, dump_images: bool, output: Option<&Path>) -> CommandResult {
    let key = config.param_key()?;
    let renderer = PatchRenderer::default();
    let graph = Graph::new();
    let mut params = cornell(config)?;

    graph.enable_grad(params.get_mut(key.as_str())?)?;
    params.update(&graph, None)?;
    let image = renderer.render(params.scene(), config.gradient_spp, config.seed)?;
    graph.forward(params.get(key.as_str())?, AdFlags::NONE)?;
    let parameter_grad = image.grad(&graph)?;
    let parameter = GradientSummary::of(&parameter_grad)?;
    log::info!(
        "Remapping colors within range: [{:.2}, {:.2}]",
        -parameter.vlim,
        parameter.vlim
    );

    graph.reset();
    let len = params.get(key.as_str())?.len();
    let color = if len == 3 {
        config.theta_color.to_vec()
    } else {
        vec![1.0; len]
    };
    let mut theta = Value::scalar(config.theta);
    graph.enable_grad(&mut theta)?;
    params.set(key.as_str(), theta.try_mul(&Value::from_vec(color.clone()))?)?;
    params.update(&graph, None)?;
    graph.forward(&theta, AdFlags::CLEAR_EDGES)?;

    let image = renderer.render(params.scene(), config.gradient_spp, config.seed)?;
    let grad = graph.forward_to(&image.pixels, AdFlags::NONE)?;
    let seeded_grad = Image::new(image.width, image.height, grad)?;
    let seeded = GradientSummary::of(&seeded_grad)?;
    log::info!("theta gradient range: [{:.2}, {:.2}]", -seeded.vlim, seeded.vlim);

    emit(
        &GradientsReport {
            key: key.to_string(),
            spp: config.gradient_spp,
            parameter,
            theta: config.theta,
            theta_color: color,
            seeded,
            parameter_image: dump_images.then(|| ImageDump::from(&parameter_grad)),
            seeded_image: dump_images.then(|| ImageDump::from(&seeded_grad)),
        },
        output,
    )
}
