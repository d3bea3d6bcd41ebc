//! Recover a parameter from a reference render with Adam.

use std::path::Path;

use dr_core::{AdFlags, Graph, Value};
use dr_optim::{mse, squared_error, Adam, Optimizer};
use dr_scene::{PatchRenderer, Renderer};

use super::{cornell, emit, CommandResult};
use crate::config::Config;
use crate::report::{IterationRecord, OptimizeReport};

pub fn execute(config: &Config, output: Option<&Path>) -> CommandResult {
    let key = config.param_key()?;
    let renderer = PatchRenderer::default();
    let graph = Graph::new();
    let mut params = cornell(config)?;

    let reference_image = renderer.render(params.scene(), config.reference_spp, config.seed)?;
    let param_ref = params.get(key.as_str())?.detach();

    let len = param_ref.len();
    let initial = if len == 3 {
        Value::from(config.initial_guess)
    } else {
        Value::full(len, config.initial_guess[0])
    };
    params.set(key.as_str(), initial.clone())?;
    params.update(&graph, None)?;

    let mut opt = Adam::new(config.learning_rate);
    opt.add(key.clone(), initial.clone());
    params.update(&graph, Some(&mut opt))?;

    let (lo, hi) = config.clamp;
    let mut iterations = Vec::with_capacity(config.iterations);
    for it in 0..config.iterations {
        let seed = config.seed.wrapping_add(it as u64 + 1);
        let image = renderer.render(params.scene(), config.optimize_spp, seed)?;
        let loss = mse(&image.pixels, &reference_image.pixels)?;
        graph.backward(&loss, AdFlags::NONE)?;
        opt.step(&graph)?;

        let clamped = opt.get(key.as_str())?.clamp(lo, hi);
        opt.set(key.clone(), clamped);
        graph.reset();
        params.update(&graph, Some(&mut opt))?;

        let current = params.get(key.as_str())?.detach();
        let parameter_error = squared_error(&param_ref, &current)?.item();
        log::info!("Iteration {it:02}: parameter error = {parameter_error:.6}");
        iterations.push(IterationRecord {
            iteration: it,
            loss: loss.item(),
            parameter_error,
        });
    }
    log::info!("Optimization complete.");

    graph.reset();
    let recovered = params.get(key.as_str())?.detach();
    let final_image = renderer.render(params.scene(), config.gradient_spp, config.seed)?;
    let final_image_loss = mse(&final_image.pixels, &reference_image.pixels)?.item();

    emit(
        &OptimizeReport {
            key: key.to_string(),
            learning_rate: config.learning_rate,
            reference: param_ref.into_vec(),
            initial: initial.into_vec(),
            recovered: recovered.into_vec(),
            iterations,
            final_image_loss,
        },
        output,
    )
}
