//! Subcommand implementations.

pub mod gradients;
pub mod optimize;
pub mod params;

use std::path::Path;

use serde::Serialize;

use dr_scene::{PatchScene, SceneParameters};

use crate::config::Config;

pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Registry over a fresh Cornell preset at the configured resolution.
pub(crate) fn cornell(config: &Config) -> dr_core::Result<SceneParameters<PatchScene>> {
    Ok(SceneParameters::traverse(PatchScene::cornell_box(
        config.width,
        config.height,
    )?))
}

/// Print a report as pretty JSON, or write it to `output` when given.
pub(crate) fn emit<T: Serialize>(report: &T, output: Option<&Path>) -> CommandResult {
    let json = serde_json::to_string_pretty(report)?;
    match output {
        Some(path) => {
            std::fs::write(path, json + "\n")?;
            log::info!("report written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
