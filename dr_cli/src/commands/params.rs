//! List the differentiable parameters of the scene.

use std::path::Path;

use super::{cornell, emit, CommandResult};
use crate::config::Config;
use crate::report::ParameterEntry;

pub fn execute(config: &Config, output: Option<&Path>) -> CommandResult {
    let params = cornell(config)?;
    let entries: Vec<ParameterEntry> = params
        .keys()
        .map(|key| {
            Ok(ParameterEntry {
                key: key.to_string(),
                value: params.get(key.as_str())?.data().to_vec(),
            })
        })
        .collect::<dr_core::Result<_>>()?;
    emit(&entries, output)
}
