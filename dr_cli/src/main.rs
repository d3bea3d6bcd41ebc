//! Inverse-rendering demo.
//!
//! Renders a reference image of the Cornell preset, differentiates renders
//! with respect to a scene parameter in forward mode, and recovers the
//! parameter from the reference with Adam. Results are reported as JSON.

mod commands;
mod config;
mod report;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use config::Config;

#[derive(Parser)]
#[command(name = "dr")]
#[command(version, about = "Differentiable rendering demo")]
#[command(after_help = "Settings can also be given as DR_* environment variables (e.g. DR_ITERATIONS=100).")]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,

    /// Write the JSON report to a file instead of stdout
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the differentiable scene parameters
    Params,

    /// Forward-mode gradient images with respect to the parameter
    Gradients {
        /// Include the raw gradient pixels in the report
        #[arg(long)]
        dump_images: bool,
    },

    /// Recover the parameter from a reference render with Adam
    Optimize,
}

/// Command-line settings; they take precedence over the environment.
#[derive(Args, Debug, Default)]
struct Overrides {
    /// Parameter key, e.g. green.reflectance.value
    #[arg(long, global = true)]
    key: Option<String>,

    #[arg(long, global = true)]
    width: Option<usize>,

    #[arg(long, global = true)]
    height: Option<usize>,

    #[arg(long, global = true)]
    reference_spp: Option<u32>,

    #[arg(long, global = true)]
    gradient_spp: Option<u32>,

    #[arg(long, global = true)]
    optimize_spp: Option<u32>,

    #[arg(long, global = true)]
    iterations: Option<usize>,

    #[arg(long, global = true)]
    lr: Option<f64>,

    /// Initial guess as r,g,b
    #[arg(long, global = true, value_parser = parse_rgb)]
    init: Option<[f64; 3]>,

    #[arg(long, global = true)]
    theta: Option<f64>,

    #[arg(long, global = true)]
    seed: Option<u64>,
}

impl Overrides {
    fn apply(self, config: &mut Config) {
        let Overrides {
            key,
            width,
            height,
            reference_spp,
            gradient_spp,
            optimize_spp,
            iterations,
            lr,
            init,
            theta,
            seed,
        } = self;
        if let Some(key) = key {
            config.key = key;
        }
        config.width = width.unwrap_or(config.width);
        config.height = height.unwrap_or(config.height);
        config.reference_spp = reference_spp.unwrap_or(config.reference_spp);
        config.gradient_spp = gradient_spp.unwrap_or(config.gradient_spp);
        config.optimize_spp = optimize_spp.unwrap_or(config.optimize_spp);
        config.iterations = iterations.unwrap_or(config.iterations);
        config.learning_rate = lr.unwrap_or(config.learning_rate);
        config.initial_guess = init.unwrap_or(config.initial_guess);
        config.theta = theta.unwrap_or(config.theta);
        config.seed = seed.unwrap_or(config.seed);
    }
}

fn parse_rgb(s: &str) -> Result<[f64; 3], String> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<f64>().map_err(|e| format!("'{p}': {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    <[f64; 3]>::try_from(parts).map_err(|v| format!("expected 3 components, got {}", v.len()))
}

fn load_config(overrides: Overrides) -> Result<Config, config::ConfigError> {
    let mut config = config::from_env()?;
    overrides.apply(&mut config);
    config.validate()?;
    log::debug!("{config:?}");
    Ok(config)
}

fn run(cli: Cli) -> commands::CommandResult {
    let config = load_config(cli.overrides)?;
    let output = cli.output.as_deref();
    match cli.command {
        Commands::Params => commands::params::execute(&config, output),
        Commands::Gradients { dump_images } => {
            commands::gradients::execute(&config, dump_images, output)
        }
        Commands::Optimize => commands::optimize::execute(&config, output),
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
