//! Configuration for the inverse-rendering demo.
//!
//! Load from environment via [`from_env`], apply command-line overrides, then
//! check with [`Config::validate`]. Defaults and env key names live in the
//! `constants` submodule.

mod builder;
mod constants;
mod error;

use dr_core::ParamKey;

use constants::{
    DEFAULT_CLAMP, DEFAULT_GRADIENT_SPP, DEFAULT_HEIGHT, DEFAULT_INITIAL_GUESS, DEFAULT_ITERATIONS,
    DEFAULT_KEY, DEFAULT_LEARNING_RATE, DEFAULT_OPTIMIZE_SPP, DEFAULT_REFERENCE_SPP, DEFAULT_SEED,
    DEFAULT_THETA, DEFAULT_THETA_COLOR, DEFAULT_WIDTH,
};

pub use builder::from_env;
pub use error::ConfigError;

/// Settings shared by every subcommand.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Image width in pixels.
    pub width: usize,
    /// Image height in pixels.
    pub height: usize,
    /// Parameter to differentiate and recover.
    pub key: String,

    /// Samples per pixel of the reference render.
    pub reference_spp: u32,
    /// Samples per pixel of the gradient renders.
    pub gradient_spp: u32,
    /// Samples per pixel inside the optimization loop.
    pub optimize_spp: u32,

    /// Adam iterations.
    pub iterations: usize,
    /// Adam learning rate.
    pub learning_rate: f64,
    /// Starting point of the recovery.
    pub initial_guess: [f64; 3],
    /// Parameter domain enforced after each step.
    pub clamp: (f64, f64),

    /// Scalar seed that drives the parameter in the second gradient pass.
    pub theta: f64,
    /// Colour multiplied by `theta`.
    pub theta_color: [f64; 3],

    /// Base seed of the renderer's sampling noise.
    pub seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            key: DEFAULT_KEY.to_string(),
            reference_spp: DEFAULT_REFERENCE_SPP,
            gradient_spp: DEFAULT_GRADIENT_SPP,
            optimize_spp: DEFAULT_OPTIMIZE_SPP,
            iterations: DEFAULT_ITERATIONS,
            learning_rate: DEFAULT_LEARNING_RATE,
            initial_guess: DEFAULT_INITIAL_GUESS,
            clamp: DEFAULT_CLAMP,
            theta: DEFAULT_THETA,
            theta_color: DEFAULT_THETA_COLOR,
            seed: DEFAULT_SEED,
        }
    }
}

impl Config {
    /// The configured key as a typed parameter path.
    pub fn param_key(&self) -> Result<ParamKey, ConfigError> {
        ParamKey::parse(&self.key).map_err(|e| ConfigError::Validation(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Validation(format!(
                "image size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        for (name, spp) in [
            ("reference_spp", self.reference_spp),
            ("gradient_spp", self.gradient_spp),
            ("optimize_spp", self.optimize_spp),
        ] {
            if spp == 0 {
                return Err(ConfigError::Validation(format!(
                    "{name} must be greater than 0"
                )));
            }
        }
        if self.iterations == 0 {
            return Err(ConfigError::Validation(
                "iterations must be greater than 0".to_string(),
            ));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ConfigError::Validation(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        let (lo, hi) = self.clamp;
        if lo.is_nan() || hi.is_nan() || lo >= hi {
            return Err(ConfigError::Validation(format!(
                "clamp range [{lo}, {hi}] is empty"
            )));
        }
        self.param_key()?;
        Ok(())
    }
}
