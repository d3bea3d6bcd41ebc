//! Default values and environment variable key names used by the config builder.

/// Environment variable prefix (e.g. `DR_ITERATIONS`).
pub(crate) const ENV_PREFIX: &str = "DR_";

// --- Env key suffixes (full key = ENV_PREFIX + suffix) ---

pub(crate) const ENV_WIDTH: &str = "WIDTH";
pub(crate) const ENV_HEIGHT: &str = "HEIGHT";
pub(crate) const ENV_KEY: &str = "KEY";
pub(crate) const ENV_REFERENCE_SPP: &str = "REFERENCE_SPP";
pub(crate) const ENV_GRADIENT_SPP: &str = "GRADIENT_SPP";
pub(crate) const ENV_OPTIMIZE_SPP: &str = "OPTIMIZE_SPP";
pub(crate) const ENV_ITERATIONS: &str = "ITERATIONS";
pub(crate) const ENV_LEARNING_RATE: &str = "LEARNING_RATE";
pub(crate) const ENV_THETA: &str = "THETA";
pub(crate) const ENV_SEED: &str = "SEED";

// --- Default values ---

pub(crate) const DEFAULT_WIDTH: usize = 64;
pub(crate) const DEFAULT_HEIGHT: usize = 64;
pub(crate) const DEFAULT_KEY: &str = "green.reflectance.value";
pub(crate) const DEFAULT_REFERENCE_SPP: u32 = 512;
pub(crate) const DEFAULT_GRADIENT_SPP: u32 = 128;
pub(crate) const DEFAULT_OPTIMIZE_SPP: u32 = 4;
pub(crate) const DEFAULT_ITERATIONS: usize = 50;
pub(crate) const DEFAULT_LEARNING_RATE: f64 = 0.05;
pub(crate) const DEFAULT_INITIAL_GUESS: [f64; 3] = [0.01, 0.2, 0.9];
pub(crate) const DEFAULT_THETA: f64 = 0.5;
pub(crate) const DEFAULT_THETA_COLOR: [f64; 3] = [0.2, 0.5, 0.8];
pub(crate) const DEFAULT_CLAMP: (f64, f64) = (0.0, 1.0);
pub(crate) const DEFAULT_SEED: u64 = 0;
