//! Build [`Config`] from environment variables.

use super::constants::{
    ENV_GRADIENT_SPP, ENV_HEIGHT, ENV_ITERATIONS, ENV_KEY, ENV_LEARNING_RATE, ENV_OPTIMIZE_SPP,
    ENV_PREFIX, ENV_REFERENCE_SPP, ENV_SEED, ENV_THETA, ENV_WIDTH,
};
use super::{Config, ConfigError};

/// Full environment variable key for a suffix (e.g. `SEED` → `DR_SEED`).
#[must_use]
pub fn env_key(suffix: &str) -> String {
    format!("{ENV_PREFIX}{suffix}")
}

/// Reads an environment variable as a string; `None` if unset.
pub fn env_string(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(s) => Ok(Some(s)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(ConfigError::EnvVar {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}

/// Reads an environment variable and parses it into `T`; `None` if unset.
pub fn env_parsed<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let Some(s) = env_string(key)? else {
        return Ok(None);
    };
    match s.parse() {
        Ok(t) => Ok(Some(t)),
        Err(e) => Err(ConfigError::Parse {
            key: key.to_string(),
            message: e.to_string(),
            value: s,
        }),
    }
}

/// Builds [`Config`] from `DR_*` environment variables, falling back to
/// [`Config::default`] for unset values.
pub fn from_env() -> Result<Config, ConfigError> {
    let default = Config::default();

    Ok(Config {
        width: env_parsed(&env_key(ENV_WIDTH))?.unwrap_or(default.width),
        height: env_parsed(&env_key(ENV_HEIGHT))?.unwrap_or(default.height),
        key: env_string(&env_key(ENV_KEY))?.unwrap_or_else(|| default.key.clone()),
        reference_spp: env_parsed(&env_key(ENV_REFERENCE_SPP))?.unwrap_or(default.reference_spp),
        gradient_spp: env_parsed(&env_key(ENV_GRADIENT_SPP))?.unwrap_or(default.gradient_spp),
        optimize_spp: env_parsed(&env_key(ENV_OPTIMIZE_SPP))?.unwrap_or(default.optimize_spp),
        iterations: env_parsed(&env_key(ENV_ITERATIONS))?.unwrap_or(default.iterations),
        learning_rate: env_parsed(&env_key(ENV_LEARNING_RATE))?.unwrap_or(default.learning_rate),
        theta: env_parsed(&env_key(ENV_THETA))?.unwrap_or(default.theta),
        seed: env_parsed(&env_key(ENV_SEED))?.unwrap_or(default.seed),
        ..default
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test uses its own variable so parallel tests do not interfere.

    #[test]
    fn test_env_key() {
        assert_eq!(env_key("SEED"), "DR_SEED");
    }

    #[test]
    fn test_env_parsed_unset_is_none() {
        assert_eq!(env_parsed::<u64>("DR_TEST_UNSET_VARIABLE").unwrap(), None);
    }

    #[test]
    fn test_env_parsed_reports_bad_value() {
        std::env::set_var("DR_TEST_BAD_SPP", "many");
        let err = env_parsed::<u32>("DR_TEST_BAD_SPP").unwrap_err();
        std::env::remove_var("DR_TEST_BAD_SPP");
        assert!(matches!(err, ConfigError::Parse { ref value, .. } if value == "many"));
    }
}
