//! Configuration loading from disk and the environment.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

use crate::config::schema::{GatekeeperConfig, LogFormat};
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable naming an optional TOML config file.
pub const CONFIG_PATH_ENV: &str = "GATEKEEPER_CONFIG";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("environment variable {var} has invalid value `{value}`")]
    InvalidEnv { var: &'static str, value: String },

    /// The shared signing secret is absent; the service must not start.
    #[error("JWT_SECRET_KEY is not set; refusing to serve traffic without a signing secret")]
    MissingSecret,

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse a TOML file into a configuration without validating it.
pub fn read_config_file(path: &Path) -> Result<GatekeeperConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

/// Overlay environment variables on top of `config`.
///
/// `lookup` abstracts `std::env::var` so the overlay can be exercised
/// without touching process state.
pub fn apply_env_overrides<F>(config: &mut GatekeeperConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(secret) = lookup("JWT_SECRET_KEY") {
        config.auth.secret = Some(secret);
    }
    if let Some(issuer) = lookup("JWT_ISSUER") {
        config.auth.issuer = issuer;
    }
    if let Some(addr) = lookup("BIND_ADDRESS") {
        config.listener.bind_address = addr;
    }
    if let Some(addr) = lookup("METRICS_ADDRESS") {
        config.observability.metrics_enabled = true;
        config.observability.metrics_address = addr;
    }
    if let Some(level) = lookup("LOG_LEVEL") {
        config.observability.log_level = level;
    }
    if let Some(format) = lookup("LOG_FORMAT") {
        config.observability.log_format = match format.to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            _ => {
                return Err(ConfigError::InvalidEnv {
                    var: "LOG_FORMAT",
                    value: format,
                })
            }
        };
    }

    parse_env(&lookup, "RATE_LIMIT_CAPACITY", &mut config.throttle.capacity)?;
    parse_env(&lookup, "RATE_LIMIT_REFILL_PER_SEC", &mut config.throttle.refill_per_sec)?;
    parse_env(&lookup, "RATE_LIMIT_MAX_CLIENTS", &mut config.throttle.max_clients)?;
    parse_env(&lookup, "TRUST_FORWARDED_FOR", &mut config.throttle.trust_forwarded_for)?;
    parse_env(&lookup, "REQUEST_TIMEOUT_SECS", &mut config.deadline.request_secs)?;
    parse_env(&lookup, "HANDLER_BUDGET_SECS", &mut config.deadline.handler_budget_secs)?;

    Ok(())
}

fn parse_env<F, T>(lookup: &F, var: &'static str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(value) = lookup(var) {
        *slot = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidEnv { var, value })?;
    }
    Ok(())
}

/// Check the secret, then run semantic validation.
pub fn finalize(config: GatekeeperConfig) -> Result<GatekeeperConfig, ConfigError> {
    match config.auth.secret.as_deref() {
        Some(secret) if !secret.is_empty() => {}
        _ => return Err(ConfigError::MissingSecret),
    }
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file, with environment overrides.
pub fn load_config(path: &Path) -> Result<GatekeeperConfig, ConfigError> {
    let mut config = read_config_file(path)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    finalize(config)
}

/// Load configuration the way the binaries do: defaults, then the file
/// named by `GATEKEEPER_CONFIG` if set, then the environment.
pub fn load_from_env() -> Result<GatekeeperConfig, ConfigError> {
    match std::env::var_os(CONFIG_PATH_ENV) {
        Some(path) => load_config(Path::new(&path)),
        None => {
            let mut config = GatekeeperConfig::default();
            apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
            finalize(config)
        }
    }
}
