//! Configuration validation.
//!
//! Semantic checks that serde cannot express. Every problem is reported,
//! not just the first, so an operator can fix a config in one pass.

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::GatekeeperConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address `{0}` is not a socket address")]
    InvalidBindAddress(String),

    #[error("throttle.capacity must be at least 1")]
    ZeroCapacity,

    #[error("throttle.refill_per_sec must be a positive number, got {0}")]
    InvalidRefillRate(f64),

    #[error("throttle.max_clients must be at least 1")]
    ZeroMaxClients,

    #[error("throttle.idle_eviction_secs ({idle}) is shorter than a full refill ({refill:.1}s)")]
    IdleWindowTooShort { idle: u64, refill: f64 },

    #[error("throttle.sweep_interval_secs must be at least 1")]
    ZeroSweepInterval,

    #[error("deadline.request_secs must be at least 1")]
    ZeroRequestTimeout,

    #[error("deadline.handler_budget_secs must be at least 1")]
    ZeroHandlerBudget,

    #[error("auth.issuer must not be empty")]
    EmptyIssuer,

    #[error("auth.max_token_bytes must be at least 1")]
    ZeroTokenLimit,

    #[error("observability.metrics_address `{0}` is not a socket address")]
    InvalidMetricsAddress(String),
}

/// Validate a configuration. The shared secret is checked by the loader.
pub fn validate_config(config: &GatekeeperConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    let throttle = &config.throttle;
    if throttle.capacity == 0 {
        errors.push(ValidationError::ZeroCapacity);
    }
    if !(throttle.refill_per_sec.is_finite() && throttle.refill_per_sec > 0.0) {
        errors.push(ValidationError::InvalidRefillRate(throttle.refill_per_sec));
    }
    if throttle.max_clients == 0 {
        errors.push(ValidationError::ZeroMaxClients);
    }
    // An entry evicted before it could have refilled would come back with a full bucket.
    if throttle.idle_eviction_secs > 0
        && (throttle.idle_eviction_secs as f64) < throttle.full_refill_secs()
    {
        errors.push(ValidationError::IdleWindowTooShort {
            idle: throttle.idle_eviction_secs,
            refill: throttle.full_refill_secs(),
        });
    }
    if throttle.sweep_interval_secs == 0 {
        errors.push(ValidationError::ZeroSweepInterval);
    }

    if config.deadline.request_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }
    if config.deadline.handler_budget_secs == 0 {
        errors.push(ValidationError::ZeroHandlerBudget);
    }

    if config.auth.issuer.trim().is_empty() {
        errors.push(ValidationError::EmptyIssuer);
    }
    if config.auth.max_token_bytes == 0 {
        errors.push(ValidationError::ZeroTokenLimit);
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(validate_config(&GatekeeperConfig::default()), Ok(()));
    }

    #[test]
    fn reports_every_problem() {
        let mut config = GatekeeperConfig::default();
        config.throttle.capacity = 0;
        config.throttle.refill_per_sec = f64::NAN;
        config.deadline.request_secs = 0;
        config.auth.issuer = "  ".to_string();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::ZeroCapacity));
        assert!(errors.contains(&ValidationError::ZeroRequestTimeout));
        assert!(errors.contains(&ValidationError::EmptyIssuer));
    }

    #[test]
    fn rejects_idle_window_shorter_than_refill() {
        let mut config = GatekeeperConfig::default();
        config.throttle.capacity = 100;
        config.throttle.refill_per_sec = 1.0;
        config.throttle.idle_eviction_secs = 30;

        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(
            errors.as_slice(),
            [ValidationError::IdleWindowTooShort { idle: 30, .. }]
        ));
    }

    #[test]
    fn negligible_refill_rate_never_evicts() {
        let mut config = GatekeeperConfig::default();
        config.throttle.refill_per_sec = 1e-19;

        assert!(validate_config(&config).is_ok());
        assert_eq!(config.throttle.idle_window(), Duration::MAX);
        let settings = crate::security::rate_limit::ThrottleSettings::from(&config.throttle);
        assert_eq!(settings.idle_window, Duration::MAX);
    }

    #[test]
    fn metrics_address_only_checked_when_enabled() {
        let mut config = GatekeeperConfig::default();
        config.observability.metrics_address = "nowhere".to_string();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert!(validate_config(&config).is_err());
    }
}
