//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gatekeeper.
//! All types derive Serde traits for deserialization from config files.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the gatekeeping layer and its host server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatekeeperConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Per-client admission control.
    pub throttle: ThrottleConfig,

    /// Request deadline and handler working budget.
    pub deadline: DeadlineConfig,

    /// Bearer credential verification.
    pub auth: AuthConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Token bucket settings applied to every client identity.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Burst size: tokens available to a fresh client.
    pub capacity: u32,

    /// Sustained rate in tokens per second.
    pub refill_per_sec: f64,

    /// Ceiling on tracked client identities before forced eviction.
    pub max_clients: usize,

    /// Idle time after which a client's state is dropped.
    /// Zero derives it from the bucket (ten full refill windows).
    pub idle_eviction_secs: u64,

    /// Interval of the background sweep over idle clients.
    pub sweep_interval_secs: u64,

    /// Take the client identity from the first `X-Forwarded-For` entry.
    /// Only enable behind a proxy that overwrites the header.
    pub trust_forwarded_for: bool,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            refill_per_sec: 5.0,
            max_clients: 100_000,
            idle_eviction_secs: 0,
            sweep_interval_secs: 30,
            trust_forwarded_for: false,
        }
    }
}

impl ThrottleConfig {
    /// Seconds for an empty bucket to refill completely.
    pub fn full_refill_secs(&self) -> f64 {
        if self.refill_per_sec > 0.0 {
            f64::from(self.capacity) / self.refill_per_sec
        } else {
            f64::INFINITY
        }
    }

    /// Effective idle window for eviction.
    pub fn idle_window(&self) -> Duration {
        if self.idle_eviction_secs > 0 {
            return Duration::from_secs(self.idle_eviction_secs);
        }
        let derived = (self.full_refill_secs() * 10.0).ceil();
        Duration::try_from_secs_f64(derived.max(1.0)).unwrap_or(Duration::MAX)
    }
}

/// Deadline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeadlineConfig {
    /// Hard budget for a request passing through the chain, in seconds.
    pub request_secs: u64,

    /// Working budget for a single handler operation (login, registration).
    pub handler_budget_secs: u64,
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            request_secs: 5,
            handler_budget_secs: 60,
        }
    }
}

impl DeadlineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    pub fn handler_budget(&self) -> Duration {
        Duration::from_secs(self.handler_budget_secs)
    }
}

/// Bearer credential verification settings.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared HMAC secret. Required; there is no default.
    #[serde(skip_serializing)]
    pub secret: Option<String>,

    /// Issuer every accepted token must carry.
    pub issuer: String,

    /// Tokens longer than this are rejected before decoding.
    pub max_token_bytes: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: None,
            issuer: "auth".to_string(),
            max_token_bytes: 8192,
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field("issuer", &self.issuer)
            .field("max_token_bytes", &self.max_token_bytes)
            .finish()
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON log lines.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
