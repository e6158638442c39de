//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! defaults
//!     → config file (TOML, optional, path from GATEKEEPER_CONFIG)
//!     → environment overrides (JWT_SECRET_KEY, RATE_LIMIT_*, ...)
//!     → loader.rs (secret presence check)
//!     → validation.rs (semantic checks)
//!     → GatekeeperConfig (validated, immutable)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields except the signing secret have defaults
//! - A missing secret is fatal before any socket is bound

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_from_env, ConfigError};
pub use schema::{
    AuthConfig, DeadlineConfig, GatekeeperConfig, ListenerConfig, LogFormat, ObservabilityConfig,
    ThrottleConfig,
};
