//! Request gatekeeping for the credential and company services.
//!
//! Every inbound request passes, in order, through per-client rate
//! limiting, a hard request deadline, and (on protected routes) bearer
//! credential verification before it reaches application code.

pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

pub use auth::{ClaimsExt, TokenClaims, TokenVerifier, VerifyError};
pub use config::GatekeeperConfig;
pub use error::GateError;
pub use http::{GatekeeperChain, HttpServer};
pub use lifecycle::Shutdown;
pub use resilience::{within_budget, DeadlineGuard, RequestScope};
pub use security::rate_limit::ClientThrottle;
