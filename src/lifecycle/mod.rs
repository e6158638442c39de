//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → fail fast without a secret → init logging/metrics
//!     → build chain → bind listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → cancel root token → stop accepting
//!     → in-flight request scopes observe cancellation → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
