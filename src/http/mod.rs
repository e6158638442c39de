//! HTTP hosting subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (request id, trace span, peer address)
//!     → chain.rs (throttle → deadline → auth)
//!     → handlers.rs / application routers
//!     → Send to client
//! ```

pub mod chain;
pub mod handlers;
pub mod server;

pub use chain::GatekeeperChain;
pub use server::{HttpServer, X_REQUEST_ID};
