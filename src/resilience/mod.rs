//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Admitted request:
//!     → timeouts.rs (open a request scope, race the chain against the deadline)
//!     → handler may bound its own operations with `within_budget`
//! ```
//!
//! # Design Decisions
//! - Every request has a deadline; there is no opt-out
//! - Timed-out requests return 504 Gateway Timeout
//! - Cancellation is signalled, never forced

pub mod timeouts;

pub use timeouts::{within_budget, DeadlineGuard, RequestScope};
