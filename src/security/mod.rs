//! Admission control.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → client_ip.rs (derive the client identity)
//!     → rate_limit.rs (spend a token from that client's bucket)
//!     → Pass to the deadline guard
//! ```
//!
//! # Design Decisions
//! - One bucket per client; clients never affect each other
//! - Bucket map is an owned component, constructed per server (or per test)
//! - No trust in client-supplied forwarding headers unless configured

pub mod client_ip;
pub mod rate_limit;
