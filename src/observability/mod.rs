//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Gatekeeping stages produce:
//!     → logging.rs (structured log events; rejections at warn/debug)
//!     → metrics.rs (admissions, deadline outcomes, token verdicts)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID (x-request-id) is attached by the HTTP layer and appears in
//!   every request span
//! - Metric labels never carry client identities

pub mod logging;
pub mod metrics;
