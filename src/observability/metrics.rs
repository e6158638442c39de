//! Metrics collection and exposition.
//!
//! All metrics follow Prometheus naming conventions:
//! - `gatekeeper_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Metrics
//! - `gatekeeper_admissions_total` (counter): `decision` = allowed | denied
//! - `gatekeeper_throttle_clients` (gauge): client identities tracked
//! - `gatekeeper_deadline_outcomes_total` (counter): `outcome` = completed | timed_out | failed
//! - `gatekeeper_request_duration_seconds` (histogram): time inside the deadline guard
//! - `gatekeeper_token_verifications_total` (counter): `status`, `reason`
//!
//! # Cardinality
//! Labels are bounded by code; client identities are never used as labels.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::auth::VerifyError;

/// Install the Prometheus exporter with its own HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_admission(allowed: bool) {
    let decision = if allowed { "allowed" } else { "denied" };
    counter!("gatekeeper_admissions_total", "decision" => decision).increment(1);
}

pub fn set_throttle_clients(count: usize) {
    gauge!("gatekeeper_throttle_clients").set(count as f64);
}

pub fn record_deadline_outcome(outcome: &'static str, elapsed: Duration) {
    counter!("gatekeeper_deadline_outcomes_total", "outcome" => outcome).increment(1);
    histogram!("gatekeeper_request_duration_seconds", "outcome" => outcome)
        .record(elapsed.as_secs_f64());
}

pub fn record_token_verification(result: Result<(), VerifyError>) {
    let (status, reason) = match result {
        Ok(()) => ("valid", "none"),
        Err(reason) => ("invalid", reason.label()),
    };
    counter!("gatekeeper_token_verifications_total", "status" => status, "reason" => reason)
        .increment(1);
}
