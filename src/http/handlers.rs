//! Routes served by the standalone gatekeeper host.
//!
//! The credential and company services mount their own routers behind the
//! same chain; these exist so the host can be probed and smoke-tested.

use axum::{routing::get, Extension, Json, Router};
use serde::Serialize;

use crate::auth::TokenClaims;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Liveness probe.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(Debug, Serialize)]
pub struct WhoAmIResponse {
    pub subject: String,
    pub scopes: Vec<String>,
}

/// Echo the verified caller back to them.
pub async fn whoami(Extension(claims): Extension<TokenClaims>) -> Json<WhoAmIResponse> {
    Json(WhoAmIResponse {
        subject: claims.subject,
        scopes: claims.scopes,
    })
}

pub fn public_routes() -> Router {
    Router::new().route("/health", get(health))
}

pub fn protected_routes() -> Router {
    Router::new().route("/v1/whoami", get(whoami))
}
