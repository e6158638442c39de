//! Authentication middleware for protected routes.
//!
//! Extracts the `Authorization` header, verifies it, and injects the
//! resulting [`TokenClaims`] into request extensions for downstream handlers.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use tracing::instrument;

use crate::auth::claims::TokenClaims;
use crate::auth::verifier::{TokenVerifier, VerifyError};
use crate::error::GateError;
use crate::observability::metrics;

/// Rejects requests without an acceptable bearer credential.
///
/// # Response
///
/// - 401 Unauthorized if the credential is missing, malformed, forged,
///   expired, not yet valid, or from another issuer (indistinguishably)
/// - Otherwise continues with `TokenClaims` in extensions
#[instrument(skip_all, name = "gatekeeper.auth")]
pub async fn auth_middleware(
    State(verifier): State<Arc<TokenVerifier>>,
    mut request: Request,
    next: Next,
) -> Result<Response, GateError> {
    let verdict = match request.headers().get(AUTHORIZATION) {
        None => verifier.verify(None),
        Some(value) => match value.to_str() {
            Ok(value) => verifier.verify(Some(value)),
            Err(_) => Err(VerifyError::Malformed),
        },
    };

    let claims = verdict.map_err(|reason| {
        tracing::debug!(reason = %reason, "Rejected bearer credential");
        metrics::record_token_verification(Err(reason));
        GateError::CredentialInvalid(reason)
    })?;

    metrics::record_token_verification(Ok(()));
    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

/// Extension trait for reading verified claims off a request.
pub trait ClaimsExt {
    /// `None` when the request did not pass through [`auth_middleware`].
    fn claims(&self) -> Option<&TokenClaims>;
}

impl<B> ClaimsExt for axum::http::Request<B> {
    fn claims(&self) -> Option<&TokenClaims> {
        self.extensions().get::<TokenClaims>()
    }
}
