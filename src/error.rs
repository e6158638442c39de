//! Terminal rejections produced by the gatekeeping chain.

use std::time::Duration;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::auth::VerifyError;

/// A request that was stopped before (or instead of) reaching its handler.
///
/// The rendered body is deliberately minimal: a stable code and a fixed
/// message. Internal detail (which token check failed, panic payloads) is
/// logged, never returned.
#[derive(Debug, Error)]
pub enum GateError {
    /// The client's token bucket is empty.
    #[error("rate limit exceeded")]
    AdmissionDenied { retry_after: Option<Duration> },

    /// The handler chain did not finish within the request deadline.
    #[error("request timed out")]
    DeadlineExceeded,

    /// Bearer credential missing or not acceptable.
    #[error("invalid token")]
    CredentialInvalid(#[source] VerifyError),

    /// The handler task terminated abnormally.
    #[error("internal error")]
    HandlerFailed,
}

impl GateError {
    pub fn status(&self) -> StatusCode {
        match self {
            GateError::AdmissionDenied { .. } => StatusCode::TOO_MANY_REQUESTS,
            GateError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            GateError::CredentialInvalid(_) => StatusCode::UNAUTHORIZED,
            GateError::HandlerFailed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            GateError::AdmissionDenied { .. } => "RATE_LIMIT_EXCEEDED",
            GateError::DeadlineExceeded => "REQUEST_TIMEOUT",
            GateError::CredentialInvalid(_) => "UNAUTHORIZED",
            GateError::HandlerFailed => "INTERNAL_ERROR",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.code(),
                // Display of the outer error only; the source is never rendered.
                message: self.to_string(),
            },
        };

        let mut response = (self.status(), Json(body)).into_response();

        if let GateError::AdmissionDenied {
            retry_after: Some(wait),
        } = self
        {
            let secs = wait
                .as_secs()
                .saturating_add(u64::from(wait.subsec_nanos() > 0));
            if let Ok(value) = HeaderValue::from_str(&secs.max(1).to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}
