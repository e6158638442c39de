//! Bearer credential verification.
//!
//! # Security
//!
//! - Tokens are size-checked before any decoding
//! - Only HS256 with the shared secret is accepted
//! - Expiry, not-before and issuer are checked against an injected clock
//! - Every failure maps to the same external outcome; [`VerifyError`]
//!   exists for logs and metrics only

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use thiserror::Error;

use crate::auth::claims::TokenClaims;
use crate::clock::Clock;
use crate::config::AuthConfig;

const BEARER_PREFIX: &str = "Bearer ";

/// Why a credential was refused. Never rendered to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("no credential presented")]
    Missing,

    #[error("credential is not a well-formed token")]
    Malformed,

    #[error("credential exceeds the size limit")]
    TooLarge,

    #[error("credential signature does not verify")]
    BadSignature,

    #[error("credential is missing a required claim")]
    MissingClaim,

    #[error("credential has expired")]
    Expired,

    #[error("credential is not valid yet")]
    NotYetValid,

    #[error("credential was issued by an unexpected authority")]
    WrongIssuer,
}

impl VerifyError {
    /// Bounded label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            VerifyError::Missing => "missing",
            VerifyError::Malformed => "malformed",
            VerifyError::TooLarge => "too_large",
            VerifyError::BadSignature => "bad_signature",
            VerifyError::MissingClaim => "missing_claim",
            VerifyError::Expired => "expired",
            VerifyError::NotYetValid => "not_yet_valid",
            VerifyError::WrongIssuer => "wrong_issuer",
        }
    }
}

/// Validates credentials signed with the deployment's shared secret.
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
    issuer: String,
    max_token_bytes: usize,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("key", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("max_token_bytes", &self.max_token_bytes)
            .finish()
    }
}

impl TokenVerifier {
    pub fn new(
        secret: &[u8],
        issuer: impl Into<String>,
        max_token_bytes: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Time and issuer checks run against our own clock below.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.leeway = 0;
        validation.required_spec_claims = HashSet::from(["exp".to_string(), "iss".to_string()]);

        Self {
            key: DecodingKey::from_secret(secret),
            validation,
            issuer: issuer.into(),
            max_token_bytes,
            clock,
        }
    }

    /// Build from configuration. Returns `None` when no secret is configured.
    pub fn from_config(config: &AuthConfig, clock: Arc<dyn Clock>) -> Option<Self> {
        let secret = config.secret.as_deref().filter(|s| !s.is_empty())?;
        Some(Self::new(
            secret.as_bytes(),
            config.issuer.clone(),
            config.max_token_bytes,
            clock,
        ))
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Verify the raw value of an `Authorization` header.
    ///
    /// A single `"Bearer "` prefix is stripped if present; otherwise the
    /// value is used as presented.
    pub fn verify(&self, authorization: Option<&str>) -> Result<TokenClaims, VerifyError> {
        let raw = authorization
            .filter(|value| !value.is_empty())
            .ok_or(VerifyError::Missing)?;
        let token = raw.strip_prefix(BEARER_PREFIX).unwrap_or(raw);

        if token.len() > self.max_token_bytes {
            return Err(VerifyError::TooLarge);
        }

        let claims = decode::<TokenClaims>(token, &self.key, &self.validation)
            .map_err(|err| classify(err.kind()))?
            .claims;

        let now = self.clock.unix_now();
        if claims.exp <= now {
            return Err(VerifyError::Expired);
        }
        if claims.nbf.is_some_and(|nbf| nbf > now) {
            return Err(VerifyError::NotYetValid);
        }
        if claims.iss != self.issuer {
            return Err(VerifyError::WrongIssuer);
        }

        Ok(claims)
    }
}

fn classify(kind: &ErrorKind) -> VerifyError {
    match kind {
        ErrorKind::InvalidSignature => VerifyError::BadSignature,
        ErrorKind::MissingRequiredClaim(_) => VerifyError::MissingClaim,
        ErrorKind::ExpiredSignature => VerifyError::Expired,
        ErrorKind::ImmatureSignature => VerifyError::NotYetValid,
        ErrorKind::InvalidIssuer => VerifyError::WrongIssuer,
        _ => VerifyError::Malformed,
    }
}
