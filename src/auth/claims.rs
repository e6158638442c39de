//! Decoded bearer credential payload.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Claims carried by a credential issued by the credential service.
///
/// The subject is redacted in Debug output so that claim sets can be logged
/// without leaking user names.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Identity of the caller.
    #[serde(rename = "username")]
    pub subject: String,

    /// Capabilities granted to the caller. Absent and `null` both mean none.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub scopes: Vec<String>,

    /// Issued-at (unix seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Expiry (unix seconds). Presence is enforced by the verifier.
    #[serde(default)]
    pub exp: i64,

    /// Not-before (unix seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    /// Issuing authority. Presence is enforced by the verifier.
    #[serde(default)]
    pub iss: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl TokenClaims {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

impl fmt::Debug for TokenClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenClaims")
            .field("subject", &"[REDACTED]")
            .field("scopes", &self.scopes)
            .field("iat", &self.iat)
            .field("exp", &self.exp)
            .field("nbf", &self.nbf)
            .field("iss", &self.iss)
            .finish()
    }
}
