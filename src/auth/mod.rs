//! Bearer credential verification.
//!
//! # Data Flow
//! ```text
//! Authorization header
//!     → verifier.rs (strip "Bearer ", size check, HS256 signature,
//!                    required claims, expiry / not-before / issuer)
//!     → middleware.rs (401 on any failure, claims into extensions)
//!     → handler reads Extension<TokenClaims>
//! ```
//!
//! # Design Decisions
//! - Fail closed: anything short of a positive verification is a 401
//! - One external outcome for every failure; reasons are logged at debug
//! - Claims are rebuilt per request and never cached

pub mod claims;
pub mod middleware;
pub mod verifier;

pub use claims::TokenClaims;
pub use middleware::{auth_middleware, ClaimsExt};
pub use verifier::{TokenVerifier, VerifyError};
