//! Composition of the gatekeeping stages.
//!
//! ```text
//! request
//!   → rate_limit_middleware   (429 when the client's bucket is empty)
//!   → deadline_middleware     (504 when the rest does not finish in time)
//!   → auth_middleware         (401, protected routes only)
//!   → handler
//! ```
//!
//! Exactly one of those rejections or the handler's own response reaches
//! the client.

use std::sync::Arc;

use axum::{middleware, Router};
use tokio_util::sync::CancellationToken;

use crate::auth::{auth_middleware, TokenVerifier};
use crate::clock::Clock;
use crate::config::{ConfigError, GatekeeperConfig};
use crate::resilience::timeouts::{deadline_middleware, DeadlineGuard, DeadlineState};
use crate::security::client_ip::IdentitySource;
use crate::security::rate_limit::{rate_limit_middleware, ClientThrottle, RateLimitState};

/// The ordered set of protections placed in front of application routes.
#[derive(Clone)]
pub struct GatekeeperChain {
    throttle: Arc<ClientThrottle>,
    identity: IdentitySource,
    deadline: DeadlineGuard,
    verifier: Arc<TokenVerifier>,
    root: CancellationToken,
}

impl GatekeeperChain {
    pub fn new(
        throttle: Arc<ClientThrottle>,
        identity: IdentitySource,
        deadline: DeadlineGuard,
        verifier: Arc<TokenVerifier>,
        root: CancellationToken,
    ) -> Self {
        Self {
            throttle,
            identity,
            deadline,
            verifier,
            root,
        }
    }

    /// Build every stage from configuration. Request scopes become children
    /// of `root`.
    pub fn from_config(
        config: &GatekeeperConfig,
        clock: Arc<dyn Clock>,
        root: CancellationToken,
    ) -> Result<Self, ConfigError> {
        let verifier = TokenVerifier::from_config(&config.auth, clock.clone())
            .ok_or(ConfigError::MissingSecret)?;
        let throttle = ClientThrottle::from_config(&config.throttle, clock);
        let deadline = DeadlineGuard::new(config.deadline.request_timeout())
            .with_handler_budget(config.deadline.handler_budget());

        Ok(Self::new(
            Arc::new(throttle),
            IdentitySource::from_trust(config.throttle.trust_forwarded_for),
            deadline,
            Arc::new(verifier),
            root,
        ))
    }

    pub fn throttle(&self) -> &Arc<ClientThrottle> {
        &self.throttle
    }

    pub fn deadline(&self) -> &DeadlineGuard {
        &self.deadline
    }

    pub fn verifier(&self) -> &Arc<TokenVerifier> {
        &self.verifier
    }

    pub fn root(&self) -> &CancellationToken {
        &self.root
    }

    /// Routes that require a verified bearer credential.
    ///
    /// # Panics
    ///
    /// If `routes` has no routes yet (axum refuses a route layer on an
    /// empty router).
    pub fn protect<S>(&self, routes: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let routes = routes.route_layer(middleware::from_fn_with_state(
            self.verifier.clone(),
            auth_middleware,
        ));
        self.guard(routes)
    }

    /// Routes open to unauthenticated callers (login, registration, health).
    /// They are still throttled and bounded by the deadline.
    pub fn public<S>(&self, routes: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        self.guard(routes)
    }

    fn guard<S>(&self, routes: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let deadline = DeadlineState {
            guard: self.deadline,
            root: self.root.clone(),
        };
        let rate_limit = RateLimitState {
            throttle: self.throttle.clone(),
            identity: self.identity,
        };

        // Last layer added runs first.
        routes
            .layer(middleware::from_fn_with_state(deadline, deadline_middleware))
            .layer(middleware::from_fn_with_state(rate_limit, rate_limit_middleware))
    }
}
