//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Mount public and protected routers behind the gatekeeper chain
//! - Wire up cross-cutting layers (request id, tracing)
//! - Serve with peer addresses available to the throttle
//! - Run the throttle sweeper and shut everything down together

use std::net::SocketAddr;

use axum::{http::HeaderName, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::GatekeeperConfig;
use crate::http::chain::GatekeeperChain;

pub const X_REQUEST_ID: &str = "x-request-id";

/// HTTP server hosting application routes behind the gatekeeper.
pub struct HttpServer {
    router: Router,
    config: GatekeeperConfig,
    chain: GatekeeperChain,
}

impl HttpServer {
    /// `public` routes skip authentication; `protected` routes require a
    /// verified bearer credential. Both are throttled and deadline-bound.
    pub fn new(
        config: GatekeeperConfig,
        chain: GatekeeperChain,
        public: Router,
        protected: Router,
    ) -> Self {
        let router = Self::build_router(&chain, public, protected);
        Self {
            router,
            config,
            chain,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(chain: &GatekeeperChain, public: Router, protected: Router) -> Router {
        let request_id = HeaderName::from_static(X_REQUEST_ID);

        Router::new()
            .merge(chain.public(public))
            .merge(chain.protect(protected))
            .layer(PropagateRequestIdLayer::new(request_id.clone()))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            capacity = self.config.throttle.capacity,
            refill_per_sec = self.config.throttle.refill_per_sec,
            request_timeout_secs = self.config.deadline.request_secs,
            issuer = %self.chain.verifier().issuer(),
            "HTTP server starting"
        );

        let sweeper = self.chain.throttle().clone().spawn_sweeper(
            std::time::Duration::from_secs(self.config.throttle.sweep_interval_secs),
            shutdown.clone(),
        );

        // In-flight request scopes hang off the chain root.
        let root = self.chain.root().clone();
        let signal = shutdown.clone();
        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                signal.cancelled().await;
                root.cancel();
                tracing::info!("Draining in-flight requests");
            })
            .await?;

        shutdown.cancel();
        if let Err(err) = sweeper.await {
            tracing::warn!(error = %err, "Throttle sweeper ended abnormally");
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatekeeperConfig {
        &self.config
    }

    /// The router as served, for in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}
