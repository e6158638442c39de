//! Gatekeeper host.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────────┐
//!                      │                     GATEKEEPER                        │
//!                      │                                                       │
//!   Client Request     │  ┌──────────┐   ┌──────────┐   ┌──────────┐          │
//!   ───────────────────┼─▶│ throttle │──▶│ deadline │──▶│   auth   │──▶ handler
//!                      │  │  (429)   │   │  (504)   │   │  (401)   │          │
//!                      │  └──────────┘   └──────────┘   └──────────┘          │
//!                      │                                                       │
//!                      │  config · logging · metrics · graceful shutdown       │
//!                      └──────────────────────────────────────────────────────┘
//! ```
//!
//! Configuration comes from the environment (see `config::loader`). The
//! process refuses to start without `JWT_SECRET_KEY`.

use std::process::ExitCode;
use std::sync::Arc;

use gatekeeper::clock::SystemClock;
use gatekeeper::config::{self, ObservabilityConfig};
use gatekeeper::http::handlers::{protected_routes, public_routes};
use gatekeeper::lifecycle::{signals, Shutdown};
use gatekeeper::observability::{logging, metrics};
use gatekeeper::{GatekeeperChain, HttpServer};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match config::load_from_env() {
        Ok(config) => config,
        Err(err) => {
            if let Err(log_err) = logging::init_logging(&ObservabilityConfig::default()) {
                eprintln!("failed to initialise logging: {log_err}");
                eprintln!("configuration rejected: {err}");
                return ExitCode::FAILURE;
            }
            tracing::error!(error = %err, "Configuration rejected; not serving traffic");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = logging::init_logging(&config.observability) {
        eprintln!("failed to initialise logging: {err}");
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        capacity = config.throttle.capacity,
        refill_per_sec = config.throttle.refill_per_sec,
        request_timeout_secs = config.deadline.request_secs,
        "Configuration loaded"
    );

    match run(config).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(error = %err, "Gatekeeper terminated with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: config::GatekeeperConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.observability.metrics_enabled {
        let addr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(shutdown.clone());

    let chain = GatekeeperChain::from_config(&config, Arc::new(SystemClock), shutdown.subscribe())?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config, chain, public_routes(), protected_routes());
    server.run(listener, shutdown.subscribe()).await?;
    Ok(())
}
