//! Shared utilities for integration and load testing.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::Router;
use gatekeeper::clock::SystemClock;
use gatekeeper::config::GatekeeperConfig;
use gatekeeper::http::handlers::{protected_routes, public_routes};
use gatekeeper::{GatekeeperChain, HttpServer, Shutdown};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};

pub const SECRET: &str = "integration-test-secret";
pub const ISSUER: &str = "auth";

/// Config with the test secret and an ephemeral port.
pub fn test_config() -> GatekeeperConfig {
    let mut config = GatekeeperConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.auth.secret = Some(SECRET.to_string());
    config
}

/// A running gatekeeper host.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: tokio::task::JoinHandle<Result<(), std::io::Error>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Start the host with the default routes plus `extra_protected`.
pub async fn start_server(config: GatekeeperConfig, extra_protected: Router) -> TestServer {
    let shutdown = Shutdown::new();
    let chain =
        GatekeeperChain::from_config(&config, Arc::new(SystemClock), shutdown.subscribe()).unwrap();

    let listener = tokio::net::TcpListener::bind(&config.listener.bind_address)
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();

    let server = HttpServer::new(
        config,
        chain,
        public_routes(),
        protected_routes().merge(extra_protected),
    );
    let server_shutdown = shutdown.subscribe();
    let handle = tokio::spawn(async move { server.run(listener, server_shutdown).await });

    TestServer {
        addr,
        shutdown,
        handle,
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

/// Claims the credential service would issue for `subject`.
pub fn claims_for(subject: &str, scopes: &[&str]) -> Value {
    let now = unix_now();
    json!({
        "username": subject,
        "scopes": scopes,
        "iat": now,
        "exp": now + 3600,
        "iss": ISSUER,
    })
}

pub fn sign(claims: &Value, secret: &str) -> String {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

pub fn valid_token(subject: &str, scopes: &[&str]) -> String {
    sign(&claims_for(subject, scopes), SECRET)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
