//! Load testing for the gatekeeper.

use std::time::{Duration, Instant};

use axum::Router;
use reqwest::StatusCode;

mod common;

#[tokio::test]
async fn test_concurrent_clients_never_overspend_a_bucket() {
    // 1. Setup gatekeeper with a bucket that effectively never refills
    let mut config = common::test_config();
    config.throttle.capacity = 30;
    config.throttle.refill_per_sec = 0.001;
    let server = common::start_server(config, Router::new()).await;

    // 2. Run load from a single client identity (loopback)
    let concurrency = 20;
    let requests_per_task = 5;
    let total_requests = concurrency * requests_per_task;

    let client = common::client();
    let token = common::valid_token("loadtest", &["companies:read"]);
    let start = Instant::now();

    let mut tasks = Vec::new();
    for _ in 0..concurrency {
        let client = client.clone();
        let url = server.url("/v1/whoami");
        let token = token.clone();
        tasks.push(tokio::spawn(async move {
            let mut latencies = Vec::new();
            let mut throttled = 0usize;
            for _ in 0..requests_per_task {
                let req_start = Instant::now();
                match client.get(&url).bearer_auth(&token).send().await {
                    Ok(res) if res.status() == StatusCode::OK => latencies.push(req_start.elapsed()),
                    Ok(res) if res.status() == StatusCode::TOO_MANY_REQUESTS => throttled += 1,
                    Ok(res) => panic!("unexpected status {}", res.status()),
                    Err(err) => panic!("request failed: {err}"),
                }
            }
            (latencies, throttled)
        }));
    }

    let mut all_latencies = Vec::new();
    let mut throttled = 0;
    for task in tasks {
        let (latencies, denied) = task.await.unwrap();
        all_latencies.extend(latencies);
        throttled += denied;
    }

    let duration = start.elapsed();

    // 3. Exactly the burst was admitted, the rest refused
    assert_eq!(all_latencies.len(), 30);
    assert_eq!(throttled, total_requests - 30);

    all_latencies.sort();
    let p50 = all_latencies[all_latencies.len() / 2];
    let p99 = all_latencies[(all_latencies.len() as f64 * 0.99) as usize];

    println!("\n--- Load Test Results ---");
    println!("Total Requests: {}", total_requests);
    println!("Concurrency:    {}", concurrency);
    println!("Total Duration: {:?}", duration);
    println!("Admitted:       {}", all_latencies.len());
    println!("Throttled:      {}", throttled);
    println!("P50 Latency:    {:?}", p50);
    println!("P99 Latency:    {:?}", p99);
    println!("-------------------------\n");

    server.shutdown.trigger();
}

#[tokio::test]
async fn test_throttling_is_fast_under_load() {
    let mut config = common::test_config();
    config.throttle.capacity = 1;
    config.throttle.refill_per_sec = 0.001;
    let server = common::start_server(config, Router::new()).await;
    let client = common::client();

    // Spend the only token, then measure rejection latency
    client.get(server.url("/health")).send().await.unwrap();

    let start = Instant::now();
    for _ in 0..50 {
        let res = client.get(server.url("/health")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    }
    assert!(
        start.elapsed() < Duration::from_secs(10),
        "rejections took {:?}",
        start.elapsed()
    );

    server.shutdown.trigger();
}
