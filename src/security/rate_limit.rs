//! Per-client rate limiting with token buckets.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::config::ThrottleConfig;
use crate::error::GateError;
use crate::observability::metrics;
use crate::security::client_ip::IdentitySource;

/// Token bucket state of one client.
#[derive(Debug, Clone, Copy)]
struct RateState {
    tokens: f64,
    last_refill: Instant,
}

impl RateState {
    fn full(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant, capacity: f64, refill_rate: f64) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_refill = now;
    }

    fn try_take(&mut self) -> bool {
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    Allowed,
    /// Denied; `retry_after` is when the next token will exist.
    Denied { retry_after: Option<Duration> },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }
}

/// Bucket parameters shared by every client.
#[derive(Debug, Clone)]
pub struct ThrottleSettings {
    pub capacity: f64,
    pub refill_per_sec: f64,
    pub max_clients: usize,
    pub idle_window: Duration,
}

impl From<&ThrottleConfig> for ThrottleSettings {
    fn from(config: &ThrottleConfig) -> Self {
        Self {
            capacity: f64::from(config.capacity),
            refill_per_sec: config.refill_per_sec,
            max_clients: config.max_clients,
            idle_window: config.idle_window(),
        }
    }
}

/// Tracks one token bucket per client identity.
///
/// Each identity's read-modify-write (lookup or create, refill, decrement)
/// happens under that map shard's write lock, so concurrent requests from
/// the same client can neither lose a decrement nor double-count a refill.
///
/// Idle entries are dropped by [`ClientThrottle::sweep`]. An entry idle for
/// longer than a full refill would be indistinguishable from a fresh one, so
/// sweeping never changes an admission decision.
pub struct ClientThrottle {
    buckets: DashMap<String, RateState>,
    settings: ThrottleSettings,
    clock: Arc<dyn Clock>,
}

impl ClientThrottle {
    pub fn new(settings: ThrottleSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            buckets: DashMap::new(),
            settings,
            clock,
        }
    }

    pub fn from_config(config: &ThrottleConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(ThrottleSettings::from(config), clock)
    }

    pub fn settings(&self) -> &ThrottleSettings {
        &self.settings
    }

    /// Spend one token for `identity` if one is available.
    pub fn admit(&self, identity: &str) -> bool {
        self.check(identity).is_allowed()
    }

    /// Like [`ClientThrottle::admit`], reporting how long a denied client should wait.
    pub fn check(&self, identity: &str) -> Admission {
        let now = self.clock.now();
        let capacity = self.settings.capacity;

        let (admission, inserted) = match self.buckets.get_mut(identity) {
            Some(mut state) => (self.spend(&mut state, now), false),
            None => {
                let mut state = self
                    .buckets
                    .entry(identity.to_owned())
                    .or_insert_with(|| RateState::full(capacity, now));
                (self.spend(&mut state, now), true)
            }
        };

        // Shard locks are released above; eviction may now walk the map.
        if inserted {
            let tracked = self.buckets.len();
            if tracked > self.settings.max_clients {
                self.enforce_ceiling();
            } else {
                metrics::set_throttle_clients(tracked);
            }
        }

        admission
    }

    fn spend(&self, state: &mut RateState, now: Instant) -> Admission {
        state.refill(now, self.settings.capacity, self.settings.refill_per_sec);
        if state.try_take() {
            Admission::Allowed
        } else {
            Admission::Denied {
                retry_after: self.time_to_next_token(state.tokens),
            }
        }
    }

    fn time_to_next_token(&self, tokens: f64) -> Option<Duration> {
        if self.settings.refill_per_sec <= 0.0 {
            return None;
        }
        let deficit = (1.0 - tokens).max(0.0);
        // Rates small enough to overflow a Duration mean "effectively never".
        Some(
            Duration::try_from_secs_f64(deficit / self.settings.refill_per_sec)
                .unwrap_or(Duration::MAX),
        )
    }

    /// Tokens currently held by `identity`, as of its last refill.
    pub fn available_tokens(&self, identity: &str) -> Option<f64> {
        self.buckets.get(identity).map(|state| state.tokens)
    }

    /// Number of client identities being tracked.
    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }

    /// Drop clients idle for longer than the idle window. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let idle_window = self.settings.idle_window;
        let before = self.buckets.len();
        self.buckets
            .retain(|_, state| now.saturating_duration_since(state.last_refill) < idle_window);
        let removed = before.saturating_sub(self.buckets.len());
        metrics::set_throttle_clients(self.buckets.len());
        removed
    }

    /// Size the map is trimmed back to once it overflows `max_clients`.
    ///
    /// Trimming to a tenth below the ceiling means the full walk below runs
    /// at most once per `max_clients / 10` new identities.
    fn low_water_mark(&self) -> usize {
        let max = self.settings.max_clients;
        max.saturating_sub((max / 10).max(1)).max(1)
    }

    fn enforce_ceiling(&self) {
        let removed = self.sweep();
        let low_water = self.low_water_mark();
        let excess = self.buckets.len().saturating_sub(low_water);
        if excess == 0 {
            tracing::debug!(removed, "Throttle ceiling restored by idle sweep");
            return;
        }

        let mut by_age: Vec<(String, Instant)> = self
            .buckets
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().last_refill))
            .collect();
        if excess < by_age.len() {
            // Oldest `excess` entries end up in front, in no particular order.
            by_age.select_nth_unstable_by_key(excess, |(_, last_refill)| *last_refill);
        }

        for (identity, _) in by_age.into_iter().take(excess) {
            self.buckets.remove(&identity);
        }

        tracing::warn!(
            evicted = excess,
            max_clients = self.settings.max_clients,
            "Throttle client ceiling reached; evicted least recently seen clients"
        );
        metrics::set_throttle_clients(self.buckets.len());
    }

    /// Sweep idle clients every `interval` until `shutdown` fires.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = self.sweep();
                        if removed > 0 {
                            tracing::debug!(removed, remaining = self.tracked_clients(), "Swept idle throttle clients");
                        }
                    }
                }
            }
        })
    }
}

/// State for the rate limiting middleware.
#[derive(Clone)]
pub struct RateLimitState {
    pub throttle: Arc<ClientThrottle>,
    pub identity: IdentitySource,
}

/// Middleware function for per-client rate limiting.
pub async fn rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let client = state.identity.identify(addr, request.headers());

    match state.throttle.check(&client) {
        Admission::Allowed => {
            metrics::record_admission(true);
            next.run(request).await
        }
        Admission::Denied { retry_after } => {
            tracing::warn!(client = %client, "Rate limit exceeded");
            metrics::record_admission(false);
            GateError::AdmissionDenied { retry_after }.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn throttle(capacity: f64, rate: f64) -> (ClientThrottle, ManualClock) {
        let clock = ManualClock::new();
        let settings = ThrottleSettings {
            capacity,
            refill_per_sec: rate,
            max_clients: 1_000,
            idle_window: Duration::from_secs(60),
        };
        (ClientThrottle::new(settings, Arc::new(clock.clone())), clock)
    }

    #[test]
    fn burst_then_throttle() {
        let (throttle, _clock) = throttle(10.0, 5.0);
        for i in 0..10 {
            assert!(throttle.admit("10.0.0.1"), "call {} should be admitted", i + 1);
        }
        assert!(!throttle.admit("10.0.0.1"));
    }

    #[test]
    fn refill_recovers_after_one_second() {
        let (throttle, clock) = throttle(10.0, 5.0);
        for _ in 0..10 {
            throttle.admit("10.0.0.1");
        }
        assert!(!throttle.admit("10.0.0.1"));

        clock.advance(Duration::from_secs(1));
        assert!(throttle.admit("10.0.0.1"));
        let left = throttle.available_tokens("10.0.0.1").unwrap();
        assert!((left - 4.0).abs() < 1e-9, "expected 4 tokens, got {left}");
    }

    #[test]
    fn refill_is_capped_at_capacity() {
        let (throttle, clock) = throttle(10.0, 5.0);
        throttle.admit("10.0.0.1");
        clock.advance(Duration::from_secs(3600));
        throttle.admit("10.0.0.1");
        assert_eq!(throttle.available_tokens("10.0.0.1"), Some(9.0));
    }

    #[test]
    fn identities_are_isolated() {
        let (throttle, _clock) = throttle(10.0, 5.0);
        while throttle.admit("a") {}
        assert!(!throttle.admit("a"));
        assert!(throttle.admit("b"));
    }

    #[test]
    fn tokens_stay_within_bounds() {
        let (throttle, clock) = throttle(10.0, 5.0);
        let steps = [0, 50, 0, 0, 900, 10, 0, 3_000, 0, 1, 0, 0, 0, 250];
        for (i, millis) in steps.iter().cycle().take(500).enumerate() {
            clock.advance(Duration::from_millis(*millis));
            throttle.admit("x");
            let tokens = throttle.available_tokens("x").unwrap();
            assert!(
                (0.0..=10.0).contains(&tokens),
                "step {i}: tokens out of range: {tokens}"
            );
        }
    }

    #[test]
    fn denial_reports_time_to_next_token() {
        let (throttle, _clock) = throttle(1.0, 4.0);
        assert!(throttle.admit("x"));
        match throttle.check("x") {
            Admission::Denied {
                retry_after: Some(wait),
            } => assert_eq!(wait, Duration::from_millis(250)),
            other => panic!("unexpected admission {other:?}"),
        }
    }

    #[test]
    fn sweep_drops_only_idle_clients() {
        let (throttle, clock) = throttle(10.0, 5.0);
        throttle.admit("old");
        clock.advance(Duration::from_secs(61));
        throttle.admit("fresh");

        assert_eq!(throttle.sweep(), 1);
        assert_eq!(throttle.tracked_clients(), 1);
        assert!(throttle.available_tokens("old").is_none());
        assert!(throttle.available_tokens("fresh").is_some());
    }

    #[test]
    fn ceiling_evicts_least_recently_seen() {
        let clock = ManualClock::new();
        let settings = ThrottleSettings {
            capacity: 10.0,
            refill_per_sec: 5.0,
            max_clients: 3,
            idle_window: Duration::from_secs(3600),
        };
        let throttle = ClientThrottle::new(settings, Arc::new(clock.clone()));

        for client in ["a", "b", "c"] {
            throttle.admit(client);
            clock.advance(Duration::from_millis(10));
        }
        throttle.admit("a");
        clock.advance(Duration::from_millis(10));
        throttle.admit("d");

        assert_eq!(throttle.tracked_clients(), 2);
        assert!(throttle.available_tokens("b").is_none());
        assert!(throttle.available_tokens("c").is_none());
        assert!(throttle.available_tokens("a").is_some());
        assert!(throttle.available_tokens("d").is_some());
    }

    #[test]
    fn ceiling_trims_in_batches_under_churn() {
        let clock = ManualClock::new();
        let settings = ThrottleSettings {
            capacity: 10.0,
            refill_per_sec: 5.0,
            max_clients: 100,
            idle_window: Duration::from_secs(3600),
        };
        let throttle = ClientThrottle::new(settings, Arc::new(clock.clone()));

        for i in 0..100 {
            throttle.admit(&format!("client-{i}"));
            clock.advance(Duration::from_millis(1));
        }
        assert_eq!(throttle.tracked_clients(), 100);

        // One overflow trims a whole batch of the oldest clients.
        throttle.admit("client-100");
        assert_eq!(throttle.tracked_clients(), 90);
        assert!(throttle.available_tokens("client-0").is_none());
        assert!(throttle.available_tokens("client-10").is_none());
        assert!(throttle.available_tokens("client-11").is_some());
        assert!(throttle.available_tokens("client-100").is_some());

        // The following new clients fit without another walk over the map.
        for i in 101..111 {
            clock.advance(Duration::from_millis(1));
            throttle.admit(&format!("client-{i}"));
            assert_eq!(throttle.tracked_clients(), i - 10);
        }
        assert!(throttle.available_tokens("client-11").is_some());
    }

    #[test]
    fn negligible_refill_rate_saturates_retry_after() {
        let (throttle, _clock) = throttle(1.0, 1e-20);
        assert!(throttle.admit("x"));
        assert_eq!(
            throttle.check("x"),
            Admission::Denied {
                retry_after: Some(Duration::MAX)
            }
        );
    }

    #[test]
    fn gauge_follows_new_clients_between_sweeps() {
        use metrics_util::debugging::{DebugValue, DebuggingRecorder};

        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        let (throttle, _clock) = throttle(10.0, 5.0);

        ::metrics::with_local_recorder(&recorder, || {
            throttle.admit("a");
            throttle.admit("b");
            throttle.admit("a");
        });

        let tracked = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .find_map(|(key, _, _, value)| match (key.key().name(), value) {
                ("gatekeeper_throttle_clients", DebugValue::Gauge(v)) => Some(v.into_inner()),
                _ => None,
            });
        assert_eq!(tracked, Some(2.0));
    }

    #[test]
    fn concurrent_admissions_never_overspend() {
        let (throttle, _clock) = throttle(50.0, 0.000_001);
        let throttle = Arc::new(throttle);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let throttle = throttle.clone();
                std::thread::spawn(move || (0..25).filter(|_| throttle.admit("shared")).count())
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_stops_on_shutdown() {
        let (throttle, clock) = throttle(10.0, 5.0);
        let throttle = Arc::new(throttle);
        throttle.admit("idle");
        clock.advance(Duration::from_secs(120));

        let shutdown = CancellationToken::new();
        let handle = throttle
            .clone()
            .spawn_sweeper(Duration::from_secs(1), shutdown.clone());

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(throttle.tracked_clients(), 0);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
