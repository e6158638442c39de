//! Timeout enforcement.
//!
//! # Responsibilities
//! - Race the rest of the handler chain against a hard request deadline
//! - Signal downstream work to stop when the deadline wins
//! - Bound individual handler operations with a working budget
//!
//! # Cancellation contract
//! Cancellation is cooperative. When the deadline elapses the request's
//! [`RequestScope`] is cancelled and the client gets a 504, but the handler
//! task is left running: it is expected to watch its scope (directly or via
//! [`within_budget`]) and give up. Its eventual response is discarded.

use std::future::Future;
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio_util::sync::CancellationToken;

use crate::error::GateError;
use crate::observability::metrics;

/// Cancellation scope of one request, available to handlers as a request
/// extension (`Extension<RequestScope>`).
///
/// Also carries the working budget for individual handler operations, so
/// handlers bound their slow steps with the configured value:
///
/// ```ignore
/// async fn login(Extension(scope): Extension<RequestScope>) -> Result<String, GateError> {
///     scope.within_budget(check_password()).await
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RequestScope {
    token: CancellationToken,
    budget: Duration,
}

impl RequestScope {
    pub fn new(token: CancellationToken, budget: Duration) -> Self {
        Self { token, budget }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the request has been abandoned.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Working budget for one handler operation.
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// [`within_budget`] with this scope's budget and cancellation.
    pub async fn within_budget<F>(&self, work: F) -> Result<F::Output, GateError>
    where
        F: Future,
    {
        within_budget(self.budget, Some(self), work).await
    }
}

/// Runs a unit of work under a fixed time budget.
#[derive(Debug, Clone, Copy)]
pub struct DeadlineGuard {
    timeout: Duration,
    handler_budget: Duration,
}

impl DeadlineGuard {
    /// The handler budget starts equal to `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            handler_budget: timeout,
        }
    }

    /// Budget handed to handlers through their [`RequestScope`].
    pub fn with_handler_budget(mut self, budget: Duration) -> Self {
        self.handler_budget = budget;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn handler_budget(&self) -> Duration {
        self.handler_budget
    }

    /// Run `work` on its own task in a child scope of `parent`.
    ///
    /// Exactly one outcome is returned: the work's output if it finishes
    /// first, otherwise [`GateError::DeadlineExceeded`]. The child scope is
    /// cancelled when this returns, whichever way it went. A panic in the
    /// work becomes [`GateError::HandlerFailed`].
    pub async fn enforce<F, Fut>(&self, parent: &CancellationToken, work: F) -> Result<Fut::Output, GateError>
    where
        F: FnOnce(RequestScope) -> Fut,
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        let token = parent.child_token();
        let _teardown = token.clone().drop_guard();

        let scope = RequestScope::new(token.clone(), self.handler_budget);
        let mut task = tokio::spawn(work(scope));
        let deadline = tokio::time::sleep(self.timeout);

        tokio::select! {
            biased;
            joined = &mut task => joined.map_err(|err| {
                tracing::error!(error = %err, "Handler task failed");
                GateError::HandlerFailed
            }),
            () = deadline => {
                token.cancel();
                Err(GateError::DeadlineExceeded)
            }
        }
    }
}

/// State for the deadline middleware.
#[derive(Clone)]
pub struct DeadlineState {
    pub guard: DeadlineGuard,
    /// Parent of every request scope; cancelled on server shutdown.
    pub root: CancellationToken,
}

/// Middleware enforcing the request deadline on everything after it in the chain.
pub async fn deadline_middleware(
    State(state): State<DeadlineState>,
    mut request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let path = request.uri().path().to_owned();

    let outcome = state
        .guard
        .enforce(&state.root, move |scope| {
            request.extensions_mut().insert(scope);
            next.run(request)
        })
        .await;

    let label = match &outcome {
        Ok(_) => "completed",
        Err(GateError::DeadlineExceeded) => {
            tracing::warn!(
                path = %path,
                timeout_ms = state.guard.timeout().as_millis() as u64,
                "Request timed out"
            );
            "timed_out"
        }
        Err(_) => "failed",
    };
    metrics::record_deadline_outcome(label, started.elapsed());

    match outcome {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

/// Bound one handler operation by `budget`, stopping early if the request
/// scope is cancelled.
pub async fn within_budget<F>(
    budget: Duration,
    scope: Option<&RequestScope>,
    work: F,
) -> Result<F::Output, GateError>
where
    F: Future,
{
    let abandoned = async {
        match scope {
            Some(scope) => scope.cancelled().await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        biased;
        output = work => Ok(output),
        () = abandoned => Err(GateError::DeadlineExceeded),
        () = tokio::time::sleep(budget) => Err(GateError::DeadlineExceeded),
    }
}
