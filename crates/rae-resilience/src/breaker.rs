//! Three-state circuit breaker
//!
//! ```text
//! Closed   --[failure_count >= failure_threshold]-->  Open
//! Open     --[call attempted, timeout elapsed]----->  HalfOpen
//! HalfOpen --[success_count >= success_threshold]-->  Closed
//! HalfOpen --[any failure]------------------------->  Open
//! ```
//!
//! The breaker does not interpret errors: an `Err` from the wrapped call is a
//! failure, an `Ok` is a success. It applies no timeout of its own; callers
//! wrap slow calls with [`call_with_timeout`](crate::call_with_timeout) so a
//! call that never returns still reaches the failure accounting.
//!
//! # Thread Safety
//!
//! All state lives behind one `parking_lot::Mutex` per breaker. The lock is
//! never held across the wrapped call's `.await`; events are emitted after the
//! lock is released.

use parking_lot::Mutex;
use rae_core::{BreakerConfig, CollaboratorError, EngineError, EventKind, EventSink, NullSink};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CircuitState {
    /// Calls pass through
    Closed,
    /// Calls are rejected without reaching the resource
    Open,
    /// Probe calls pass through to test recovery
    HalfOpen,
}

impl CircuitState {
    /// Stable state name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "Closed",
            Self::Open => "Open",
            Self::HalfOpen => "HalfOpen",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transitions the breaker may make on its own (`reset` is administrative and not listed)
#[must_use]
pub fn allowed_transitions(from: CircuitState) -> Vec<CircuitState> {
    use CircuitState::*;
    match from {
        Closed => vec![Open],
        Open => vec![HalfOpen],
        HalfOpen => vec![Closed, Open],
    }
}

/// Error returned through a breaker
#[derive(Debug, thiserror::Error)]
pub enum BreakerError<E> {
    /// Breaker is open; the wrapped call was not made
    #[error("circuit open for '{resource}', retry after {retry_after:?}")]
    Open {
        /// Protected resource name
        resource: String,
        /// Time until a probe call is admitted
        retry_after: Duration,
    },

    /// The wrapped call itself failed
    #[error("{0}")]
    Inner(E),
}

impl<E> BreakerError<E> {
    /// Check if the breaker rejected the call
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }
}

impl From<BreakerError<CollaboratorError>> for EngineError {
    fn from(value: BreakerError<CollaboratorError>) -> Self {
        match value {
            BreakerError::Open {
                resource,
                retry_after,
            } => EngineError::CircuitOpen {
                resource,
                retry_after,
            },
            BreakerError::Inner(e) => EngineError::TransientExternal(e),
        }
    }
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerStatus {
    /// Resource name
    pub name: String,
    /// Current state
    pub state: CircuitState,
    /// Consecutive failures counted
    pub failure_count: u32,
    /// Half-open successes counted
    pub success_count: u32,
    /// Zero unless open
    pub time_until_retry: Duration,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_at: Option<Instant>,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_at: None,
        }
    }

    fn elapsed_since_failure(&self) -> Duration {
        self.last_failure_at
            .map_or(Duration::MAX, |at| Instant::now().saturating_duration_since(at))
    }
}

/// Failure isolator for one named resource
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
    sink: Arc<dyn EventSink>,
}

impl CircuitBreaker {
    /// Create a closed breaker
    #[must_use]
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner::new()),
            sink: Arc::new(NullSink),
        }
    }

    /// With event sink for state transitions
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Resource name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Current state (no transition is triggered by reading)
    #[inline]
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Run `f` through the breaker
    ///
    /// # Errors
    /// - `BreakerError::Open` if the breaker is open and the timeout has not
    ///   elapsed; `f` is not called
    /// - `BreakerError::Inner` with the call's own error
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.try_acquire()?;

        match f().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure();
                Err(BreakerError::Inner(e))
            }
        }
    }

    /// Wrap a function so every invocation goes through this breaker
    #[must_use]
    pub fn protect<F>(self: &Arc<Self>, f: F) -> Protected<F> {
        Protected {
            breaker: Arc::clone(self),
            f,
        }
    }

    /// Admit or reject a call, moving Open -> HalfOpen once the timeout elapsed
    ///
    /// # Errors
    /// `BreakerError::Open` while the breaker is open.
    pub fn try_acquire<E>(&self) -> Result<(), BreakerError<E>> {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Open {
            return Ok(());
        }

        let elapsed = inner.elapsed_since_failure();
        let timeout = self.config.timeout();
        if elapsed >= timeout {
            inner.state = CircuitState::HalfOpen;
            inner.success_count = 0;
            drop(inner);

            tracing::info!(resource = %self.name, "breaker half-open, admitting probe call");
            self.sink.record(EventKind::BreakerHalfOpen {
                resource: self.name.clone(),
            });
            return Ok(());
        }

        Err(BreakerError::Open {
            resource: self.name.clone(),
            retry_after: timeout.saturating_sub(elapsed),
        })
    }

    /// Feed a successful outcome
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        let closed = match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
                false
            }
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    true
                } else {
                    false
                }
            }
            // Late success from a call admitted before the breaker opened
            CircuitState::Open => false,
        };
        drop(inner);

        if closed {
            tracing::info!(resource = %self.name, "breaker closed");
            self.sink.record(EventKind::BreakerClosed {
                resource: self.name.clone(),
            });
        }
    }

    /// Feed a failed outcome
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure_at = Some(Instant::now());

        let opened = match inner.state {
            CircuitState::Closed if inner.failure_count >= self.config.failure_threshold => {
                inner.state = CircuitState::Open;
                inner.success_count = 0;
                true
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.success_count = 0;
                true
            }
            _ => false,
        };
        let failure_count = inner.failure_count;
        drop(inner);

        if opened {
            tracing::warn!(resource = %self.name, failure_count, "breaker opened");
            self.sink.record(EventKind::BreakerOpened {
                resource: self.name.clone(),
                failure_count,
            });
        }
    }

    /// Snapshot of state and counters
    #[must_use]
    pub fn status(&self) -> BreakerStatus {
        let inner = self.inner.lock();
        let time_until_retry = if inner.state == CircuitState::Open {
            self.config
                .timeout()
                .saturating_sub(inner.elapsed_since_failure())
        } else {
            Duration::ZERO
        };

        BreakerStatus {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            time_until_retry,
        }
    }

    /// Force the breaker closed and clear its counters
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        let was = inner.state;
        *inner = BreakerInner::new();
        drop(inner);

        if was != CircuitState::Closed {
            tracing::info!(resource = %self.name, from = %was, "breaker reset");
            self.sink.record(EventKind::BreakerClosed {
                resource: self.name.clone(),
            });
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Function wrapped by [`CircuitBreaker::protect`]
#[derive(Debug, Clone)]
pub struct Protected<F> {
    breaker: Arc<CircuitBreaker>,
    f: F,
}

impl<F> Protected<F> {
    /// Invoke the wrapped function through the breaker
    ///
    /// # Errors
    /// Same as [`CircuitBreaker::call`].
    pub async fn call<A, Fut, T, E>(&self, arg: A) -> Result<T, BreakerError<E>>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.breaker.call(|| (self.f)(arg)).await
    }

    /// The guarding breaker
    #[inline]
    #[must_use]
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }
}
