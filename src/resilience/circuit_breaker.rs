//! Circuit breaker for upstream protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: upstream assumed down, calls fail fast
//! - Half-Open: testing if upstream recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive_failures >= failure_threshold
//! Open → Half-Open: open_duration elapsed (checked on the next call)
//! Half-Open → Closed: consecutive_successes >= success_threshold
//! Half-Open → Open: any failure
//! ```
//!
//! # Design Decisions
//! - Per-upstream circuit breaker (not global)
//! - Fail fast in Open state (work is never invoked)
//! - The lock covers state bookkeeping only, never the protected call
//! - Counters reset on every transition

use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use prometheus::IntGauge;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::schema::BreakerConfig;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    HalfOpen,
    Open,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::HalfOpen => "half-open",
            BreakerState::Open => "open",
        }
    }

    /// Value exported on the breaker state gauge.
    pub fn gauge_value(&self) -> i64 {
        match self {
            BreakerState::Closed => 0,
            BreakerState::HalfOpen => 1,
            BreakerState::Open => 2,
        }
    }
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Call outcome counters since the last state transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub calls: u64,
    pub successes: u64,
    pub consecutive_successes: u64,
    pub failures: u64,
    pub consecutive_failures: u64,
}

impl Counters {
    fn pass(&mut self) {
        self.calls += 1;
        self.successes += 1;
        self.consecutive_successes += 1;
        self.consecutive_failures = 0;
    }

    fn fail(&mut self) {
        self.calls += 1;
        self.failures += 1;
        self.consecutive_failures += 1;
        self.consecutive_successes = 0;
    }
}

/// Thresholds driving the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSettings {
    pub failure_threshold: u64,
    pub success_threshold: u64,
    pub open_duration: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 2,
            success_threshold: 1,
            open_duration: Duration::from_secs(300),
        }
    }
}

impl From<&BreakerConfig> for BreakerSettings {
    fn from(config: &BreakerConfig) -> Self {
        Self {
            failure_threshold: u64::from(config.failure_threshold),
            success_threshold: u64::from(config.success_threshold),
            open_duration: Duration::from_secs(config.open_duration_secs),
        }
    }
}

/// Error returned by [`CircuitBreaker::execute`].
///
/// `Open` means the call was suppressed by policy and says nothing about
/// the upstream itself; callers usually skip it instead of reporting it.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    #[error("circuit is open")]
    Open,

    #[error("{0}")]
    Inner(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open)
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            BreakerError::Open => None,
            BreakerError::Inner(e) => Some(e),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    counters: Counters,
    /// `None` while closed, or when the open duration outlasts the clock.
    open_expiration: Option<Instant>,
}

/// A three-state circuit breaker guarding one unit of work.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    settings: BreakerSettings,
    inner: Mutex<BreakerInner>,
    state_gauge: Option<IntGauge>,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(name: impl Into<String>, settings: BreakerSettings) -> Self {
        Self {
            name: name.into(),
            settings,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                counters: Counters::default(),
                open_expiration: None,
            }),
            state_gauge: None,
        }
    }

    /// Mirror every state transition onto `gauge`.
    pub fn with_state_gauge(mut self, gauge: IntGauge) -> Self {
        gauge.set(BreakerState::Closed.gauge_value());
        self.state_gauge = Some(gauge);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &BreakerSettings {
        &self.settings
    }

    /// Current state, promoting an expired Open state to Half-Open.
    pub fn state(&self) -> BreakerState {
        let mut inner = self.lock();
        self.refresh_state(&mut inner)
    }

    /// Snapshot of the counters since the last transition.
    pub fn counters(&self) -> Counters {
        self.lock().counters
    }

    /// Run `work` unless the circuit is open, recording its outcome.
    pub async fn execute<F, Fut, T, E>(&self, work: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if self.state() == BreakerState::Open {
            return Err(BreakerError::Open);
        }

        match work().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(e) => {
                self.on_failure();
                Err(BreakerError::Inner(e))
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.lock();
        inner.counters.pass();
        if inner.state == BreakerState::HalfOpen
            && inner.counters.consecutive_successes >= self.settings.success_threshold
        {
            self.set_state(&mut inner, BreakerState::Closed);
        }
    }

    fn on_failure(&self) {
        let mut inner = self.lock();
        inner.counters.fail();
        let trip = match inner.state {
            BreakerState::HalfOpen => true,
            BreakerState::Closed => {
                inner.counters.consecutive_failures >= self.settings.failure_threshold
            }
            BreakerState::Open => false,
        };
        if trip {
            self.set_state(&mut inner, BreakerState::Open);
        }
    }

    fn refresh_state(&self, inner: &mut BreakerInner) -> BreakerState {
        let expired = inner
            .open_expiration
            .is_some_and(|expiration| Instant::now() >= expiration);
        if inner.state == BreakerState::Open && expired {
            self.set_state(inner, BreakerState::HalfOpen);
        }
        inner.state
    }

    fn set_state(&self, inner: &mut BreakerInner, state: BreakerState) {
        let previous = inner.state;
        inner.state = state;
        inner.counters = Counters::default();
        if state == BreakerState::Open {
            inner.open_expiration = Instant::now().checked_add(self.settings.open_duration);
        }
        if let Some(gauge) = &self.state_gauge {
            gauge.set(state.gauge_value());
        }
        tracing::info!(
            breaker = %self.name,
            from = %previous,
            to = %state,
            "Circuit breaker state change"
        );
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
