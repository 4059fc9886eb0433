//! Single-flight TTL memoization.
//!
//! A [`Snapshot`] remembers the last successful result of an expensive
//! computation and hands it out until it is older than the refresh interval.
//! The lock is held for the whole evaluation: concurrent callers wait for the
//! computation in progress and then share its result.
//!
//! Failures are returned to the caller and never stored, so the call after a
//! failure recomputes immediately.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
struct Measured<T> {
    value: T,
    checked_at: Instant,
}

/// Memoized result of a computation.
#[derive(Debug)]
pub struct Snapshot<T> {
    interval: Duration,
    state: Mutex<Option<Measured<T>>>,
}

impl<T: Clone> Snapshot<T> {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Return the memoized value, running `compute` if it is missing or stale.
    pub async fn measure<F, Fut, E>(&self, compute: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut state = self.state.lock().await;
        if let Some(measured) = state.as_ref() {
            if measured.checked_at.elapsed() <= self.interval {
                return Ok(measured.value.clone());
            }
        }

        let value = compute().await?;
        *state = Some(Measured {
            value: value.clone(),
            checked_at: Instant::now(),
        });
        Ok(value)
    }

    /// Forget the memoized value.
    pub async fn invalidate(&self) {
        *self.state.lock().await = None;
    }
}
