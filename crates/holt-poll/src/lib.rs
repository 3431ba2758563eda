//! Bounded condition polling with exponential backoff.
//!
//! Used wherever the bridge or the debug orchestrator must wait for a remote
//! state transition that the editor does not push (socket creation,
//! breakpoint verification, language-server readiness). External-process
//! timing is inherently variable, so a fixed sleep either wastes time or
//! flakes under load; polling with backoff bounds both.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Error)]
pub enum WaitError<E> {
    #[error("condition not met within {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Check(E),
}

/// Backoff schedule for [`wait_for`].
#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    /// Minimum sleep between two checks; the predicate is never sampled more
    /// often than this.
    pub initial: Duration,
    /// Upper bound the growing interval saturates at.
    pub max: Duration,
    /// Interval growth factor per attempt.
    pub multiplier: f64,
    /// Overall deadline for the wait.
    pub deadline: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(50),
            max: Duration::from_secs(1),
            multiplier: 2.0,
            deadline: Duration::from_secs(10),
        }
    }
}

impl BackoffConfig {
    fn next_interval(&self, interval: Duration) -> Duration {
        interval.mul_f64(self.multiplier.max(1.0)).min(self.max)
    }
}

/// Repeatedly evaluate `check` until it reports the condition holds.
///
/// The predicate must be side-effect-free (a check against local state or a
/// fresh remote query). Returns as soon as it reports `true` and never
/// re-checks after success; fails with [`WaitError::Timeout`] once the
/// deadline has elapsed without success. Errors from the predicate abort the
/// wait; callers that consider an error transient should map it to
/// `Ok(false)` themselves.
pub async fn wait_for<F, Fut, E>(config: &BackoffConfig, mut check: F) -> Result<(), WaitError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    let started = Instant::now();
    let deadline = started + config.deadline;
    let mut interval = config.initial.max(Duration::from_millis(1));

    loop {
        if check().await.map_err(WaitError::Check)? {
            return Ok(());
        }

        let now = Instant::now();
        if now + interval > deadline {
            return Err(WaitError::Timeout(config.deadline));
        }

        tokio::time::sleep(interval).await;
        interval = config.next_interval(interval);
    }
}

/// [`wait_for`] for infallible predicates.
pub async fn wait_until<F, Fut>(
    config: &BackoffConfig,
    mut check: F,
) -> Result<(), WaitError<std::convert::Infallible>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    wait_for(config, || {
        let fut = check();
        async move { Ok::<_, std::convert::Infallible>(fut.await) }
    })
    .await
}
