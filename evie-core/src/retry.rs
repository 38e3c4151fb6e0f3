//! Bounded fixed-delay retry.
//!
//! ```text
//! attempt 1 ──► outcome ──should_retry?──► sleep(delay) ──► attempt 2 ──► … ──► attempt N
//!                  │ no                                                       │
//!                  └──────────────────────────► Attempted { outcome, attempts }◄┘
//! ```
//!
//! The last outcome is returned unchanged; the caller decides what a failure means.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Values below 1 are treated as 1.
    pub max_attempts: u32,
    /// Wait between a failed attempt and the next one.
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// A single attempt, no waiting.
    pub const fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

/// Outcome of the final attempt plus how many attempts ran.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempted<T> {
    pub outcome: T,
    pub attempts: u32,
}

/// Run `op` until `should_retry` says stop or `policy.max_attempts` is reached.
///
/// `op` receives the 1-based attempt number.
pub async fn retry<T, Op, Fut, P>(policy: &RetryPolicy, mut op: Op, mut should_retry: P) -> Attempted<T>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = T>,
    P: FnMut(&T) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let outcome = op(attempt).await;
        if attempt >= max_attempts || !should_retry(&outcome) {
            return Attempted {
                outcome,
                attempts: attempt,
            };
        }
        debug!(
            attempt,
            max_attempts,
            delay_ms = policy.delay.as_millis() as u64,
            "attempt failed; retrying after delay"
        );
        tokio::time::sleep(policy.delay).await;
        attempt += 1;
    }
}
