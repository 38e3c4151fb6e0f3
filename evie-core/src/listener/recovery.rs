//! Automatic recovery after classifier faults.
//!
//! ## Procedure
//!
//! ```text
//! fault ─► stop() ─► wait restart_delay (2 s) ─► start()
//!                                                  │ ok  → counter = 0, Listening
//!                                                  │ err → counter += 1
//!                                                  ▼
//!                              counter < max (3)? wait retry delay (3 s), try again
//!                              otherwise         → RECOVERY_EXHAUSTED, stay in Error
//! ```
//!
//! The counter only resets after a successful recovery, a fresh `initialize()`
//! or a manual `start()` that brings the classifier back up, so faults arriving
//! once the budget is spent are not retried.
//! An explicit `stop()`, a new `initialize()` or `release()` abandons recovery
//! at the next step: each run carries the listener generation it started
//! under and stands down once that generation is gone.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::Inner;
use crate::{
    error::EvieError,
    ipc::events::ListenerState,
    retry::{retry, RetryPolicy},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPolicy {
    /// Pause between stopping and restarting the classifier. Default: 2 s.
    pub restart_delay: Duration,
    /// Attempt bound and pause after a failed attempt. Default: 3 × 3 s.
    pub retry: RetryPolicy,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            restart_delay: Duration::from_secs(2),
            retry: RetryPolicy::new(3, Duration::from_secs(3)),
        }
    }
}

#[derive(Debug)]
enum Attempt {
    Recovered,
    /// Caller stopped, re-initialized or released the listener mid-recovery.
    Halted,
    Failed(EvieError),
}

impl Inner {
    pub(super) async fn recover(self: &Arc<Self>, generation: u64) {
        let policy = self.config.recovery;
        let spent = self.recovery_attempts.load(Ordering::SeqCst);
        let remaining = policy.retry.max_attempts.saturating_sub(spent);
        if remaining == 0 {
            return;
        }
        info!(spent, remaining, "starting wake word recovery");

        let attempted = retry(
            &RetryPolicy::new(remaining, policy.retry.delay),
            |_| {
                let inner = Arc::clone(self);
                async move { inner.restart_once(policy.restart_delay, generation).await }
            },
            |outcome| matches!(outcome, Attempt::Failed(_)) && !self.superseded(generation),
        )
        .await;

        let attempts = self.recovery_attempts.load(Ordering::SeqCst);
        match attempted.outcome {
            Attempt::Recovered => {
                self.recovery_attempts.store(0, Ordering::SeqCst);
                info!(tries = attempted.attempts, "wake word listener recovered");
            }
            Attempt::Halted => {
                info!("recovery abandoned: listener stopped or replaced");
            }
            Attempt::Failed(_) if self.superseded(generation) => {
                info!("recovery abandoned after failure: listener stopped or replaced");
            }
            Attempt::Failed(e) => {
                warn!(attempts, "wake word recovery exhausted: {e}");
                self.set_state(
                    ListenerState::Error,
                    Some(format!("wake word engine did not recover: {e}")),
                );
                self.emit_error(&EvieError::RecoveryExhausted { attempts }, attempts);
            }
        }
    }

    async fn restart_once(&self, restart_delay: Duration, generation: u64) -> Attempt {
        if self.superseded(generation) {
            return Attempt::Halted;
        }
        if let Err(e) = self.stop_classifier() {
            return self.record_failure(e);
        }
        tokio::time::sleep(restart_delay).await;
        if self.superseded(generation) {
            return Attempt::Halted;
        }
        match self.start_classifier() {
            Ok(()) => Attempt::Recovered,
            Err(e) => self.record_failure(e),
        }
    }

    /// `true` once the caller stopped, re-initialized or released the listener.
    fn superseded(&self, generation: u64) -> bool {
        self.halted.load(Ordering::SeqCst) || self.generation.load(Ordering::SeqCst) != generation
    }

    fn record_failure(&self, e: EvieError) -> Attempt {
        let attempts = self.recovery_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        warn!(attempts, "recovery attempt failed: {e}");
        self.set_state(ListenerState::Error, Some(e.to_string()));
        Attempt::Failed(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::stub::{ClassifierProbe, ManualClassifierFactory};
    use crate::listener::{ListenerConfig, WakeWordListener};
    use crate::permissions::stub::StaticPermissions;
    use crate::permissions::{PermissionGateway, Platform};

    const KEY: &str = "dGVzdC1hY2Nlc3Mta2V5";

    async fn running_listener() -> (WakeWordListener, ClassifierProbe) {
        let factory = ManualClassifierFactory::new();
        let probe = factory.probe();
        let gateway = Arc::new(PermissionGateway::new(Arc::new(
            StaticPermissions::granting_all(Platform::Intent),
        )));
        let listener = WakeWordListener::new(ListenerConfig::default(), Arc::new(factory), gateway);
        listener.initialize(KEY, "hey evie", 0.5).await.expect("init");
        listener.start().expect("start");
        (listener, probe)
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_single_fault() {
        let (listener, probe) = running_listener().await;
        let mut errors = listener.subscribe_errors();

        probe.fault("audio device lost");
        let event = errors.recv().await.expect("error event");
        assert_eq!(event.error.code, "CLASSIFIER_ERROR");
        assert!(event.error.recoverable);
        assert_eq!(event.recovery_attempts, 0);

        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(listener.state(), ListenerState::Listening);
        assert_eq!(listener.recovery_attempts(), 0);
        assert_eq!(probe.starts(), 2);
        assert!(!listener.is_recovering());
    }

    #[tokio::test(start_paused = true)]
    async fn counter_resets_only_after_success() {
        let (listener, probe) = running_listener().await;
        probe.fail_next_starts(2);
        probe.fault("device busy");

        // Attempt 1 at 2 s fails, attempt 2 at 7 s fails, attempt 3 at 12 s succeeds.
        tokio::time::sleep(Duration::from_millis(7100)).await;
        assert_eq!(listener.recovery_attempts(), 2);
        assert_eq!(listener.state(), ListenerState::Error);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(listener.state(), ListenerState::Listening);
        assert_eq!(listener.recovery_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn three_failures_are_terminal_with_no_fourth_attempt() {
        let (listener, probe) = running_listener().await;
        let mut errors = listener.subscribe_errors();
        probe.fail_next_starts(10);

        probe.fault("device gone");
        tokio::time::sleep(Duration::from_secs(60)).await;

        // One initial start plus exactly three recovery attempts.
        assert_eq!(probe.starts(), 4);
        assert_eq!(listener.recovery_attempts(), 3);
        assert_eq!(listener.state(), ListenerState::Error);

        let mut codes = Vec::new();
        while let Ok(event) = errors.try_recv() {
            codes.push((event.error.code, event.error.recoverable));
        }
        assert_eq!(
            codes.last(),
            Some(&("RECOVERY_EXHAUSTED".to_string(), false))
        );

        // Further faults do not restart the cycle.
        probe.fault("device still gone");
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(probe.starts(), 4);
        let event = errors.recv().await.expect("terminal error repeated");
        assert_eq!(event.error.code, "RECOVERY_EXHAUSTED");
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_stop_cancels_recovery() {
        let (listener, probe) = running_listener().await;
        probe.fault("audio glitch");
        tokio::time::sleep(Duration::from_millis(500)).await;

        listener.stop().expect("stop during recovery");
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(probe.starts(), 1);
        assert_eq!(listener.state(), ListenerState::Idle);
        assert!(!listener.is_recovering());
    }

    #[tokio::test(start_paused = true)]
    async fn reinitialize_during_recovery_does_not_start_new_classifier() {
        let (listener, probe) = running_listener().await;
        probe.fault("audio device lost");
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(listener.is_recovering());

        listener
            .initialize(KEY, "okay evie", 0.5)
            .await
            .expect("re-init during recovery");
        assert_eq!(listener.state(), ListenerState::Idle);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(listener.state(), ListenerState::Idle);
        assert!(!probe.is_running());
        assert_eq!(probe.creates(), 2);
        assert_eq!(probe.starts(), 1);
        assert!(!listener.is_recovering());

        // The fresh classifier still gets its own recovery.
        listener.start().expect("start after re-init");
        probe.fault("audio device lost again");
        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(listener.state(), ListenerState::Listening);
        assert_eq!(probe.starts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_start_after_exhaustion_restores_budget() {
        let (listener, probe) = running_listener().await;
        probe.fail_next_starts(10);
        probe.fault("device gone");
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(listener.recovery_attempts(), 3);
        assert_eq!(listener.state(), ListenerState::Error);

        probe.fail_next_starts(0);
        listener.start().expect("manual start once the device is back");
        assert_eq!(listener.state(), ListenerState::Listening);
        assert_eq!(listener.recovery_attempts(), 0);

        let mut errors = listener.subscribe_errors();
        probe.fault("device hiccup");
        let event = errors.recv().await.expect("error event");
        assert_eq!(event.error.code, "CLASSIFIER_ERROR");
        assert!(event.error.recoverable);

        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(listener.state(), ListenerState::Listening);
        assert_eq!(probe.starts(), 6);
        assert_eq!(listener.recovery_attempts(), 0);
    }
}
