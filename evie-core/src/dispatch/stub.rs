//! Scripted transport and intent backends.
//!
//! `ScriptedTransport` replaces the whole delivery path and is what the
//! dispatcher and orchestrator tests drive. `ScriptedIntent` stands in for
//! the OS compose sheet behind a real `IntentTransport`; the console host
//! uses it to "send" by logging.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use super::intent::{IntentOutcome, SmsIntent};
use super::{DispatchRequest, Receipt, SmsTransport};
use crate::error::{EvieError, Result};
use crate::permissions::Platform;

// ---------------------------------------------------------------------------
// ScriptedTransport
// ---------------------------------------------------------------------------

pub struct ScriptedTransport {
    platform: Platform,
    failures: Mutex<VecDeque<EvieError>>,
    calls: Mutex<Vec<DispatchRequest>>,
}

impl ScriptedTransport {
    /// Succeeds on every call until failures are queued.
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            failures: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// The next `deliver` fails with `error`. Queued failures are consumed in order.
    pub fn push_failure(&self, error: EvieError) {
        self.failures.lock().push_back(error);
    }

    /// Every request that reached `deliver`.
    pub fn calls(&self) -> Vec<DispatchRequest> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl SmsTransport for ScriptedTransport {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn deliver(&self, request: &DispatchRequest) -> Result<Receipt> {
        let call = {
            let mut calls = self.calls.lock();
            calls.push(request.clone());
            calls.len()
        };
        match self.failures.lock().pop_front() {
            Some(error) => Err(error),
            None => Ok(Receipt::sent(Some(format!("scripted-{call}")))),
        }
    }
}

// ---------------------------------------------------------------------------
// ScriptedIntent
// ---------------------------------------------------------------------------

pub struct ScriptedIntent {
    available: bool,
    outcomes: Mutex<VecDeque<IntentOutcome>>,
    composed: Mutex<Vec<(Vec<String>, String)>>,
}

impl ScriptedIntent {
    /// Available, and completes every compose unless outcomes are queued.
    pub fn new() -> Self {
        Self {
            available: true,
            outcomes: Mutex::new(VecDeque::new()),
            composed: Mutex::new(Vec::new()),
        }
    }

    /// A device with no SMS capability.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    pub fn push_outcome(&self, outcome: IntentOutcome) {
        self.outcomes.lock().push_back(outcome);
    }

    /// `(recipients, body)` for every compose sheet opened.
    pub fn composed(&self) -> Vec<(Vec<String>, String)> {
        self.composed.lock().clone()
    }
}

impl Default for ScriptedIntent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SmsIntent for ScriptedIntent {
    async fn is_available(&self) -> bool {
        self.available
    }

    async fn compose(&self, recipients: &[String], body: &str) -> IntentOutcome {
        info!(recipients = recipients.len(), chars = body.chars().count(), "compose sheet opened");
        self.composed
            .lock()
            .push((recipients.to_vec(), body.to_string()));
        self.outcomes
            .lock()
            .pop_front()
            .unwrap_or_else(IntentOutcome::completed)
    }
}
