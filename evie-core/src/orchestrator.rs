//! Wake word → message dispatch.
//!
//! `DispatchOrchestrator` owns the single configured `MessageBinding` and turns
//! each `DetectionEvent` into one `send_with_retry` call. There is no
//! confirmation step. Detections that arrive while a send is in flight are
//! dropped rather than queued, so one utterance never produces two messages.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::dispatch::phone::PhoneNumber;
use crate::dispatch::{DispatchResult, DispatchStatus, MessageDispatcher};
use crate::error::EvieError;
use crate::ipc::events::{DetectionEvent, DispatchEvent};

const BROADCAST_CAP: usize = 64;

/// What gets sent, and to whom, when the wake word fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageBinding {
    pub recipient: String,
    pub body: String,
    /// Spoken instead of the number in announcements.
    #[serde(default)]
    pub contact_name: Option<String>,
}

pub struct DispatchOrchestrator {
    dispatcher: Arc<MessageDispatcher>,
    binding: Mutex<Option<MessageBinding>>,
    in_flight: AtomicBool,
    dropped: AtomicUsize,
    seq: AtomicU64,
    event_tx: broadcast::Sender<DispatchEvent>,
}

impl DispatchOrchestrator {
    pub fn new(dispatcher: Arc<MessageDispatcher>) -> Self {
        let (event_tx, _) = broadcast::channel(BROADCAST_CAP);
        Self {
            dispatcher,
            binding: Mutex::new(None),
            in_flight: AtomicBool::new(false),
            dropped: AtomicUsize::new(0),
            seq: AtomicU64::new(0),
            event_tx,
        }
    }

    pub fn bind(&self, binding: MessageBinding) {
        info!(
            contact = binding.contact_name.as_deref().unwrap_or("-"),
            "message bound to wake word"
        );
        *self.binding.lock() = Some(binding);
    }

    pub fn unbind(&self) {
        if self.binding.lock().take().is_some() {
            info!("message binding cleared");
        }
    }

    pub fn binding(&self) -> Option<MessageBinding> {
        self.binding.lock().clone()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Detections ignored because a send was already running.
    pub fn dropped_detections(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn dispatcher(&self) -> &Arc<MessageDispatcher> {
        &self.dispatcher
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.event_tx.subscribe()
    }

    /// Send the bound message. `None` when the detection was dropped.
    pub async fn on_keyword_detected(&self, detection: &DetectionEvent) -> Option<DispatchResult> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(seq = detection.seq, "detection dropped: dispatch already in flight");
            return None;
        }
        let _guard = InFlightGuard(&self.in_flight);

        let binding = self.binding();
        let (result, fallback) = match &binding {
            None => {
                warn!(keyword = %detection.keyword, "wake word heard but no message is bound");
                (DispatchResult::failure(&EvieError::NoBinding, 0), None)
            }
            Some(binding) => {
                info!(seq = detection.seq, keyword = %detection.keyword, "dispatching bound message");
                let result = self
                    .dispatcher
                    .send_with_retry(&binding.recipient, &binding.body)
                    .await;
                let fallback = match (&result.status, &result.error) {
                    (DispatchStatus::Failed, Some(error)) => Some(self.dispatcher.manual_fallback(
                        &binding.recipient,
                        &binding.body,
                        error,
                    )),
                    _ => None,
                };
                (result, fallback)
            }
        };

        let event = DispatchEvent {
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            keyword: detection.keyword.clone(),
            announcement: announcement(binding.as_ref(), &result),
            result: result.clone(),
            fallback,
        };
        let _ = self.event_tx.send(event);
        Some(result)
    }

    /// Forward listener detections until the channel closes.
    ///
    /// Each detection is handled on its own task so the in-flight guard,
    /// not channel backlog, decides what is dropped.
    pub async fn run(self: Arc<Self>, mut detections: broadcast::Receiver<DetectionEvent>) {
        loop {
            match detections.recv().await {
                Ok(detection) => {
                    let this = Arc::clone(&self);
                    tokio::spawn(async move {
                        this.on_keyword_detected(&detection).await;
                    });
                }
                Err(RecvError::Lagged(n)) => {
                    warn!("detection receiver lagged by {n} events");
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("detection channel closed; orchestrator stopped");
    }
}

impl std::fmt::Debug for DispatchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchOrchestrator")
            .field("bound", &self.binding.lock().is_some())
            .field("in_flight", &self.is_in_flight())
            .finish()
    }
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Sentence for a screen reader describing `result`.
pub fn announcement(binding: Option<&MessageBinding>, result: &DispatchResult) -> String {
    let Some(binding) = binding else {
        return "No emergency message is set up. Open Evie settings to add a contact and message."
            .to_string();
    };
    let who = binding
        .contact_name
        .as_deref()
        .map(str::to_string)
        .or_else(|| {
            PhoneNumber::parse(&binding.recipient)
                .ok()
                .map(|p| format!("the number ending {}", p.redacted().trim_start_matches('•')))
        })
        .unwrap_or_else(|| "your contact".to_string());

    match result.status {
        DispatchStatus::Sent | DispatchStatus::Delivered => format!("Message sent to {who}."),
        DispatchStatus::Pending => format!("Message to {who} is waiting to send."),
        DispatchStatus::Cancelled => "Message cancelled. Nothing was sent.".to_string(),
        DispatchStatus::Failed => {
            let reason = result
                .error
                .as_ref()
                .map(|e| e.message.as_str())
                .unwrap_or("unknown error");
            format!(
                "Message to {who} could not be sent: {reason}. \
                 Instructions to send it yourself are on screen."
            )
        }
    }
}
