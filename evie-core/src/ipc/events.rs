//! Event types broadcast to the presentation layer.
//!
//! | Event | Producer | Subscribe with |
//! |-------|----------|----------------|
//! | `ListenerStatusEvent` | `WakeWordListener` | `subscribe_status()` |
//! | `DetectionEvent` | `WakeWordListener` | `subscribe_detections()` |
//! | `ListenerErrorEvent` | `WakeWordListener` | `subscribe_errors()` |
//! | `DispatchEvent` | `DispatchOrchestrator` | `subscribe()` |
//!
//! Everything serialises camelCase so a UI bridge can forward it as-is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dispatch::{fallback::ManualFallback, DispatchResult};
use crate::error::ErrorDetail;

// ---------------------------------------------------------------------------
// Listener state
// ---------------------------------------------------------------------------

/// Current state of the wake-word listener. Only the listener changes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ListenerState {
    /// No classifier running (not initialized, or stopped).
    Idle,
    /// Validating config, acquiring the microphone, building the classifier.
    Initializing,
    /// Classifier running; detections are accepted.
    Listening,
    /// A detection was just emitted; returns to `Listening` after a fixed delay.
    Processing,
    /// Classifier fault; automatic recovery may be running.
    Error,
    /// Microphone refused. Terminal until permission is re-requested.
    PermissionDenied,
}

impl ListenerState {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Listening | Self::Processing)
    }
}

/// Emitted whenever `ListenerState` changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerStatusEvent {
    pub state: ListenerState,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

// ---------------------------------------------------------------------------
// Detections
// ---------------------------------------------------------------------------

/// One positive classifier callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    pub keyword: String,
    /// Classifier confidence in [0.0, 1.0]. Engines that only report a hit
    /// yield `1.0`.
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Listener errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerErrorEvent {
    pub error: ErrorDetail,
    /// Recovery attempts made so far for the current fault.
    pub recovery_attempts: u32,
}

// ---------------------------------------------------------------------------
// Dispatch results
// ---------------------------------------------------------------------------

/// Outcome of a wake-word-triggered send, ready to be shown and announced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchEvent {
    pub seq: u64,
    /// Keyword that triggered the send.
    pub keyword: String,
    pub result: DispatchResult,
    /// Copy-and-send-yourself text, present after a terminal failure.
    pub fallback: Option<ManualFallback>,
    /// Sentence for a screen reader.
    pub announcement: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchStatus;
    use crate::error::EvieError;

    #[test]
    fn listener_status_serializes_camel_case_state() {
        let event = ListenerStatusEvent {
            state: ListenerState::PermissionDenied,
            detail: Some("microphone refused".into()),
        };
        let json = serde_json::to_value(&event).expect("serialize status event");
        assert_eq!(json["state"], "permissionDenied");
        assert_eq!(json["detail"], "microphone refused");

        let round_trip: ListenerStatusEvent =
            serde_json::from_value(json).expect("deserialize status event");
        assert_eq!(round_trip.state, ListenerState::PermissionDenied);
    }

    #[test]
    fn detection_event_carries_rfc3339_timestamp() {
        let event = DetectionEvent {
            seq: 4,
            keyword: "hey evie".into(),
            confidence: 1.0,
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).expect("valid timestamp"),
        };
        let json = serde_json::to_value(&event).expect("serialize detection");
        assert_eq!(json["keyword"], "hey evie");
        assert_eq!(json["timestamp"], "2023-11-14T22:13:20Z");
    }

    #[test]
    fn dispatch_event_nests_result_and_error() {
        let event = DispatchEvent {
            seq: 1,
            keyword: "hey evie".into(),
            result: DispatchResult::failure(&EvieError::Timeout, 3),
            fallback: None,
            announcement: "Message could not be sent.".into(),
        };
        let json = serde_json::to_value(&event).expect("serialize dispatch event");
        assert_eq!(json["result"]["status"], "failed");
        assert_eq!(json["result"]["error"]["code"], "TIMEOUT");
        assert_eq!(json["result"]["attempts"], 3);
        assert!(json["fallback"].is_null());
        assert_eq!(event.result.status, DispatchStatus::Failed);
    }

    #[test]
    fn only_listening_and_processing_are_active() {
        assert!(ListenerState::Listening.is_active());
        assert!(ListenerState::Processing.is_active());
        assert!(!ListenerState::Error.is_active());
        assert!(!ListenerState::Idle.is_active());
    }
}
