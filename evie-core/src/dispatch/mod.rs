//! Message dispatch adapter.
//!
//! ```text
//! send(recipient, body)
//!   ├─ PhoneNumber::parse ──✗──► InvalidRecipient   (no transport call)
//!   ├─ body.trim().is_empty() ─► EmptyMessage       (no transport call)
//!   └─ SmsTransport::deliver
//!        ├─ IntentTransport   (OS compose intent, SMS permission)
//!        └─ RelayTransport    (HTTP relay, monthly quota)
//! ```
//!
//! `send` and `send_with_retry` never return `Err`: every failure is folded
//! into a `DispatchResult` carrying an `ErrorDetail`.

pub mod fallback;
pub mod intent;
pub mod phone;
pub mod quota;
pub mod relay;
pub mod stub;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ErrorDetail, EvieError, Result};
use crate::permissions::Platform;
use crate::retry::{retry, RetryPolicy};
use fallback::ManualFallback;
use phone::PhoneNumber;

// ---------------------------------------------------------------------------
// Requests and results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Normal,
    High,
    Urgent,
}

/// One validated send. Lives for a single send+retry cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRequest {
    pub recipient: PhoneNumber,
    /// Sent exactly as bound; must contain more than whitespace.
    pub body: String,
    pub priority: Priority,
}

impl DispatchRequest {
    /// Recipient is validated before the body.
    pub fn new(recipient: &str, body: &str, priority: Priority) -> Result<Self> {
        let recipient = PhoneNumber::parse(recipient)?;
        if body.trim().is_empty() {
            return Err(EvieError::EmptyMessage);
        }
        Ok(Self {
            recipient,
            body: body.to_string(),
            priority,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchStatus {
    Sent,
    Delivered,
    Failed,
    Cancelled,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResult {
    pub success: bool,
    pub status: DispatchStatus,
    pub message_id: Option<String>,
    pub error: Option<ErrorDetail>,
    /// Transport calls made for this result. Zero when validation failed.
    pub attempts: u32,
}

impl DispatchResult {
    pub fn delivered(receipt: Receipt, attempts: u32) -> Self {
        Self {
            success: true,
            status: receipt.status,
            message_id: receipt.message_id,
            error: None,
            attempts,
        }
    }

    pub fn failure(error: &EvieError, attempts: u32) -> Self {
        let status = match error {
            EvieError::Cancelled => DispatchStatus::Cancelled,
            _ => DispatchStatus::Failed,
        };
        Self {
            success: false,
            status,
            message_id: None,
            error: Some(error.detail()),
            attempts,
        }
    }

    /// Failure worth another automatic attempt.
    pub fn is_retryable(&self) -> bool {
        self.error.as_ref().is_some_and(ErrorDetail::is_retryable)
    }

    pub fn error_code(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.code.as_str())
    }
}

/// What a transport reports for an accepted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub message_id: Option<String>,
    pub status: DispatchStatus,
}

impl Receipt {
    pub fn sent(message_id: Option<String>) -> Self {
        Self {
            message_id,
            status: DispatchStatus::Sent,
        }
    }
}

// ---------------------------------------------------------------------------
// Transport seam
// ---------------------------------------------------------------------------

/// Platform-specific SMS delivery.
#[async_trait]
pub trait SmsTransport: Send + Sync {
    fn platform(&self) -> Platform;

    /// Deliver one already-validated request.
    async fn deliver(&self, request: &DispatchRequest) -> Result<Receipt>;
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Bound and fixed delay for `send_with_retry`. Default: 3 × 2 s.
    pub retry: RetryPolicy,
    pub priority: Priority,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::new(3, Duration::from_secs(2)),
            priority: Priority::Urgent,
        }
    }
}

#[derive(Default)]
pub struct DispatchDiagnostics {
    pub validation_failures: AtomicUsize,
    pub transport_calls: AtomicUsize,
    pub sent: AtomicUsize,
    pub failed: AtomicUsize,
    pub retries: AtomicUsize,
}

impl DispatchDiagnostics {
    pub fn snapshot(&self) -> DispatchSnapshot {
        DispatchSnapshot {
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            transport_calls: self.transport_calls.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchSnapshot {
    pub validation_failures: usize,
    pub transport_calls: usize,
    pub sent: usize,
    pub failed: usize,
    pub retries: usize,
}

pub struct MessageDispatcher {
    config: DispatchConfig,
    transport: Arc<dyn SmsTransport>,
    diagnostics: DispatchDiagnostics,
}

impl MessageDispatcher {
    pub fn new(config: DispatchConfig, transport: Arc<dyn SmsTransport>) -> Self {
        Self {
            config,
            transport,
            diagnostics: DispatchDiagnostics::default(),
        }
    }

    pub fn platform(&self) -> Platform {
        self.transport.platform()
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// One attempt. Validation failures make no transport call.
    pub async fn send(&self, recipient: &str, body: &str) -> DispatchResult {
        let request = match DispatchRequest::new(recipient, body, self.config.priority) {
            Ok(request) => request,
            Err(e) => {
                self.diagnostics
                    .validation_failures
                    .fetch_add(1, Ordering::Relaxed);
                warn!(code = e.code(), "message rejected before sending: {e}");
                return DispatchResult::failure(&e, 0);
            }
        };

        self.diagnostics
            .transport_calls
            .fetch_add(1, Ordering::Relaxed);
        let platform = self.transport.platform();
        match self.transport.deliver(&request).await {
            Ok(receipt) => {
                self.diagnostics.sent.fetch_add(1, Ordering::Relaxed);
                info!(
                    ?platform,
                    recipient = %request.recipient.redacted(),
                    message_id = receipt.message_id.as_deref().unwrap_or("-"),
                    "message sent"
                );
                DispatchResult::delivered(receipt, 1)
            }
            Err(e) => {
                self.diagnostics.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    ?platform,
                    recipient = %request.recipient.redacted(),
                    code = e.code(),
                    recoverable = e.is_recoverable(),
                    "message send failed: {e}"
                );
                DispatchResult::failure(&e, 1)
            }
        }
    }

    /// `send`, repeated while the failure is recoverable and transient.
    ///
    /// Returns the last result unchanged except for `attempts`.
    pub async fn send_with_retry(&self, recipient: &str, body: &str) -> DispatchResult {
        let attempted = retry(
            &self.config.retry,
            |attempt| {
                if attempt > 1 {
                    self.diagnostics.retries.fetch_add(1, Ordering::Relaxed);
                }
                self.send(recipient, body)
            },
            DispatchResult::is_retryable,
        )
        .await;

        let mut result = attempted.outcome;
        if result.attempts > 0 {
            result.attempts = attempted.attempts;
        }
        result
    }

    /// Copy-and-send-yourself instructions for a terminal failure.
    pub fn manual_fallback(&self, recipient: &str, body: &str, error: &ErrorDetail) -> ManualFallback {
        fallback::manual_fallback(recipient, body, error)
    }

    pub fn diagnostics_snapshot(&self) -> DispatchSnapshot {
        self.diagnostics.snapshot()
    }
}

impl std::fmt::Debug for MessageDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageDispatcher")
            .field("config", &self.config)
            .field("platform", &self.transport.platform())
            .finish()
    }
}
