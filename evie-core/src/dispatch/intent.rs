//! Direct send through the OS compose intent.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{DispatchRequest, Receipt, SmsTransport};
use crate::error::{EvieError, Result};
use crate::permissions::{PermissionGateway, PermissionKind, Platform};

/// Completion reported by the compose sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentOutcome {
    pub completed: bool,
    pub cancelled: bool,
    pub error: Option<String>,
}

impl IntentOutcome {
    pub fn completed() -> Self {
        Self {
            completed: true,
            ..Self::default()
        }
    }

    pub fn cancelled() -> Self {
        Self {
            cancelled: true,
            ..Self::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }
}

/// OS SMS compose capability.
#[async_trait]
pub trait SmsIntent: Send + Sync {
    async fn is_available(&self) -> bool;

    async fn compose(&self, recipients: &[String], body: &str) -> IntentOutcome;
}

pub struct IntentTransport {
    permissions: Arc<PermissionGateway>,
    intent: Arc<dyn SmsIntent>,
}

impl IntentTransport {
    pub fn new(permissions: Arc<PermissionGateway>, intent: Arc<dyn SmsIntent>) -> Self {
        Self {
            permissions,
            intent,
        }
    }
}

#[async_trait]
impl SmsTransport for IntentTransport {
    fn platform(&self) -> Platform {
        Platform::Intent
    }

    async fn deliver(&self, request: &DispatchRequest) -> Result<Receipt> {
        if !self.intent.is_available().await {
            return Err(EvieError::SmsUnavailable);
        }

        let status = self.permissions.ensure(PermissionKind::Sms).await;
        if !status.is_granted() {
            warn!(%status, "sms permission not granted");
            return Err(EvieError::PermissionDenied {
                kind: PermissionKind::Sms,
                status,
            });
        }

        let recipients = [request.recipient.to_string()];
        let outcome = self.intent.compose(&recipients, &request.body).await;
        debug!(?outcome, "compose intent finished");

        // An error wins over the flags; some OS builds set both.
        if let Some(detail) = outcome.error {
            return Err(EvieError::SendFailed {
                detail,
                recoverable: true,
            });
        }
        if outcome.cancelled {
            return Err(EvieError::Cancelled);
        }
        if outcome.completed {
            return Ok(Receipt::sent(None));
        }
        Err(EvieError::SendFailed {
            detail: "compose sheet closed without a result".into(),
            recoverable: false,
        })
    }
}
