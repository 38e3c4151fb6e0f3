use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::permissions::{PermissionKind, PermissionStatus};

/// All errors produced by evie-core.
#[derive(Debug, Error)]
pub enum EvieError {
    // ── Configuration ────────────────────────────────────────────────────
    #[error("access key is malformed: {0}")]
    InvalidAccessKey(String),

    #[error("sensitivity {0} is outside [0.0, 1.0]")]
    InvalidSensitivity(f32),

    #[error("wake word keyword is empty")]
    InvalidKeyword,

    #[error("listener has not been initialized")]
    NotInitialized,

    #[error("invalid recipient {0:?}: expected 10-15 digits")]
    InvalidRecipient(String),

    #[error("message body is empty")]
    EmptyMessage,

    #[error("no message is bound to the wake word")]
    NoBinding,

    #[error("this device cannot send SMS")]
    SmsUnavailable,

    #[error("message was cancelled")]
    Cancelled,

    #[error("wake word engine failed to initialize: {0}")]
    Initialization(String),

    // ── Permission ───────────────────────────────────────────────────────
    #[error("{kind} permission not granted ({status})")]
    PermissionDenied {
        kind: PermissionKind,
        status: PermissionStatus,
    },

    // ── Transient ────────────────────────────────────────────────────────
    #[error("wake word engine error: {0}")]
    Classifier(String),

    #[error("relay request timed out")]
    Timeout,

    #[error("relay rate limited the request")]
    RateLimited,

    #[error("relay server error ({status}): {detail}")]
    Server { status: u16, detail: String },

    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("send failed: {detail}")]
    SendFailed { detail: String, recoverable: bool },

    // ── Quota / terminal ─────────────────────────────────────────────────
    #[error("monthly relay quota of {limit} messages exceeded")]
    QuotaExceeded { limit: u32 },

    #[error("wake word engine did not recover after {attempts} attempts")]
    RecoveryExhausted { attempts: u32 },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, EvieError>;

/// Error taxonomy used to decide who can fix a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorClass {
    /// Needs the user to act (settings, engine key, device, a decision).
    /// Never retried.
    Configuration,
    /// OS permission missing; only resolved through user action.
    Permission,
    /// Fault expected to clear on its own; retried with fixed delay.
    Transient,
    /// Relay quota exhausted until the next period.
    Quota,
}

/// Boundary form of an error: everything a caller needs to tell the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    /// Stable machine-readable code, e.g. `"INVALID_RECIPIENT"`.
    pub code: String,
    /// Human-readable message, suitable for a screen-reader announcement.
    pub message: String,
    /// Whether retrying (automatically or after user action) can succeed.
    pub recoverable: bool,
    pub class: ErrorClass,
}

impl ErrorDetail {
    /// True when `send_with_retry` and listener recovery should try again.
    pub fn is_retryable(&self) -> bool {
        self.recoverable && self.class == ErrorClass::Transient
    }
}

impl EvieError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAccessKey(_) => "INVALID_ACCESS_KEY",
            Self::InvalidSensitivity(_) => "INVALID_SENSITIVITY",
            Self::InvalidKeyword => "INVALID_KEYWORD",
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::InvalidRecipient(_) => "INVALID_RECIPIENT",
            Self::EmptyMessage => "EMPTY_MESSAGE",
            Self::NoBinding => "NO_BINDING",
            Self::SmsUnavailable => "SMS_UNAVAILABLE",
            Self::Cancelled => "CANCELLED",
            Self::PermissionDenied { .. } => "PERMISSION_DENIED",
            Self::Initialization(_) => "INITIALIZATION_ERROR",
            Self::Classifier(_) => "CLASSIFIER_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::RateLimited => "RATE_LIMITED",
            Self::Server { .. } => "SERVER_ERROR",
            Self::NetworkUnavailable(_) => "NETWORK_UNAVAILABLE",
            Self::SendFailed { .. } => "SEND_FAILED",
            Self::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            Self::RecoveryExhausted { .. } => "RECOVERY_EXHAUSTED",
            Self::Other(_) => "UNKNOWN",
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidAccessKey(_)
            | Self::InvalidSensitivity(_)
            | Self::InvalidKeyword
            | Self::NotInitialized
            | Self::InvalidRecipient(_)
            | Self::EmptyMessage
            | Self::NoBinding
            | Self::SmsUnavailable
            | Self::Cancelled
            | Self::Initialization(_)
            | Self::SendFailed {
                recoverable: false,
                ..
            }
            | Self::RecoveryExhausted { .. }
            | Self::Other(_) => ErrorClass::Configuration,
            Self::PermissionDenied { .. } => ErrorClass::Permission,
            Self::QuotaExceeded { .. } => ErrorClass::Quota,
            Self::Classifier(_)
            | Self::Timeout
            | Self::RateLimited
            | Self::Server { .. }
            | Self::NetworkUnavailable(_)
            | Self::SendFailed {
                recoverable: true,
                ..
            } => ErrorClass::Transient,
        }
    }

    /// Transient faults clear on their own; a permission denial is recoverable
    /// until the user picks "never ask again".
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::PermissionDenied { status, .. } => !status.is_permanent(),
            _ => self.class() == ErrorClass::Transient,
        }
    }

    /// Convert into the boundary representation.
    pub fn detail(&self) -> ErrorDetail {
        ErrorDetail {
            code: self.code().to_string(),
            message: self.to_string(),
            recoverable: self.is_recoverable(),
            class: self.class(),
        }
    }
}

impl From<&EvieError> for ErrorDetail {
    fn from(e: &EvieError) -> Self {
        e.detail()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_are_never_recoverable() {
        for err in [
            EvieError::InvalidRecipient("123".into()),
            EvieError::EmptyMessage,
            EvieError::InvalidSensitivity(1.5),
            EvieError::NoBinding,
        ] {
            assert_eq!(err.class(), ErrorClass::Configuration);
            assert!(!err.is_recoverable(), "{err} should not be recoverable");
            assert!(!err.detail().is_retryable());
        }
    }

    #[test]
    fn network_faults_are_retryable() {
        for err in [
            EvieError::Timeout,
            EvieError::RateLimited,
            EvieError::Server {
                status: 503,
                detail: "unavailable".into(),
            },
            EvieError::NetworkUnavailable("offline".into()),
        ] {
            assert!(err.detail().is_retryable(), "{err} should be retryable");
        }
    }

    #[test]
    fn permission_recoverability_follows_denial_severity() {
        let temporary = EvieError::PermissionDenied {
            kind: PermissionKind::Sms,
            status: PermissionStatus::Denied,
        };
        let permanent = EvieError::PermissionDenied {
            kind: PermissionKind::Sms,
            status: PermissionStatus::NeverAskAgain,
        };
        assert!(temporary.is_recoverable());
        assert!(!permanent.is_recoverable());
        // Permission problems are fixed by the user, not by automatic retry.
        assert!(!temporary.detail().is_retryable());
    }

    #[test]
    fn quota_is_terminal() {
        let err = EvieError::QuotaExceeded { limit: 100 };
        let detail = err.detail();
        assert_eq!(detail.code, "QUOTA_EXCEEDED");
        assert_eq!(detail.class, ErrorClass::Quota);
        assert!(!detail.recoverable);
    }

    #[test]
    fn class_agrees_with_recoverability() {
        let all = [
            EvieError::InvalidAccessKey("empty".into()),
            EvieError::InvalidSensitivity(2.0),
            EvieError::InvalidKeyword,
            EvieError::NotInitialized,
            EvieError::InvalidRecipient("123".into()),
            EvieError::EmptyMessage,
            EvieError::NoBinding,
            EvieError::SmsUnavailable,
            EvieError::Cancelled,
            EvieError::Initialization("key rejected".into()),
            EvieError::Classifier("device lost".into()),
            EvieError::Timeout,
            EvieError::RateLimited,
            EvieError::Server {
                status: 502,
                detail: "bad gateway".into(),
            },
            EvieError::NetworkUnavailable("offline".into()),
            EvieError::SendFailed {
                detail: "HTTP 400".into(),
                recoverable: false,
            },
            EvieError::SendFailed {
                detail: "compose failed".into(),
                recoverable: true,
            },
            EvieError::QuotaExceeded { limit: 100 },
            EvieError::RecoveryExhausted { attempts: 3 },
            EvieError::Other(anyhow::anyhow!("unexpected")),
        ];
        for err in &all {
            let detail = err.detail();
            assert_eq!(
                detail.class == ErrorClass::Transient,
                detail.recoverable && detail.class != ErrorClass::Permission,
                "{} reports class {:?} with recoverable={}",
                detail.code,
                detail.class,
                detail.recoverable
            );
        }

        assert_eq!(
            EvieError::Initialization("key rejected".into()).class(),
            ErrorClass::Configuration
        );
        let rejected = EvieError::SendFailed {
            detail: "HTTP 400".into(),
            recoverable: false,
        }
        .detail();
        assert_eq!(rejected.class, ErrorClass::Configuration);
        assert!(!rejected.is_retryable());
    }

    #[test]
    fn error_detail_serializes_with_camel_case() {
        let detail = EvieError::RateLimited.detail();
        let json = serde_json::to_value(&detail).expect("serialize detail");
        assert_eq!(json["code"], "RATE_LIMITED");
        assert_eq!(json["recoverable"], true);
        assert_eq!(json["class"], "transient");
    }
}
