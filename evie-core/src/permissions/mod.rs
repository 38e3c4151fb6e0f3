//! Permission gateway.
//!
//! Wraps the OS permission dialogs behind `PermissionBackend` and keeps one
//! `PermissionRecord` per `PermissionKind` for the lifetime of the session.
//!
//! ## Never-ask-again
//!
//! Once a kind is cached as `NeverAskAgain`, `request()` returns the cached
//! status without prompting. The only way out is the user changing OS settings,
//! which is picked up by the next `check()`.

pub mod stub;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Which sending path the host platform uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Direct send through an OS compose intent (Android-style).
    Intent,
    /// Send through a cloud relay endpoint (iOS-style).
    Relay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionKind {
    Microphone,
    Contacts,
    Sms,
}

impl PermissionKind {
    pub const ALL: [PermissionKind; 3] = [Self::Microphone, Self::Contacts, Self::Sms];
}

impl fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Microphone => "microphone",
            Self::Contacts => "contacts",
            Self::Sms => "sms",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    Granted,
    Denied,
    NeverAskAgain,
    Undetermined,
    Restricted,
    Unavailable,
}

impl PermissionStatus {
    pub fn is_granted(self) -> bool {
        self == Self::Granted
    }

    /// Denials that a new prompt cannot fix.
    pub fn is_permanent(self) -> bool {
        matches!(self, Self::NeverAskAgain | Self::Restricted | Self::Unavailable)
    }

    pub fn severity(self) -> DenialSeverity {
        match self {
            Self::Granted => DenialSeverity::None,
            Self::Denied | Self::Undetermined => DenialSeverity::Temporary,
            Self::NeverAskAgain | Self::Restricted | Self::Unavailable => {
                DenialSeverity::Permanent
            }
        }
    }

    /// Map a raw platform permission result onto the status enum.
    ///
    /// `"blocked"` is what the relay platform reports when the OS will no
    /// longer show a dialog; it is treated as `NeverAskAgain` on both platforms
    /// instead of being assumed granted.
    pub fn classify(raw: &str, platform: Platform) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "granted" | "authorized" => Self::Granted,
            // Partial grants (e.g. limited contacts) are enough for our reads.
            "limited" => Self::Granted,
            "denied" => Self::Denied,
            "never_ask_again" | "blocked" => Self::NeverAskAgain,
            "undetermined" | "not_determined" | "prompt" => Self::Undetermined,
            "restricted" => Self::Restricted,
            "unavailable" => Self::Unavailable,
            other => {
                warn!(raw = other, ?platform, "unknown permission result; treating as denied");
                Self::Denied
            }
        }
    }
}

impl fmt::Display for PermissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Granted => "granted",
            Self::Denied => "denied",
            Self::NeverAskAgain => "never_ask_again",
            Self::Undetermined => "undetermined",
            Self::Restricted => "restricted",
            Self::Unavailable => "unavailable",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DenialSeverity {
    None,
    /// Asking again may succeed.
    Temporary,
    /// Only an OS settings change can help.
    Permanent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRecord {
    pub kind: PermissionKind,
    pub status: PermissionStatus,
    /// Number of times the OS dialog was actually shown this session.
    pub request_count: u32,
    pub last_checked: Option<DateTime<Utc>>,
}

impl PermissionRecord {
    fn new(kind: PermissionKind) -> Self {
        Self {
            kind,
            status: PermissionStatus::Undetermined,
            request_count: 0,
            last_checked: None,
        }
    }
}

/// OS-level permission check/request pair.
#[async_trait]
pub trait PermissionBackend: Send + Sync {
    fn platform(&self) -> Platform;

    /// Query the current status without prompting.
    async fn check(&self, kind: PermissionKind) -> PermissionStatus;

    /// Show the OS dialog (if the OS allows it) and return the outcome.
    async fn request(&self, kind: PermissionKind) -> PermissionStatus;
}

/// Session-scoped permission tracker.
pub struct PermissionGateway {
    backend: Arc<dyn PermissionBackend>,
    records: Mutex<HashMap<PermissionKind, PermissionRecord>>,
}

impl PermissionGateway {
    pub fn new(backend: Arc<dyn PermissionBackend>) -> Self {
        let records = PermissionKind::ALL
            .into_iter()
            .map(|kind| (kind, PermissionRecord::new(kind)))
            .collect();
        Self {
            backend,
            records: Mutex::new(records),
        }
    }

    pub fn platform(&self) -> Platform {
        self.backend.platform()
    }

    /// Query the OS and refresh the cached record.
    pub async fn check(&self, kind: PermissionKind) -> PermissionStatus {
        let status = self.backend.check(kind).await;
        let mut records = self.records.lock();
        let record = records
            .entry(kind)
            .or_insert_with(|| PermissionRecord::new(kind));
        if record.status != status {
            debug!(%kind, from = %record.status, to = %status, "permission status changed");
        }
        record.status = status;
        record.last_checked = Some(Utc::now());
        status
    }

    /// Prompt for `kind`, unless the OS has already been told never to ask.
    pub async fn request(&self, kind: PermissionKind) -> PermissionStatus {
        let cached = self.record(kind).status;
        if cached == PermissionStatus::NeverAskAgain {
            debug!(%kind, "permission cached as never_ask_again; not prompting");
            return cached;
        }

        let status = self.backend.request(kind).await;
        let mut records = self.records.lock();
        let record = records
            .entry(kind)
            .or_insert_with(|| PermissionRecord::new(kind));
        record.request_count = record.request_count.saturating_add(1);
        record.status = status;
        record.last_checked = Some(Utc::now());
        info!(
            %kind,
            %status,
            request_count = record.request_count,
            "permission requested"
        );
        status
    }

    /// `check`, then `request` once if the first answer was not a grant.
    pub async fn ensure(&self, kind: PermissionKind) -> PermissionStatus {
        let status = self.check(kind).await;
        if status.is_granted() || status.is_permanent() {
            return status;
        }
        self.request(kind).await
    }

    /// Copy of the cached record.
    pub fn record(&self, kind: PermissionKind) -> PermissionRecord {
        self.records
            .lock()
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| PermissionRecord::new(kind))
    }

    pub fn records(&self) -> Vec<PermissionRecord> {
        let records = self.records.lock();
        PermissionKind::ALL
            .iter()
            .filter_map(|k| records.get(k).cloned())
            .collect()
    }
}

/// What the user should do when `kind` is not granted.
pub fn guidance(kind: PermissionKind, status: PermissionStatus) -> Option<String> {
    let feature = match kind {
        PermissionKind::Microphone => "hear your wake word",
        PermissionKind::Contacts => "look up your saved contact",
        PermissionKind::Sms => "send your message",
    };
    match status.severity() {
        DenialSeverity::None => None,
        DenialSeverity::Temporary => Some(format!(
            "Evie needs {kind} access to {feature}. Allow access when prompted."
        )),
        DenialSeverity::Permanent if status == PermissionStatus::Unavailable => Some(format!(
            "{kind} access is not available on this device, so Evie cannot {feature}."
        )),
        DenialSeverity::Permanent => Some(format!(
            "Evie can no longer ask for {kind} access. Open your device Settings, \
             find Evie under Apps, and turn on {kind} to {feature}."
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::stub::StaticPermissions;
    use super::*;

    fn gateway(backend: &Arc<StaticPermissions>) -> PermissionGateway {
        PermissionGateway::new(Arc::clone(backend) as Arc<dyn PermissionBackend>)
    }

    #[test]
    fn classify_maps_platform_strings() {
        assert_eq!(
            PermissionStatus::classify("granted", Platform::Intent),
            PermissionStatus::Granted
        );
        assert_eq!(
            PermissionStatus::classify("never_ask_again", Platform::Intent),
            PermissionStatus::NeverAskAgain
        );
        assert_eq!(
            PermissionStatus::classify("blocked", Platform::Relay),
            PermissionStatus::NeverAskAgain
        );
        assert_eq!(
            PermissionStatus::classify("limited", Platform::Relay),
            PermissionStatus::Granted
        );
        assert_eq!(
            PermissionStatus::classify("garbage", Platform::Intent),
            PermissionStatus::Denied
        );
    }

    #[test]
    fn severity_splits_temporary_and_permanent() {
        assert_eq!(PermissionStatus::Granted.severity(), DenialSeverity::None);
        assert_eq!(PermissionStatus::Denied.severity(), DenialSeverity::Temporary);
        assert_eq!(
            PermissionStatus::NeverAskAgain.severity(),
            DenialSeverity::Permanent
        );
        assert_eq!(PermissionStatus::Restricted.severity(), DenialSeverity::Permanent);
    }

    #[test]
    fn guidance_only_for_missing_grants() {
        assert!(guidance(PermissionKind::Sms, PermissionStatus::Granted).is_none());
        let text = guidance(PermissionKind::Microphone, PermissionStatus::NeverAskAgain)
            .expect("permanent denial has guidance");
        assert!(text.contains("Settings"));
    }

    #[tokio::test]
    async fn request_counts_prompts() {
        let backend = Arc::new(StaticPermissions::new(Platform::Intent));
        backend.set_request_result(PermissionKind::Microphone, PermissionStatus::Granted);
        let gateway = gateway(&backend);

        assert_eq!(
            gateway.request(PermissionKind::Microphone).await,
            PermissionStatus::Granted
        );
        let record = gateway.record(PermissionKind::Microphone);
        assert_eq!(record.request_count, 1);
        assert_eq!(record.status, PermissionStatus::Granted);
        assert!(record.last_checked.is_some());
    }

    #[tokio::test]
    async fn never_ask_again_short_circuits_request() {
        let backend = Arc::new(StaticPermissions::new(Platform::Intent));
        backend.set_status(PermissionKind::Sms, PermissionStatus::NeverAskAgain);
        let gateway = gateway(&backend);

        assert_eq!(
            gateway.check(PermissionKind::Sms).await,
            PermissionStatus::NeverAskAgain
        );
        assert_eq!(
            gateway.request(PermissionKind::Sms).await,
            PermissionStatus::NeverAskAgain
        );
        assert_eq!(backend.prompts(PermissionKind::Sms), 0);
        assert_eq!(gateway.record(PermissionKind::Sms).request_count, 0);
    }

    #[tokio::test]
    async fn fresh_check_clears_never_ask_again() {
        let backend = Arc::new(StaticPermissions::new(Platform::Intent));
        backend.set_status(PermissionKind::Sms, PermissionStatus::NeverAskAgain);
        let gateway = gateway(&backend);
        gateway.check(PermissionKind::Sms).await;

        // User flips the switch in OS settings.
        backend.set_status(PermissionKind::Sms, PermissionStatus::Granted);
        assert_eq!(
            gateway.check(PermissionKind::Sms).await,
            PermissionStatus::Granted
        );
    }

    #[tokio::test]
    async fn ensure_prompts_once_after_denied_check() {
        let backend = Arc::new(StaticPermissions::new(Platform::Intent));
        backend.set_status(PermissionKind::Microphone, PermissionStatus::Undetermined);
        backend.set_request_result(PermissionKind::Microphone, PermissionStatus::Denied);
        let gateway = gateway(&backend);

        assert_eq!(
            gateway.ensure(PermissionKind::Microphone).await,
            PermissionStatus::Denied
        );
        assert_eq!(backend.prompts(PermissionKind::Microphone), 1);
    }

    #[tokio::test]
    async fn records_returns_copies_for_every_kind() {
        let backend = Arc::new(StaticPermissions::granting_all(Platform::Relay));
        let gateway = gateway(&backend);
        let mut records = gateway.records();
        assert_eq!(records.len(), 3);
        records[0].request_count = 99;
        assert_eq!(gateway.record(records[0].kind).request_count, 0);
    }
}
