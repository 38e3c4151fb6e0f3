//! Console host state.
//!
//! One `AppState` is built in `main` and shared (via `Arc`) with the event
//! forwarders and the console loop.

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use evie_core::classifier::stub::ClassifierProbe;
use evie_core::dispatch::DispatchSnapshot;
use evie_core::permissions::PermissionRecord;
use evie_core::{DispatchOrchestrator, ListenerState, PermissionGateway, WakeWordListener};
use parking_lot::Mutex;
use serde::Serialize;

use crate::settings::{AppSettings, EnvOverrides, RuntimeSettings};

pub struct AppState {
    pub listener: WakeWordListener,
    pub orchestrator: Arc<DispatchOrchestrator>,
    pub permissions: Arc<PermissionGateway>,
    /// Drives the development classifier from console input.
    pub probe: ClassifierProbe,
    /// File-backed settings; the only copy that is ever saved.
    pub settings: Arc<Mutex<AppSettings>>,
    pub overrides: EnvOverrides,
    /// Absolute path to `settings.json`.
    pub settings_path: PathBuf,
    /// Count of detection events observed.
    pub detections_seen: AtomicUsize,
    /// Count of dispatch events that reported success.
    pub dispatch_success: AtomicUsize,
    /// Count of dispatch events that reported failure or cancellation.
    pub dispatch_failed: AtomicUsize,
    /// Count of listener error events.
    pub listener_errors: AtomicUsize,
}

impl AppState {
    pub fn new(
        listener: WakeWordListener,
        orchestrator: Arc<DispatchOrchestrator>,
        permissions: Arc<PermissionGateway>,
        probe: ClassifierProbe,
        settings: AppSettings,
        overrides: EnvOverrides,
        settings_path: PathBuf,
    ) -> Self {
        Self {
            listener,
            orchestrator,
            permissions,
            probe,
            settings: Arc::new(Mutex::new(settings)),
            overrides,
            settings_path,
            detections_seen: AtomicUsize::new(0),
            dispatch_success: AtomicUsize::new(0),
            dispatch_failed: AtomicUsize::new(0),
            listener_errors: AtomicUsize::new(0),
        }
    }

    /// File settings with the `EVIE_*` overrides applied.
    pub fn effective_settings(&self) -> AppSettings {
        self.settings.lock().with_overrides(&self.overrides)
    }

    pub fn diagnostics_snapshot(&self) -> AppDiagnostics {
        AppDiagnostics {
            listener_state: self.listener.state(),
            keyword: self.listener.keyword(),
            recovery_attempts: self.listener.recovery_attempts(),
            detections_seen: self.detections_seen.load(Ordering::Relaxed),
            dispatch_success: self.dispatch_success.load(Ordering::Relaxed),
            dispatch_failed: self.dispatch_failed.load(Ordering::Relaxed),
            detections_dropped: self.orchestrator.dropped_detections(),
            listener_errors: self.listener_errors.load(Ordering::Relaxed),
            dispatch: self.orchestrator.dispatcher().diagnostics_snapshot(),
            permissions: self.permissions.records(),
            settings: self.effective_settings().runtime_settings(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppDiagnostics {
    pub listener_state: ListenerState,
    pub keyword: Option<String>,
    pub recovery_attempts: u32,
    pub detections_seen: usize,
    pub dispatch_success: usize,
    pub dispatch_failed: usize,
    pub detections_dropped: usize,
    pub listener_errors: usize,
    pub dispatch: DispatchSnapshot,
    pub permissions: Vec<PermissionRecord>,
    pub settings: RuntimeSettings,
}
