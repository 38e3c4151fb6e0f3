//! `WakeWordListener`: wake-word lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! WakeWordListener::new()
//!     └─► initialize(key, keyword, sensitivity)   Idle → Initializing → Idle
//!         └─► start()                             → Listening
//!             ├─► detection                       → Processing ─(1 s)─► Listening
//!             ├─► classifier error                → Error ─► recovery ─► Listening
//!             └─► stop()                          → Idle
//! ```
//!
//! `start()`/`stop()` are idempotent: starting while `Listening` or stopping
//! while `Idle` returns `Ok` without touching the classifier.
//!
//! ## Threading
//!
//! The engine reports through `ClassifierCallbacks` from its own capture
//! thread. A single pump task drains those signals, so detections are handled
//! serially. The classifier handle sits behind a `parking_lot::Mutex` that is
//! never held across an `.await`. Lock order is classifier → state.

pub mod recovery;

pub use recovery::RecoveryPolicy;

use std::sync::{
    atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
    Arc, Weak,
};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    classifier::{
        ClassifierCallbacks, ClassifierFactory, ClassifierSignal, ClassifierSpec,
        KeywordClassifier,
    },
    error::{EvieError, Result},
    ipc::events::{DetectionEvent, ListenerErrorEvent, ListenerState, ListenerStatusEvent},
    permissions::{guidance, PermissionGateway, PermissionKind},
};

/// Broadcast channel capacity for listener events.
const BROADCAST_CAP: usize = 64;

/// Configuration for `WakeWordListener`.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// How long the listener stays in `Processing` after a detection before
    /// accepting the next one. Default: 1 s.
    pub processing_reset_delay: Duration,
    /// Automatic recovery after classifier faults.
    pub recovery: RecoveryPolicy,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            processing_reset_delay: Duration::from_secs(1),
            recovery: RecoveryPolicy::default(),
        }
    }
}

/// Cloneable handle; all clones drive the same classifier.
#[derive(Clone)]
pub struct WakeWordListener {
    inner: Arc<Inner>,
}

struct Inner {
    config: ListenerConfig,
    factory: Arc<dyn ClassifierFactory>,
    permissions: Arc<PermissionGateway>,
    state: Mutex<ListenerState>,
    classifier: Mutex<Option<Box<dyn KeywordClassifier>>>,
    keywords: Mutex<Vec<String>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    recovery: Mutex<Option<JoinHandle<()>>>,
    /// Bumped by `stop()` and teardown; a recovery run only acts while the
    /// generation it started under is current.
    generation: AtomicU64,
    /// Failed recovery attempts since the last success.
    recovery_attempts: AtomicU32,
    /// `true` while a recovery task is running.
    recovering: AtomicBool,
    /// Set by an explicit `stop()`; cancels pending recovery.
    halted: AtomicBool,
    status_tx: broadcast::Sender<ListenerStatusEvent>,
    detection_tx: broadcast::Sender<DetectionEvent>,
    error_tx: broadcast::Sender<ListenerErrorEvent>,
    seq: AtomicU64,
}

impl WakeWordListener {
    pub fn new(
        config: ListenerConfig,
        factory: Arc<dyn ClassifierFactory>,
        permissions: Arc<PermissionGateway>,
    ) -> Self {
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (detection_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (error_tx, _) = broadcast::channel(BROADCAST_CAP);
        Self {
            inner: Arc::new(Inner {
                config,
                factory,
                permissions,
                state: Mutex::new(ListenerState::Idle),
                classifier: Mutex::new(None),
                keywords: Mutex::new(Vec::new()),
                pump: Mutex::new(None),
                recovery: Mutex::new(None),
                generation: AtomicU64::new(0),
                recovery_attempts: AtomicU32::new(0),
                recovering: AtomicBool::new(false),
                halted: AtomicBool::new(false),
                status_tx,
                detection_tx,
                error_tx,
                seq: AtomicU64::new(0),
            }),
        }
    }

    /// Validate config, acquire the microphone and build the classifier.
    ///
    /// Calling it again replaces the previous classifier and is the way to
    /// leave `PermissionDenied` after the user grants access.
    ///
    /// # Errors
    /// - `InvalidAccessKey` / `InvalidKeyword` / `InvalidSensitivity` on bad config
    ///   (state untouched, never retried).
    /// - `PermissionDenied` if the microphone is refused.
    /// - `Initialization` if the engine rejects the configuration.
    pub async fn initialize(&self, access_key: &str, keyword: &str, sensitivity: f32) -> Result<()> {
        self.inner.initialize(access_key, keyword, sensitivity).await
    }

    /// Begin listening. No-op when already listening.
    ///
    /// A start that actually brings the classifier up (for example out of
    /// `Error` after recovery gave up) restores the full recovery budget.
    pub fn start(&self) -> Result<()> {
        self.inner.halted.store(false, Ordering::SeqCst);
        let was_active = self.state().is_active();
        self.inner.start_classifier()?;
        if !was_active {
            self.inner.recovery_attempts.store(0, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Stop listening and cancel pending recovery. No-op when idle.
    ///
    /// Does not abort a send that a detection already triggered.
    pub fn stop(&self) -> Result<()> {
        self.inner.halted.store(true, Ordering::SeqCst);
        self.inner.cancel_recovery();
        self.inner.stop_classifier()
    }

    /// Stop and free the classifier. `initialize()` is required afterwards.
    pub fn release(&self) {
        self.inner.halted.store(true, Ordering::SeqCst);
        self.inner.teardown();
        self.inner.set_state(ListenerState::Idle, None);
        info!("wake word listener released");
    }

    /// Current state (snapshot).
    pub fn state(&self) -> ListenerState {
        *self.inner.state.lock()
    }

    /// Keyword the classifier is bound to, if initialized.
    pub fn keyword(&self) -> Option<String> {
        self.inner.keywords.lock().first().cloned()
    }

    /// Failed recovery attempts since the last successful recovery.
    pub fn recovery_attempts(&self) -> u32 {
        self.inner.recovery_attempts.load(Ordering::SeqCst)
    }

    pub fn is_recovering(&self) -> bool {
        self.inner.recovering.load(Ordering::SeqCst)
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<ListenerStatusEvent> {
        self.inner.status_tx.subscribe()
    }

    pub fn subscribe_detections(&self) -> broadcast::Receiver<DetectionEvent> {
        self.inner.detection_tx.subscribe()
    }

    pub fn subscribe_errors(&self) -> broadcast::Receiver<ListenerErrorEvent> {
        self.inner.error_tx.subscribe()
    }
}

impl std::fmt::Debug for WakeWordListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WakeWordListener")
            .field("state", &self.state())
            .field("recovery_attempts", &self.recovery_attempts())
            .finish_non_exhaustive()
    }
}

impl Inner {
    async fn initialize(
        self: &Arc<Self>,
        access_key: &str,
        keyword: &str,
        sensitivity: f32,
    ) -> Result<()> {
        validate_access_key(access_key)?;
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(EvieError::InvalidKeyword);
        }
        if !sensitivity.is_finite() || !(0.0..=1.0).contains(&sensitivity) {
            return Err(EvieError::InvalidSensitivity(sensitivity));
        }

        self.teardown();
        self.set_state(ListenerState::Initializing, None);

        let mic = self.permissions.ensure(PermissionKind::Microphone).await;
        if !mic.is_granted() {
            warn!(status = %mic, "microphone permission not granted");
            self.set_state(
                ListenerState::PermissionDenied,
                guidance(PermissionKind::Microphone, mic),
            );
            return Err(EvieError::PermissionDenied {
                kind: PermissionKind::Microphone,
                status: mic,
            });
        }

        let spec = ClassifierSpec {
            access_key: access_key.trim().to_string(),
            keywords: vec![keyword.to_string()],
            sensitivities: vec![sensitivity],
        };
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let classifier = match self
            .factory
            .create(&spec, ClassifierCallbacks::new(signal_tx))
        {
            Ok(c) => c,
            Err(e) => {
                let e = match e {
                    EvieError::Initialization(_) => e,
                    other => EvieError::Initialization(other.to_string()),
                };
                self.set_state(ListenerState::Error, Some(e.to_string()));
                return Err(e);
            }
        };

        *self.classifier.lock() = Some(classifier);
        *self.keywords.lock() = spec.keywords;
        self.recovery_attempts.store(0, Ordering::SeqCst);
        self.halted.store(false, Ordering::SeqCst);
        *self.pump.lock() = Some(tokio::spawn(pump(Arc::downgrade(self), signal_rx)));

        self.set_state(ListenerState::Idle, None);
        info!(keyword, sensitivity, "wake word listener initialized");
        Ok(())
    }

    fn start_classifier(&self) -> Result<()> {
        let mut guard = self.classifier.lock();
        let state = *self.state.lock();
        if state.is_active() {
            debug!(?state, "start ignored: already listening");
            return Ok(());
        }
        if state == ListenerState::PermissionDenied {
            return Err(EvieError::PermissionDenied {
                kind: PermissionKind::Microphone,
                status: self.permissions.record(PermissionKind::Microphone).status,
            });
        }
        let Some(classifier) = guard.as_mut() else {
            return Err(EvieError::NotInitialized);
        };
        if let Err(e) = classifier.start() {
            self.set_state(ListenerState::Error, Some(e.to_string()));
            return Err(e);
        }
        self.set_state(ListenerState::Listening, None);
        info!("wake word listener started");
        Ok(())
    }

    fn stop_classifier(&self) -> Result<()> {
        let mut guard = self.classifier.lock();
        let state = *self.state.lock();
        if matches!(state, ListenerState::Idle | ListenerState::PermissionDenied) {
            return Ok(());
        }
        if let Some(classifier) = guard.as_mut() {
            classifier.stop()?;
        }
        self.set_state(ListenerState::Idle, None);
        info!("wake word listener stopped");
        Ok(())
    }

    /// Drop the pump, any recovery run and the classifier. State is left to
    /// the caller.
    fn teardown(&self) {
        self.cancel_recovery();
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
        if let Some(mut classifier) = self.classifier.lock().take() {
            if let Err(e) = classifier.stop() {
                debug!("classifier stop during teardown failed: {e}");
            }
            classifier.release();
        }
        self.keywords.lock().clear();
    }

    fn on_detected(self: &Arc<Self>, keyword_index: usize, confidence: Option<f32>) {
        if !self.transition(ListenerState::Listening, ListenerState::Processing) {
            debug!(state = ?*self.state.lock(), "detection ignored outside Listening");
            return;
        }

        let keyword = {
            let keywords = self.keywords.lock();
            keywords
                .get(keyword_index)
                .or_else(|| keywords.first())
                .cloned()
                .unwrap_or_default()
        };
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let event = DetectionEvent {
            seq,
            keyword,
            confidence: confidence.unwrap_or(1.0).clamp(0.0, 1.0),
            timestamp: Utc::now(),
        };
        info!(seq = event.seq, keyword = %event.keyword, "wake word detected");
        let _ = self.detection_tx.send(event);

        // Return to Listening after the delay unless stop()/an error moved us on
        // or a later detection owns the Processing window.
        let weak = Arc::downgrade(self);
        let delay = self.config.processing_reset_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if inner.seq.load(Ordering::SeqCst) != seq + 1 {
                debug!(seq, "stale processing reset skipped");
                return;
            }
            inner.transition(ListenerState::Processing, ListenerState::Listening);
        });
    }

    fn on_classifier_error(self: &Arc<Self>, message: String) {
        let err = EvieError::Classifier(message);
        warn!("wake word engine error: {err}");
        self.set_state(ListenerState::Error, Some(err.to_string()));

        let attempts = self.recovery_attempts.load(Ordering::SeqCst);
        if attempts >= self.config.recovery.retry.max_attempts {
            warn!(attempts, "recovery budget exhausted; not retrying");
            self.emit_error(&EvieError::RecoveryExhausted { attempts }, attempts);
            return;
        }
        self.emit_error(&err, attempts);

        if self.halted.load(Ordering::SeqCst) {
            debug!("listener stopped by caller; skipping recovery");
            return;
        }
        if self.recovering.swap(true, Ordering::SeqCst) {
            debug!("recovery already in progress");
            return;
        }
        let generation = self.generation.load(Ordering::SeqCst);
        let inner = Arc::clone(self);
        let handle = tokio::spawn(async move {
            inner.recover(generation).await;
            if inner.generation.load(Ordering::SeqCst) == generation {
                inner.recovering.store(false, Ordering::SeqCst);
            }
        });
        *self.recovery.lock() = Some(handle);
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    /// Abandon any recovery run. A run already past its last await sees the
    /// generation change and backs off.
    fn cancel_recovery(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(recovery) = self.recovery.lock().take() {
            recovery.abort();
        }
        self.recovering.store(false, Ordering::SeqCst);
    }

    fn set_state(&self, new_state: ListenerState, detail: Option<String>) {
        *self.state.lock() = new_state;
        let _ = self.status_tx.send(ListenerStatusEvent {
            state: new_state,
            detail,
        });
    }

    /// Compare-and-set; emits a status event only when it switched.
    fn transition(&self, from: ListenerState, to: ListenerState) -> bool {
        {
            let mut state = self.state.lock();
            if *state != from {
                return false;
            }
            *state = to;
        }
        let _ = self.status_tx.send(ListenerStatusEvent {
            state: to,
            detail: None,
        });
        true
    }

    fn emit_error(&self, err: &EvieError, recovery_attempts: u32) {
        let _ = self.error_tx.send(ListenerErrorEvent {
            error: err.detail(),
            recovery_attempts,
        });
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Drains classifier callbacks one at a time.
async fn pump(weak: Weak<Inner>, mut signals: mpsc::UnboundedReceiver<ClassifierSignal>) {
    while let Some(signal) = signals.recv().await {
        let Some(inner) = weak.upgrade() else {
            break;
        };
        match signal {
            ClassifierSignal::Detected {
                keyword_index,
                confidence,
            } => inner.on_detected(keyword_index, confidence),
            ClassifierSignal::Error(message) => inner.on_classifier_error(message),
        }
    }
    debug!("classifier signal pump finished");
}

/// Access keys are base64 blobs; reject empties and unreplaced placeholders.
pub fn validate_access_key(access_key: &str) -> Result<()> {
    let key = access_key.trim();
    if key.is_empty() {
        return Err(EvieError::InvalidAccessKey("access key is empty".into()));
    }
    if key.to_ascii_uppercase().starts_with("YOUR_") {
        return Err(EvieError::InvalidAccessKey(
            "access key is still the placeholder value".into(),
        ));
    }
    if let Some(bad) = key
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=')))
    {
        return Err(EvieError::InvalidAccessKey(format!(
            "unexpected character {bad:?}"
        )));
    }
    Ok(())
}
