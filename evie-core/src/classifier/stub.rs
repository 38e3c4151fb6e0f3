//! `ManualClassifier`: engine stand-in driven by hand.
//!
//! No audio is captured. Detections and faults are injected through a
//! `ClassifierProbe`, so the full listener → orchestrator → dispatch path can
//! be exercised on hosts without a wake-word engine (console host, tests).

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::{ClassifierCallbacks, ClassifierFactory, ClassifierSpec, KeywordClassifier};
use crate::error::{EvieError, Result};

#[derive(Debug, Default)]
struct ProbeState {
    callbacks: Option<ClassifierCallbacks>,
    spec: Option<ClassifierSpec>,
    running: bool,
    creates: u32,
    starts: u32,
    stops: u32,
    releases: u32,
    failing_starts: u32,
    create_error: Option<String>,
}

/// Control + inspection handle shared by the factory and every classifier it builds.
#[derive(Debug, Clone, Default)]
pub struct ClassifierProbe {
    state: Arc<Mutex<ProbeState>>,
}

impl ClassifierProbe {
    /// Report a hit on the first keyword. Ignored unless capture is running.
    pub fn detect(&self) -> bool {
        self.detect_keyword(0, None)
    }

    pub fn detect_keyword(&self, keyword_index: usize, confidence: Option<f32>) -> bool {
        let state = self.state.lock();
        match (&state.callbacks, state.running) {
            (Some(cb), true) => {
                cb.detected(keyword_index, confidence);
                true
            }
            _ => false,
        }
    }

    /// Report an engine fault, as a lost audio device would.
    pub fn fault(&self, message: &str) {
        if let Some(cb) = &self.state.lock().callbacks {
            cb.error(message);
        }
    }

    /// Make the next `n` calls to `start()` fail.
    pub fn fail_next_starts(&self, n: u32) {
        self.state.lock().failing_starts = n;
    }

    /// Make `create()` fail with `message` (or succeed again with `None`).
    pub fn fail_create(&self, message: Option<&str>) {
        self.state.lock().create_error = message.map(str::to_string);
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub fn creates(&self) -> u32 {
        self.state.lock().creates
    }

    pub fn starts(&self) -> u32 {
        self.state.lock().starts
    }

    pub fn stops(&self) -> u32 {
        self.state.lock().stops
    }

    pub fn releases(&self) -> u32 {
        self.state.lock().releases
    }

    /// Spec the most recent classifier was created with.
    pub fn spec(&self) -> Option<ClassifierSpec> {
        self.state.lock().spec.clone()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ManualClassifierFactory {
    probe: ClassifierProbe,
}

impl ManualClassifierFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe(&self) -> ClassifierProbe {
        self.probe.clone()
    }
}

impl ClassifierFactory for ManualClassifierFactory {
    fn create(
        &self,
        spec: &ClassifierSpec,
        callbacks: ClassifierCallbacks,
    ) -> Result<Box<dyn KeywordClassifier>> {
        let mut state = self.probe.state.lock();
        if let Some(message) = state.create_error.clone() {
            return Err(EvieError::Initialization(message));
        }
        state.creates += 1;
        state.callbacks = Some(callbacks);
        state.spec = Some(spec.clone());
        state.running = false;
        debug!(keywords = ?spec.keywords, "ManualClassifier created");
        Ok(Box::new(ManualClassifier {
            probe: self.probe.clone(),
        }))
    }
}

pub struct ManualClassifier {
    probe: ClassifierProbe,
}

impl KeywordClassifier for ManualClassifier {
    fn start(&mut self) -> Result<()> {
        let mut state = self.probe.state.lock();
        state.starts += 1;
        if state.failing_starts > 0 {
            state.failing_starts -= 1;
            return Err(EvieError::Classifier("audio capture unavailable".into()));
        }
        state.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let mut state = self.probe.state.lock();
        state.stops += 1;
        state.running = false;
        Ok(())
    }

    fn release(&mut self) {
        let mut state = self.probe.state.lock();
        state.releases += 1;
        state.running = false;
        state.callbacks = None;
    }
}
