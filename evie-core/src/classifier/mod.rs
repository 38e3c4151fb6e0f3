//! Wake-word classifier abstraction.
//!
//! The `KeywordClassifier` trait decouples the listener from any specific
//! engine (Porcupine, openWakeWord, the in-tree `ManualClassifier`, …).
//!
//! Engines run their own capture loop and report back through
//! `ClassifierCallbacks`, which queues `ClassifierSignal`s for the listener's
//! pump task. Callbacks are therefore cheap and safe to call from any thread.

pub mod stub;

use tokio::sync::mpsc;

use crate::error::Result;

/// What the classifier is bound to. The listener always passes exactly one
/// keyword and one sensitivity.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierSpec {
    pub access_key: String,
    pub keywords: Vec<String>,
    /// One per keyword, each in [0.0, 1.0].
    pub sensitivities: Vec<f32>,
}

/// A message from the classifier's capture thread.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifierSignal {
    Detected {
        /// Index into `ClassifierSpec::keywords`.
        keyword_index: usize,
        confidence: Option<f32>,
    },
    Error(String),
}

/// `onDetect` / `onError` handed to the engine at construction time.
#[derive(Debug, Clone)]
pub struct ClassifierCallbacks {
    tx: mpsc::UnboundedSender<ClassifierSignal>,
}

impl ClassifierCallbacks {
    pub fn new(tx: mpsc::UnboundedSender<ClassifierSignal>) -> Self {
        Self { tx }
    }

    pub fn detected(&self, keyword_index: usize, confidence: Option<f32>) {
        let _ = self.tx.send(ClassifierSignal::Detected {
            keyword_index,
            confidence,
        });
    }

    pub fn error(&self, message: impl Into<String>) {
        let _ = self.tx.send(ClassifierSignal::Error(message.into()));
    }
}

/// Handle to a constructed engine. Owned exclusively by the listener.
pub trait KeywordClassifier: Send + 'static {
    /// Begin audio capture and classification.
    fn start(&mut self) -> Result<()>;

    /// Halt capture. Must be safe to call when already stopped.
    fn stop(&mut self) -> Result<()>;

    /// Free engine resources. The handle is not used afterwards.
    fn release(&mut self);
}

/// Builds classifier handles (the engine's `create` entry point).
pub trait ClassifierFactory: Send + Sync + 'static {
    /// # Errors
    /// Returns an error if the engine rejects the key or model.
    fn create(
        &self,
        spec: &ClassifierSpec,
        callbacks: ClassifierCallbacks,
    ) -> Result<Box<dyn KeywordClassifier>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callbacks_queue_signals_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let callbacks = ClassifierCallbacks::new(tx);

        callbacks.detected(0, Some(0.8));
        callbacks.error("audio device lost");

        assert_eq!(
            rx.try_recv().expect("first signal"),
            ClassifierSignal::Detected {
                keyword_index: 0,
                confidence: Some(0.8)
            }
        );
        assert_eq!(
            rx.try_recv().expect("second signal"),
            ClassifierSignal::Error("audio device lost".into())
        );
    }

    #[test]
    fn callbacks_ignore_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        // Must not panic once the listener has gone away.
        ClassifierCallbacks::new(tx).detected(0, None);
    }
}
