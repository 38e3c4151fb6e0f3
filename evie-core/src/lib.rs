//! # evie-core
//!
//! Hands-free emergency messaging: a wake word sends a pre-bound SMS.
//!
//! ## Architecture
//!
//! ```text
//! KeywordClassifier ─callbacks─► WakeWordListener (pump task)
//!                                    │
//!                      broadcast::Sender<DetectionEvent>
//!                                    │
//!                           DispatchOrchestrator
//!                                    │
//!                 MessageDispatcher::send_with_retry
//!                                    │
//!                 SmsTransport: IntentTransport | RelayTransport
//!                                    │
//!                      broadcast::Sender<DispatchEvent>
//! ```
//!
//! Permissions go through `PermissionGateway` on both paths. Nothing past the
//! dispatch adapter returns `Err`; failures travel as `ErrorDetail`.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod classifier;
pub mod dispatch;
pub mod error;
pub mod ipc;
pub mod listener;
pub mod orchestrator;
pub mod permissions;
pub mod retry;

// Convenience re-exports for downstream crates
pub use classifier::{ClassifierFactory, KeywordClassifier};
pub use dispatch::{
    intent::IntentTransport, relay::RelayConfig, relay::RelayTransport, DispatchConfig,
    DispatchResult, DispatchStatus, MessageDispatcher, SmsTransport,
};
pub use error::{ErrorDetail, EvieError};
pub use ipc::events::{
    DetectionEvent, DispatchEvent, ListenerErrorEvent, ListenerState, ListenerStatusEvent,
};
pub use listener::{ListenerConfig, WakeWordListener};
pub use orchestrator::{DispatchOrchestrator, MessageBinding};
pub use permissions::{PermissionBackend, PermissionGateway, Platform};
