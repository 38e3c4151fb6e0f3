//! Event types exchanged between the core and its host.
//!
//! All types derive `serde::Serialize` + `serde::Deserialize` so a host can
//! forward them over whatever bridge it uses (console, FFI, webview).

pub mod events;
