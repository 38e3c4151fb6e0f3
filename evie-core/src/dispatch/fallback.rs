//! Manual-send fallback shown after a terminal failure.

use serde::{Deserialize, Serialize};

use super::phone::PhoneNumber;
use crate::error::ErrorDetail;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualFallback {
    /// Normalized number when the input was valid, otherwise the raw input.
    pub recipient: String,
    /// The literal message text, ready to copy.
    pub message: String,
    pub instructions: String,
}

/// Build copy-and-send-yourself instructions for `body`.
pub fn manual_fallback(recipient: &str, body: &str, error: &ErrorDetail) -> ManualFallback {
    let recipient = PhoneNumber::parse(recipient)
        .map(|p| p.to_string())
        .unwrap_or_else(|_| recipient.trim().to_string());
    let message = body.trim().to_string();

    let to_line = if recipient.is_empty() {
        "2. Start a new message to your emergency contact.".to_string()
    } else {
        format!("2. Start a new message to {recipient}.")
    };
    let instructions = format!(
        "Evie could not send your message ({reason}).\n\
         To send it yourself:\n\
         1. Open your phone's messaging app.\n\
         {to_line}\n\
         3. Copy the message below, paste it, and send.",
        reason = error.message,
    );

    ManualFallback {
        recipient,
        message,
        instructions,
    }
}

impl ManualFallback {
    /// Instructions followed by the message, for a single copy action.
    pub fn clipboard_text(&self) -> String {
        format!("{}\n\n{}", self.instructions, self.message)
    }
}
