//! Recipient validation and E.164-style normalization.
//!
//! | Input digits | Rule | Example |
//! |--------------|------|---------|
//! | `+` prefixed | keep, drop separators | `+44 20 7946 0958` → `+442079460958` |
//! | 10 | prepend `+1` | `5551234567` → `+15551234567` |
//! | 11 starting `1` | prepend `+` | `15551234567` → `+15551234567` |
//! | other 11–15 | prepend `+` | `442079460958` → `+442079460958` |
//!
//! Anything with fewer than 10 or more than 15 digits is rejected.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EvieError, Result};

pub const MIN_DIGITS: usize = 10;
pub const MAX_DIGITS: usize = 15;

/// A validated, normalized phone number. Only constructible through `parse`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// # Errors
    /// `InvalidRecipient` unless the input holds 10–15 digits.
    pub fn parse(raw: &str) -> Result<Self> {
        let digits = digits(raw);
        if !(MIN_DIGITS..=MAX_DIGITS).contains(&digits.len()) {
            return Err(EvieError::InvalidRecipient(raw.to_string()));
        }

        let normalized = if raw.trim_start().starts_with('+') {
            format!("+{digits}")
        } else if digits.len() == 10 {
            format!("+1{digits}")
        } else {
            format!("+{digits}")
        };
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last four digits only, for logs and announcements.
    pub fn redacted(&self) -> String {
        let tail_start = self.0.len().saturating_sub(4);
        format!("•••{}", &self.0[tail_start..])
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strip everything that is not an ASCII digit.
pub fn digits(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// Convenience wrapper returning the normalized string.
pub fn normalize(raw: &str) -> Result<String> {
    PhoneNumber::parse(raw).map(|p| p.0)
}
