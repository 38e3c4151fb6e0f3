//! Persistent application settings (JSON file in app data directory).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use evie_core::{
    dispatch::Priority, retry::RetryPolicy, DispatchConfig, ListenerConfig, MessageBinding,
    Platform, RelayConfig,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub access_key: Option<String>,
    pub keyword: String,
    pub sensitivity: f32,
    pub recipient: String,
    pub message: String,
    pub contact_name: Option<String>,
    pub platform: String,
    pub relay_url: Option<String>,
    pub relay_api_key: Option<String>,
    pub relay_monthly_limit: u32,
    pub relay_timeout_secs: u64,
    pub send_max_attempts: u32,
    pub send_retry_delay_ms: u64,
    pub processing_reset_ms: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            access_key: None,
            keyword: "hey evie".into(),
            sensitivity: 0.5,
            recipient: String::new(),
            message: String::new(),
            contact_name: None,
            platform: "intent".into(),
            relay_url: None,
            relay_api_key: None,
            relay_monthly_limit: 100,
            relay_timeout_secs: 30,
            send_max_attempts: 3,
            send_retry_delay_ms: 2_000,
            processing_reset_ms: 1_000,
        }
    }
}

/// Settings as shown to the user: secrets reduced to presence flags.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSettings {
    pub keyword: String,
    pub sensitivity: f32,
    pub platform: String,
    pub has_access_key: bool,
    pub has_binding: bool,
    pub contact_name: Option<String>,
    pub relay_url: Option<String>,
    pub has_relay_api_key: bool,
    pub relay_monthly_limit: u32,
    pub send_max_attempts: u32,
    pub send_retry_delay_ms: u64,
}

/// `EVIE_*` environment values for secrets and the platform.
///
/// They only ever reach the effective settings built by
/// [`AppSettings::with_overrides`], never the copy that is saved to disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub access_key: Option<String>,
    pub platform: Option<String>,
    pub relay_url: Option<String>,
    pub relay_api_key: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            access_key: lookup("EVIE_ACCESS_KEY"),
            platform: lookup("EVIE_PLATFORM"),
            relay_url: lookup("EVIE_RELAY_URL"),
            relay_api_key: lookup("EVIE_RELAY_API_KEY"),
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.access_key = trimmed(self.access_key.take());
        self.keyword = normalize_keyword(&self.keyword);
        self.sensitivity = if self.sensitivity.is_finite() {
            self.sensitivity.clamp(0.0, 1.0)
        } else {
            0.5
        };
        self.recipient = self.recipient.trim().to_string();
        self.message = self.message.trim().to_string();
        self.contact_name = trimmed(self.contact_name.take());
        self.platform = normalize_platform(&self.platform);
        self.relay_url = trimmed(self.relay_url.take());
        self.relay_api_key = trimmed(self.relay_api_key.take());
        self.relay_monthly_limit = self.relay_monthly_limit.clamp(1, 10_000);
        self.relay_timeout_secs = self.relay_timeout_secs.clamp(5, 120);
        self.send_max_attempts = self.send_max_attempts.clamp(1, 10);
        self.send_retry_delay_ms = self.send_retry_delay_ms.clamp(0, 60_000);
        self.processing_reset_ms = self.processing_reset_ms.clamp(250, 10_000);
    }

    /// Settings the runtime uses: the file values with `EVIE_*` overrides on
    /// top. Save `self`, not the returned copy.
    pub fn with_overrides(&self, overrides: &EnvOverrides) -> AppSettings {
        let mut effective = self.clone();
        if let Some(key) = &overrides.access_key {
            effective.access_key = Some(key.clone());
        }
        if let Some(platform) = &overrides.platform {
            effective.platform = platform.clone();
        }
        if let Some(url) = &overrides.relay_url {
            effective.relay_url = Some(url.clone());
        }
        if let Some(key) = &overrides.relay_api_key {
            effective.relay_api_key = Some(key.clone());
        }
        effective.normalize();
        effective
    }

    pub fn platform(&self) -> Platform {
        match self.platform.as_str() {
            "relay" => Platform::Relay,
            _ => Platform::Intent,
        }
    }

    /// `None` until both a recipient and a message are configured.
    pub fn binding(&self) -> Option<MessageBinding> {
        if self.recipient.is_empty() || self.message.is_empty() {
            return None;
        }
        Some(MessageBinding {
            recipient: self.recipient.clone(),
            body: self.message.clone(),
            contact_name: self.contact_name.clone(),
        })
    }

    pub fn listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            processing_reset_delay: Duration::from_millis(self.processing_reset_ms),
            ..ListenerConfig::default()
        }
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            retry: RetryPolicy::new(
                self.send_max_attempts,
                Duration::from_millis(self.send_retry_delay_ms),
            ),
            priority: Priority::Urgent,
        }
    }

    pub fn relay_config(&self) -> RelayConfig {
        let defaults = RelayConfig::default();
        RelayConfig {
            url: self.relay_url.clone().unwrap_or(defaults.url),
            api_key: self.relay_api_key.clone(),
            timeout: Duration::from_secs(self.relay_timeout_secs),
            monthly_limit: self.relay_monthly_limit,
        }
    }

    pub fn runtime_settings(&self) -> RuntimeSettings {
        RuntimeSettings {
            keyword: self.keyword.clone(),
            sensitivity: self.sensitivity,
            platform: self.platform.clone(),
            has_access_key: self.access_key.is_some(),
            has_binding: self.binding().is_some(),
            contact_name: self.contact_name.clone(),
            relay_url: self.relay_url.clone(),
            has_relay_api_key: self.relay_api_key.is_some(),
            relay_monthly_limit: self.relay_monthly_limit,
            send_max_attempts: self.send_max_attempts,
            send_retry_delay_ms: self.send_retry_delay_ms,
        }
    }
}

pub fn normalize_platform(raw: &str) -> String {
    match raw.trim().to_ascii_lowercase().as_str() {
        "relay" | "ios" | "cloud" => "relay".into(),
        _ => "intent".into(),
    }
}

pub fn normalize_keyword(raw: &str) -> String {
    let keyword = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if keyword.is_empty() {
        "hey evie".into()
    } else {
        keyword.to_lowercase()
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Evie")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("evie")
            .join("settings.json")
    }
}

/// Missing or unreadable files fall back to defaults.
pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| match serde_json::from_str::<AppSettings>(&raw) {
            Ok(settings) => Some(settings),
            Err(e) => {
                tracing::warn!(path = %path.display(), "ignoring malformed settings: {e}");
                None
            }
        })
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}
