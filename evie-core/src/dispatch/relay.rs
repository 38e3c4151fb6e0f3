//! Send through a cloud SMS relay.
//!
//! Wire format:
//!
//! ```text
//! POST <url>                         200 OK
//! { "phoneNumber": "+15551234567",   { "success": true,  "messageId": "abc" }
//!   "message": "…",                  { "success": false, "error": "…" }
//!   "priority": "urgent" }
//! ```
//!
//! | Failure | Error | Retried |
//! |---------|-------|---------|
//! | local monthly quota spent | `QuotaExceeded` | no |
//! | request timeout | `Timeout` | yes |
//! | connect failure | `NetworkUnavailable` | yes |
//! | HTTP 429 | `RateLimited` | yes |
//! | HTTP 5xx | `Server` | yes |
//! | other non-2xx | `SendFailed` | no |
//! | `success: false` | `SendFailed` / `QuotaExceeded` | no |

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::quota::MonthlyQuota;
use super::{DispatchRequest, Priority, Receipt, SmsTransport};
use crate::error::{EvieError, Result};
use crate::permissions::Platform;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub url: String,
    /// Sent as a bearer token when present.
    pub api_key: Option<String>,
    /// Whole-request timeout. Default: 30 s.
    pub timeout: Duration,
    /// Sends allowed per UTC calendar month. Default: 100.
    pub monthly_limit: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8787/sms".into(),
            api_key: None,
            timeout: Duration::from_secs(30),
            monthly_limit: 100,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RelayRequest<'a> {
    phone_number: &'a str,
    message: &'a str,
    priority: Priority,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelayResponse {
    success: bool,
    #[serde(default)]
    message_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

pub struct RelayTransport {
    config: RelayConfig,
    http: reqwest::Client,
    quota: Mutex<MonthlyQuota>,
}

impl RelayTransport {
    pub fn new(config: RelayConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("building relay HTTP client")?;
        let quota = MonthlyQuota::new(config.monthly_limit, Utc::now());
        Ok(Self {
            config,
            http,
            quota: Mutex::new(quota),
        })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Sends left this month.
    pub fn remaining_quota(&self) -> u32 {
        self.quota.lock().remaining(Utc::now())
    }

    async fn post(&self, request: &DispatchRequest) -> Result<RelayResponse> {
        let body = RelayRequest {
            phone_number: request.recipient.as_str(),
            message: &request.body,
            priority: request.priority,
        };

        let mut builder = self.http.post(&self.config.url).json(&body);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await.map_err(classify_transport_error)?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(EvieError::RateLimited);
        }
        if status.is_server_error() {
            let text = response.text().await.unwrap_or_default();
            return Err(EvieError::Server {
                status: status.as_u16(),
                detail: truncate(&text),
            });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EvieError::SendFailed {
                detail: format!("relay returned HTTP {status}: {}", truncate(&text)),
                recoverable: false,
            });
        }

        response.json::<RelayResponse>().await.map_err(|e| {
            if e.is_timeout() {
                EvieError::Timeout
            } else {
                EvieError::SendFailed {
                    detail: format!("unreadable relay response: {e}"),
                    recoverable: false,
                }
            }
        })
    }
}

#[async_trait]
impl SmsTransport for RelayTransport {
    fn platform(&self) -> Platform {
        Platform::Relay
    }

    async fn deliver(&self, request: &DispatchRequest) -> Result<Receipt> {
        self.quota.lock().check(Utc::now())?;

        debug!(url = %self.config.url, priority = ?request.priority, "relay request");
        let response = self.post(request).await?;

        if !response.success {
            let detail = response
                .error
                .unwrap_or_else(|| "relay reported failure".to_string());
            warn!(%detail, "relay refused message");
            if detail.to_ascii_lowercase().contains("quota") {
                return Err(EvieError::QuotaExceeded {
                    limit: self.config.monthly_limit,
                });
            }
            return Err(EvieError::SendFailed {
                detail,
                recoverable: false,
            });
        }

        self.quota.lock().record(Utc::now());
        Ok(Receipt::sent(response.message_id))
    }
}

fn classify_transport_error(e: reqwest::Error) -> EvieError {
    if e.is_timeout() {
        EvieError::Timeout
    } else if e.is_connect() {
        EvieError::NetworkUnavailable(e.to_string())
    } else {
        EvieError::SendFailed {
            detail: e.to_string(),
            recoverable: false,
        }
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_uses_camel_case() {
        let body = RelayRequest {
            phone_number: "+15551234567",
            message: "help",
            priority: Priority::Urgent,
        };
        let json = serde_json::to_value(&body).expect("serialize relay request");
        assert_eq!(json["phoneNumber"], "+15551234567");
        assert_eq!(json["message"], "help");
        assert_eq!(json["priority"], "urgent");
    }

    #[test]
    fn response_tolerates_missing_optionals() {
        let parsed: RelayResponse =
            serde_json::from_str(r#"{"success":true}"#).expect("parse minimal response");
        assert!(parsed.success);
        assert!(parsed.message_id.is_none());
        assert!(parsed.error.is_none());
    }

    #[test]
    fn defaults_match_relay_contract() {
        let config = RelayConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.monthly_limit, 100);
    }
}
