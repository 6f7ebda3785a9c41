//! Twilio adapter for international numbers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::{http_client, BatchOutcome, NumberError, ProviderKind, SmsProvider};
use crate::config::InternationalProviderConfig;
use crate::error::Result;
use crate::message::truncate_sms;
use crate::phone::NormalizedPhone;

const NAME: &str = "twilio";
const API_VERSION: &str = "2010-04-01";

#[derive(Debug)]
struct Credentials {
    account_sid: String,
    auth_token: String,
    from_number: String,
}

/// Adapter for the Twilio Messages resource.
///
/// Each number gets its own request; the requests run concurrently and
/// results are reported in input order.
#[derive(Debug, Clone)]
pub struct InternationalSmsProvider {
    client: reqwest::Client,
    credentials: Option<Arc<Credentials>>,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct MessageResource {
    #[serde(default)]
    sid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<u32>,
    #[serde(default)]
    message: Option<String>,
}

fn present(value: Option<&String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Prefix `+` when missing.
fn with_plus(number: &str) -> String {
    let number = number.trim();
    if number.starts_with('+') {
        number.to_string()
    } else {
        format!("+{number}")
    }
}

impl InternationalSmsProvider {
    /// Build the adapter. It is unconfigured unless all three credentials are set.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &InternationalProviderConfig, timeout: Duration) -> Result<Self> {
        let credentials = match (
            present(config.account_sid.as_ref()),
            present(config.auth_token.as_ref()),
            present(config.from_number.as_ref()),
        ) {
            (Some(account_sid), Some(auth_token), Some(from_number)) => Some(Arc::new(Credentials {
                account_sid,
                auth_token,
                from_number,
            })),
            _ => None,
        };

        Ok(Self {
            client: http_client(NAME, timeout)?,
            credentials,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn messages_url(&self, account_sid: &str) -> String {
        format!(
            "{}/{API_VERSION}/Accounts/{account_sid}/Messages.json",
            self.api_base
        )
    }
}

/// Send one message; `Ok` carries the message sid.
async fn send_one(
    client: reqwest::Client,
    url: String,
    credentials: Arc<Credentials>,
    to: String,
    body: String,
) -> std::result::Result<Option<String>, String> {
    let form = [
        ("To", to.as_str()),
        ("From", credentials.from_number.as_str()),
        ("Body", body.as_str()),
    ];

    let response = client
        .post(&url)
        .basic_auth(&credentials.account_sid, Some(&credentials.auth_token))
        .form(&form)
        .send()
        .await
        .map_err(|e| format!("transport error: {e}"))?;

    let status = response.status();
    if status.is_success() {
        let resource: Option<MessageResource> = response.json().await.ok();
        return Ok(resource.and_then(|r| r.sid));
    }

    let detail = match response.json::<ApiError>().await {
        Ok(ApiError {
            code: Some(code),
            message: Some(message),
        }) => format!("{message} (code {code})"),
        Ok(ApiError {
            message: Some(message),
            ..
        }) => message,
        _ => status
            .canonical_reason()
            .unwrap_or("request rejected")
            .to_string(),
    };
    Err(format!("HTTP {}: {detail}", status.as_u16()))
}

#[async_trait]
impl SmsProvider for InternationalSmsProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::International
    }

    fn name(&self) -> &'static str {
        NAME
    }

    fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    fn format_number(&self, phone: &NormalizedPhone) -> Option<String> {
        phone.e164()
    }

    async fn send(&self, numbers: &[String], message: &str) -> BatchOutcome {
        let Some(credentials) = self.credentials.clone() else {
            warn!("International SMS skipped: credentials not configured");
            return BatchOutcome::not_configured(numbers, NAME);
        };

        let body = truncate_sms(message);
        let url = self.messages_url(&credentials.account_sid);
        debug!("International SMS to {} number(s)", numbers.len());

        // Dropping the set aborts whatever is still in flight
        let mut tasks = JoinSet::new();
        for (index, number) in numbers.iter().enumerate() {
            let request = send_one(
                self.client.clone(),
                url.clone(),
                Arc::clone(&credentials),
                with_plus(number),
                body.clone(),
            );
            tasks.spawn(async move { (index, request.await) });
        }

        let mut results: Vec<std::result::Result<Option<String>, String>> = numbers
            .iter()
            .map(|_| Err("send task failed".to_string()))
            .collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = result,
                Err(e) => warn!("International send task failed: {}", e),
            }
        }

        let mut outcome = BatchOutcome::default();
        for (number, result) in numbers.iter().zip(results) {
            match result {
                Ok(sid) => {
                    outcome.sent_count += 1;
                    debug!("International SMS to {} accepted ({:?})", number, sid);
                }
                Err(error) => {
                    warn!("International SMS to {} failed: {}", number, error);
                    outcome.failed_count += 1;
                    outcome.per_number_errors.push(NumberError {
                        number: number.clone(),
                        error,
                    });
                }
            }
        }

        outcome.success = outcome.sent_count > 0;
        if !outcome.success && !numbers.is_empty() {
            outcome.error = Some("no message was accepted".to_string());
        }
        info!(
            "International SMS: {} sent, {} failed",
            outcome.sent_count, outcome.failed_count
        );
        outcome
    }
}
