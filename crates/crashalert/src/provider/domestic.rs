//! Fast2SMS bulk adapter for domestic numbers.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{http_client, BatchOutcome, NumberError, ProviderKind, SmsProvider};
use crate::config::DomesticProviderConfig;
use crate::error::Result;
use crate::message::truncate_sms;
use crate::phone::{self, NormalizedPhone};

const NAME: &str = "fast2sms";

/// Adapter for the Fast2SMS bulk API.
///
/// One request carries every number; the provider accepts or rejects the
/// batch as a whole.
#[derive(Debug, Clone)]
pub struct DomesticSmsProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
    route: String,
    sender_id: String,
}

/// Response body of the bulk endpoint.
#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(rename = "return", default)]
    accepted: bool,
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default)]
    message: Option<serde_json::Value>,
    #[serde(default)]
    status_code: Option<u16>,
}

impl BulkResponse {
    /// The provider sends `message` either as a string or a list of strings.
    fn message_text(&self) -> Option<String> {
        match self.message.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(serde_json::Value::as_str)
                    .collect::<Vec<_>>()
                    .join("; "),
            ),
            other => Some(other.to_string()),
        }
    }
}

/// Advice for provider status codes that need operator action.
fn status_guidance(code: u16) -> Option<&'static str> {
    match code {
        412 => Some("authentication failed: check FAST2SMS_API_KEY"),
        416 => Some("insufficient balance in the SMS account"),
        990 | 996 => {
            Some("account setup required: complete website verification before using the API")
        }
        995 => Some("message content rejected by the provider"),
        _ => None,
    }
}

impl DomesticSmsProvider {
    /// Build the adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &DomesticProviderConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(NAME, timeout)?,
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            endpoint: config.endpoint.clone(),
            route: config.route.clone(),
            sender_id: config.sender_id.clone(),
        })
    }

    fn rejection(response: &BulkResponse) -> String {
        let detail = response
            .message_text()
            .unwrap_or_else(|| "provider rejected the request".to_string());
        match response.status_code.and_then(status_guidance) {
            Some(guidance) => format!("{detail} ({guidance})"),
            None => detail,
        }
    }
}

#[async_trait]
impl SmsProvider for DomesticSmsProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Domestic
    }

    fn name(&self) -> &'static str {
        NAME
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn format_number(&self, phone: &NormalizedPhone) -> Option<String> {
        phone.domestic_number().map(str::to_string)
    }

    async fn send(&self, numbers: &[String], message: &str) -> BatchOutcome {
        let Some(api_key) = self.api_key.as_deref() else {
            warn!("Domestic SMS skipped: API key not configured");
            return BatchOutcome::not_configured(numbers, NAME);
        };

        let mut valid = Vec::with_capacity(numbers.len());
        let mut per_number_errors = Vec::new();
        for number in numbers {
            match phone::normalize(number).domestic_number() {
                Some(digits) => valid.push(digits.to_string()),
                None => per_number_errors.push(NumberError {
                    number: number.clone(),
                    error: "not a 10-digit domestic number".to_string(),
                }),
            }
        }

        if valid.is_empty() {
            return BatchOutcome {
                per_number_errors,
                ..BatchOutcome::failure(
                    numbers,
                    "no valid phone numbers provided; domestic numbers must be 10 digits",
                )
            };
        }

        let body = truncate_sms(message);
        let joined = valid.join(",");
        debug!("Domestic SMS to {} number(s)", valid.len());

        let form = [
            ("authorization", api_key),
            ("route", self.route.as_str()),
            ("sender_id", self.sender_id.as_str()),
            ("message", body.as_str()),
            ("language", "english"),
            ("flash", "0"),
            ("numbers", joined.as_str()),
        ];

        let response = match self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .form(&form)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Domestic SMS request failed: {}", e);
                return BatchOutcome::transport_failure(numbers, &e);
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => return BatchOutcome::transport_failure(numbers, &e),
        };

        let parsed: BulkResponse = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!("Domestic SMS provider returned non-JSON body (HTTP {})", status);
                return BatchOutcome::failure(
                    numbers,
                    format!("invalid response from provider (HTTP {status}): {text}"),
                );
            }
        };

        if !parsed.accepted {
            let reason = Self::rejection(&parsed);
            warn!("Domestic SMS rejected: {}", reason);
            return BatchOutcome::failure(numbers, reason);
        }

        info!(
            "Domestic SMS accepted for {} number(s), request {}",
            valid.len(),
            parsed.request_id.as_deref().unwrap_or("-")
        );
        BatchOutcome {
            success: true,
            sent_count: valid.len(),
            failed_count: per_number_errors.len(),
            error: None,
            per_number_errors,
            request_id: parsed.request_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn provider(endpoint: String, api_key: Option<&str>) -> DomesticSmsProvider {
        let config = DomesticProviderConfig {
            api_key: api_key.map(str::to_string),
            endpoint,
            ..DomesticProviderConfig::default()
        };
        DomesticSmsProvider::new(&config, Duration::from_secs(2)).unwrap()
    }

    fn numbers(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_status_guidance() {
        assert!(status_guidance(412).unwrap().contains("authentication"));
        assert!(status_guidance(416).unwrap().contains("balance"));
        assert!(status_guidance(990).unwrap().contains("setup"));
        assert!(status_guidance(996).unwrap().contains("setup"));
        assert!(status_guidance(995).unwrap().contains("rejected"));
        assert!(status_guidance(200).is_none());
    }

    #[test]
    fn test_format_number() {
        let adapter = provider("http://unused".to_string(), Some("key"));
        assert_eq!(
            adapter.format_number(&phone::normalize("+91 98765 43210")),
            Some("9876543210".to_string())
        );
        assert_eq!(adapter.format_number(&phone::normalize("+12345678901")), None);
    }

    #[tokio::test]
    async fn test_not_configured() {
        let adapter = provider("http://unused".to_string(), None);
        assert!(!adapter.is_configured());

        let outcome = adapter.send(&numbers(&["9876543210"]), "help").await;
        assert!(!outcome.success);
        assert_eq!(outcome.failed_count, 1);
    }

    #[tokio::test]
    async fn test_send_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/dev/bulkV2"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("authorization=secret"))
            .and(body_string_contains("route=v3"))
            .and(body_string_contains("sender_id=TXTIND"))
            .and(body_string_contains("numbers=9876543210%2C9123456780"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "return": true,
                "request_id": "req-42",
                "message": ["SMS sent successfully."]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = provider(format!("{}/dev/bulkV2", server.uri()), Some("secret"));
        let outcome = adapter
            .send(&numbers(&["9876543210", "+91 91234 56780"]), "help")
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.sent_count, 2);
        assert_eq!(outcome.failed_count, 0);
        assert_eq!(outcome.request_id.as_deref(), Some("req-42"));
    }

    #[tokio::test]
    async fn test_send_skips_invalid_numbers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"return": true, "request_id": "r1"})),
            )
            .mount(&server)
            .await;

        let adapter = provider(server.uri(), Some("secret"));
        let outcome = adapter
            .send(&numbers(&["9876543210", "12345"]), "help")
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.sent_count, 1);
        assert_eq!(outcome.failed_count, 1);
        assert!(!outcome.status_for("12345").0);
        assert_eq!(outcome.status_for("9876543210"), (true, None));
    }

    #[tokio::test]
    async fn test_send_all_invalid_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let adapter = provider(server.uri(), Some("secret"));
        let outcome = adapter.send(&numbers(&["+12345678901"]), "help").await;

        assert!(!outcome.success);
        assert_eq!(outcome.per_number_errors.len(), 1);
        assert!(outcome.error.unwrap().contains("10 digits"));
    }

    #[tokio::test]
    async fn test_send_rejected_with_guidance() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "return": false,
                "status_code": 416,
                "message": "You don't have sufficient wallet balance"
            })))
            .mount(&server)
            .await;

        let adapter = provider(server.uri(), Some("secret"));
        let outcome = adapter.send(&numbers(&["9876543210"]), "help").await;

        assert!(!outcome.success);
        assert_eq!(outcome.sent_count, 0);
        assert_eq!(outcome.failed_count, 1);
        let error = outcome.error.unwrap();
        assert!(error.contains("wallet balance"));
        assert!(error.contains("insufficient balance"));
    }

    #[tokio::test]
    async fn test_send_non_json_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
            .mount(&server)
            .await;

        let adapter = provider(server.uri(), Some("secret"));
        let outcome = adapter.send(&numbers(&["9876543210"]), "help").await;

        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("invalid response"));
    }

    #[tokio::test]
    async fn test_send_transport_failure() {
        // Nothing listens on port 9 of localhost
        let adapter = provider("http://127.0.0.1:9/dev/bulkV2".to_string(), Some("secret"));
        let outcome = adapter.send(&numbers(&["9876543210"]), "help").await;

        assert!(!outcome.success);
        assert!(outcome.error.unwrap().starts_with("transport error"));
    }

    #[tokio::test]
    async fn test_long_message_truncated() {
        let server = MockServer::start().await;
        let long = "a".repeat(200);
        let expected = format!("message={}...", "a".repeat(157));
        Mock::given(method("POST"))
            .and(body_string_contains(expected.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"return": true})))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = provider(server.uri(), Some("secret"));
        let outcome = adapter.send(&numbers(&["9876543210"]), &long).await;
        assert!(outcome.success);
    }
}
