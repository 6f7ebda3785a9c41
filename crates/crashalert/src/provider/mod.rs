//! SMS provider adapters.
//!
//! Every adapter reports failures as data: a missing credential, a
//! transport error or a provider rejection all come back as a
//! [`BatchOutcome`] with `success == false`, never as an `Err`.

mod domestic;
mod international;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ProvidersConfig;
use crate::error::{Error, Result};
use crate::phone::NormalizedPhone;

pub use domestic::DomesticSmsProvider;
pub use international::InternationalSmsProvider;

/// Which adapter produced an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Bulk provider for ten-digit domestic numbers.
    Domestic,
    /// Per-message provider for E.164 numbers.
    International,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Domestic => write!(f, "domestic"),
            Self::International => write!(f, "international"),
        }
    }
}

/// Failure for a single number within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberError {
    /// The number as handed to the adapter.
    pub number: String,
    /// What went wrong.
    pub error: String,
}

/// Result of one adapter call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    /// At least one message was accepted.
    pub success: bool,
    /// Messages accepted by the provider.
    pub sent_count: usize,
    /// Messages that were not sent.
    pub failed_count: usize,
    /// Batch-level failure reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Numbers that failed individually.
    pub per_number_errors: Vec<NumberError>,
    /// Provider request identifier, when one was returned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl BatchOutcome {
    /// Every number failed for the same reason.
    #[must_use]
    pub fn failure(numbers: &[String], error: impl Into<String>) -> Self {
        Self {
            success: false,
            sent_count: 0,
            failed_count: numbers.len(),
            error: Some(error.into()),
            per_number_errors: Vec::new(),
            request_id: None,
        }
    }

    /// The request never reached the provider.
    #[must_use]
    pub fn transport_failure(numbers: &[String], error: &impl std::fmt::Display) -> Self {
        Self::failure(numbers, format!("transport error: {error}"))
    }

    /// The adapter has no credentials.
    #[must_use]
    pub fn not_configured(numbers: &[String], provider: &str) -> Self {
        Self::failure(numbers, format!("{provider} credentials not configured"))
    }

    /// Delivery status of one number in this batch.
    #[must_use]
    pub fn status_for(&self, number: &str) -> (bool, Option<String>) {
        if let Some(failed) = self.per_number_errors.iter().find(|e| e.number == number) {
            return (false, Some(failed.error.clone()));
        }
        if self.success {
            (true, None)
        } else {
            let reason = self
                .error
                .clone()
                .unwrap_or_else(|| "delivery failed".to_string());
            (false, Some(reason))
        }
    }
}

/// An SMS gateway.
#[async_trait]
pub trait SmsProvider: Send + Sync + std::fmt::Debug {
    /// Which adapter this is.
    fn kind(&self) -> ProviderKind;

    /// Short provider name for logs and error messages.
    fn name(&self) -> &'static str;

    /// Whether credentials are present.
    fn is_configured(&self) -> bool;

    /// The form of `phone` this provider accepts, if it can deliver to it.
    fn format_number(&self, phone: &NormalizedPhone) -> Option<String>;

    /// Send `message` to every number. Never fails; problems are reported
    /// in the outcome.
    async fn send(&self, numbers: &[String], message: &str) -> BatchOutcome;
}

/// The pair of adapters built from configuration.
#[derive(Debug, Clone)]
pub struct Providers {
    /// Domestic adapter.
    pub domestic: Arc<dyn SmsProvider>,
    /// International adapter.
    pub international: Arc<dyn SmsProvider>,
}

impl Providers {
    /// Build both adapters.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be constructed.
    pub fn from_config(config: &ProvidersConfig) -> Result<Self> {
        let timeout = Duration::from_millis(config.timeout_ms);
        Ok(Self {
            domestic: Arc::new(DomesticSmsProvider::new(&config.domestic, timeout)?),
            international: Arc::new(InternationalSmsProvider::new(
                &config.international,
                timeout,
            )?),
        })
    }

    /// Whether either adapter has credentials.
    #[must_use]
    pub fn any_configured(&self) -> bool {
        self.domestic.is_configured() || self.international.is_configured()
    }
}

fn http_client(provider: &'static str, timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("crashalert/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::provider_setup(provider, e.to_string()))
}
