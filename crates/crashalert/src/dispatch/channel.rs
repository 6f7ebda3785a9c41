//! Delivery channels, tried in priority order by the dispatcher.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::contact::Contact;
use crate::error::{Error, Result};
use crate::message::{mailto_link, sms_link};
use crate::phone::{self, PhoneClass};
use crate::provider::{BatchOutcome, ProviderKind, Providers, SmsProvider};

/// How a notification was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelKind {
    /// Domestic SMS provider.
    SmsDomestic,
    /// International SMS provider.
    SmsIntl,
    /// Native share sheet.
    BrowserShare,
    /// `sms:` deep link.
    SmsLink,
    /// `mailto:` deep link.
    EmailLink,
}

impl ChannelKind {
    /// Stable name used in storage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SmsDomestic => "SMS_DOMESTIC",
            Self::SmsIntl => "SMS_INTL",
            Self::BrowserShare => "BROWSER_SHARE",
            Self::SmsLink => "SMS_LINK",
            Self::EmailLink => "EMAIL_LINK",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChannelKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "SMS_DOMESTIC" => Ok(Self::SmsDomestic),
            "SMS_INTL" => Ok(Self::SmsIntl),
            "BROWSER_SHARE" => Ok(Self::BrowserShare),
            "SMS_LINK" => Ok(Self::SmsLink),
            "EMAIL_LINK" => Ok(Self::EmailLink),
            other => Err(Error::validation(format!("unknown channel: {other}"))),
        }
    }
}

impl From<ProviderKind> for ChannelKind {
    fn from(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::Domestic => Self::SmsDomestic,
            ProviderKind::International => Self::SmsIntl,
        }
    }
}

/// One delivery attempt. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryOutcome {
    /// Contact the attempt targeted; `None` for raw numbers and the share sheet.
    pub contact_id: Option<i64>,
    /// Channel used; `None` when no channel applied.
    pub channel: Option<ChannelKind>,
    /// Whether the attempt succeeded.
    pub success: bool,
    /// Failure reason.
    pub error: Option<String>,
    /// When the attempt was made.
    pub attempted_at: DateTime<Utc>,
    /// Deep link produced by a link channel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl DeliveryOutcome {
    /// A successful attempt.
    #[must_use]
    pub fn delivered(contact_id: Option<i64>, channel: ChannelKind) -> Self {
        Self {
            contact_id,
            channel: Some(channel),
            success: true,
            error: None,
            attempted_at: Utc::now(),
            link: None,
        }
    }

    /// A failed attempt.
    #[must_use]
    pub fn failed(
        contact_id: Option<i64>,
        channel: Option<ChannelKind>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            contact_id,
            channel,
            success: false,
            error: Some(error.into()),
            attempted_at: Utc::now(),
            link: None,
        }
    }

    fn with_link(mut self, link: String) -> Self {
        self.link = Some(link);
        self
    }
}

/// Someone to notify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    /// Source contact, if any.
    pub contact_id: Option<i64>,
    /// Phone as entered.
    pub phone: Option<String>,
    /// Email address.
    pub email: Option<String>,
    /// Whether SMS delivery is wanted.
    pub sms_enabled: bool,
}

impl Recipient {
    /// Recipient for a stored contact.
    #[must_use]
    pub fn from_contact(contact: &Contact) -> Self {
        Self {
            contact_id: Some(contact.id),
            phone: contact.phone().map(str::to_string),
            email: contact.email().map(str::to_string),
            sms_enabled: contact.notify_by_sms,
        }
    }

    /// Recipient for a bare phone number.
    #[must_use]
    pub fn from_number(number: &str) -> Self {
        let number = number.trim();
        Self {
            contact_id: None,
            phone: (!number.is_empty()).then(|| number.to_string()),
            email: None,
            sms_enabled: true,
        }
    }

    /// Whether any channel can reach this recipient.
    #[must_use]
    pub fn is_reachable(&self) -> bool {
        self.phone.is_some() || self.email.is_some()
    }
}

/// Everything a channel needs for one dispatch.
#[derive(Debug, Clone)]
pub struct DispatchPlan {
    /// Message body.
    pub message: String,
    /// Subject for email links and the share sheet title.
    pub subject: String,
    /// Maps link passed to the share sheet.
    pub maps_url: Option<String>,
    /// Recipients in input order.
    pub recipients: Vec<Recipient>,
}

/// What a channel produced.
///
/// Outcomes are tagged with the index of their recipient in the plan so the
/// dispatcher can keep input order across channels.
#[derive(Debug, Clone, Default)]
pub struct ChannelAttempt {
    /// Outcomes with their recipient index.
    pub outcomes: Vec<(usize, DeliveryOutcome)>,
    /// Raw adapter results, for callers that want provider detail.
    pub batches: Vec<(ProviderKind, BatchOutcome)>,
}

impl ChannelAttempt {
    /// Whether anything succeeded.
    #[must_use]
    pub fn any_success(&self) -> bool {
        self.outcomes.iter().any(|(_, o)| o.success)
    }
}

/// A delivery strategy.
#[async_trait]
pub trait ChannelStrategy: Send + Sync + std::fmt::Debug {
    /// Name for logs.
    fn name(&self) -> &'static str;

    /// Whether this channel can attempt delivery for `plan`.
    fn available(&self, plan: &DispatchPlan) -> bool;

    /// Attempt delivery.
    async fn attempt(&self, plan: &DispatchPlan) -> ChannelAttempt;

    /// Whether successes from this channel are unverified.
    fn is_fallback(&self) -> bool {
        true
    }
}

/// Sends through the SMS providers.
#[derive(Debug, Clone)]
pub struct ProviderChannel {
    domestic: Arc<dyn SmsProvider>,
    international: Arc<dyn SmsProvider>,
    timeout: Duration,
}

struct Bucket {
    entries: Vec<(usize, String)>,
}

impl Bucket {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    fn numbers(&self) -> Vec<String> {
        self.entries.iter().map(|(_, n)| n.clone()).collect()
    }
}

impl ProviderChannel {
    /// Build from a provider pair with a per-call timeout.
    #[must_use]
    pub fn new(providers: &Providers, timeout: Duration) -> Self {
        Self {
            domestic: Arc::clone(&providers.domestic),
            international: Arc::clone(&providers.international),
            timeout,
        }
    }

    fn any_configured(&self) -> bool {
        self.domestic.is_configured() || self.international.is_configured()
    }

    /// Split SMS recipients by adapter; invalid phones become failed outcomes.
    fn route(&self, plan: &DispatchPlan) -> (Bucket, Bucket, Vec<(usize, DeliveryOutcome)>) {
        let mut domestic = Bucket::new();
        let mut international = Bucket::new();
        let mut rejected = Vec::new();
        let domestic_ready = self.domestic.is_configured();

        for (index, recipient) in plan.recipients.iter().enumerate() {
            if !recipient.sms_enabled {
                continue;
            }
            let Some(raw) = recipient.phone.as_deref() else {
                continue;
            };
            let normalized = phone::normalize(raw);

            let routed = match normalized.class {
                PhoneClass::Domestic if domestic_ready => self
                    .domestic
                    .format_number(&normalized)
                    .map(|n| (ProviderKind::Domestic, n)),
                PhoneClass::Domestic | PhoneClass::International => self
                    .international
                    .format_number(&normalized)
                    .map(|n| (ProviderKind::International, n)),
                PhoneClass::Invalid => None,
            };

            match routed {
                Some((ProviderKind::Domestic, number)) => domestic.entries.push((index, number)),
                Some((ProviderKind::International, number)) => {
                    international.entries.push((index, number));
                }
                None => rejected.push((
                    index,
                    DeliveryOutcome::failed(
                        recipient.contact_id,
                        None,
                        format!("invalid phone number: {raw}"),
                    ),
                )),
            }
        }

        (domestic, international, rejected)
    }

    async fn send_bucket(
        &self,
        provider: &Arc<dyn SmsProvider>,
        bucket: &Bucket,
        message: &str,
    ) -> Option<BatchOutcome> {
        if bucket.entries.is_empty() {
            return None;
        }
        let numbers = bucket.numbers();
        let outcome = match tokio::time::timeout(self.timeout, provider.send(&numbers, message)).await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    "{} did not respond within {}ms",
                    provider.name(),
                    self.timeout.as_millis()
                );
                BatchOutcome::failure(
                    &numbers,
                    format!("timed out after {}ms", self.timeout.as_millis()),
                )
            }
        };
        Some(outcome)
    }

    fn outcomes_for(
        plan: &DispatchPlan,
        kind: ProviderKind,
        bucket: &Bucket,
        batch: &BatchOutcome,
    ) -> Vec<(usize, DeliveryOutcome)> {
        bucket
            .entries
            .iter()
            .map(|(index, number)| {
                let contact_id = plan.recipients[*index].contact_id;
                let outcome = match batch.status_for(number) {
                    (true, _) => DeliveryOutcome::delivered(contact_id, kind.into()),
                    (false, error) => DeliveryOutcome::failed(
                        contact_id,
                        Some(kind.into()),
                        error.unwrap_or_else(|| "delivery failed".to_string()),
                    ),
                };
                (*index, outcome)
            })
            .collect()
    }
}

#[async_trait]
impl ChannelStrategy for ProviderChannel {
    fn name(&self) -> &'static str {
        "sms-providers"
    }

    fn available(&self, plan: &DispatchPlan) -> bool {
        self.any_configured()
            && plan
                .recipients
                .iter()
                .any(|r| r.sms_enabled && r.phone.is_some())
    }

    async fn attempt(&self, plan: &DispatchPlan) -> ChannelAttempt {
        let (domestic, international, rejected) = self.route(plan);
        debug!(
            "Routing {} domestic and {} international number(s)",
            domestic.entries.len(),
            international.entries.len()
        );

        let (domestic_batch, international_batch) = tokio::join!(
            self.send_bucket(&self.domestic, &domestic, &plan.message),
            self.send_bucket(&self.international, &international, &plan.message),
        );

        let mut attempt = ChannelAttempt {
            outcomes: rejected,
            batches: Vec::new(),
        };
        if let Some(batch) = domestic_batch {
            attempt.outcomes.extend(Self::outcomes_for(
                plan,
                ProviderKind::Domestic,
                &domestic,
                &batch,
            ));
            attempt.batches.push((ProviderKind::Domestic, batch));
        }
        if let Some(batch) = international_batch {
            attempt.outcomes.extend(Self::outcomes_for(
                plan,
                ProviderKind::International,
                &international,
                &batch,
            ));
            attempt.batches.push((ProviderKind::International, batch));
        }
        attempt
    }

    fn is_fallback(&self) -> bool {
        false
    }
}

/// Builds `sms:` and `mailto:` deep links.
///
/// A link counts as delivered once it exists; whether the user sends it
/// cannot be observed.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkChannel;

#[async_trait]
impl ChannelStrategy for LinkChannel {
    fn name(&self) -> &'static str {
        "deep-links"
    }

    fn available(&self, plan: &DispatchPlan) -> bool {
        plan.recipients.iter().any(Recipient::is_reachable)
    }

    async fn attempt(&self, plan: &DispatchPlan) -> ChannelAttempt {
        let outcomes = plan
            .recipients
            .iter()
            .enumerate()
            .filter_map(|(index, recipient)| {
                let outcome = match (&recipient.phone, &recipient.email) {
                    (Some(phone), email) if recipient.sms_enabled || email.is_none() => {
                        DeliveryOutcome::delivered(recipient.contact_id, ChannelKind::SmsLink)
                            .with_link(sms_link(phone, &plan.message))
                    }
                    (_, Some(email)) => {
                        DeliveryOutcome::delivered(recipient.contact_id, ChannelKind::EmailLink)
                            .with_link(mailto_link(email, &plan.subject, &plan.message))
                    }
                    _ => return None,
                };
                Some((index, outcome))
            })
            .collect();

        ChannelAttempt {
            outcomes,
            batches: Vec::new(),
        }
    }
}

/// A native share capability.
#[async_trait]
pub trait ShareSheet: Send + Sync + std::fmt::Debug {
    /// Whether the capability exists on this host.
    fn is_available(&self) -> bool {
        true
    }

    /// Present the share sheet.
    ///
    /// # Errors
    ///
    /// Returns an error if the share sheet could not be shown.
    async fn share(&self, title: &str, text: &str, url: Option<&str>) -> Result<()>;
}

/// Last resort: hand the message to a share sheet once.
#[derive(Debug, Clone)]
pub struct ShareChannel {
    sheet: Arc<dyn ShareSheet>,
}

impl ShareChannel {
    /// Wrap a share capability.
    #[must_use]
    pub fn new(sheet: Arc<dyn ShareSheet>) -> Self {
        Self { sheet }
    }
}

#[async_trait]
impl ChannelStrategy for ShareChannel {
    fn name(&self) -> &'static str {
        "share-sheet"
    }

    fn available(&self, _plan: &DispatchPlan) -> bool {
        self.sheet.is_available()
    }

    async fn attempt(&self, plan: &DispatchPlan) -> ChannelAttempt {
        let outcome = match self
            .sheet
            .share(&plan.subject, &plan.message, plan.maps_url.as_deref())
            .await
        {
            Ok(()) => DeliveryOutcome::delivered(None, ChannelKind::BrowserShare),
            Err(e) => {
                warn!("Share sheet failed: {}", e);
                DeliveryOutcome::failed(None, Some(ChannelKind::BrowserShare), e.to_string())
            }
        };
        ChannelAttempt {
            outcomes: vec![(plan.recipients.len(), outcome)],
            batches: Vec::new(),
        }
    }
}
