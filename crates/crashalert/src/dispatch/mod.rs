//! Notification dispatcher.
//!
//! The dispatcher turns a confirmed emergency into delivery attempts. It
//! walks an ordered list of channel strategies, skipping those that are not
//! available, and stops after the first one that reaches anybody. Every
//! outcome is appended to the notification log before `dispatch` returns,
//! and nothing on this path is reported as an `Err`.

mod channel;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::MessageConfig;
use crate::contact::Contact;
use crate::event::EmergencyEvent;
use crate::message::emergency_message;
use crate::provider::{BatchOutcome, ProviderKind, Providers};
use crate::repository::{NotificationLog, NotificationRecord};

pub use channel::{
    ChannelAttempt, ChannelKind, ChannelStrategy, DeliveryOutcome, DispatchPlan, LinkChannel,
    ProviderChannel, Recipient, ShareChannel, ShareSheet,
};

/// Error recorded for recipients with neither phone nor email.
pub const NO_USABLE_CHANNEL: &str = "no usable channel";

/// Aggregate result of one dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryResult {
    /// `sent_count > 0`.
    pub success: bool,
    /// Recipients reached by at least one channel.
    pub sent_count: usize,
    /// Recipients attempted without success.
    pub failed_count: usize,
    /// Recipients no channel attempted.
    pub skipped_count: usize,
    /// Delivery relied on an unverified fallback channel.
    pub fallback_used: bool,
    /// Log id of the event.
    pub event_id: String,
    /// Message that was sent.
    pub message: String,
    /// Every outcome, in recipient order.
    pub outcomes: Vec<DeliveryOutcome>,
    /// Raw domestic adapter result.
    #[serde(rename = "indianResults", skip_serializing_if = "Option::is_none")]
    pub domestic_results: Option<BatchOutcome>,
    /// Raw international adapter result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub international_results: Option<BatchOutcome>,
}

/// Routes an emergency message through the configured channels.
#[derive(Debug)]
pub struct Dispatcher {
    channels: Vec<Box<dyn ChannelStrategy>>,
    log: Arc<dyn NotificationLog>,
    message: MessageConfig,
}

impl Dispatcher {
    /// Create a dispatcher with an explicit channel order.
    #[must_use]
    pub fn new(
        channels: Vec<Box<dyn ChannelStrategy>>,
        log: Arc<dyn NotificationLog>,
        message: MessageConfig,
    ) -> Self {
        Self {
            channels,
            log,
            message,
        }
    }

    /// Providers first, then deep links, then the share sheet if one exists.
    #[must_use]
    pub fn standard(
        providers: &Providers,
        timeout: Duration,
        share: Option<Arc<dyn ShareSheet>>,
        log: Arc<dyn NotificationLog>,
        message: MessageConfig,
    ) -> Self {
        let mut channels: Vec<Box<dyn ChannelStrategy>> = vec![
            Box::new(ProviderChannel::new(providers, timeout)),
            Box::new(LinkChannel),
        ];
        if let Some(sheet) = share {
            channels.push(Box::new(ShareChannel::new(sheet)));
        }
        Self::new(channels, log, message)
    }

    /// Notify `contacts` about `event`.
    pub async fn dispatch(&self, event: &EmergencyEvent, contacts: &[Contact]) -> DeliveryResult {
        let location = event.location();
        let plan = DispatchPlan {
            message: emergency_message(event, &self.message.maps_base_url),
            subject: self.message.share_title.clone(),
            maps_url: Some(location.maps_url(&self.message.maps_base_url)),
            recipients: contacts.iter().map(Recipient::from_contact).collect(),
        };
        info!(
            "Dispatching {} emergency to {} contact(s)",
            event.severity(),
            contacts.len()
        );
        self.run(event.fingerprint(), plan).await
    }

    /// Send a caller-supplied message to bare phone numbers.
    pub async fn dispatch_to_numbers(&self, message: &str, numbers: &[String]) -> DeliveryResult {
        let plan = DispatchPlan {
            message: message.to_string(),
            subject: self.message.share_title.clone(),
            maps_url: None,
            recipients: numbers.iter().map(|n| Recipient::from_number(n)).collect(),
        };
        self.run(adhoc_event_id(message), plan).await
    }

    async fn run(&self, event_id: String, plan: DispatchPlan) -> DeliveryResult {
        let mut result = DeliveryResult {
            event_id,
            message: plan.message.clone(),
            ..DeliveryResult::default()
        };
        if plan.recipients.is_empty() {
            debug!("No recipients; nothing to dispatch");
            return result;
        }

        let mut outcomes: Vec<(usize, DeliveryOutcome)> = plan
            .recipients
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.is_reachable())
            .map(|(i, r)| (i, DeliveryOutcome::failed(r.contact_id, None, NO_USABLE_CHANNEL)))
            .collect();

        for channel in &self.channels {
            if !channel.available(&plan) {
                debug!("Channel {} unavailable", channel.name());
                continue;
            }

            let attempt = channel.attempt(&plan).await;
            let succeeded = attempt.any_success();
            debug!(
                "Channel {} produced {} outcome(s), success={}",
                channel.name(),
                attempt.outcomes.len(),
                succeeded
            );

            for (kind, batch) in attempt.batches {
                match kind {
                    ProviderKind::Domestic => result.domestic_results = Some(batch),
                    ProviderKind::International => result.international_results = Some(batch),
                }
            }
            outcomes.extend(attempt.outcomes);

            if succeeded {
                result.fallback_used = channel.is_fallback();
                break;
            }
            warn!("Channel {} reached nobody, trying next", channel.name());
        }

        // Stable: a recipient's outcomes stay in channel order
        outcomes.sort_by_key(|(index, _)| *index);
        tally(&mut result, &plan, &outcomes);
        result.outcomes = outcomes.into_iter().map(|(_, o)| o).collect();

        self.record(&result);
        info!(
            "Dispatch {}: {} sent, {} failed, {} skipped{}",
            result.event_id,
            result.sent_count,
            result.failed_count,
            result.skipped_count,
            if result.fallback_used { " (fallback)" } else { "" }
        );
        result
    }

    fn record(&self, result: &DeliveryResult) {
        for outcome in &result.outcomes {
            let record = NotificationRecord::from_outcome(&result.event_id, &result.message, outcome);
            if let Err(e) = self.log.append(&record) {
                warn!("Failed to log delivery outcome: {}", e);
            }
        }
    }
}

/// Per-recipient counts. The share sheet outcome sits past the last
/// recipient index and counts once, only when no recipient succeeded.
fn tally(
    result: &mut DeliveryResult,
    plan: &DispatchPlan,
    outcomes: &[(usize, DeliveryOutcome)],
) {
    let mut per_recipient: BTreeMap<usize, bool> = BTreeMap::new();
    let mut shared = false;
    for (index, outcome) in outcomes {
        if *index >= plan.recipients.len() {
            shared |= outcome.success;
        } else if outcome.channel.is_some() || outcome.error.as_deref() != Some(NO_USABLE_CHANNEL)
        {
            *per_recipient.entry(*index).or_default() |= outcome.success;
        }
    }

    result.sent_count = per_recipient.values().filter(|ok| **ok).count();
    result.failed_count = per_recipient.len() - result.sent_count;
    result.skipped_count = plan.recipients.len() - per_recipient.len();

    if result.sent_count == 0 && shared {
        result.sent_count = 1;
    }
    result.success = result.sent_count > 0;
}

fn adhoc_event_id(message: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(message.as_bytes());
    hasher.update(Utc::now().to_rfc3339().as_bytes());
    hasher.finalize().to_hex().as_str()[..16].to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::contact::NewContact;
    use crate::error::{Error, Result};
    use crate::event::Location;
    use crate::phone::NormalizedPhone;
    use crate::provider::{NumberError, SmsProvider};
    use crate::severity::SeverityLevel;
    use crate::storage::Storage;

    #[derive(Debug)]
    struct FakeProvider {
        kind: ProviderKind,
        configured: bool,
        fail: Vec<String>,
        delay: Option<Duration>,
        calls: AtomicUsize,
        seen: Mutex<Vec<String>>,
    }

    impl FakeProvider {
        fn new(kind: ProviderKind, configured: bool) -> Self {
            Self {
                kind,
                configured,
                fail: Vec::new(),
                delay: None,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing(mut self, number: &str) -> Self {
            self.fail.push(number.to_string());
            self
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    #[async_trait]
    impl SmsProvider for FakeProvider {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        fn name(&self) -> &'static str {
            "fake"
        }

        fn is_configured(&self) -> bool {
            self.configured
        }

        fn format_number(&self, phone: &NormalizedPhone) -> Option<String> {
            match self.kind {
                ProviderKind::Domestic => phone.domestic_number().map(str::to_string),
                ProviderKind::International => phone.e164(),
            }
        }

        async fn send(&self, numbers: &[String], _message: &str) -> BatchOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().extend(numbers.iter().cloned());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if !self.configured {
                return BatchOutcome::not_configured(numbers, "fake");
            }
            let per_number_errors: Vec<NumberError> = numbers
                .iter()
                .filter(|n| self.fail.contains(n))
                .map(|n| NumberError {
                    number: n.clone(),
                    error: "rejected".to_string(),
                })
                .collect();
            let sent = numbers.len() - per_number_errors.len();
            BatchOutcome {
                success: sent > 0,
                sent_count: sent,
                failed_count: per_number_errors.len(),
                error: (sent == 0).then(|| "all rejected".to_string()),
                per_number_errors,
                request_id: None,
            }
        }
    }

    #[derive(Debug, Default)]
    struct FakeShareSheet {
        shared: AtomicUsize,
        broken: bool,
    }

    #[async_trait]
    impl ShareSheet for FakeShareSheet {
        async fn share(&self, _title: &str, _text: &str, _url: Option<&str>) -> Result<()> {
            if self.broken {
                return Err(Error::internal("share cancelled"));
            }
            self.shared.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Harness {
        domestic: Arc<FakeProvider>,
        international: Arc<FakeProvider>,
        storage: Arc<Storage>,
        dispatcher: Dispatcher,
    }

    fn harness(domestic: FakeProvider, international: FakeProvider) -> Harness {
        harness_with_share(domestic, international, None)
    }

    fn harness_with_share(
        domestic: FakeProvider,
        international: FakeProvider,
        share: Option<Arc<dyn ShareSheet>>,
    ) -> Harness {
        let domestic = Arc::new(domestic);
        let international = Arc::new(international);
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let providers = Providers {
            domestic: domestic.clone(),
            international: international.clone(),
        };
        let dispatcher = Dispatcher::standard(
            &providers,
            Duration::from_millis(500),
            share,
            storage.clone(),
            MessageConfig::default(),
        );
        Harness {
            domestic,
            international,
            storage,
            dispatcher,
        }
    }

    fn configured() -> (FakeProvider, FakeProvider) {
        (
            FakeProvider::new(ProviderKind::Domestic, true),
            FakeProvider::new(ProviderKind::International, true),
        )
    }

    fn unconfigured() -> (FakeProvider, FakeProvider) {
        (
            FakeProvider::new(ProviderKind::Domestic, false),
            FakeProvider::new(ProviderKind::International, false),
        )
    }

    fn contact(id: i64, name: &str, phone: &str) -> Contact {
        NewContact::new(name, phone).into_contact(id)
    }

    fn event() -> EmergencyEvent {
        EmergencyEvent::new(SeverityLevel::Severe, Location::new(22.316_41, 87.3215), 15)
    }

    #[tokio::test]
    async fn test_zero_contacts() {
        let (d, i) = configured();
        let h = harness(d, i);
        let result = h.dispatcher.dispatch(&event(), &[]).await;

        assert!(!result.success);
        assert_eq!(result.sent_count, 0);
        assert_eq!(result.failed_count, 0);
        assert!(result.outcomes.is_empty());
        assert!(h.storage.recent(10).unwrap().is_empty());
        assert_eq!(h.domestic.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_mixed_contacts_all_delivered() {
        let (d, i) = configured();
        let h = harness(d, i);
        let contacts = vec![
            contact(1, "Asha", "9876543210"),
            contact(2, "Ravi", "+91 91234 56780"),
            contact(3, "Sam", "+12345678901"),
        ];
        let result = h.dispatcher.dispatch(&event(), &contacts).await;

        assert!(result.success);
        assert_eq!(result.sent_count, 3);
        assert_eq!(result.failed_count, 0);
        assert!(!result.fallback_used);
        assert_eq!(h.domestic.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            *h.domestic.seen.lock().unwrap(),
            vec!["9876543210".to_string(), "9123456780".to_string()]
        );
        assert_eq!(
            *h.international.seen.lock().unwrap(),
            vec!["+12345678901".to_string()]
        );

        let logged = h.storage.for_event(&result.event_id).unwrap();
        assert_eq!(logged.len(), 3);
        assert!(logged.iter().all(|r| r.success));
        let ids: Vec<_> = logged.iter().map(|r| r.contact_id).collect();
        assert_eq!(ids, vec![Some(1), Some(2), Some(3)]);
        assert_eq!(logged[2].channel, Some(ChannelKind::SmsIntl));
    }

    #[tokio::test]
    async fn test_no_credentials_falls_back_to_link() {
        let (d, i) = unconfigured();
        let h = harness(d, i);
        let result = h
            .dispatcher
            .dispatch(&event(), &[contact(1, "Asha", "9876543210")])
            .await;

        assert!(result.success);
        assert!(result.fallback_used);
        assert_eq!(result.sent_count, 1);
        assert_eq!(result.outcomes.len(), 1);
        assert_eq!(result.outcomes[0].channel, Some(ChannelKind::SmsLink));
        assert!(result.outcomes[0].link.as_ref().unwrap().starts_with("sms:9876543210"));
        assert_eq!(h.domestic.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.storage.for_event(&result.event_id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_domestic_routed_internationally_when_domestic_unconfigured() {
        let h = harness(
            FakeProvider::new(ProviderKind::Domestic, false),
            FakeProvider::new(ProviderKind::International, true),
        );
        let result = h
            .dispatcher
            .dispatch(&event(), &[contact(1, "Asha", "9876543210")])
            .await;

        assert!(result.success);
        assert_eq!(result.outcomes[0].channel, Some(ChannelKind::SmsIntl));
        assert_eq!(
            *h.international.seen.lock().unwrap(),
            vec!["+919876543210".to_string()]
        );
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_provider_result() {
        let h = harness(
            FakeProvider::new(ProviderKind::Domestic, true),
            FakeProvider::new(ProviderKind::International, true).failing("+12345678901"),
        );
        let contacts = vec![
            contact(1, "Asha", "9876543210"),
            contact(2, "Sam", "+12345678901"),
        ];
        let result = h.dispatcher.dispatch(&event(), &contacts).await;

        assert!(result.success);
        assert_eq!(result.sent_count, 1);
        assert_eq!(result.failed_count, 1);
        assert!(!result.fallback_used);
        assert_eq!(result.outcomes[1].error.as_deref(), Some("rejected"));
        assert!(result.international_results.is_some());
    }

    #[tokio::test]
    async fn test_all_providers_fail_then_links() {
        let h = harness(
            FakeProvider::new(ProviderKind::Domestic, true).failing("9876543210"),
            FakeProvider::new(ProviderKind::International, true),
        );
        let result = h
            .dispatcher
            .dispatch(&event(), &[contact(1, "Asha", "9876543210")])
            .await;

        assert!(result.success);
        assert!(result.fallback_used);
        assert_eq!(result.sent_count, 1);
        assert_eq!(result.failed_count, 0);
        assert_eq!(result.outcomes.len(), 2);
        assert!(!result.outcomes[0].success);
        assert_eq!(result.outcomes[1].channel, Some(ChannelKind::SmsLink));
        assert_eq!(h.storage.for_event(&result.event_id).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_contact_logged() {
        let (d, i) = configured();
        let h = harness(d, i);
        let mut nobody = contact(2, "Nobody", "9876543210");
        nobody.phone = String::new();
        let contacts = vec![contact(1, "Asha", "9876543210"), nobody];
        let result = h.dispatcher.dispatch(&event(), &contacts).await;

        assert_eq!(result.sent_count, 1);
        assert_eq!(result.skipped_count, 1);
        assert_eq!(result.outcomes.len(), 2);
        assert_eq!(result.outcomes[1].contact_id, Some(2));
        assert_eq!(result.outcomes[1].error.as_deref(), Some(NO_USABLE_CHANNEL));
    }

    #[tokio::test]
    async fn test_email_only_contact_skipped_when_providers_succeed() {
        let (d, i) = configured();
        let h = harness(d, i);
        let mut email_only = contact(2, "Mail", "9123456780");
        email_only.notify_by_sms = false;
        email_only.email = Some("mail@example.com".to_string());
        let result = h
            .dispatcher
            .dispatch(&event(), &[contact(1, "Asha", "9876543210"), email_only])
            .await;

        assert_eq!(result.sent_count, 1);
        assert_eq!(result.skipped_count, 1);
        assert_eq!(result.outcomes.len(), 1);
    }

    #[tokio::test]
    async fn test_share_sheet_last_resort() {
        let (d, i) = unconfigured();
        let sheet = Arc::new(FakeShareSheet::default());
        let h = harness_with_share(d, i, Some(sheet.clone()));
        let mut nobody = contact(1, "Nobody", "x");
        nobody.phone = String::new();
        let result = h.dispatcher.dispatch(&event(), &[nobody]).await;

        assert_eq!(sheet.shared.load(Ordering::SeqCst), 1);
        assert!(result.success);
        assert!(result.fallback_used);
        assert_eq!(result.sent_count, 1);
        assert_eq!(result.outcomes.len(), 2);
        assert_eq!(result.outcomes[1].channel, Some(ChannelKind::BrowserShare));
    }

    #[tokio::test]
    async fn test_everything_fails_is_still_a_result() {
        let (d, i) = unconfigured();
        let sheet = Arc::new(FakeShareSheet {
            broken: true,
            ..FakeShareSheet::default()
        });
        let h = harness_with_share(d, i, Some(sheet));
        let mut nobody = contact(1, "Nobody", "x");
        nobody.phone = String::new();
        let result = h.dispatcher.dispatch(&event(), &[nobody]).await;

        assert!(!result.success);
        assert_eq!(result.sent_count, 0);
        assert_eq!(h.storage.for_event(&result.event_id).unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_provider_times_out() {
        let h = harness(
            FakeProvider::new(ProviderKind::Domestic, true).slow(Duration::from_secs(30)),
            FakeProvider::new(ProviderKind::International, true),
        );
        let contacts = vec![
            contact(1, "Asha", "9876543210"),
            contact(2, "Sam", "+12345678901"),
        ];
        let result = h.dispatcher.dispatch(&event(), &contacts).await;

        assert!(result.success);
        assert_eq!(result.sent_count, 1);
        assert!(result.outcomes[0].error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_dispatch_to_numbers() {
        let (d, i) = configured();
        let h = harness(d, i);
        let numbers = vec!["9876543210".to_string(), "garbage".to_string()];
        let result = h.dispatcher.dispatch_to_numbers("Test alert", &numbers).await;

        assert!(result.success);
        assert_eq!(result.message, "Test alert");
        assert_eq!(result.sent_count, 1);
        assert_eq!(result.failed_count, 1);
        assert!(result.outcomes.iter().all(|o| o.contact_id.is_none()));
        assert!(result.outcomes[1].error.as_deref().unwrap().contains("invalid phone"));
    }

    #[tokio::test]
    async fn test_message_and_subject_from_config() {
        let (d, i) = unconfigured();
        let h = harness(d, i);
        let mut mail = contact(1, "Mail", "9876543210");
        mail.phone = String::new();
        mail.email = Some("mail@example.com".to_string());
        let result = h.dispatcher.dispatch(&event(), &[mail]).await;

        assert!(result.message.starts_with("EMERGENCY: Helmet user detected a crash!"));
        let link = result.outcomes[0].link.as_deref().unwrap();
        assert!(link.starts_with("mailto:mail@example.com?subject=EMERGENCY%3A%20Crash%20Detected"));
    }
}
