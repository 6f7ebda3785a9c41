//! Persistence seams used by the pipeline.
//!
//! The dispatcher, countdown and HTTP layer only ever see these traits;
//! [`crate::storage::Storage`] is the `SQLite` implementation, and tests are
//! free to substitute their own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AlertSettings;
use crate::contact::{Contact, ContactUpdate, NewContact};
use crate::dispatch::{ChannelKind, DeliveryOutcome};
use crate::error::Result;

/// Contact CRUD.
pub trait ContactRepository: Send + Sync + std::fmt::Debug {
    /// All contacts, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    fn list_contacts(&self) -> Result<Vec<Contact>>;

    /// A single contact.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    fn get_contact(&self, id: i64) -> Result<Option<Contact>>;

    /// Validate and store a new contact.
    ///
    /// # Errors
    ///
    /// Returns a validation error for bad input or an error from the store.
    fn create_contact(&self, contact: NewContact) -> Result<Contact>;

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id, a validation error for bad input,
    /// or an error from the store.
    fn update_contact(&self, id: i64, update: &ContactUpdate) -> Result<Contact>;

    /// Remove a contact. Returns `false` if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    fn delete_contact(&self, id: i64) -> Result<bool>;
}

/// Get/set of user alert settings.
pub trait SettingsStore: Send + Sync + std::fmt::Debug {
    /// Saved settings, or `None` if the user never saved any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    fn load_settings(&self) -> Result<Option<AlertSettings>>;

    /// Validate and persist settings.
    ///
    /// # Errors
    ///
    /// Returns a validation error for out-of-range values or an error from the store.
    fn save_settings(&self, settings: &AlertSettings) -> Result<()>;
}

/// Append-only record of delivery attempts.
pub trait NotificationLog: Send + Sync + std::fmt::Debug {
    /// Append a record, returning its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    fn append(&self, record: &NotificationRecord) -> Result<i64>;

    /// Most recent records first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    fn recent(&self, limit: usize) -> Result<Vec<NotificationRecord>>;

    /// Records for one event, in append order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    fn for_event(&self, event_id: &str) -> Result<Vec<NotificationRecord>>;
}

/// One logged delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    /// Assigned by the log on append.
    #[serde(default)]
    pub id: Option<i64>,
    /// Fingerprint of the event, or a caller-supplied id.
    pub event_id: String,
    /// Contact the attempt targeted, if any.
    #[serde(default)]
    pub contact_id: Option<i64>,
    /// Channel used, if one was chosen.
    #[serde(default)]
    pub channel: Option<ChannelKind>,
    /// Message body that was sent.
    pub message: String,
    /// Whether the attempt succeeded.
    pub success: bool,
    /// Failure reason.
    #[serde(default)]
    pub error_message: Option<String>,
    /// When the attempt was made.
    #[serde(default = "Utc::now")]
    pub attempted_at: DateTime<Utc>,
}

impl NotificationRecord {
    /// Build a log record for a dispatcher outcome.
    #[must_use]
    pub fn from_outcome(event_id: &str, message: &str, outcome: &DeliveryOutcome) -> Self {
        Self {
            id: None,
            event_id: event_id.to_string(),
            contact_id: outcome.contact_id,
            channel: outcome.channel,
            message: message.to_string(),
            success: outcome.success,
            error_message: outcome.error.clone(),
            attempted_at: outcome.attempted_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_outcome_copies_fields() {
        let outcome = DeliveryOutcome::failed(Some(4), Some(ChannelKind::SmsDomestic), "timeout");
        let record = NotificationRecord::from_outcome("abc123", "help", &outcome);

        assert_eq!(record.id, None);
        assert_eq!(record.event_id, "abc123");
        assert_eq!(record.contact_id, Some(4));
        assert_eq!(record.channel, Some(ChannelKind::SmsDomestic));
        assert!(!record.success);
        assert_eq!(record.error_message.as_deref(), Some("timeout"));
        assert_eq!(record.attempted_at, outcome.attempted_at);
    }

    #[test]
    fn test_record_from_minimal_json() {
        let record: NotificationRecord = serde_json::from_str(
            r#"{"eventId": "manual", "message": "test", "success": true}"#,
        )
        .unwrap();
        assert_eq!(record.event_id, "manual");
        assert!(record.contact_id.is_none());
        assert!(record.channel.is_none());
    }
}
