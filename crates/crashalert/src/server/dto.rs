//! Request and response bodies for the HTTP API.

use serde::{Deserialize, Serialize};

use crate::config::AlertSettings;
use crate::contact::{ContactUpdate, NewContact};
use crate::countdown::{CountdownReport, CountdownState};
use crate::event::Location;
use crate::severity::{SeverityLevel, Thresholds};

/// Body of `POST /api/contacts`. An `id` turns the create into an update.
#[derive(Debug, Clone, Deserialize)]
pub struct ContactBody {
    /// Existing contact to overwrite.
    #[serde(default)]
    pub id: Option<i64>,
    /// Contact fields.
    #[serde(flatten)]
    pub contact: NewContact,
}

impl ContactBody {
    /// Every field as an update.
    #[must_use]
    pub fn as_update(&self) -> ContactUpdate {
        ContactUpdate {
            name: Some(self.contact.name.clone()),
            phone: Some(self.contact.phone.clone()),
            email: Some(self.contact.email.clone().unwrap_or_default()),
            notify_by_sms: Some(self.contact.notify_by_sms),
            notify_by_email: Some(self.contact.notify_by_email),
        }
    }
}

/// Settings as the web client sends and reads them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsBody {
    /// Countdown length in seconds.
    #[serde(alias = "countdownSeconds")]
    pub countdown_duration: u32,
    /// Severity thresholds.
    pub thresholds: Thresholds,
}

impl From<AlertSettings> for SettingsBody {
    fn from(settings: AlertSettings) -> Self {
        Self {
            countdown_duration: settings.countdown_seconds,
            thresholds: settings.thresholds,
        }
    }
}

impl From<SettingsBody> for AlertSettings {
    fn from(body: SettingsBody) -> Self {
        Self {
            countdown_seconds: body.countdown_duration,
            thresholds: body.thresholds,
        }
    }
}

/// `{ "success": bool }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessResponse {
    /// Whether the operation took effect.
    pub success: bool,
}

impl SuccessResponse {
    /// `{ "success": true }`.
    #[must_use]
    pub fn ok() -> Self {
        Self { success: true }
    }
}

/// Body of `POST /api/emergency/sms`.
///
/// Two request shapes are accepted; the explicit one is tried first because
/// its fields are all required.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EmergencyRequest {
    /// Pre-built message for bare phone numbers.
    ByExplicitRecipients {
        /// Raw phone numbers.
        #[serde(rename = "phoneNumbers")]
        phone_numbers: Vec<String>,
        /// Message body.
        message: String,
    },
    /// Build the message from the event and notify stored contacts.
    BySeverityAndContacts {
        /// Severity name, case-insensitive.
        severity: String,
        /// Crash location.
        location: Location,
        /// Limit to these contacts; all contacts when absent.
        #[serde(rename = "contactIds", default)]
        contact_ids: Option<Vec<i64>>,
    },
}

/// Body of the single-provider send endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectSmsRequest {
    /// Raw phone numbers.
    pub phone_numbers: Vec<String>,
    /// Message body.
    pub message: String,
}

/// Body of `POST /api/emergency/log`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRequest {
    /// Contact the attempt targeted.
    #[serde(default)]
    pub contact_id: Option<i64>,
    /// Message that was sent.
    pub message: String,
    /// Whether it was delivered.
    pub success: bool,
    /// Failure reason.
    #[serde(default)]
    pub error_message: Option<String>,
    /// Event the attempt belongs to.
    #[serde(default)]
    pub event_id: Option<String>,
}

/// Acknowledgement of a log append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogAck {
    /// Always true.
    pub success: bool,
    /// Id of the new record.
    pub id: i64,
}

/// `?limit=` for log listings.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct LogQuery {
    /// Maximum records to return.
    pub limit: Option<usize>,
}

/// Body of `POST /api/emergency/countdown`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CountdownRequest {
    /// Measured impact force; classified with the active thresholds.
    pub force: Option<f64>,
    /// Explicit severity; wins over `force`.
    pub severity: Option<String>,
    /// Crash location; the configured fallback when absent.
    pub location: Option<Location>,
    /// Override the configured countdown length.
    pub countdown_seconds: Option<u32>,
    /// Limit dispatch to these contacts.
    pub contact_ids: Option<Vec<i64>>,
}

/// A countdown session as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountdownView {
    /// Session id.
    pub id: u64,
    /// Event severity.
    pub severity: SeverityLevel,
    /// Event location.
    pub location: Location,
    /// Latest state.
    pub state: CountdownState,
    /// Present once the session closed and its dispatch finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<CountdownReport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emergency_request_by_contacts() {
        let req: EmergencyRequest = serde_json::from_str(
            r#"{"severity": "severe", "location": {"lat": 12.9, "lng": 77.6}, "contactIds": [1, 3]}"#,
        )
        .unwrap();
        match req {
            EmergencyRequest::BySeverityAndContacts {
                severity,
                contact_ids,
                ..
            } => {
                assert_eq!(severity, "severe");
                assert_eq!(contact_ids, Some(vec![1, 3]));
            }
            other @ EmergencyRequest::ByExplicitRecipients { .. } => {
                panic!("wrong shape: {other:?}")
            }
        }
    }

    #[test]
    fn test_emergency_request_by_numbers() {
        let req: EmergencyRequest =
            serde_json::from_str(r#"{"phoneNumbers": ["9876543210"], "message": "help"}"#)
                .unwrap();
        assert!(matches!(
            req,
            EmergencyRequest::ByExplicitRecipients { ref phone_numbers, .. } if phone_numbers.len() == 1
        ));
    }

    #[test]
    fn test_emergency_request_rejects_partial_shapes() {
        assert!(serde_json::from_str::<EmergencyRequest>(r#"{"message": "help"}"#).is_err());
        assert!(serde_json::from_str::<EmergencyRequest>(r#"{"severity": "MILD"}"#).is_err());
    }

    #[test]
    fn test_settings_body_accepts_both_names() {
        let body: SettingsBody = serde_json::from_str(
            r#"{"countdownDuration": 20, "thresholds": {"mild": 5, "moderate": 10, "severe": 30}}"#,
        )
        .unwrap();
        assert_eq!(body.countdown_duration, 20);

        let body: SettingsBody = serde_json::from_str(
            r#"{"countdownSeconds": 9, "thresholds": {"mild": 5, "moderate": 10, "severe": 30}}"#,
        )
        .unwrap();
        assert_eq!(AlertSettings::from(body).countdown_seconds, 9);
    }

    #[test]
    fn test_contact_body_with_id() {
        let body: ContactBody = serde_json::from_str(
            r#"{"id": 4, "name": "Asha", "phone": "9876543210", "notifyBySms": false}"#,
        )
        .unwrap();
        assert_eq!(body.id, Some(4));
        let update = body.as_update();
        assert_eq!(update.name.as_deref(), Some("Asha"));
        assert_eq!(update.notify_by_sms, Some(false));
        assert_eq!(update.email.as_deref(), Some(""));
    }
}
