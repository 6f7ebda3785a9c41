//! Emergency contact records.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Minimum length of a contact name, after trimming.
pub const MIN_NAME_LEN: usize = 2;

/// A stored emergency contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    /// Identifier assigned by the store.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Phone number as entered.
    pub phone: String,
    /// Optional email address.
    pub email: Option<String>,
    /// Whether the contact wants SMS alerts.
    pub notify_by_sms: bool,
    /// Whether the contact wants email alerts.
    pub notify_by_email: bool,
}

impl Contact {
    /// The phone number, if one is present.
    #[must_use]
    pub fn phone(&self) -> Option<&str> {
        non_blank(Some(&self.phone))
    }

    /// The email address, if one is present.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        non_blank(self.email.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn default_true() -> bool {
    true
}

/// Input for creating a contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewContact {
    /// Display name.
    pub name: String,
    /// Phone number.
    pub phone: String,
    /// Optional email address.
    #[serde(default)]
    pub email: Option<String>,
    /// Defaults to `true`.
    #[serde(default = "default_true")]
    pub notify_by_sms: bool,
    /// Defaults to `false`.
    #[serde(default)]
    pub notify_by_email: bool,
}

impl NewContact {
    /// Create a contact input with default notification preferences.
    #[must_use]
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            email: None,
            notify_by_sms: true,
            notify_by_email: false,
        }
    }

    /// Set the email address.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Validate the input.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a short name, blank phone or malformed email.
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        validate_phone(&self.phone)?;
        validate_email(self.email.as_deref())
    }

    /// Turn the input into a stored contact with the given id.
    #[must_use]
    pub fn into_contact(self, id: i64) -> Contact {
        Contact {
            id,
            name: self.name.trim().to_string(),
            phone: self.phone.trim().to_string(),
            email: non_blank(self.email.as_deref()).map(str::to_string),
            notify_by_sms: self.notify_by_sms,
            notify_by_email: self.notify_by_email,
        }
    }
}

/// Partial update of a contact; absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContactUpdate {
    /// New display name.
    pub name: Option<String>,
    /// New phone number.
    pub phone: Option<String>,
    /// New email address; an empty string clears it.
    pub email: Option<String>,
    /// New SMS preference.
    pub notify_by_sms: Option<bool>,
    /// New email preference.
    pub notify_by_email: Option<bool>,
}

impl ContactUpdate {
    /// Validate the fields that are present.
    ///
    /// # Errors
    ///
    /// Returns a validation error for any present field that is malformed.
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(phone) = &self.phone {
            validate_phone(phone)?;
        }
        validate_email(self.email.as_deref())
    }

    /// Apply this update to `contact`.
    pub fn apply_to(&self, contact: &mut Contact) {
        if let Some(name) = &self.name {
            contact.name = name.trim().to_string();
        }
        if let Some(phone) = &self.phone {
            contact.phone = phone.trim().to_string();
        }
        if let Some(email) = &self.email {
            contact.email = non_blank(Some(email)).map(str::to_string);
        }
        if let Some(sms) = self.notify_by_sms {
            contact.notify_by_sms = sms;
        }
        if let Some(mail) = self.notify_by_email {
            contact.notify_by_email = mail;
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().chars().count() < MIN_NAME_LEN {
        return Err(Error::validation(format!(
            "name must be at least {MIN_NAME_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_phone(phone: &str) -> Result<()> {
    if phone.trim().is_empty() {
        return Err(Error::validation("phone must not be empty"));
    }
    Ok(())
}

fn validate_email(email: Option<&str>) -> Result<()> {
    match non_blank(email) {
        Some(email) if !email.contains('@') => {
            Err(Error::validation(format!("invalid email address: {email}")))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_contact_validation() {
        assert!(NewContact::new("Asha", "9876543210").validate().is_ok());
        assert!(NewContact::new("A", "9876543210").validate().is_err());
        assert!(NewContact::new("Asha", "   ").validate().is_err());
        assert!(NewContact::new("Asha", "9876543210")
            .with_email("not-an-email")
            .validate()
            .is_err());
        assert!(NewContact::new("Asha", "9876543210")
            .with_email("asha@example.com")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_new_contact_defaults_from_json() {
        let contact: NewContact =
            serde_json::from_str(r#"{"name": "Ravi", "phone": "+919876543210"}"#).unwrap();
        assert!(contact.notify_by_sms);
        assert!(!contact.notify_by_email);
        assert!(contact.email.is_none());
    }

    #[test]
    fn test_into_contact_trims() {
        let contact = NewContact::new("  Ravi ", " 9876543210 ")
            .with_email("  ")
            .into_contact(7);
        assert_eq!(contact.id, 7);
        assert_eq!(contact.name, "Ravi");
        assert_eq!(contact.phone, "9876543210");
        assert!(contact.email.is_none());
    }

    #[test]
    fn test_contact_accessors() {
        let mut contact = NewContact::new("Ravi", "9876543210").into_contact(1);
        assert_eq!(contact.phone(), Some("9876543210"));
        assert_eq!(contact.email(), None);

        contact.phone = String::new();
        contact.email = Some("ravi@example.com".to_string());
        assert_eq!(contact.phone(), None);
        assert_eq!(contact.email(), Some("ravi@example.com"));
    }

    #[test]
    fn test_update_apply() {
        let mut contact = NewContact::new("Ravi", "9876543210")
            .with_email("ravi@example.com")
            .into_contact(1);
        let update = ContactUpdate {
            phone: Some("+12345678901".to_string()),
            email: Some(String::new()),
            notify_by_sms: Some(false),
            ..ContactUpdate::default()
        };
        assert!(update.validate().is_ok());
        update.apply_to(&mut contact);

        assert_eq!(contact.name, "Ravi");
        assert_eq!(contact.phone, "+12345678901");
        assert!(contact.email.is_none());
        assert!(!contact.notify_by_sms);
    }

    #[test]
    fn test_update_validation() {
        let update = ContactUpdate {
            name: Some("x".to_string()),
            ..ContactUpdate::default()
        };
        assert!(update.validate().is_err());
        assert!(ContactUpdate::default().validate().is_ok());
    }

    #[test]
    fn test_contact_json_shape() {
        let contact = NewContact::new("Ravi", "9876543210").into_contact(3);
        let json = serde_json::to_value(&contact).unwrap();
        assert_eq!(json["notifyBySms"], true);
        assert_eq!(json["notifyByEmail"], false);
        assert_eq!(json["id"], 3);
    }
}
