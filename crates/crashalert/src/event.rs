//! Confirmed emergency events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::severity::SeverityLevel;

/// A geographic position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

impl Location {
    /// Create a location.
    #[must_use]
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Check that the coordinates are finite and in range.
    ///
    /// # Errors
    ///
    /// Returns a validation error for out-of-range or non-finite coordinates.
    pub fn validate(&self) -> Result<()> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(Error::validation(format!("invalid latitude: {}", self.lat)));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(Error::validation(format!("invalid longitude: {}", self.lng)));
        }
        Ok(())
    }

    /// Maps link for this position, e.g. `https://www.google.com/maps?q=lat,lng`.
    #[must_use]
    pub fn maps_url(&self, base_url: &str) -> String {
        format!("{base_url}{},{}", self.lat, self.lng)
    }
}

/// A confirmed crash, created on manual trigger or countdown expiry.
///
/// Immutable once built; the countdown hands it to the dispatcher exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyEvent {
    severity: SeverityLevel,
    location: Location,
    triggered_at: DateTime<Utc>,
    countdown_seconds: u32,
}

impl EmergencyEvent {
    /// Create an event stamped with the current time.
    #[must_use]
    pub fn new(severity: SeverityLevel, location: Location, countdown_seconds: u32) -> Self {
        Self::at(severity, location, Utc::now(), countdown_seconds)
    }

    /// Create an event with an explicit trigger time.
    #[must_use]
    pub fn at(
        severity: SeverityLevel,
        location: Location,
        triggered_at: DateTime<Utc>,
        countdown_seconds: u32,
    ) -> Self {
        Self {
            severity,
            location,
            triggered_at,
            countdown_seconds,
        }
    }

    /// Crash severity.
    #[must_use]
    pub fn severity(&self) -> SeverityLevel {
        self.severity
    }

    /// Where the crash happened.
    #[must_use]
    pub fn location(&self) -> Location {
        self.location
    }

    /// When the emergency was confirmed.
    #[must_use]
    pub fn triggered_at(&self) -> DateTime<Utc> {
        self.triggered_at
    }

    /// Length of the countdown that preceded the event.
    #[must_use]
    pub fn countdown_seconds(&self) -> u32 {
        self.countdown_seconds
    }

    /// Stable identifier derived from the event fields.
    ///
    /// Used as the event id in the notification log.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.severity.as_str().as_bytes());
        hasher.update(&self.location.lat.to_le_bytes());
        hasher.update(&self.location.lng.to_le_bytes());
        hasher.update(self.triggered_at.to_rfc3339().as_bytes());
        hasher.update(&self.countdown_seconds.to_le_bytes());
        hasher.finalize().to_hex().as_str()[..16].to_string()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn fixed_event() -> EmergencyEvent {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap();
        EmergencyEvent::at(SeverityLevel::Severe, Location::new(22.316_41, 87.3215), at, 15)
    }

    #[test]
    fn test_location_validate() {
        assert!(Location::new(22.3, 87.3).validate().is_ok());
        assert!(Location::new(91.0, 0.0).validate().is_err());
        assert!(Location::new(0.0, -181.0).validate().is_err());
        assert!(Location::new(f64::NAN, 0.0).validate().is_err());
    }

    #[test]
    fn test_maps_url() {
        let url = Location::new(22.316_41, 87.3215).maps_url("https://www.google.com/maps?q=");
        assert_eq!(url, "https://www.google.com/maps?q=22.31641,87.3215");
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(fixed_event().fingerprint(), fixed_event().fingerprint());
        assert_eq!(fixed_event().fingerprint().len(), 16);
    }

    #[test]
    fn test_fingerprint_differs_per_event() {
        let other = EmergencyEvent::at(
            SeverityLevel::Mild,
            fixed_event().location(),
            fixed_event().triggered_at(),
            15,
        );
        assert_ne!(fixed_event().fingerprint(), other.fingerprint());
    }

    #[test]
    fn test_event_serializes_camel_case() {
        let json = serde_json::to_value(fixed_event()).unwrap();
        assert_eq!(json["severity"], "SEVERE");
        assert_eq!(json["countdownSeconds"], 15);
        assert!(json.get("triggeredAt").is_some());
    }
}
