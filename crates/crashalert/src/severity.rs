//! Impact samples and severity classification.
//!
//! A scalar impact force is bucketed into a [`SeverityLevel`] using three
//! configurable [`Thresholds`].

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Coarse, totally ordered crash severity.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeverityLevel {
    /// No crash.
    #[default]
    None,
    /// Light impact.
    Mild,
    /// Significant impact.
    Moderate,
    /// Heavy impact.
    Severe,
}

impl SeverityLevel {
    /// The display name used in messages and on the wire.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Mild => "MILD",
            Self::Moderate => "MODERATE",
            Self::Severe => "SEVERE",
        }
    }
}

impl std::fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeverityLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NONE" => Ok(Self::None),
            "MILD" => Ok(Self::Mild),
            "MODERATE" => Ok(Self::Moderate),
            "SEVERE" => Ok(Self::Severe),
            other => Err(Error::validation(format!("unknown severity: {other}"))),
        }
    }
}

/// Force thresholds separating the severity buckets.
///
/// A force must strictly exceed a threshold to reach that bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Lower bound (exclusive) for [`SeverityLevel::Mild`].
    pub mild: f64,
    /// Lower bound (exclusive) for [`SeverityLevel::Moderate`].
    pub moderate: f64,
    /// Lower bound (exclusive) for [`SeverityLevel::Severe`].
    pub severe: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            mild: 7.0,
            moderate: 15.0,
            severe: 35.0,
        }
    }
}

impl Thresholds {
    /// Check that the thresholds are finite, positive and strictly increasing.
    ///
    /// # Errors
    ///
    /// Returns a validation error describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("mild", self.mild),
            ("moderate", self.moderate),
            ("severe", self.severe),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::validation(format!(
                    "{name} threshold must be a positive number, got {value}"
                )));
            }
        }

        if !(self.mild < self.moderate && self.moderate < self.severe) {
            return Err(Error::validation(format!(
                "thresholds must be strictly increasing (mild {} < moderate {} < severe {})",
                self.mild, self.moderate, self.severe
            )));
        }

        Ok(())
    }

    /// Classify an impact force.
    ///
    /// Buckets are tested from the top down. NaN classifies as
    /// [`SeverityLevel::None`].
    #[must_use]
    pub fn classify(&self, force: f64) -> SeverityLevel {
        if force.is_nan() {
            return SeverityLevel::None;
        }

        if force > self.severe {
            SeverityLevel::Severe
        } else if force > self.moderate {
            SeverityLevel::Moderate
        } else if force > self.mild {
            SeverityLevel::Mild
        } else {
            SeverityLevel::None
        }
    }
}

/// Classify `force` against `thresholds`.
#[must_use]
pub fn classify(force: f64, thresholds: &Thresholds) -> SeverityLevel {
    thresholds.classify(force)
}

/// One accelerometer reading from the helmet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactSample {
    /// Magnitude of the impact force.
    pub force_magnitude: f64,
    /// Acceleration along the X axis.
    pub axis_x: f64,
    /// Acceleration along the Y axis.
    pub axis_y: f64,
    /// Acceleration along the Z axis.
    pub axis_z: f64,
    /// When the reading was taken.
    pub captured_at: DateTime<Utc>,
}

impl ImpactSample {
    /// Build a sample from per-axis readings; the magnitude is their Euclidean norm.
    #[must_use]
    pub fn from_axes(axis_x: f64, axis_y: f64, axis_z: f64) -> Self {
        let force_magnitude = (axis_x * axis_x + axis_y * axis_y + axis_z * axis_z).sqrt();
        Self {
            force_magnitude,
            axis_x,
            axis_y,
            axis_z,
            captured_at: Utc::now(),
        }
    }

    /// Build a sample carrying only a force magnitude.
    #[must_use]
    pub fn with_force(force_magnitude: f64) -> Self {
        Self {
            force_magnitude,
            axis_x: 0.0,
            axis_y: 0.0,
            axis_z: 0.0,
            captured_at: Utc::now(),
        }
    }

    /// Classify this sample.
    #[must_use]
    pub fn severity(&self, thresholds: &Thresholds) -> SeverityLevel {
        thresholds.classify(self.force_magnitude)
    }
}
