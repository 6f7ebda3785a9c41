//! `crashalert` - crash detection emergency alerting
//!
//! Classifies impact forces into severity levels, runs a cancellable
//! countdown once a crash is detected, and notifies emergency contacts
//! through SMS providers with deep-link and share-sheet fallbacks. Every
//! delivery attempt is recorded in a notification log.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod contact;
pub mod countdown;
pub mod detector;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod logging;
pub mod message;
pub mod phone;
pub mod provider;
pub mod repository;
pub mod server;
pub mod severity;
pub mod storage;

pub use config::{AlertSettings, Config};
pub use contact::{Contact, ContactUpdate, NewContact};
pub use countdown::{CountdownHandle, CountdownReport, CountdownState, CountdownStatus};
pub use detector::{CrashDetector, CrashSignal, DetectorHandle};
pub use dispatch::{DeliveryOutcome, DeliveryResult, Dispatcher};
pub use error::{Error, Result};
pub use event::{EmergencyEvent, Location};
pub use logging::init_logging;
pub use phone::{normalize, NormalizedPhone, PhoneClass};
pub use provider::{BatchOutcome, Providers, SmsProvider};
pub use repository::{ContactRepository, NotificationLog, NotificationRecord, SettingsStore};
pub use severity::{classify, ImpactSample, SeverityLevel, Thresholds};
pub use storage::{Storage, StorageStats};
