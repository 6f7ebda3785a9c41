//! Configuration management for crashalert.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::event::Location;
use crate::severity::Thresholds;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "crashalert";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "crashalert.db";

/// Shortest countdown the user can configure.
pub const MIN_COUNTDOWN_SECONDS: u32 = 5;

/// Longest countdown the user can configure.
pub const MAX_COUNTDOWN_SECONDS: u32 = 30;

/// Environment variable holding the domestic provider API key.
pub const DOMESTIC_API_KEY_VAR: &str = "FAST2SMS_API_KEY";
/// Environment variable holding the international provider account id.
pub const INTERNATIONAL_ACCOUNT_VAR: &str = "TWILIO_ACCOUNT_SID";
/// Environment variable holding the international provider auth token.
pub const INTERNATIONAL_TOKEN_VAR: &str = "TWILIO_AUTH_TOKEN";
/// Environment variable holding the international sender number.
pub const INTERNATIONAL_FROM_VAR: &str = "TWILIO_PHONE_NUMBER";

const REDACTED: &str = "********";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Provider secret variables (`FAST2SMS_API_KEY`, `TWILIO_*`)
/// 2. Environment variables prefixed with `CRASHALERT_`, `__` separating sections
/// 3. TOML config file at `~/.config/crashalert/config.toml`
/// 4. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Countdown and severity defaults.
    pub alert: AlertSettings,
    /// Emergency message configuration.
    pub message: MessageConfig,
    /// SMS provider configuration.
    pub providers: ProvidersConfig,
    /// HTTP server configuration.
    pub server: ServerConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/crashalert/crashalert.db`
    pub database_path: Option<PathBuf>,
}

/// User-adjustable alert settings.
///
/// The config file supplies the defaults; values saved through the settings
/// store take precedence at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    /// Seconds the user has to cancel before contacts are alerted.
    pub countdown_seconds: u32,
    /// Severity thresholds.
    pub thresholds: Thresholds,
}

/// Emergency message configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageConfig {
    /// Prefix of the maps link; `lat,lng` is appended.
    pub maps_base_url: String,
    /// Position reported when no location fix is available.
    pub fallback_location: Location,
    /// Title used for the share sheet and email subject.
    pub share_title: String,
}

/// SMS provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Upper bound for a single provider call, in milliseconds.
    pub timeout_ms: u64,
    /// Domestic bulk SMS provider.
    pub domestic: DomesticProviderConfig,
    /// International SMS provider.
    pub international: InternationalProviderConfig,
}

/// Domestic bulk SMS provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomesticProviderConfig {
    /// API key; the provider is disabled when absent.
    pub api_key: Option<String>,
    /// Bulk send endpoint.
    pub endpoint: String,
    /// Delivery route.
    pub route: String,
    /// Sender id shown to recipients.
    pub sender_id: String,
}

/// International SMS provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InternationalProviderConfig {
    /// Account identifier.
    pub account_sid: Option<String>,
    /// Auth token.
    pub auth_token: Option<String>,
    /// Sender number in E.164 form.
    pub from_number: Option<String>,
    /// API base URL.
    pub api_base: String,
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP server binds to.
    pub bind_address: String,
    /// How long a finished countdown session stays queryable, in seconds.
    pub session_retention_secs: u64,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            countdown_seconds: 15,
            thresholds: Thresholds::default(),
        }
    }
}

impl AlertSettings {
    /// Validate countdown range and threshold ordering.
    ///
    /// # Errors
    ///
    /// Returns a validation error when a value is out of range.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_COUNTDOWN_SECONDS..=MAX_COUNTDOWN_SECONDS).contains(&self.countdown_seconds) {
            return Err(Error::validation(format!(
                "countdown must be between {MIN_COUNTDOWN_SECONDS} and {MAX_COUNTDOWN_SECONDS} seconds, got {}",
                self.countdown_seconds
            )));
        }
        self.thresholds.validate()
    }
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            maps_base_url: "https://www.google.com/maps?q=".to_string(),
            fallback_location: Location::new(22.316_41, 87.3215),
            share_title: "EMERGENCY: Crash Detected".to_string(),
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 8_000,
            domestic: DomesticProviderConfig::default(),
            international: InternationalProviderConfig::default(),
        }
    }
}

impl Default for DomesticProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: "https://www.fast2sms.com/dev/bulkV2".to_string(),
            // Promotional route; the quick route needs DLT approval
            route: "v3".to_string(),
            sender_id: "TXTIND".to_string(),
        }
    }
}

impl Default for InternationalProviderConfig {
    fn default() -> Self {
        Self {
            account_sid: None,
            auth_token: None,
            from_number: None,
            api_base: "https://api.twilio.com".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:5000".to_string(),
            session_retention_secs: 600,
        }
    }
}

impl ProvidersConfig {
    /// Fill provider secrets from their conventional environment variables.
    pub fn merge_env_secrets(&mut self) {
        self.merge_secrets_from(|name| std::env::var(name).ok());
    }

    /// Fill provider secrets using `lookup`; blank values count as absent.
    pub fn merge_secrets_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let secret = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = secret(DOMESTIC_API_KEY_VAR) {
            self.domestic.api_key = Some(key);
        }
        if let Some(sid) = secret(INTERNATIONAL_ACCOUNT_VAR) {
            self.international.account_sid = Some(sid);
        }
        if let Some(token) = secret(INTERNATIONAL_TOKEN_VAR) {
            self.international.auth_token = Some(token);
        }
        if let Some(from) = secret(INTERNATIONAL_FROM_VAR) {
            self.international.from_number = Some(from);
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("CRASHALERT_").split("__"));

        let mut config: Config = figment.extract()?;
        config.providers.merge_env_secrets();
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        self.alert
            .validate()
            .map_err(|e| Error::ConfigValidation {
                message: format!("alert: {e}"),
            })?;

        if self.providers.timeout_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "providers.timeout_ms must be greater than 0".to_string(),
            });
        }

        if self.server.bind_address.parse::<SocketAddr>().is_err() {
            return Err(Error::ConfigValidation {
                message: format!("invalid server.bind_address: {}", self.server.bind_address),
            });
        }

        self.message
            .fallback_location
            .validate()
            .map_err(|e| Error::ConfigValidation {
                message: format!("message.fallback_location: {e}"),
            })?;

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the provider call timeout as a Duration.
    #[must_use]
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.providers.timeout_ms)
    }

    /// Retention for finished countdown sessions.
    #[must_use]
    pub fn session_retention(&self) -> Duration {
        Duration::from_secs(self.server.session_retention_secs)
    }

    /// A copy of this configuration with secrets masked, for display.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        let mask = |value: &mut Option<String>| {
            if value.is_some() {
                *value = Some(REDACTED.to_string());
            }
        };
        mask(&mut copy.providers.domestic.api_key);
        mask(&mut copy.providers.international.auth_token);
        copy
    }
}
