//! Shared state for the HTTP handlers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use crate::config::{AlertSettings, Config};
use crate::countdown::{CountdownHandle, CountdownReport, TICK};
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::event::EmergencyEvent;
use crate::provider::Providers;
use crate::repository::{ContactRepository, NotificationLog, SettingsStore};
use crate::storage::Storage;

/// One armed or finished countdown.
#[derive(Debug)]
pub struct CountdownSession {
    /// Session id.
    pub id: u64,
    /// Event the countdown is for.
    pub event: EmergencyEvent,
    /// Control handle.
    pub handle: CountdownHandle,
    /// Set once the run finished.
    pub report: Arc<OnceLock<CountdownReport>>,
}

/// Cloneable application state.
#[derive(Debug, Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

#[derive(Debug)]
struct AppStateInner {
    contacts: Arc<dyn ContactRepository>,
    settings: Arc<dyn SettingsStore>,
    log: Arc<dyn NotificationLog>,
    providers: Providers,
    dispatcher: Arc<Dispatcher>,
    config: Config,
    tick: Duration,
    sessions: Mutex<HashMap<u64, Arc<CountdownSession>>>,
    next_session_id: AtomicU64,
}

impl AppState {
    /// State backed by one `SQLite` store, with the standard dispatcher.
    #[must_use]
    pub fn new(storage: Arc<Storage>, providers: Providers, config: Config) -> Self {
        let dispatcher = Dispatcher::standard(
            &providers,
            config.provider_timeout(),
            None,
            storage.clone(),
            config.message.clone(),
        );
        Self::from_parts(
            storage.clone(),
            storage.clone(),
            storage,
            providers,
            dispatcher,
            config,
            TICK,
        )
    }

    /// Assemble state from individual parts.
    #[must_use]
    pub fn from_parts(
        contacts: Arc<dyn ContactRepository>,
        settings: Arc<dyn SettingsStore>,
        log: Arc<dyn NotificationLog>,
        providers: Providers,
        dispatcher: Dispatcher,
        config: Config,
        tick: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                contacts,
                settings,
                log,
                providers,
                dispatcher: Arc::new(dispatcher),
                config,
                tick,
                sessions: Mutex::new(HashMap::new()),
                next_session_id: AtomicU64::new(1),
            }),
        }
    }

    /// Contact store.
    pub fn contacts(&self) -> &dyn ContactRepository {
        self.inner.contacts.as_ref()
    }

    /// Settings store.
    pub fn settings(&self) -> &dyn SettingsStore {
        self.inner.settings.as_ref()
    }

    /// Notification log.
    pub fn log(&self) -> &dyn NotificationLog {
        self.inner.log.as_ref()
    }

    /// SMS providers.
    pub fn providers(&self) -> &Providers {
        &self.inner.providers
    }

    /// Shared dispatcher.
    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.inner.dispatcher.clone()
    }

    /// Loaded configuration.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Countdown tick length.
    pub fn tick(&self) -> Duration {
        self.inner.tick
    }

    /// Saved settings, or the configured defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings store fails.
    pub fn alert_settings(&self) -> Result<AlertSettings> {
        Ok(self
            .inner
            .settings
            .load_settings()?
            .unwrap_or(self.inner.config.alert))
    }

    /// Reserve the next session id.
    pub fn next_session_id(&self) -> u64 {
        self.inner.next_session_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the session table lock is poisoned.
    pub fn insert_session(&self, session: CountdownSession) -> Result<Arc<CountdownSession>> {
        let session = Arc::new(session);
        self.sessions()?.insert(session.id, session.clone());
        Ok(session)
    }

    /// Look up a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the session table lock is poisoned.
    pub fn session(&self, id: u64) -> Result<Option<Arc<CountdownSession>>> {
        Ok(self.sessions()?.get(&id).cloned())
    }

    /// Drop a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the session table lock is poisoned.
    pub fn remove_session(&self, id: u64) -> Result<Option<Arc<CountdownSession>>> {
        Ok(self.sessions()?.remove(&id))
    }

    /// Number of sessions currently held.
    ///
    /// # Errors
    ///
    /// Returns an error if the session table lock is poisoned.
    pub fn session_count(&self) -> Result<usize> {
        Ok(self.sessions()?.len())
    }

    fn sessions(&self) -> Result<MutexGuard<'_, HashMap<u64, Arc<CountdownSession>>>> {
        self.inner
            .sessions
            .lock()
            .map_err(|_| Error::internal("countdown session table lock poisoned"))
    }
}
