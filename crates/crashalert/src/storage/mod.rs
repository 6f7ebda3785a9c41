//! Storage layer for crashalert.
//!
//! This module provides `SQLite`-based persistent storage for emergency
//! contacts, saved alert settings and the notification log.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::AlertSettings;
use crate::contact::{Contact, ContactUpdate, NewContact};
use crate::dispatch::ChannelKind;
use crate::error::{Error, Result};
use crate::repository::{ContactRepository, NotificationLog, NotificationRecord, SettingsStore};
use crate::severity::Thresholds;

const MEMORY_PATH: &str = ":memory:";

/// `SQLite` store backing every repository trait.
///
/// The connection sits behind a mutex so one `Storage` can be shared
/// between the HTTP handlers and the dispatcher.
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Mutex<Connection>,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory storage instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(MEMORY_PATH),
            source,
        })?;
        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(MEMORY_PATH),
            conn: Mutex::new(conn),
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::internal("storage connection lock poisoned"))
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let conn = self.conn()?;

        let total_contacts: i64 =
            conn.query_row("SELECT COUNT(*) FROM contacts", [], |row| row.get(0))?;
        let (total_notifications, successful_notifications): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(success), 0) FROM notifications",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let last: Option<String> = conn
            .query_row(
                "SELECT attempted_at FROM notifications ORDER BY attempted_at DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        let db_size_bytes = if self.path.as_os_str() == MEMORY_PATH {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            total_contacts,
            total_notifications,
            successful_notifications,
            last_notification_at: last.as_deref().and_then(parse_timestamp),
            db_size_bytes,
        })
    }

    fn read_contact(conn: &Connection, id: i64) -> Result<Option<Contact>> {
        let contact = conn
            .query_row(
                r"
                SELECT id, name, phone, email, notify_by_sms, notify_by_email
                FROM contacts WHERE id = ?1
                ",
                [id],
                Self::row_to_contact,
            )
            .optional()?;
        Ok(contact)
    }

    fn row_to_contact(row: &rusqlite::Row) -> rusqlite::Result<Contact> {
        Ok(Contact {
            id: row.get(0)?,
            name: row.get(1)?,
            phone: row.get(2)?,
            email: row.get(3)?,
            notify_by_sms: row.get(4)?,
            notify_by_email: row.get(5)?,
        })
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<NotificationRecord> {
        let channel: Option<String> = row.get(3)?;
        let attempted_at: String = row.get(7)?;

        let channel = channel.and_then(|name| match name.parse::<ChannelKind>() {
            Ok(kind) => Some(kind),
            Err(_) => {
                warn!("Unknown channel in notification log: {}", name);
                None
            }
        });

        Ok(NotificationRecord {
            id: Some(row.get(0)?),
            event_id: row.get(1)?,
            contact_id: row.get(2)?,
            channel,
            message: row.get(4)?,
            success: row.get(5)?,
            error_message: row.get(6)?,
            attempted_at: parse_timestamp(&attempted_at).unwrap_or_else(Utc::now),
        })
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

impl ContactRepository for Storage {
    fn list_contacts(&self) -> Result<Vec<Contact>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r"
            SELECT id, name, phone, email, notify_by_sms, notify_by_email
            FROM contacts ORDER BY id
            ",
        )?;
        let contacts = stmt
            .query_map([], Self::row_to_contact)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(contacts)
    }

    fn get_contact(&self, id: i64) -> Result<Option<Contact>> {
        let conn = self.conn()?;
        Self::read_contact(&conn, id)
    }

    fn create_contact(&self, contact: NewContact) -> Result<Contact> {
        contact.validate()?;
        let contact = contact.into_contact(0);

        let conn = self.conn()?;
        conn.execute(
            r"
            INSERT INTO contacts (name, phone, email, notify_by_sms, notify_by_email)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
            params![
                contact.name,
                contact.phone,
                contact.email,
                contact.notify_by_sms,
                contact.notify_by_email,
            ],
        )?;

        let id = conn.last_insert_rowid();
        debug!("Created contact {}", id);
        Ok(Contact { id, ..contact })
    }

    fn update_contact(&self, id: i64, update: &ContactUpdate) -> Result<Contact> {
        update.validate()?;

        let conn = self.conn()?;
        let mut contact =
            Self::read_contact(&conn, id)?.ok_or_else(|| Error::not_found("contact", id))?;
        update.apply_to(&mut contact);

        conn.execute(
            r"
            UPDATE contacts
            SET name = ?2, phone = ?3, email = ?4, notify_by_sms = ?5, notify_by_email = ?6
            WHERE id = ?1
            ",
            params![
                contact.id,
                contact.name,
                contact.phone,
                contact.email,
                contact.notify_by_sms,
                contact.notify_by_email,
            ],
        )?;
        debug!("Updated contact {}", id);
        Ok(contact)
    }

    fn delete_contact(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn()?
            .execute("DELETE FROM contacts WHERE id = ?1", [id])?;
        Ok(affected > 0)
    }
}

impl SettingsStore for Storage {
    fn load_settings(&self) -> Result<Option<AlertSettings>> {
        let conn = self.conn()?;
        let settings = conn
            .query_row(
                r"
                SELECT countdown_seconds, mild_threshold, moderate_threshold, severe_threshold
                FROM settings WHERE id = 1
                ",
                [],
                |row| {
                    Ok(AlertSettings {
                        countdown_seconds: row.get(0)?,
                        thresholds: Thresholds {
                            mild: row.get(1)?,
                            moderate: row.get(2)?,
                            severe: row.get(3)?,
                        },
                    })
                },
            )
            .optional()?;
        Ok(settings)
    }

    fn save_settings(&self, settings: &AlertSettings) -> Result<()> {
        settings.validate()?;

        self.conn()?.execute(
            r"
            INSERT OR REPLACE INTO settings
                (id, countdown_seconds, mild_threshold, moderate_threshold, severe_threshold, updated_at)
            VALUES (1, ?1, ?2, ?3, ?4, ?5)
            ",
            params![
                settings.countdown_seconds,
                settings.thresholds.mild,
                settings.thresholds.moderate,
                settings.thresholds.severe,
                Utc::now().to_rfc3339(),
            ],
        )?;
        info!(
            "Saved settings: countdown {}s, thresholds {}/{}/{}",
            settings.countdown_seconds,
            settings.thresholds.mild,
            settings.thresholds.moderate,
            settings.thresholds.severe
        );
        Ok(())
    }
}

impl NotificationLog for Storage {
    fn append(&self, record: &NotificationRecord) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            r"
            INSERT INTO notifications
                (event_id, contact_id, channel, message, success, error_message, attempted_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
            params![
                record.event_id,
                record.contact_id,
                record.channel.map(ChannelKind::as_str),
                record.message,
                record.success,
                record.error_message,
                record.attempted_at.to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn recent(&self, limit: usize) -> Result<Vec<NotificationRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r"
            SELECT id, event_id, contact_id, channel, message, success, error_message, attempted_at
            FROM notifications ORDER BY attempted_at DESC, id DESC LIMIT ?1
            ",
        )?;
        let records = stmt
            .query_map([limit_param(limit)], Self::row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn for_event(&self, event_id: &str) -> Result<Vec<NotificationRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r"
            SELECT id, event_id, contact_id, channel, message, success, error_message, attempted_at
            FROM notifications WHERE event_id = ?1 ORDER BY id
            ",
        )?;
        let records = stmt
            .query_map([event_id], Self::row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    /// Number of stored contacts.
    pub total_contacts: i64,
    /// Number of logged delivery attempts.
    pub total_notifications: i64,
    /// Number of logged attempts that succeeded.
    pub successful_notifications: i64,
    /// Time of the most recent attempt.
    pub last_notification_at: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}
