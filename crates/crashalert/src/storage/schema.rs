//! `SQLite` schema definitions for crashalert.
//!
//! This module contains the SQL statements for creating and managing
//! the database schema.

/// SQL statement to create the contacts table.
pub const CREATE_CONTACTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS contacts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    phone TEXT NOT NULL,
    email TEXT,
    notify_by_sms INTEGER NOT NULL DEFAULT 1,
    notify_by_email INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
)
";

/// SQL statement to create the single-row settings table.
pub const CREATE_SETTINGS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS settings (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    countdown_seconds INTEGER NOT NULL,
    mild_threshold REAL NOT NULL,
    moderate_threshold REAL NOT NULL,
    severe_threshold REAL NOT NULL,
    updated_at TEXT NOT NULL
)
";

/// SQL statement to create the append-only notification log.
pub const CREATE_NOTIFICATIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS notifications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id TEXT NOT NULL,
    contact_id INTEGER,
    channel TEXT,
    message TEXT NOT NULL,
    success INTEGER NOT NULL,
    error_message TEXT,
    attempted_at TEXT NOT NULL
)
";

/// Index for looking up every attempt made for one event.
pub const CREATE_EVENT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_notifications_event ON notifications(event_id)
";

/// Index for per-contact history.
pub const CREATE_CONTACT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_notifications_contact ON notifications(contact_id)
";

/// Index for recent-first listing.
pub const CREATE_ATTEMPTED_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_notifications_attempted ON notifications(attempted_at DESC)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_CONTACTS_TABLE,
    CREATE_SETTINGS_TABLE,
    CREATE_NOTIFICATIONS_TABLE,
    CREATE_EVENT_INDEX,
    CREATE_CONTACT_INDEX,
    CREATE_ATTEMPTED_INDEX,
    CREATE_METADATA_TABLE,
];
