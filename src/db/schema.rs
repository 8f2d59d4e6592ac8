//! Database schema definitions

use rusqlite::Connection;
use tracing::info;

use crate::error::MarketError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<(), MarketError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!(
            "Migrating schema from v{} to v{}",
            current_version, SCHEMA_VERSION
        );
        migrate_schema(conn, current_version)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32, MarketError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )
    .map_err(|e| MarketError::Database(format!("Failed to create schema_version table: {}", e)))?;

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .unwrap_or(0);

    Ok(version)
}

/// Set schema version
fn set_schema_version(conn: &Connection, version: i32) -> Result<(), MarketError> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(|e| MarketError::Database(format!("Failed to clear schema_version: {}", e)))?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])
        .map_err(|e| MarketError::Database(format!("Failed to set schema_version: {}", e)))?;
    Ok(())
}

/// Create all tables
fn create_tables(conn: &Connection) -> Result<(), MarketError> {
    conn.execute_batch(USERS_SCHEMA)
        .map_err(|e| MarketError::Database(format!("Failed to create users tables: {}", e)))?;

    conn.execute_batch(NOTES_SCHEMA)
        .map_err(|e| MarketError::Database(format!("Failed to create notes tables: {}", e)))?;

    conn.execute_batch(LEDGER_SCHEMA)
        .map_err(|e| MarketError::Database(format!("Failed to create ledger tables: {}", e)))?;

    conn.execute_batch(ACTIVITY_SCHEMA)
        .map_err(|e| MarketError::Database(format!("Failed to create activity tables: {}", e)))?;

    conn.execute_batch(INDEXES_SCHEMA)
        .map_err(|e| MarketError::Database(format!("Failed to create indexes: {}", e)))?;

    Ok(())
}

/// Migrate schema from older version
fn migrate_schema(conn: &Connection, _from_version: i32) -> Result<(), MarketError> {
    // v1 is the first released schema; migration steps land here as it
    // evolves
    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

/// Users table schema
const USERS_SCHEMA: &str = r#"
-- Accounts with a cached coin balance (the balance projection).
-- The balance is only ever mutated in the same transaction as a
-- ledger append, keeping projection == starting bonus + sum(ledger).
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY NOT NULL,
    identifier TEXT NOT NULL UNIQUE,
    identifier_type TEXT NOT NULL DEFAULT 'email',
    password_hash TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'member',
    coin_balance INTEGER NOT NULL DEFAULT 0 CHECK (coin_balance >= 0),
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// Notes (content records) and review decisions schema
const NOTES_SCHEMA: &str = r#"
-- Uploaded notes. Status is a single tagged value; there is no parallel
-- boolean approval flag anywhere.
CREATE TABLE IF NOT EXISTS notes (
    id TEXT PRIMARY KEY NOT NULL,
    title TEXT NOT NULL,
    subject TEXT NOT NULL,
    description TEXT NOT NULL,
    owner_id TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'draft',
    price_coins INTEGER NOT NULL DEFAULT 0 CHECK (price_coins >= 0),

    -- Opaque references (URL/path) into an external object store
    attachments_json TEXT,

    downloads_count INTEGER NOT NULL DEFAULT 0,
    views_count INTEGER NOT NULL DEFAULT 0,
    likes_count INTEGER NOT NULL DEFAULT 0,

    reviewer_id TEXT,
    review_rationale TEXT,
    reviewed_at TEXT,

    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),

    FOREIGN KEY (owner_id) REFERENCES users(id)
);

-- Immutable decision history. One row per approve/reject, never updated
-- or deleted; a resubmitted note accumulates rows.
CREATE TABLE IF NOT EXISTS review_decisions (
    id TEXT PRIMARY KEY NOT NULL,
    note_id TEXT NOT NULL,
    outcome TEXT NOT NULL,
    reviewer_id TEXT NOT NULL,
    rationale TEXT NOT NULL,
    decided_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// Coin ledger schema
const LEDGER_SCHEMA: &str = r#"
-- Append-only coin movements. No code path updates or deletes rows here.
-- note_id is nulled (not cascaded) when a note is hard-deleted so the
-- financial history survives the content.
CREATE TABLE IF NOT EXISTS ledger (
    id TEXT PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL,
    entry_type TEXT NOT NULL,
    coin_change INTEGER NOT NULL CHECK (coin_change != 0),
    note_id TEXT,
    description TEXT,
    metadata_json TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),

    FOREIGN KEY (user_id) REFERENCES users(id)
);
"#;

/// Activity log schema
const ACTIVITY_SCHEMA: &str = r#"
-- Best-effort audit trail for dashboards. Writes here must never fail
-- the primary operation.
CREATE TABLE IF NOT EXISTS activity_log (
    id TEXT PRIMARY KEY NOT NULL,
    actor_id TEXT NOT NULL,
    action TEXT NOT NULL,
    target_type TEXT NOT NULL,
    target_id TEXT NOT NULL,
    details_json TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// Index definitions for fast queries
const INDEXES_SCHEMA: &str = r#"
-- Note indexes
CREATE INDEX IF NOT EXISTS idx_notes_status ON notes(status);
CREATE INDEX IF NOT EXISTS idx_notes_subject ON notes(subject);
CREATE INDEX IF NOT EXISTS idx_notes_owner ON notes(owner_id);
CREATE INDEX IF NOT EXISTS idx_notes_created_at ON notes(created_at);

-- Review decision indexes
CREATE INDEX IF NOT EXISTS idx_decisions_note ON review_decisions(note_id);

-- Ledger indexes
CREATE INDEX IF NOT EXISTS idx_ledger_user ON ledger(user_id);
CREATE INDEX IF NOT EXISTS idx_ledger_type ON ledger(entry_type);
CREATE INDEX IF NOT EXISTS idx_ledger_created_at ON ledger(created_at);
CREATE INDEX IF NOT EXISTS idx_ledger_note ON ledger(note_id);

-- Activity indexes
CREATE INDEX IF NOT EXISTS idx_activity_created_at ON activity_log(created_at);
CREATE INDEX IF NOT EXISTS idx_activity_actor ON activity_log(actor_id);
"#;
