//! SQLite database module for the marketplace
//!
//! Single canonical store for users, notes, the coin ledger, and the
//! activity log. The legacy admin panel's parallel schema is gone; every
//! consumer reads and writes these tables.
//!
//! ## Tables
//!
//! - `users` - accounts with cached coin balance (balance projection)
//! - `notes` - content records with lifecycle status
//! - `review_decisions` - immutable approve/reject history
//! - `ledger` - append-only coin movements
//! - `activity_log` - best-effort audit trail

pub mod activity;
pub mod ledger;
pub mod notes;
pub mod schema;
pub mod users;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::MarketError;

/// SQLite database handle shared across request handlers.
///
/// Writes serialize on the connection mutex; the correctness-critical
/// operations (approve, debit) additionally use single-statement
/// conditional updates so a lost race is detected, not silently applied
/// twice.
pub struct MarketDb {
    conn: Mutex<Connection>,
}

impl MarketDb {
    /// Open or create the marketplace database
    pub fn open(db_path: &Path) -> Result<Self, MarketError> {
        info!("Opening SQLite database at {:?}", db_path);

        let conn = Connection::open(db_path)
            .map_err(|e| MarketError::Database(format!("Failed to open SQLite: {}", e)))?;

        // WAL for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| MarketError::Database(format!("Failed to set PRAGMA: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        db.init_schema()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, MarketError> {
        debug!("Opening in-memory SQLite database");

        let conn = Connection::open_in_memory()
            .map_err(|e| MarketError::Database(format!("Failed to open in-memory SQLite: {}", e)))?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| MarketError::Database(format!("Failed to set PRAGMA: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        db.init_schema()?;

        Ok(db)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<(), MarketError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| MarketError::Internal(format!("Lock poisoned: {}", e)))?;

        schema::init_schema(&conn)?;

        Ok(())
    }

    /// Run a read-only operation against the connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, MarketError>
    where
        F: FnOnce(&Connection) -> Result<T, MarketError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| MarketError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Execute a write operation with exclusive access (for transactions)
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, MarketError>
    where
        F: FnOnce(&mut Connection) -> Result<T, MarketError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| MarketError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    /// Get database statistics for the admin dashboard
    pub fn stats(&self) -> Result<DbStats, MarketError> {
        self.with_conn(|conn| {
            let count = |sql: &str| -> Result<i64, MarketError> {
                conn.query_row(sql, [], |row| row.get(0))
                    .map_err(|e| MarketError::Database(format!("Query failed: {}", e)))
            };

            Ok(DbStats {
                user_count: count("SELECT COUNT(*) FROM users")? as u64,
                note_count: count("SELECT COUNT(*) FROM notes")? as u64,
                pending_count: count("SELECT COUNT(*) FROM notes WHERE status = 'submitted'")?
                    as u64,
                approved_count: count(
                    "SELECT COUNT(*) FROM notes WHERE status IN ('approved', 'published')",
                )? as u64,
                ledger_entry_count: count("SELECT COUNT(*) FROM ledger")? as u64,
                coins_in_circulation: count("SELECT COALESCE(SUM(coin_balance), 0) FROM users")?,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbStats {
    pub user_count: u64,
    pub note_count: u64,
    pub pending_count: u64,
    pub approved_count: u64,
    pub ledger_entry_count: u64,
    pub coins_in_circulation: i64,
}

// Re-exports
pub use activity::{recent_activity, record_activity, ActivityRow};
pub use ledger::{EntryType, LedgerEntry, LedgerQuery};
pub use notes::{CreateNoteInput, NoteCounter, NoteQuery, NoteRow, NoteStatus, UpdateNoteInput};
pub use users::{CreateUserInput, UserQuery, UserRow};
