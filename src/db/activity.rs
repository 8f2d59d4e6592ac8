//! Admin activity log
//!
//! Best-effort audit trail. `record_activity` is called after the primary
//! operation commits; callers wrap it in `log_best_effort` so a failed
//! log write never rolls back or fails the action it describes.

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::MarketError;

/// Activity row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRow {
    pub id: String,
    pub actor_id: String,
    pub action: String,
    pub target_type: String,
    pub target_id: String,
    pub details_json: Option<String>,
    pub created_at: String,
}

impl ActivityRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            actor_id: row.get("actor_id")?,
            action: row.get("action")?,
            target_type: row.get("target_type")?,
            target_id: row.get("target_id")?,
            details_json: row.get("details_json")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Append one activity entry
pub fn record_activity(
    conn: &Connection,
    actor_id: &str,
    action: &str,
    target_type: &str,
    target_id: &str,
    details_json: Option<&str>,
) -> Result<(), MarketError> {
    conn.execute(
        r#"
        INSERT INTO activity_log (id, actor_id, action, target_type, target_id, details_json)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
        params![
            Uuid::new_v4().to_string(),
            actor_id,
            action,
            target_type,
            target_id,
            details_json,
        ],
    )
    .map_err(|e| MarketError::Database(format!("Activity insert failed: {}", e)))?;

    Ok(())
}

/// Record an activity entry, swallowing failures.
///
/// The dashboard simply shows fewer entries if a write was lost.
pub fn log_best_effort(
    db: &crate::db::MarketDb,
    actor_id: &str,
    action: &str,
    target_type: &str,
    target_id: &str,
    details_json: Option<&str>,
) {
    let result = db.with_conn(|conn| {
        record_activity(conn, actor_id, action, target_type, target_id, details_json)
    });
    if let Err(e) = result {
        warn!(action = %action, error = %e, "Activity log write failed (non-fatal)");
    }
}

/// Recent activity, newest-first
pub fn recent_activity(conn: &Connection, limit: u32) -> Result<Vec<ActivityRow>, MarketError> {
    let mut stmt = conn
        .prepare("SELECT * FROM activity_log ORDER BY created_at DESC, rowid DESC LIMIT ?")
        .map_err(|e| MarketError::Database(format!("Prepare failed: {}", e)))?;

    let rows = stmt
        .query_map(params![limit as i64], |row| ActivityRow::from_row(row))
        .map_err(|e| MarketError::Database(format!("Query failed: {}", e)))?;

    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| MarketError::Database(format!("Row parse failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MarketDb;

    #[test]
    fn test_record_and_recent() {
        let db = MarketDb::open_in_memory().unwrap();

        db.with_conn(|conn| {
            record_activity(conn, "admin-1", "note_approved", "note", "n1", None)?;
            record_activity(
                conn,
                "admin-1",
                "note_rejected",
                "note",
                "n2",
                Some(r#"{"reason":"duplicate"}"#),
            )
        })
        .unwrap();

        let recent = db.with_conn(|conn| recent_activity(conn, 10)).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].action, "note_rejected");
        assert_eq!(recent[1].action, "note_approved");
    }

    #[test]
    fn test_recent_respects_limit() {
        let db = MarketDb::open_in_memory().unwrap();

        db.with_conn(|conn| {
            for i in 0..5 {
                record_activity(conn, "admin-1", "ping", "system", &format!("t{}", i), None)?;
            }
            Ok(())
        })
        .unwrap();

        let recent = db.with_conn(|conn| recent_activity(conn, 3)).unwrap();
        assert_eq!(recent.len(), 3);
    }
}
