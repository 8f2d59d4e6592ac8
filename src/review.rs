//! Review workflow for content records
//!
//! The approve/reject state machine that gates marketplace visibility and
//! triggers the upload reward. Transitions are one-directional:
//!
//! - draft -> submitted (owner)
//! - submitted -> approved (reviewer, credits the reward)
//! - submitted -> rejected (reviewer; terminal, resubmission is a new note)
//! - approved -> published
//!
//! Every transition is a single conditional UPDATE on the current status,
//! so a retried or racing request loses cleanly with `InvalidState`
//! instead of applying twice. Approve performs the status flip, the
//! decision insert, the ledger append, and the balance bump in one
//! transaction.

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::db::ledger::{self, EntryType};
use crate::db::notes::{self, NoteStatus};
use crate::error::MarketError;

/// Tunable business rules for the workflow
#[derive(Debug, Clone)]
pub struct ReviewPolicy {
    /// Coins credited to the owner on approval
    pub reward_coins: i64,
    /// Minimum rationale length in words; 0 means only non-empty.
    /// One legacy admin UI required 60, which is this knob, not a
    /// hard-wired rule.
    pub min_rationale_words: usize,
}

impl Default for ReviewPolicy {
    fn default() -> Self {
        Self {
            reward_coins: 20,
            min_rationale_words: 0,
        }
    }
}

impl ReviewPolicy {
    /// Validate a rationale against the configured policy
    pub fn check_rationale(&self, rationale: &str) -> Result<(), MarketError> {
        let words = rationale.split_whitespace().count();
        if words == 0 {
            return Err(MarketError::ValidationFailed(
                "a rationale is required".to_string(),
            ));
        }
        if words < self.min_rationale_words {
            return Err(MarketError::ValidationFailed(format!(
                "rationale must be at least {} words (got {})",
                self.min_rationale_words, words
            )));
        }
        Ok(())
    }
}

/// A recorded review decision
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewDecision {
    pub id: String,
    pub note_id: String,
    pub outcome: String,
    pub reviewer_id: String,
    pub rationale: String,
    pub decided_at: String,
}

/// Flip a note's status if and only if it currently has the expected one.
/// Returns false when the note exists but the transition lost (wrong or
/// already-changed state).
fn transition_status(
    conn: &Connection,
    note_id: &str,
    from: NoteStatus,
    to: NoteStatus,
    reviewer_id: Option<&str>,
    rationale: Option<&str>,
) -> Result<bool, MarketError> {
    let updated = conn
        .execute(
            r#"
            UPDATE notes
            SET status = ?,
                reviewer_id = COALESCE(?, reviewer_id),
                review_rationale = COALESCE(?, review_rationale),
                reviewed_at = CASE WHEN ? IS NULL THEN reviewed_at ELSE datetime('now') END,
                updated_at = datetime('now')
            WHERE id = ? AND status = ?
            "#,
            params![
                to.as_str(),
                reviewer_id,
                rationale,
                reviewer_id,
                note_id,
                from.as_str(),
            ],
        )
        .map_err(|e| MarketError::Database(format!("Status update failed: {}", e)))?;

    Ok(updated == 1)
}

fn insert_decision(
    conn: &Connection,
    note_id: &str,
    outcome: &str,
    reviewer_id: &str,
    rationale: &str,
) -> Result<(), MarketError> {
    conn.execute(
        r#"
        INSERT INTO review_decisions (id, note_id, outcome, reviewer_id, rationale)
        VALUES (?, ?, ?, ?, ?)
        "#,
        params![
            Uuid::new_v4().to_string(),
            note_id,
            outcome,
            reviewer_id,
            rationale
        ],
    )
    .map_err(|e| MarketError::Database(format!("Decision insert failed: {}", e)))?;
    Ok(())
}

/// Map a failed transition to the right error: NotFound for unknown ids,
/// InvalidState otherwise.
fn transition_error(
    conn: &Connection,
    note_id: &str,
    wanted: NoteStatus,
) -> Result<MarketError, MarketError> {
    match notes::get_note(conn, note_id)? {
        None => Ok(MarketError::NotFound(format!("note {}", note_id))),
        Some(note) => Ok(MarketError::InvalidState(format!(
            "note {} is '{}', expected '{}'",
            note_id,
            note.status,
            wanted.as_str()
        ))),
    }
}

/// Owner submits a draft for review. No ledger effect.
pub fn submit(conn: &Connection, note_id: &str, owner_id: &str) -> Result<(), MarketError> {
    let note = notes::get_note(conn, note_id)?
        .ok_or_else(|| MarketError::NotFound(format!("note {}", note_id)))?;

    if note.owner_id != owner_id {
        return Err(MarketError::Forbidden(
            "only the owner may submit this note".to_string(),
        ));
    }

    if !transition_status(conn, note_id, NoteStatus::Draft, NoteStatus::Submitted, None, None)? {
        return Err(transition_error(conn, note_id, NoteStatus::Draft)?);
    }

    info!(note_id = %note_id, "Note submitted for review");
    Ok(())
}

/// Approve a submitted note and credit the owner the upload reward.
///
/// Returns the reward amount credited. A repeated or concurrent approve
/// of the same note fails the conditional status flip and credits
/// nothing.
pub fn approve(
    conn: &mut Connection,
    policy: &ReviewPolicy,
    note_id: &str,
    reviewer_id: &str,
    rationale: &str,
) -> Result<i64, MarketError> {
    policy.check_rationale(rationale)?;

    let tx = conn
        .transaction()
        .map_err(|e| MarketError::Database(format!("Transaction failed: {}", e)))?;

    if !transition_status(
        &tx,
        note_id,
        NoteStatus::Submitted,
        NoteStatus::Approved,
        Some(reviewer_id),
        Some(rationale),
    )? {
        return Err(transition_error(&tx, note_id, NoteStatus::Submitted)?);
    }

    let owner_id: String = tx
        .query_row(
            "SELECT owner_id FROM notes WHERE id = ?",
            params![note_id],
            |row| row.get(0),
        )
        .map_err(|e| MarketError::Database(format!("Owner lookup failed: {}", e)))?;

    insert_decision(&tx, note_id, "approved", reviewer_id, rationale)?;

    // Reward: ledger entry + balance projection, inside this transaction
    tx.execute(
        "UPDATE users SET coin_balance = coin_balance + ?, updated_at = datetime('now') WHERE id = ?",
        params![policy.reward_coins, owner_id],
    )
    .map_err(|e| MarketError::Database(format!("Reward credit failed: {}", e)))?;

    ledger::insert_entry(
        &tx,
        &owner_id,
        EntryType::UploadReward,
        policy.reward_coins,
        Some(note_id),
        Some("Upload approved"),
        None,
    )?;

    tx.commit()
        .map_err(|e| MarketError::Database(format!("Commit failed: {}", e)))?;

    info!(note_id = %note_id, reviewer = %reviewer_id, reward = policy.reward_coins, "Note approved");
    Ok(policy.reward_coins)
}

/// Reject a submitted note. Records the rationale for the owner; no
/// ledger effect.
pub fn reject(
    conn: &mut Connection,
    policy: &ReviewPolicy,
    note_id: &str,
    reviewer_id: &str,
    rationale: &str,
) -> Result<(), MarketError> {
    policy.check_rationale(rationale)?;

    let tx = conn
        .transaction()
        .map_err(|e| MarketError::Database(format!("Transaction failed: {}", e)))?;

    if !transition_status(
        &tx,
        note_id,
        NoteStatus::Submitted,
        NoteStatus::Rejected,
        Some(reviewer_id),
        Some(rationale),
    )? {
        return Err(transition_error(&tx, note_id, NoteStatus::Submitted)?);
    }

    insert_decision(&tx, note_id, "rejected", reviewer_id, rationale)?;

    tx.commit()
        .map_err(|e| MarketError::Database(format!("Commit failed: {}", e)))?;

    info!(note_id = %note_id, reviewer = %reviewer_id, "Note rejected");
    Ok(())
}

/// Publish an approved note to the marketplace
pub fn publish(conn: &Connection, note_id: &str) -> Result<(), MarketError> {
    if !transition_status(conn, note_id, NoteStatus::Approved, NoteStatus::Published, None, None)? {
        return Err(transition_error(conn, note_id, NoteStatus::Approved)?);
    }
    Ok(())
}

/// Hard-delete a note (admin only, checked at the route).
///
/// Ledger entries referencing the note survive with their note_id nulled
/// in the same transaction: financial history is append-only and outlives
/// the content it describes.
pub fn delete(conn: &mut Connection, note_id: &str) -> Result<(), MarketError> {
    let tx = conn
        .transaction()
        .map_err(|e| MarketError::Database(format!("Transaction failed: {}", e)))?;

    tx.execute(
        "UPDATE ledger SET note_id = NULL WHERE note_id = ?",
        params![note_id],
    )
    .map_err(|e| MarketError::Database(format!("Ledger detach failed: {}", e)))?;

    let deleted = tx
        .execute("DELETE FROM notes WHERE id = ?", params![note_id])
        .map_err(|e| MarketError::Database(format!("Delete failed: {}", e)))?;

    if deleted == 0 {
        return Err(MarketError::NotFound(format!("note {}", note_id)));
    }

    tx.commit()
        .map_err(|e| MarketError::Database(format!("Commit failed: {}", e)))?;

    info!(note_id = %note_id, "Note hard-deleted");
    Ok(())
}

/// Decision history for a note, newest-first
pub fn decisions_for_note(
    conn: &Connection,
    note_id: &str,
) -> Result<Vec<ReviewDecision>, MarketError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, note_id, outcome, reviewer_id, rationale, decided_at
             FROM review_decisions WHERE note_id = ? ORDER BY decided_at DESC, rowid DESC",
        )
        .map_err(|e| MarketError::Database(format!("Prepare failed: {}", e)))?;

    let rows = stmt
        .query_map(params![note_id], |row| {
            Ok(ReviewDecision {
                id: row.get(0)?,
                note_id: row.get(1)?,
                outcome: row.get(2)?,
                reviewer_id: row.get(3)?,
                rationale: row.get(4)?,
                decided_at: row.get(5)?,
            })
        })
        .map_err(|e| MarketError::Database(format!("Query failed: {}", e)))?;

    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| MarketError::Database(format!("Row parse failed: {}", e)))
}
