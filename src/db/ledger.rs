//! Coin ledger operations
//!
//! Append-only history of every coin movement, paired with the cached
//! balance on the user row. Credit and debit touch both in a single
//! transaction; nothing else writes `coin_balance`.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MarketError;

/// Ledger entry type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    CoinEarned,
    CoinSpent,
    CoinPurchased,
    DownloadFree,
    DownloadPaid,
    UploadReward,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::CoinEarned => "coin_earned",
            EntryType::CoinSpent => "coin_spent",
            EntryType::CoinPurchased => "coin_purchased",
            EntryType::DownloadFree => "download_free",
            EntryType::DownloadPaid => "download_paid",
            EntryType::UploadReward => "upload_reward",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "coin_earned" => Some(EntryType::CoinEarned),
            "coin_spent" => Some(EntryType::CoinSpent),
            "coin_purchased" => Some(EntryType::CoinPurchased),
            "download_free" => Some(EntryType::DownloadFree),
            "download_paid" => Some(EntryType::DownloadPaid),
            "upload_reward" => Some(EntryType::UploadReward),
            _ => None,
        }
    }
}

/// Ledger row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: String,
    pub user_id: String,
    pub entry_type: String,
    pub coin_change: i64,
    pub note_id: Option<String>,
    pub description: Option<String>,
    pub metadata_json: Option<String>,
    pub created_at: String,
}

impl LedgerEntry {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            entry_type: row.get("entry_type")?,
            coin_change: row.get("coin_change")?,
            note_id: row.get("note_id")?,
            description: row.get("description")?,
            metadata_json: row.get("metadata_json")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Query parameters for the admin ledger listing
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerQuery {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub entry_type: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    50
}

impl Default for LedgerQuery {
    fn default() -> Self {
        Self {
            user_id: None,
            entry_type: None,
            limit: default_limit(),
            offset: 0,
        }
    }
}

/// Append a raw ledger entry without touching the balance projection.
///
/// Callers own the surrounding transaction and the matching balance
/// update. `delta` must be non-zero; the schema enforces it too.
pub(crate) fn insert_entry(
    conn: &Connection,
    user_id: &str,
    entry_type: EntryType,
    delta: i64,
    note_id: Option<&str>,
    description: Option<&str>,
    metadata_json: Option<&str>,
) -> Result<String, MarketError> {
    if delta == 0 {
        return Err(MarketError::ValidationFailed(
            "ledger delta must not be zero".to_string(),
        ));
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        r#"
        INSERT INTO ledger (id, user_id, entry_type, coin_change, note_id, description, metadata_json)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            id,
            user_id,
            entry_type.as_str(),
            delta,
            note_id,
            description,
            metadata_json,
        ],
    )
    .map_err(|e| MarketError::Database(format!("Ledger insert failed: {}", e)))?;

    Ok(id)
}

/// Credit coins to a user: one ledger entry plus the matching balance
/// increment, in one transaction.
pub fn credit(
    conn: &mut Connection,
    user_id: &str,
    amount: i64,
    entry_type: EntryType,
    note_id: Option<&str>,
    description: Option<&str>,
) -> Result<LedgerEntry, MarketError> {
    if amount <= 0 {
        return Err(MarketError::ValidationFailed(
            "credit amount must be a positive integer".to_string(),
        ));
    }

    let tx = conn
        .transaction()
        .map_err(|e| MarketError::Database(format!("Transaction failed: {}", e)))?;

    let updated = tx
        .execute(
            "UPDATE users SET coin_balance = coin_balance + ?, updated_at = datetime('now') WHERE id = ?",
            params![amount, user_id],
        )
        .map_err(|e| MarketError::Database(format!("Balance update failed: {}", e)))?;

    if updated == 0 {
        return Err(MarketError::NotFound(format!("user {}", user_id)));
    }

    let entry_id = insert_entry(&tx, user_id, entry_type, amount, note_id, description, None)?;

    tx.commit()
        .map_err(|e| MarketError::Database(format!("Commit failed: {}", e)))?;

    get_entry(conn, &entry_id)
}

/// Debit coins from a user.
///
/// The balance check and decrement are one conditional UPDATE, so two
/// racing debits that would overdraw cannot both succeed: the loser
/// matches zero rows and gets `InsufficientBalance` with nothing written.
pub fn debit(
    conn: &mut Connection,
    user_id: &str,
    amount: i64,
    entry_type: EntryType,
    note_id: Option<&str>,
    description: Option<&str>,
) -> Result<LedgerEntry, MarketError> {
    if amount <= 0 {
        return Err(MarketError::ValidationFailed(
            "debit amount must be a positive integer".to_string(),
        ));
    }

    let tx = conn
        .transaction()
        .map_err(|e| MarketError::Database(format!("Transaction failed: {}", e)))?;

    let updated = tx
        .execute(
            r#"
            UPDATE users
            SET coin_balance = coin_balance - ?, updated_at = datetime('now')
            WHERE id = ? AND coin_balance >= ?
            "#,
            params![amount, user_id, amount],
        )
        .map_err(|e| MarketError::Database(format!("Balance update failed: {}", e)))?;

    if updated == 0 {
        // Distinguish unknown user from overdraw for the error taxonomy
        let available: Option<i64> = tx
            .query_row(
                "SELECT coin_balance FROM users WHERE id = ?",
                params![user_id],
                |row| row.get(0),
            )
            .map_err(|_| MarketError::NotFound(format!("user {}", user_id)))
            .ok();

        return match available {
            Some(available) => Err(MarketError::InsufficientBalance {
                available,
                required: amount,
            }),
            None => Err(MarketError::NotFound(format!("user {}", user_id))),
        };
    }

    let entry_id = insert_entry(&tx, user_id, entry_type, -amount, note_id, description, None)?;

    tx.commit()
        .map_err(|e| MarketError::Database(format!("Commit failed: {}", e)))?;

    get_entry(conn, &entry_id)
}

/// Settle a download in one transaction: debit the buyer, credit the
/// note owner, bump the download counter.
///
/// The note's owner and price are read under the same transaction, so a
/// concurrent price edit cannot charge a stale amount. Free notes and
/// owner re-downloads only bump the counter and return `None`. The
/// buyer-side debit is the same conditional UPDATE as `debit`, so an
/// overdrawing purchase rolls back whole with nothing written on either
/// side.
pub fn settle_download(
    conn: &mut Connection,
    note_id: &str,
    buyer_id: &str,
) -> Result<Option<LedgerEntry>, MarketError> {
    let tx = conn
        .transaction()
        .map_err(|e| MarketError::Database(format!("Transaction failed: {}", e)))?;

    let note: Option<(String, i64)> = tx
        .query_row(
            "SELECT owner_id, price_coins FROM notes WHERE id = ?",
            params![note_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(|e| MarketError::Database(format!("Note lookup failed: {}", e)))?;

    let (owner_id, price) =
        note.ok_or_else(|| MarketError::NotFound(format!("note {}", note_id)))?;

    if price == 0 || owner_id == buyer_id {
        tx.execute(
            "UPDATE notes SET downloads_count = downloads_count + 1 WHERE id = ?",
            params![note_id],
        )
        .map_err(|e| MarketError::Database(format!("Counter update failed: {}", e)))?;
        tx.commit()
            .map_err(|e| MarketError::Database(format!("Commit failed: {}", e)))?;
        return Ok(None);
    }

    let updated = tx
        .execute(
            r#"
            UPDATE users
            SET coin_balance = coin_balance - ?, updated_at = datetime('now')
            WHERE id = ? AND coin_balance >= ?
            "#,
            params![price, buyer_id, price],
        )
        .map_err(|e| MarketError::Database(format!("Balance update failed: {}", e)))?;

    if updated == 0 {
        let available: Option<i64> = tx
            .query_row(
                "SELECT coin_balance FROM users WHERE id = ?",
                params![buyer_id],
                |row| row.get(0),
            )
            .map_err(|_| MarketError::NotFound(format!("user {}", buyer_id)))
            .ok();

        return match available {
            Some(available) => Err(MarketError::InsufficientBalance {
                available,
                required: price,
            }),
            None => Err(MarketError::NotFound(format!("user {}", buyer_id))),
        };
    }

    let buyer_entry = insert_entry(
        &tx,
        buyer_id,
        EntryType::DownloadPaid,
        -price,
        Some(note_id),
        Some("Note download"),
        None,
    )?;

    tx.execute(
        "UPDATE users SET coin_balance = coin_balance + ?, updated_at = datetime('now') WHERE id = ?",
        params![price, owner_id],
    )
    .map_err(|e| MarketError::Database(format!("Owner credit failed: {}", e)))?;

    insert_entry(
        &tx,
        &owner_id,
        EntryType::CoinEarned,
        price,
        Some(note_id),
        Some("Note sold"),
        None,
    )?;

    tx.execute(
        "UPDATE notes SET downloads_count = downloads_count + 1 WHERE id = ?",
        params![note_id],
    )
    .map_err(|e| MarketError::Database(format!("Counter update failed: {}", e)))?;

    tx.commit()
        .map_err(|e| MarketError::Database(format!("Commit failed: {}", e)))?;

    get_entry(conn, &buyer_entry).map(Some)
}

/// Get a single entry by ID
fn get_entry(conn: &Connection, id: &str) -> Result<LedgerEntry, MarketError> {
    conn.query_row("SELECT * FROM ledger WHERE id = ?", params![id], |row| {
        LedgerEntry::from_row(row)
    })
    .map_err(|e| MarketError::Database(format!("Entry fetch failed: {}", e)))
}

/// Ledger history for a user, newest-first
pub fn history(
    conn: &Connection,
    user_id: &str,
    limit: u32,
    offset: u32,
) -> Result<Vec<LedgerEntry>, MarketError> {
    let mut stmt = conn
        .prepare(
            "SELECT * FROM ledger WHERE user_id = ? ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
        )
        .map_err(|e| MarketError::Database(format!("Prepare failed: {}", e)))?;

    let rows = stmt
        .query_map(params![user_id, limit as i64, offset as i64], |row| {
            LedgerEntry::from_row(row)
        })
        .map_err(|e| MarketError::Database(format!("Query failed: {}", e)))?;

    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| MarketError::Database(format!("Row parse failed: {}", e)))
}

/// List entries across users with filters (admin payments view)
pub fn list_entries(
    conn: &Connection,
    query: &LedgerQuery,
) -> Result<Vec<LedgerEntry>, MarketError> {
    let mut sql = String::from("SELECT * FROM ledger");
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![];
    let mut conditions = vec![];

    if let Some(ref user_id) = query.user_id {
        conditions.push("user_id = ?".to_string());
        params.push(Box::new(user_id.clone()));
    }

    if let Some(ref entry_type) = query.entry_type {
        conditions.push("entry_type = ?".to_string());
        params.push(Box::new(entry_type.clone()));
    }

    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }

    sql.push_str(" ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?");
    params.push(Box::new(query.limit as i64));
    params.push(Box::new(query.offset as i64));

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| MarketError::Database(format!("Prepare failed: {}", e)))?;

    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

    let rows = stmt
        .query_map(param_refs.as_slice(), |row| LedgerEntry::from_row(row))
        .map_err(|e| MarketError::Database(format!("Query failed: {}", e)))?;

    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| MarketError::Database(format!("Row parse failed: {}", e)))
}

/// Current balance projection for a user
pub fn balance_of(conn: &Connection, user_id: &str) -> Result<i64, MarketError> {
    conn.query_row(
        "SELECT coin_balance FROM users WHERE id = ?",
        params![user_id],
        |row| row.get(0),
    )
    .map_err(|_| MarketError::NotFound(format!("user {}", user_id)))
}

/// Sum of all ledger deltas for a user (consistency check against the
/// projection)
pub fn ledger_sum(conn: &Connection, user_id: &str) -> Result<i64, MarketError> {
    conn.query_row(
        "SELECT COALESCE(SUM(coin_change), 0) FROM ledger WHERE user_id = ?",
        params![user_id],
        |row| row.get(0),
    )
    .map_err(|e| MarketError::Database(format!("Query failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::users::{create_user, CreateUserInput};
    use crate::db::MarketDb;

    fn setup_user(db: &MarketDb, bonus: i64) -> String {
        db.with_conn_mut(|conn| {
            create_user(
                conn,
                CreateUserInput {
                    identifier: format!("user-{}@example.com", Uuid::new_v4()),
                    identifier_type: "email".to_string(),
                    password_hash: "$argon2id$fake".to_string(),
                    role: "member".to_string(),
                },
                bonus,
            )
        })
        .unwrap()
        .id
    }

    #[test]
    fn test_credit_updates_balance_and_ledger() {
        let db = MarketDb::open_in_memory().unwrap();
        let user = setup_user(&db, 0);

        let entry = db
            .with_conn_mut(|conn| {
                credit(conn, &user, 20, EntryType::UploadReward, None, Some("reward"))
            })
            .unwrap();

        assert_eq!(entry.coin_change, 20);
        assert_eq!(entry.entry_type, "upload_reward");
        assert_eq!(db.with_conn(|c| balance_of(c, &user)).unwrap(), 20);
        assert_eq!(db.with_conn(|c| ledger_sum(c, &user)).unwrap(), 20);
    }

    #[test]
    fn test_debit_overdraw_fails_cleanly() {
        let db = MarketDb::open_in_memory().unwrap();
        let user = setup_user(&db, 10);

        let err = db
            .with_conn_mut(|conn| debit(conn, &user, 15, EntryType::CoinSpent, None, None))
            .unwrap_err();

        match err {
            MarketError::InsufficientBalance {
                available,
                required,
            } => {
                assert_eq!(available, 10);
                assert_eq!(required, 15);
            }
            other => panic!("expected InsufficientBalance, got {:?}", other),
        }

        // Balance unchanged, no entry beyond the starting bonus
        assert_eq!(db.with_conn(|c| balance_of(c, &user)).unwrap(), 10);
        assert_eq!(db.with_conn(|c| history(c, &user, 10, 0)).unwrap().len(), 1);
    }

    #[test]
    fn test_debit_exact_balance_succeeds() {
        let db = MarketDb::open_in_memory().unwrap();
        let user = setup_user(&db, 10);

        db.with_conn_mut(|conn| debit(conn, &user, 10, EntryType::CoinSpent, None, None))
            .unwrap();

        assert_eq!(db.with_conn(|c| balance_of(c, &user)).unwrap(), 0);
        assert_eq!(db.with_conn(|c| ledger_sum(c, &user)).unwrap(), 0);
    }

    #[test]
    fn test_amounts_must_be_positive() {
        let db = MarketDb::open_in_memory().unwrap();
        let user = setup_user(&db, 10);

        for amount in [0, -5] {
            let err = db
                .with_conn_mut(|conn| credit(conn, &user, amount, EntryType::CoinEarned, None, None))
                .unwrap_err();
            assert!(matches!(err, MarketError::ValidationFailed(_)));

            let err = db
                .with_conn_mut(|conn| debit(conn, &user, amount, EntryType::CoinSpent, None, None))
                .unwrap_err();
            assert!(matches!(err, MarketError::ValidationFailed(_)));
        }
    }

    #[test]
    fn test_history_newest_first() {
        let db = MarketDb::open_in_memory().unwrap();
        let user = setup_user(&db, 0);

        db.with_conn_mut(|conn| {
            credit(conn, &user, 5, EntryType::CoinEarned, None, Some("first"))?;
            credit(conn, &user, 7, EntryType::CoinPurchased, None, Some("second"))
        })
        .unwrap();

        let entries = db.with_conn(|c| history(c, &user, 10, 0)).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].description.as_deref(), Some("second"));
        assert_eq!(entries[1].description.as_deref(), Some("first"));
    }

    #[test]
    fn test_projection_matches_ledger_after_mixed_ops() {
        let db = MarketDb::open_in_memory().unwrap();
        let user = setup_user(&db, 50);

        db.with_conn_mut(|conn| {
            credit(conn, &user, 20, EntryType::UploadReward, None, None)?;
            debit(conn, &user, 30, EntryType::DownloadPaid, None, None)?;
            credit(conn, &user, 100, EntryType::CoinPurchased, None, None)?;
            debit(conn, &user, 1, EntryType::CoinSpent, None, None)
        })
        .unwrap();

        let balance = db.with_conn(|c| balance_of(c, &user)).unwrap();
        let sum = db.with_conn(|c| ledger_sum(c, &user)).unwrap();
        assert_eq!(balance, sum);
        assert_eq!(balance, 50 + 20 - 30 + 100 - 1);
    }

    fn insert_note(db: &MarketDb, owner: &str, price: i64) -> String {
        let note_id = Uuid::new_v4().to_string();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notes (id, title, subject, description, owner_id, status, price_coins)
                 VALUES (?, 'T', 'math', 'A sufficiently long description here', ?, 'published', ?)",
                params![note_id, owner, price],
            )
            .map_err(|e| MarketError::Database(e.to_string()))?;
            Ok(())
        })
        .unwrap();
        note_id
    }

    fn downloads_count(db: &MarketDb, note_id: &str) -> i64 {
        db.with_conn(|conn| {
            conn.query_row(
                "SELECT downloads_count FROM notes WHERE id = ?",
                params![note_id],
                |row| row.get(0),
            )
            .map_err(|e| MarketError::Database(e.to_string()))
        })
        .unwrap()
    }

    #[test]
    fn test_settle_download_moves_coins_both_ways() {
        let db = MarketDb::open_in_memory().unwrap();
        let buyer = setup_user(&db, 50);
        let owner = setup_user(&db, 0);
        let note_id = insert_note(&db, &owner, 30);

        let entry = db
            .with_conn_mut(|conn| settle_download(conn, &note_id, &buyer))
            .unwrap()
            .unwrap();
        assert_eq!(entry.coin_change, -30);
        assert_eq!(entry.entry_type, "download_paid");

        assert_eq!(db.with_conn(|c| balance_of(c, &buyer)).unwrap(), 20);
        assert_eq!(db.with_conn(|c| balance_of(c, &owner)).unwrap(), 30);
        assert_eq!(db.with_conn(|c| ledger_sum(c, &buyer)).unwrap(), 20);
        assert_eq!(db.with_conn(|c| ledger_sum(c, &owner)).unwrap(), 30);
        assert_eq!(downloads_count(&db, &note_id), 1);
    }

    #[test]
    fn test_settle_download_overdraw_writes_nothing() {
        let db = MarketDb::open_in_memory().unwrap();
        let buyer = setup_user(&db, 5);
        let owner = setup_user(&db, 0);
        let note_id = insert_note(&db, &owner, 30);

        let err = db
            .with_conn_mut(|conn| settle_download(conn, &note_id, &buyer))
            .unwrap_err();
        assert!(matches!(err, MarketError::InsufficientBalance { .. }));

        assert_eq!(db.with_conn(|c| balance_of(c, &buyer)).unwrap(), 5);
        assert_eq!(db.with_conn(|c| balance_of(c, &owner)).unwrap(), 0);
        assert_eq!(db.with_conn(|c| history(c, &owner, 10, 0)).unwrap().len(), 0);
        assert_eq!(downloads_count(&db, &note_id), 0);
    }

    #[test]
    fn test_settle_download_charges_the_current_price() {
        let db = MarketDb::open_in_memory().unwrap();
        let buyer = setup_user(&db, 50);
        let owner = setup_user(&db, 0);
        let note_id = insert_note(&db, &owner, 30);

        // Price drops after the buyer loaded the listing
        db.with_conn(|conn| {
            conn.execute(
                "UPDATE notes SET price_coins = 10 WHERE id = ?",
                params![note_id],
            )
            .map_err(|e| MarketError::Database(e.to_string()))?;
            Ok(())
        })
        .unwrap();

        let entry = db
            .with_conn_mut(|conn| settle_download(conn, &note_id, &buyer))
            .unwrap()
            .unwrap();
        assert_eq!(entry.coin_change, -10);
        assert_eq!(db.with_conn(|c| balance_of(c, &buyer)).unwrap(), 40);
        assert_eq!(db.with_conn(|c| balance_of(c, &owner)).unwrap(), 10);
    }

    #[test]
    fn test_settle_download_free_and_owner_paths_skip_the_ledger() {
        let db = MarketDb::open_in_memory().unwrap();
        let buyer = setup_user(&db, 50);
        let owner = setup_user(&db, 0);

        let free_note = insert_note(&db, &owner, 0);
        let entry = db
            .with_conn_mut(|conn| settle_download(conn, &free_note, &buyer))
            .unwrap();
        assert!(entry.is_none());
        assert_eq!(downloads_count(&db, &free_note), 1);

        // Owner re-downloading their own priced note is not charged
        let paid_note = insert_note(&db, &owner, 30);
        let entry = db
            .with_conn_mut(|conn| settle_download(conn, &paid_note, &owner))
            .unwrap();
        assert!(entry.is_none());
        assert_eq!(downloads_count(&db, &paid_note), 1);

        assert_eq!(db.with_conn(|c| balance_of(c, &buyer)).unwrap(), 50);
        assert_eq!(db.with_conn(|c| balance_of(c, &owner)).unwrap(), 0);
        assert!(db.with_conn(|c| history(c, &owner, 10, 0)).unwrap().is_empty());
    }

    #[test]
    fn test_settle_download_unknown_note_is_not_found() {
        let db = MarketDb::open_in_memory().unwrap();
        let buyer = setup_user(&db, 50);

        let err = db
            .with_conn_mut(|conn| settle_download(conn, "missing-note", &buyer))
            .unwrap_err();
        assert!(matches!(err, MarketError::NotFound(_)));
        assert_eq!(db.with_conn(|c| balance_of(c, &buyer)).unwrap(), 50);
    }

    #[test]
    fn test_entry_type_round_trip() {
        for t in [
            EntryType::CoinEarned,
            EntryType::CoinSpent,
            EntryType::CoinPurchased,
            EntryType::DownloadFree,
            EntryType::DownloadPaid,
            EntryType::UploadReward,
        ] {
            assert_eq!(EntryType::parse(t.as_str()), Some(t));
        }
        assert_eq!(EntryType::parse("bogus"), None);
    }
}
