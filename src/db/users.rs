//! User account CRUD operations

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::ledger;
use crate::error::MarketError;

/// User row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRow {
    pub id: String,
    pub identifier: String,
    pub identifier_type: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub coin_balance: i64,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl UserRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            identifier: row.get("identifier")?,
            identifier_type: row.get("identifier_type")?,
            password_hash: row.get("password_hash")?,
            role: row.get("role")?,
            coin_balance: row.get("coin_balance")?,
            is_active: row.get::<_, i64>("is_active")? != 0,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// Input for creating a user
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserInput {
    pub identifier: String,
    #[serde(default = "default_identifier_type")]
    pub identifier_type: String,
    pub password_hash: String,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_identifier_type() -> String {
    "email".to_string()
}

fn default_role() -> String {
    "member".to_string()
}

/// Query parameters for listing users
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    50
}

impl Default for UserQuery {
    fn default() -> Self {
        Self {
            search: None,
            role: None,
            is_active: None,
            limit: default_limit(),
            offset: 0,
        }
    }
}

/// Create a user and grant the starting bonus in one transaction.
///
/// The bonus is written to both the balance projection and the ledger so
/// the consistency invariant holds from the account's first moment.
pub fn create_user(
    conn: &mut Connection,
    input: CreateUserInput,
    starting_bonus: i64,
) -> Result<UserRow, MarketError> {
    if input.identifier.trim().is_empty() {
        return Err(MarketError::ValidationFailed(
            "identifier must not be empty".to_string(),
        ));
    }

    let id = Uuid::new_v4().to_string();

    let tx = conn
        .transaction()
        .map_err(|e| MarketError::Database(format!("Transaction failed: {}", e)))?;

    let inserted = tx.execute(
        r#"
        INSERT INTO users (id, identifier, identifier_type, password_hash, role, coin_balance)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
        params![
            id,
            input.identifier,
            input.identifier_type,
            input.password_hash,
            input.role,
            starting_bonus,
        ],
    );

    match inserted {
        Ok(_) => {}
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            return Err(MarketError::Conflict(format!(
                "identifier '{}' is already registered",
                input.identifier
            )));
        }
        Err(e) => return Err(MarketError::Database(format!("Insert failed: {}", e))),
    }

    if starting_bonus > 0 {
        ledger::insert_entry(
            &tx,
            &id,
            ledger::EntryType::CoinEarned,
            starting_bonus,
            None,
            Some("Starting bonus"),
            None,
        )?;
    }

    tx.commit()
        .map_err(|e| MarketError::Database(format!("Commit failed: {}", e)))?;

    get_user(conn, &id)?
        .ok_or_else(|| MarketError::Internal("User not found after insert".to_string()))
}

/// Get user by ID
pub fn get_user(conn: &Connection, id: &str) -> Result<Option<UserRow>, MarketError> {
    conn.query_row("SELECT * FROM users WHERE id = ?", params![id], |row| {
        UserRow::from_row(row)
    })
    .optional()
    .map_err(|e| MarketError::Database(format!("Query failed: {}", e)))
}

/// Get user by identifier (login)
pub fn get_user_by_identifier(
    conn: &Connection,
    identifier: &str,
) -> Result<Option<UserRow>, MarketError> {
    conn.query_row(
        "SELECT * FROM users WHERE identifier = ?",
        params![identifier],
        |row| UserRow::from_row(row),
    )
    .optional()
    .map_err(|e| MarketError::Database(format!("Query failed: {}", e)))
}

/// List users with optional filters, newest-first
pub fn list_users(conn: &Connection, query: &UserQuery) -> Result<Vec<UserRow>, MarketError> {
    let mut sql = String::from("SELECT * FROM users");
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![];
    let mut conditions = vec![];

    if let Some(ref search) = query.search {
        conditions.push("identifier LIKE ?".to_string());
        params.push(Box::new(format!("%{}%", search)));
    }

    if let Some(ref role) = query.role {
        conditions.push("role = ?".to_string());
        params.push(Box::new(role.clone()));
    }

    if let Some(is_active) = query.is_active {
        conditions.push("is_active = ?".to_string());
        params.push(Box::new(is_active as i64));
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
        .query_map(param_refs.as_slice(), |row| UserRow::from_row(row))
        .map_err(|e| MarketError::Database(format!("Query failed: {}", e)))?;

    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| MarketError::Database(format!("Row parse failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MarketDb;

    fn test_input(identifier: &str) -> CreateUserInput {
        CreateUserInput {
            identifier: identifier.to_string(),
            identifier_type: "email".to_string(),
            password_hash: "$argon2id$fake".to_string(),
            role: "member".to_string(),
        }
    }

    #[test]
    fn test_create_user_grants_starting_bonus() {
        let db = MarketDb::open_in_memory().unwrap();

        let user = db
            .with_conn_mut(|conn| create_user(conn, test_input("alice@example.com"), 50))
            .unwrap();

        assert_eq!(user.coin_balance, 50);

        // The bonus is backed by a ledger entry
        let sum = db
            .with_conn(|conn| ledger::ledger_sum(conn, &user.id))
            .unwrap();
        assert_eq!(sum, 50);
    }

    #[test]
    fn test_duplicate_identifier_conflicts() {
        let db = MarketDb::open_in_memory().unwrap();

        db.with_conn_mut(|conn| create_user(conn, test_input("bob@example.com"), 0))
            .unwrap();
        let err = db
            .with_conn_mut(|conn| create_user(conn, test_input("bob@example.com"), 0))
            .unwrap_err();

        assert!(matches!(err, MarketError::Conflict(_)));
    }

    #[test]
    fn test_zero_bonus_writes_no_ledger_entry() {
        let db = MarketDb::open_in_memory().unwrap();

        let user = db
            .with_conn_mut(|conn| create_user(conn, test_input("carol@example.com"), 0))
            .unwrap();

        assert_eq!(user.coin_balance, 0);
        let history = db
            .with_conn(|conn| ledger::history(conn, &user.id, 10, 0))
            .unwrap();
        assert!(history.is_empty());
    }

    #[test]
    fn test_list_users_filters() {
        let db = MarketDb::open_in_memory().unwrap();

        db.with_conn_mut(|conn| {
            create_user(conn, test_input("dora@example.com"), 0)?;
            let mut admin = test_input("admin@example.com");
            admin.role = "admin".to_string();
            create_user(conn, admin, 0)
        })
        .unwrap();

        let admins = db
            .with_conn(|conn| {
                list_users(
                    conn,
                    &UserQuery {
                        role: Some("admin".to_string()),
                        ..Default::default()
                    },
                )
            })
            .unwrap();
        assert_eq!(admins.len(), 1);
        assert_eq!(admins[0].identifier, "admin@example.com");
    }
}
