//! Content record (note) CRUD operations

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MarketError;

/// Note lifecycle status.
///
/// Single tagged value stored as text; the old `isApproved` +
/// `approvalStatus` double tracking does not exist in this schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteStatus {
    Draft,
    Submitted,
    Approved,
    Published,
    Rejected,
    Archived,
}

impl NoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoteStatus::Draft => "draft",
            NoteStatus::Submitted => "submitted",
            NoteStatus::Approved => "approved",
            NoteStatus::Published => "published",
            NoteStatus::Rejected => "rejected",
            NoteStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(NoteStatus::Draft),
            "submitted" => Some(NoteStatus::Submitted),
            "approved" => Some(NoteStatus::Approved),
            "published" => Some(NoteStatus::Published),
            "rejected" => Some(NoteStatus::Rejected),
            "archived" => Some(NoteStatus::Archived),
            _ => None,
        }
    }

    /// Whether the note is visible on the public marketplace
    pub fn is_public(&self) -> bool {
        matches!(self, NoteStatus::Approved | NoteStatus::Published)
    }
}

/// Counters that can be bumped atomically
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteCounter {
    Downloads,
    Views,
    Likes,
}

impl NoteCounter {
    fn column(&self) -> &'static str {
        match self {
            NoteCounter::Downloads => "downloads_count",
            NoteCounter::Views => "views_count",
            NoteCounter::Likes => "likes_count",
        }
    }
}

/// Note row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteRow {
    pub id: String,
    pub title: String,
    pub subject: String,
    pub description: String,
    pub owner_id: String,
    pub status: String,
    pub price_coins: i64,
    pub attachments_json: Option<String>,
    pub downloads_count: i64,
    pub views_count: i64,
    pub likes_count: i64,
    pub reviewer_id: Option<String>,
    pub review_rationale: Option<String>,
    pub reviewed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl NoteRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
            subject: row.get("subject")?,
            description: row.get("description")?,
            owner_id: row.get("owner_id")?,
            status: row.get("status")?,
            price_coins: row.get("price_coins")?,
            attachments_json: row.get("attachments_json")?,
            downloads_count: row.get("downloads_count")?,
            views_count: row.get("views_count")?,
            likes_count: row.get("likes_count")?,
            reviewer_id: row.get("reviewer_id")?,
            review_rationale: row.get("review_rationale")?,
            reviewed_at: row.get("reviewed_at")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    pub fn status(&self) -> NoteStatus {
        // Rows only ever hold values written through NoteStatus
        NoteStatus::parse(&self.status).unwrap_or(NoteStatus::Draft)
    }
}

/// Input for creating a note
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNoteInput {
    pub title: String,
    pub subject: String,
    pub description: String,
    #[serde(default)]
    pub price_coins: i64,
    /// Opaque attachment references (URLs/paths into the object store)
    #[serde(default)]
    pub attachments: Vec<String>,
    /// Create as draft instead of submitting straight away
    #[serde(default)]
    pub draft: bool,
}

/// Minimum description length enforced at creation
const MIN_DESCRIPTION_CHARS: usize = 20;

/// Owner/admin metadata patch
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNoteInput {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price_coins: Option<i64>,
    #[serde(default)]
    pub attachments: Option<Vec<String>>,
}

/// Query parameters for listing notes - camelCase for URL params
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default = "default_sort_by")]
    pub sort_by: String,
    #[serde(default = "default_sort_dir")]
    pub sort_dir: String,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_sort_by() -> String {
    "created_at".to_string()
}

fn default_sort_dir() -> String {
    "desc".to_string()
}

fn default_limit() -> u32 {
    50
}

impl Default for NoteQuery {
    fn default() -> Self {
        Self {
            status: None,
            subject: None,
            owner_id: None,
            search: None,
            sort_by: default_sort_by(),
            sort_dir: default_sort_dir(),
            limit: default_limit(),
            offset: 0,
        }
    }
}

impl NoteQuery {
    /// Resolve the ORDER BY clause from whitelisted columns. Anything
    /// unknown falls back to newest-first.
    fn order_clause(&self) -> String {
        let column = match self.sort_by.as_str() {
            "title" => "title",
            "price" | "price_coins" => "price_coins",
            "downloads" | "downloads_count" => "downloads_count",
            _ => "created_at",
        };
        let dir = if self.sort_dir.eq_ignore_ascii_case("asc") {
            "ASC"
        } else {
            "DESC"
        };
        format!(" ORDER BY {} {}, rowid DESC", column, dir)
    }
}

/// Create a note. Initial status is `submitted` unless `draft` is set.
pub fn create_note(
    conn: &Connection,
    owner_id: &str,
    input: CreateNoteInput,
) -> Result<NoteRow, MarketError> {
    if input.title.trim().is_empty() {
        return Err(MarketError::ValidationFailed(
            "title must not be empty".to_string(),
        ));
    }
    if input.subject.trim().is_empty() {
        return Err(MarketError::ValidationFailed(
            "subject must not be empty".to_string(),
        ));
    }
    if input.description.trim().len() < MIN_DESCRIPTION_CHARS {
        return Err(MarketError::ValidationFailed(format!(
            "description must be at least {} characters",
            MIN_DESCRIPTION_CHARS
        )));
    }
    if input.price_coins < 0 {
        return Err(MarketError::ValidationFailed(
            "price must not be negative".to_string(),
        ));
    }

    let id = Uuid::new_v4().to_string();
    let status = if input.draft {
        NoteStatus::Draft
    } else {
        NoteStatus::Submitted
    };
    let attachments_json = if input.attachments.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&input.attachments)?)
    };

    conn.execute(
        r#"
        INSERT INTO notes (id, title, subject, description, owner_id, status, price_coins, attachments_json)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            id,
            input.title,
            input.subject,
            input.description,
            owner_id,
            status.as_str(),
            input.price_coins,
            attachments_json,
        ],
    )
    .map_err(|e| MarketError::Database(format!("Insert failed: {}", e)))?;

    get_note(conn, &id)?
        .ok_or_else(|| MarketError::Internal("Note not found after insert".to_string()))
}

/// Get note by ID
pub fn get_note(conn: &Connection, id: &str) -> Result<Option<NoteRow>, MarketError> {
    conn.query_row("SELECT * FROM notes WHERE id = ?", params![id], |row| {
        NoteRow::from_row(row)
    })
    .optional()
    .map_err(|e| MarketError::Database(format!("Query failed: {}", e)))
}

/// List notes with optional filters and whitelisted re-sorting.
///
/// Re-sorting only changes the SELECT order; stored rows are untouched.
pub fn list_notes(conn: &Connection, query: &NoteQuery) -> Result<Vec<NoteRow>, MarketError> {
    let mut sql = String::from("SELECT * FROM notes");
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![];
    let mut conditions = vec![];

    if let Some(ref status) = query.status {
        if status == "public" {
            // Marketplace-visible states
            conditions.push("status IN ('approved', 'published')".to_string());
        } else {
            // "pending" is the admin UI's name for awaiting review
            let status = if status == "pending" {
                NoteStatus::Submitted.as_str()
            } else {
                status.as_str()
            };
            conditions.push("status = ?".to_string());
            params.push(Box::new(status.to_string()));
        }
    }

    if let Some(ref subject) = query.subject {
        conditions.push("subject = ?".to_string());
        params.push(Box::new(subject.clone()));
    }

    if let Some(ref owner_id) = query.owner_id {
        conditions.push("owner_id = ?".to_string());
        params.push(Box::new(owner_id.clone()));
    }

    if let Some(ref search) = query.search {
        conditions.push("(title LIKE ? OR description LIKE ?)".to_string());
        let pattern = format!("%{}%", search);
        params.push(Box::new(pattern.clone()));
        params.push(Box::new(pattern));
    }

    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }

    sql.push_str(&query.order_clause());
    sql.push_str(" LIMIT ? OFFSET ?");
    params.push(Box::new(query.limit as i64));
    params.push(Box::new(query.offset as i64));

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| MarketError::Database(format!("Prepare failed: {}", e)))?;

    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

    let rows = stmt
        .query_map(param_refs.as_slice(), |row| NoteRow::from_row(row))
        .map_err(|e| MarketError::Database(format!("Query failed: {}", e)))?;

    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| MarketError::Database(format!("Row parse failed: {}", e)))
}

/// Update note metadata. Owners may edit while the note is a draft;
/// admins may edit in any state.
pub fn update_metadata(
    conn: &Connection,
    note_id: &str,
    actor_id: &str,
    actor_is_admin: bool,
    patch: UpdateNoteInput,
) -> Result<NoteRow, MarketError> {
    let note = get_note(conn, note_id)?
        .ok_or_else(|| MarketError::NotFound(format!("note {}", note_id)))?;

    if !actor_is_admin {
        if note.owner_id != actor_id {
            return Err(MarketError::Forbidden(
                "only the owner may edit this note".to_string(),
            ));
        }
        if note.status() != NoteStatus::Draft {
            return Err(MarketError::InvalidState(format!(
                "metadata is editable only while draft (current: {})",
                note.status
            )));
        }
    }

    if let Some(price) = patch.price_coins {
        if price < 0 {
            return Err(MarketError::ValidationFailed(
                "price must not be negative".to_string(),
            ));
        }
    }

    let attachments_json = match patch.attachments {
        Some(ref refs) if refs.is_empty() => Some(None),
        Some(ref refs) => Some(Some(serde_json::to_string(refs)?)),
        None => None,
    };

    conn.execute(
        r#"
        UPDATE notes SET
            title = COALESCE(?, title),
            subject = COALESCE(?, subject),
            description = COALESCE(?, description),
            price_coins = COALESCE(?, price_coins),
            attachments_json = CASE WHEN ? THEN ? ELSE attachments_json END,
            updated_at = datetime('now')
        WHERE id = ?
        "#,
        params![
            patch.title,
            patch.subject,
            patch.description,
            patch.price_coins,
            attachments_json.is_some(),
            attachments_json.flatten(),
            note_id,
        ],
    )
    .map_err(|e| MarketError::Database(format!("Update failed: {}", e)))?;

    get_note(conn, note_id)?
        .ok_or_else(|| MarketError::Internal("Note vanished during update".to_string()))
}

/// Atomically bump a counter. Single UPDATE statement, so concurrent
/// bumps never lose increments.
pub fn increment_counter(
    conn: &Connection,
    note_id: &str,
    counter: NoteCounter,
) -> Result<(), MarketError> {
    let sql = format!(
        "UPDATE notes SET {col} = {col} + 1 WHERE id = ?",
        col = counter.column()
    );
    let updated = conn
        .execute(&sql, params![note_id])
        .map_err(|e| MarketError::Database(format!("Counter update failed: {}", e)))?;

    if updated == 0 {
        return Err(MarketError::NotFound(format!("note {}", note_id)));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::users::{create_user, CreateUserInput};
    use crate::db::MarketDb;

    fn setup_owner(db: &MarketDb) -> String {
        db.with_conn_mut(|conn| {
            create_user(
                conn,
                CreateUserInput {
                    identifier: format!("owner-{}@example.com", Uuid::new_v4()),
                    identifier_type: "email".to_string(),
                    password_hash: "$argon2id$fake".to_string(),
                    role: "member".to_string(),
                },
                0,
            )
        })
        .unwrap()
        .id
    }

    fn sample_input(title: &str) -> CreateNoteInput {
        CreateNoteInput {
            title: title.to_string(),
            subject: "calculus".to_string(),
            description: "Comprehensive summary of limits and derivatives".to_string(),
            price_coins: 0,
            attachments: vec!["https://cdn.example.com/n1.pdf".to_string()],
            draft: false,
        }
    }

    #[test]
    fn test_create_defaults_to_submitted() {
        let db = MarketDb::open_in_memory().unwrap();
        let owner = setup_owner(&db);

        let note = db
            .with_conn(|conn| create_note(conn, &owner, sample_input("Limits 101")))
            .unwrap();
        assert_eq!(note.status(), NoteStatus::Submitted);

        let mut draft_input = sample_input("Draft note");
        draft_input.draft = true;
        let draft = db
            .with_conn(|conn| create_note(conn, &owner, draft_input))
            .unwrap();
        assert_eq!(draft.status(), NoteStatus::Draft);
    }

    #[test]
    fn test_create_validates_required_fields() {
        let db = MarketDb::open_in_memory().unwrap();
        let owner = setup_owner(&db);

        let mut input = sample_input("x");
        input.title = "   ".to_string();
        let err = db
            .with_conn(|conn| create_note(conn, &owner, input))
            .unwrap_err();
        assert!(matches!(err, MarketError::ValidationFailed(_)));

        let mut input = sample_input("Short description");
        input.description = "too short".to_string();
        let err = db
            .with_conn(|conn| create_note(conn, &owner, input))
            .unwrap_err();
        assert!(matches!(err, MarketError::ValidationFailed(_)));
    }

    #[test]
    fn test_pending_filter_maps_to_submitted() {
        let db = MarketDb::open_in_memory().unwrap();
        let owner = setup_owner(&db);

        db.with_conn(|conn| {
            create_note(conn, &owner, sample_input("Submitted one"))?;
            let mut draft = sample_input("Draft one");
            draft.draft = true;
            create_note(conn, &owner, draft)
        })
        .unwrap();

        let pending = db
            .with_conn(|conn| {
                list_notes(
                    conn,
                    &NoteQuery {
                        status: Some("pending".to_string()),
                        ..Default::default()
                    },
                )
            })
            .unwrap();

        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].status(), NoteStatus::Submitted);
    }

    #[test]
    fn test_sorting_does_not_mutate_rows() {
        let db = MarketDb::open_in_memory().unwrap();
        let owner = setup_owner(&db);

        db.with_conn(|conn| {
            let mut a = sample_input("Alpha");
            a.price_coins = 30;
            create_note(conn, &owner, a)?;
            let mut b = sample_input("Beta");
            b.price_coins = 10;
            create_note(conn, &owner, b)
        })
        .unwrap();

        let by_title = db
            .with_conn(|conn| {
                list_notes(
                    conn,
                    &NoteQuery {
                        sort_by: "title".to_string(),
                        sort_dir: "asc".to_string(),
                        ..Default::default()
                    },
                )
            })
            .unwrap();
        assert_eq!(by_title[0].title, "Alpha");

        let by_price = db
            .with_conn(|conn| {
                list_notes(
                    conn,
                    &NoteQuery {
                        sort_by: "price".to_string(),
                        sort_dir: "asc".to_string(),
                        ..Default::default()
                    },
                )
            })
            .unwrap();
        assert_eq!(by_price[0].title, "Beta");

        // Default order still newest-first regardless of prior queries
        let default_order = db
            .with_conn(|conn| list_notes(conn, &NoteQuery::default()))
            .unwrap();
        assert_eq!(default_order[0].title, "Beta"); // inserted last
    }

    #[test]
    fn test_owner_edits_only_while_draft() {
        let db = MarketDb::open_in_memory().unwrap();
        let owner = setup_owner(&db);

        let submitted = db
            .with_conn(|conn| create_note(conn, &owner, sample_input("Locked")))
            .unwrap();
        let err = db
            .with_conn(|conn| {
                update_metadata(
                    conn,
                    &submitted.id,
                    &owner,
                    false,
                    UpdateNoteInput {
                        title: Some("New title".to_string()),
                        ..Default::default()
                    },
                )
            })
            .unwrap_err();
        assert!(matches!(err, MarketError::InvalidState(_)));

        // Admin can edit regardless of state
        let updated = db
            .with_conn(|conn| {
                update_metadata(
                    conn,
                    &submitted.id,
                    "admin-1",
                    true,
                    UpdateNoteInput {
                        title: Some("Admin title".to_string()),
                        ..Default::default()
                    },
                )
            })
            .unwrap();
        assert_eq!(updated.title, "Admin title");
    }

    #[test]
    fn test_increment_counter() {
        let db = MarketDb::open_in_memory().unwrap();
        let owner = setup_owner(&db);

        let note = db
            .with_conn(|conn| create_note(conn, &owner, sample_input("Counted")))
            .unwrap();

        db.with_conn(|conn| {
            increment_counter(conn, &note.id, NoteCounter::Downloads)?;
            increment_counter(conn, &note.id, NoteCounter::Downloads)?;
            increment_counter(conn, &note.id, NoteCounter::Views)
        })
        .unwrap();

        let reloaded = db.with_conn(|conn| get_note(conn, &note.id)).unwrap().unwrap();
        assert_eq!(reloaded.downloads_count, 2);
        assert_eq!(reloaded.views_count, 1);
        assert_eq!(reloaded.likes_count, 0);

        let err = db
            .with_conn(|conn| increment_counter(conn, "missing", NoteCounter::Likes))
            .unwrap_err();
        assert!(matches!(err, MarketError::NotFound(_)));
    }
}
