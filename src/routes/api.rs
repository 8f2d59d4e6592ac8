//! Public marketplace and member API
//!
//! ## Endpoints
//!
//! - `POST /api/notes` - Upload a note (member; enters review unless draft)
//! - `GET /api/notes` - Browse the marketplace (approved/published only)
//! - `GET /api/notes/{id}` - Note details, bumps the view counter
//! - `PUT /api/notes/{id}` - Edit metadata (owner while draft, or admin)
//! - `POST /api/notes/{id}/submit` - Submit a draft for review (owner)
//! - `POST /api/notes/{id}/download` - Download; debits the price for paid notes
//! - `GET /api/wallet` - Current balance
//! - `GET /api/wallet/history` - Ledger history, newest-first
//!
//! Members may pass `mine=true` to `GET /api/notes` to see their own
//! notes in every lifecycle state.

use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::auth::PermissionLevel;
use crate::db::activity;
use crate::db::ledger::{self, LedgerEntry};
use crate::db::notes::{self, CreateNoteInput, NoteCounter, UpdateNoteInput};
use crate::review;
use crate::routes::admin::note_query_from_request;
use crate::routes::{
    authenticate, error_response, json_response, market_error_response, not_found, query_pairs,
    require_member, FullBody, SuccessResponse,
};
use crate::server::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DownloadResponse {
    success: bool,
    charged: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    entry: Option<LedgerEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WalletResponse {
    balance: i64,
    recent: Vec<LedgerEntry>,
}

/// Dispatch /api/* requests
pub async fn handle_api_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
    path: &str,
) -> Response<FullBody> {
    let method = req.method().clone();
    let subpath = path.strip_prefix("/api").unwrap_or("");

    match (method, subpath) {
        (Method::POST, "/notes") => handle_create_note(req, state).await,

        (Method::GET, "/notes") | (Method::GET, "/notes/") => handle_list_notes(req, state),

        (Method::POST, p) if p.starts_with("/notes/") && p.ends_with("/submit") => {
            let id = note_id_from(p, "/submit");
            handle_submit(req, state, &id)
        }

        (Method::POST, p) if p.starts_with("/notes/") && p.ends_with("/download") => {
            let id = note_id_from(p, "/download");
            handle_download(req, state, &id)
        }

        (Method::PUT, p) if p.starts_with("/notes/") => {
            let id = p.strip_prefix("/notes/").unwrap_or("").to_string();
            handle_update_note(req, state, &id).await
        }

        (Method::GET, p) if p.starts_with("/notes/") => {
            let id = p.strip_prefix("/notes/").unwrap_or("").to_string();
            handle_get_note(req, state, &id)
        }

        (Method::GET, "/wallet") => handle_wallet(req, state),

        (Method::GET, "/wallet/history") => handle_wallet_history(req, state),

        _ => not_found(path),
    }
}

fn note_id_from(subpath: &str, suffix: &str) -> String {
    subpath
        .strip_prefix("/notes/")
        .and_then(|s| s.strip_suffix(suffix))
        .unwrap_or("")
        .to_string()
}

/// POST /api/notes
async fn handle_create_note(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    let claims = match require_member(&req, &state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let body_bytes = match req.into_body().collect().await {
        Ok(b) => b.to_bytes(),
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "Failed to read request body", None),
    };

    let input: CreateNoteInput = match serde_json::from_slice(&body_bytes) {
        Ok(i) => i,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, &format!("Invalid JSON: {}", e), None)
        }
    };

    let note = match state
        .db
        .with_conn(|conn| notes::create_note(conn, &claims.sub, input))
    {
        Ok(n) => n,
        Err(e) => return market_error_response(&e),
    };

    activity::log_best_effort(&state.db, &claims.sub, "note_created", "note", &note.id, None);
    info!(note_id = %note.id, owner = %claims.sub, status = %note.status, "Note created");

    json_response(StatusCode::CREATED, &note)
}

/// GET /api/notes
///
/// Anonymous browsing sees only marketplace-visible notes. `mine=true`
/// switches to the caller's own notes across all states.
fn handle_list_notes(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    let mine = query_pairs(req.uri().query())
        .iter()
        .any(|(k, v)| k == "mine" && v == "true");

    let mut query = note_query_from_request(&req);

    if mine {
        let claims = match require_member(&req, &state) {
            Ok(c) => c,
            Err(resp) => return resp,
        };
        query.owner_id = Some(claims.sub);
    } else {
        // Public browsing cannot reach into the review pipeline
        match query.status.as_deref() {
            Some("approved") | Some("published") => {}
            _ => query.status = Some("public".to_string()),
        }
    }

    match state.db.with_conn(|conn| notes::list_notes(conn, &query)) {
        Ok(found) => json_response(StatusCode::OK, &found),
        Err(e) => market_error_response(&e),
    }
}

/// PUT /api/notes/{id}
async fn handle_update_note(
    req: Request<Incoming>,
    state: Arc<AppState>,
    note_id: &str,
) -> Response<FullBody> {
    let claims = match require_member(&req, &state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let body_bytes = match req.into_body().collect().await {
        Ok(b) => b.to_bytes(),
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "Failed to read request body", None),
    };

    let patch: UpdateNoteInput = match serde_json::from_slice(&body_bytes) {
        Ok(p) => p,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, &format!("Invalid JSON: {}", e), None)
        }
    };

    let is_admin = claims.permission_level >= PermissionLevel::Admin;
    let note = match state
        .db
        .with_conn(|conn| notes::update_metadata(conn, note_id, &claims.sub, is_admin, patch))
    {
        Ok(n) => n,
        Err(e) => return market_error_response(&e),
    };

    activity::log_best_effort(&state.db, &claims.sub, "note_updated", "note", note_id, None);

    json_response(StatusCode::OK, &note)
}

/// GET /api/notes/{id}
fn handle_get_note(req: Request<Incoming>, state: Arc<AppState>, note_id: &str) -> Response<FullBody> {
    let note = match state.db.with_conn(|conn| notes::get_note(conn, note_id)) {
        Ok(Some(n)) => n,
        Ok(None) => return note_not_found(),
        Err(e) => return market_error_response(&e),
    };

    if !note.status().is_public() {
        // Owners and admins can see their own pipeline
        let visible = match authenticate(&req, &state) {
            Ok(claims) => {
                claims.sub == note.owner_id || claims.permission_level >= PermissionLevel::Admin
            }
            Err(_) => false,
        };
        if !visible {
            return note_not_found();
        }
    } else {
        // Fire-and-forget view bump for public reads
        let _ = state
            .db
            .with_conn(|conn| notes::increment_counter(conn, note_id, NoteCounter::Views));
    }

    json_response(StatusCode::OK, &note)
}

/// POST /api/notes/{id}/submit
fn handle_submit(req: Request<Incoming>, state: Arc<AppState>, note_id: &str) -> Response<FullBody> {
    let claims = match require_member(&req, &state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    if let Err(e) = state
        .db
        .with_conn(|conn| review::submit(conn, note_id, &claims.sub))
    {
        return market_error_response(&e);
    }

    activity::log_best_effort(&state.db, &claims.sub, "note_submitted", "note", note_id, None);

    json_response(
        StatusCode::OK,
        &SuccessResponse {
            success: true,
            message: "Note submitted for review".to_string(),
        },
    )
}

/// POST /api/notes/{id}/download
///
/// Free notes (and an owner re-downloading their own) just bump the
/// counter. Paid notes settle buyer debit, owner credit, and the counter
/// in one transaction; an overdraw leaves everything untouched. The
/// settle reads the price itself, so a concurrent price edit cannot
/// charge a stale amount.
fn handle_download(req: Request<Incoming>, state: Arc<AppState>, note_id: &str) -> Response<FullBody> {
    let claims = match require_member(&req, &state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let note = match state.db.with_conn(|conn| notes::get_note(conn, note_id)) {
        Ok(Some(n)) => n,
        Ok(None) => return note_not_found(),
        Err(e) => return market_error_response(&e),
    };

    if !note.status().is_public() {
        return market_error_response(&crate::error::MarketError::InvalidState(format!(
            "note {} is not available for download",
            note_id
        )));
    }

    let result = state
        .db
        .with_conn_mut(|conn| ledger::settle_download(conn, note_id, &claims.sub));

    match result {
        Ok(entry) => {
            activity::log_best_effort(
                &state.db,
                &claims.sub,
                "note_downloaded",
                "note",
                note_id,
                None,
            );
            let charged = entry.as_ref().map(|e| -e.coin_change).unwrap_or(0);
            json_response(
                StatusCode::OK,
                &DownloadResponse {
                    success: true,
                    charged,
                    entry,
                },
            )
        }
        Err(e) => market_error_response(&e),
    }
}

/// GET /api/wallet
fn handle_wallet(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    let claims = match require_member(&req, &state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let result = state.db.with_conn(|conn| {
        let balance = ledger::balance_of(conn, &claims.sub)?;
        let recent = ledger::history(conn, &claims.sub, 10, 0)?;
        Ok(WalletResponse { balance, recent })
    });

    match result {
        Ok(wallet) => json_response(StatusCode::OK, &wallet),
        Err(e) => market_error_response(&e),
    }
}

/// GET /api/wallet/history
fn handle_wallet_history(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    let claims = match require_member(&req, &state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let mut limit: u32 = 50;
    let mut offset: u32 = 0;
    for (key, value) in query_pairs(req.uri().query()) {
        match key.as_str() {
            "limit" => limit = value.parse().unwrap_or(limit),
            "offset" => offset = value.parse().unwrap_or(0),
            _ => {}
        }
    }

    match state
        .db
        .with_conn(|conn| ledger::history(conn, &claims.sub, limit.min(500), offset))
    {
        Ok(entries) => json_response(StatusCode::OK, &entries),
        Err(e) => market_error_response(&e),
    }
}

fn note_not_found() -> Response<FullBody> {
    error_response(StatusCode::NOT_FOUND, "Note not found", Some("NOT_FOUND"))
}
