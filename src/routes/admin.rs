//! Admin API endpoints for the review dashboard
//!
//! ## Endpoints
//!
//! - `POST /admin/notes/{id}/approve` - Approve a submitted note, credit the reward
//! - `POST /admin/notes/{id}/reject` - Reject a submitted note with rationale
//! - `DELETE /admin/notes/{id}` - Hard-delete a note, keep its ledger history
//! - `GET /admin/notes` - List notes with filters (status=pending for the queue)
//! - `GET /admin/notes/{id}` - Note details with decision history
//! - `GET /admin/users` - List accounts with search and filters
//! - `GET /admin/payments` - Ledger entries across all users
//! - `GET /admin/stats` - Dashboard counters
//! - `GET /admin/logs` - Recent admin activity
//!
//! ## Authentication
//!
//! All endpoints require Admin permission, via JWT or the legacy
//! `x-api-key` header.

use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::db::activity;
use crate::db::ledger::{self, LedgerQuery};
use crate::db::notes::{self, NoteQuery, NoteRow};
use crate::db::users::{self, UserQuery};
use crate::review::{self, ReviewDecision};
use crate::routes::{
    error_response, json_response, market_error_response, not_found, query_pairs, require_admin,
    FullBody, SuccessResponse,
};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DecisionRequest {
    /// Admin panels send `approvalReason` on approve and `reason` on
    /// reject; all spellings land in the same field.
    #[serde(default, alias = "approvalReason", alias = "reason")]
    rationale: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApproveResponse {
    success: bool,
    coin_reward: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NoteDetailsResponse {
    #[serde(flatten)]
    note: NoteRow,
    decisions: Vec<ReviewDecision>,
}

/// Dispatch /admin/* requests
pub async fn handle_admin_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
    path: &str,
) -> Response<FullBody> {
    let method = req.method().clone();
    let subpath = path.strip_prefix("/admin").unwrap_or("");

    match (method, subpath) {
        (Method::POST, p) if p.starts_with("/notes/") && p.ends_with("/approve") => {
            let id = strip_note_id(p, "/approve");
            handle_approve(req, state, &id).await
        }

        (Method::POST, p) if p.starts_with("/notes/") && p.ends_with("/reject") => {
            let id = strip_note_id(p, "/reject");
            handle_reject(req, state, &id).await
        }

        (Method::DELETE, p) if p.starts_with("/notes/") => {
            let id = p.strip_prefix("/notes/").unwrap_or("").to_string();
            handle_delete(req, state, &id).await
        }

        (Method::GET, "/notes") | (Method::GET, "/notes/") => handle_list_notes(req, state),

        (Method::GET, p) if p.starts_with("/notes/") => {
            let id = p.strip_prefix("/notes/").unwrap_or("").to_string();
            handle_get_note(req, state, &id)
        }

        (Method::GET, "/users") | (Method::GET, "/users/") => handle_list_users(req, state),

        (Method::GET, "/payments") => handle_payments(req, state),

        (Method::GET, "/stats") => handle_stats(req, state),

        (Method::GET, "/logs") => handle_logs(req, state),

        _ => not_found(path),
    }
}

fn strip_note_id(subpath: &str, suffix: &str) -> String {
    subpath
        .strip_prefix("/notes/")
        .and_then(|s| s.strip_suffix(suffix))
        .unwrap_or("")
        .to_string()
}

async fn read_decision_body(req: Request<Incoming>) -> Result<DecisionRequest, Response<FullBody>> {
    let body_bytes = match req.into_body().collect().await {
        Ok(b) => b.to_bytes(),
        Err(_) => {
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                "Failed to read request body",
                None,
            ))
        }
    };
    if body_bytes.is_empty() {
        return Ok(DecisionRequest {
            rationale: String::new(),
        });
    }
    serde_json::from_slice(&body_bytes)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, &format!("Invalid JSON: {}", e), None))
}

/// POST /admin/notes/{id}/approve
async fn handle_approve(
    req: Request<Incoming>,
    state: Arc<AppState>,
    note_id: &str,
) -> Response<FullBody> {
    let claims = match require_admin(&req, &state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let request = match read_decision_body(req).await {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    let policy = state.policy.clone();
    let reward = match state.db.with_conn_mut(|conn| {
        review::approve(conn, &policy, note_id, &claims.sub, &request.rationale)
    }) {
        Ok(r) => r,
        Err(e) => return market_error_response(&e),
    };

    activity::log_best_effort(&state.db, &claims.sub, "note_approved", "note", note_id, None);
    info!(note_id = %note_id, admin = %claims.identifier, "Approved via admin API");

    json_response(
        StatusCode::OK,
        &ApproveResponse {
            success: true,
            coin_reward: reward,
        },
    )
}

/// POST /admin/notes/{id}/reject
async fn handle_reject(
    req: Request<Incoming>,
    state: Arc<AppState>,
    note_id: &str,
) -> Response<FullBody> {
    let claims = match require_admin(&req, &state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let request = match read_decision_body(req).await {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    let policy = state.policy.clone();
    if let Err(e) = state.db.with_conn_mut(|conn| {
        review::reject(conn, &policy, note_id, &claims.sub, &request.rationale)
    }) {
        return market_error_response(&e);
    }

    activity::log_best_effort(&state.db, &claims.sub, "note_rejected", "note", note_id, None);
    info!(note_id = %note_id, admin = %claims.identifier, "Rejected via admin API");

    json_response(
        StatusCode::OK,
        &SuccessResponse {
            success: true,
            message: "Note rejected".to_string(),
        },
    )
}

/// DELETE /admin/notes/{id}
async fn handle_delete(
    req: Request<Incoming>,
    state: Arc<AppState>,
    note_id: &str,
) -> Response<FullBody> {
    let claims = match require_admin(&req, &state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    if let Err(e) = state.db.with_conn_mut(|conn| review::delete(conn, note_id)) {
        return market_error_response(&e);
    }

    activity::log_best_effort(&state.db, &claims.sub, "note_deleted", "note", note_id, None);
    info!(note_id = %note_id, admin = %claims.identifier, "Deleted via admin API");

    json_response(
        StatusCode::OK,
        &SuccessResponse {
            success: true,
            message: "Note deleted".to_string(),
        },
    )
}

/// GET /admin/notes
fn handle_list_notes(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    if let Err(resp) = require_admin(&req, &state) {
        return resp;
    }

    let query = note_query_from_request(&req);
    match state.db.with_conn(|conn| notes::list_notes(conn, &query)) {
        Ok(notes) => json_response(StatusCode::OK, &notes),
        Err(e) => market_error_response(&e),
    }
}

/// GET /admin/notes/{id}
fn handle_get_note(req: Request<Incoming>, state: Arc<AppState>, note_id: &str) -> Response<FullBody> {
    if let Err(resp) = require_admin(&req, &state) {
        return resp;
    }

    let result = state.db.with_conn(|conn| {
        let note = notes::get_note(conn, note_id)?;
        match note {
            Some(note) => {
                let decisions = review::decisions_for_note(conn, note_id)?;
                Ok(Some(NoteDetailsResponse { note, decisions }))
            }
            None => Ok(None),
        }
    });

    match result {
        Ok(Some(details)) => json_response(StatusCode::OK, &details),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Note not found", Some("NOT_FOUND")),
        Err(e) => market_error_response(&e),
    }
}

/// GET /admin/users
fn handle_list_users(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    if let Err(resp) = require_admin(&req, &state) {
        return resp;
    }

    let mut query = UserQuery::default();
    for (key, value) in query_pairs(req.uri().query()) {
        match key.as_str() {
            "search" => query.search = Some(value),
            "role" => query.role = Some(value),
            "isActive" | "is_active" => query.is_active = value.parse().ok(),
            "limit" => query.limit = value.parse().unwrap_or(query.limit),
            "offset" => query.offset = value.parse().unwrap_or(0),
            _ => {}
        }
    }

    match state.db.with_conn(|conn| users::list_users(conn, &query)) {
        Ok(users) => json_response(StatusCode::OK, &users),
        Err(e) => market_error_response(&e),
    }
}

/// GET /admin/payments
fn handle_payments(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    if let Err(resp) = require_admin(&req, &state) {
        return resp;
    }

    let mut query = LedgerQuery::default();
    for (key, value) in query_pairs(req.uri().query()) {
        match key.as_str() {
            "userId" | "user_id" => query.user_id = Some(value),
            "entryType" | "entry_type" => query.entry_type = Some(value),
            "limit" => query.limit = value.parse().unwrap_or(query.limit),
            "offset" => query.offset = value.parse().unwrap_or(0),
            _ => {}
        }
    }

    match state.db.with_conn(|conn| ledger::list_entries(conn, &query)) {
        Ok(entries) => json_response(StatusCode::OK, &entries),
        Err(e) => market_error_response(&e),
    }
}

/// GET /admin/stats
fn handle_stats(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    if let Err(resp) = require_admin(&req, &state) {
        return resp;
    }

    match state.db.stats() {
        Ok(stats) => json_response(StatusCode::OK, &stats),
        Err(e) => market_error_response(&e),
    }
}

/// GET /admin/logs
fn handle_logs(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    if let Err(resp) = require_admin(&req, &state) {
        return resp;
    }

    let mut limit: u32 = 100;
    for (key, value) in query_pairs(req.uri().query()) {
        if key == "limit" {
            limit = value.parse().unwrap_or(limit);
        }
    }

    match state
        .db
        .with_conn(|conn| activity::recent_activity(conn, limit.min(1000)))
    {
        Ok(entries) => json_response(StatusCode::OK, &entries),
        Err(e) => market_error_response(&e),
    }
}

/// Shared note list query parsing (admin and public views)
pub(crate) fn note_query_from_request(req: &Request<Incoming>) -> NoteQuery {
    let mut query = NoteQuery::default();
    for (key, value) in query_pairs(req.uri().query()) {
        match key.as_str() {
            "status" => query.status = Some(value),
            "subject" => query.subject = Some(value),
            "ownerId" | "owner_id" => query.owner_id = Some(value),
            "search" => query.search = Some(value),
            "sortBy" | "sort_by" => query.sort_by = value,
            "sortDir" | "sort_dir" => query.sort_dir = value,
            "limit" => query.limit = value.parse().unwrap_or(query.limit),
            "offset" => query.offset = value.parse().unwrap_or(0),
            _ => {}
        }
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_body_accepts_every_field_spelling() {
        let r: DecisionRequest =
            serde_json::from_str(r#"{"approvalReason":"well structured and thorough"}"#).unwrap();
        assert_eq!(r.rationale, "well structured and thorough");

        let r: DecisionRequest = serde_json::from_str(r#"{"reason":"copied verbatim"}"#).unwrap();
        assert_eq!(r.rationale, "copied verbatim");

        let r: DecisionRequest = serde_json::from_str(r#"{"rationale":"clear notes"}"#).unwrap();
        assert_eq!(r.rationale, "clear notes");

        // Missing field is an empty rationale, rejected later by policy
        let r: DecisionRequest = serde_json::from_str("{}").unwrap();
        assert!(r.rationale.is_empty());
    }
}
