//! HTTP route handlers
//!
//! Handlers take the raw hyper request plus shared `AppState` and return
//! `Response<Full<Bytes>>`. Dispatch lives in `server::http`; each group
//! of routes owns its own sub-dispatch for path suffixes.

pub mod admin;
pub mod api;
pub mod auth_routes;
pub mod health;

pub use admin::handle_admin_request;
pub use api::handle_api_request;
pub use auth_routes::handle_auth_request;
pub use health::{health_check, version_info};

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Serialize;
use tracing::error;

use crate::auth::{extract_token_from_header, Claims, PermissionLevel};
use crate::error::MarketError;
use crate::server::AppState;

pub(crate) type FullBody = Full<Bytes>;

/// Error payload returned on every failure path
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Generic success payload for mutations with no interesting body
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

pub(crate) fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<FullBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(json)))
        .unwrap_or_default()
}

pub(crate) fn error_response(status: StatusCode, error: &str, code: Option<&str>) -> Response<FullBody> {
    json_response(
        status,
        &ErrorResponse {
            error: error.to_string(),
            code: code.map(|c| c.to_string()),
        },
    )
}

/// Map a domain error to its HTTP response. Internal details are logged
/// here and never leave the server.
pub(crate) fn market_error_response(err: &MarketError) -> Response<FullBody> {
    if err.status() == StatusCode::INTERNAL_SERVER_ERROR {
        error!(error = %err, "Request failed");
    }
    error_response(err.status(), &err.public_message(), Some(err.code()))
}

pub(crate) fn not_found(path: &str) -> Response<FullBody> {
    error_response(
        StatusCode::NOT_FOUND,
        &format!("No route for {}", path),
        Some("NOT_FOUND"),
    )
}

fn get_auth_header(req: &Request<Incoming>) -> Option<&str> {
    req.headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

fn get_api_key_header(req: &Request<Incoming>) -> Option<&str> {
    req.headers().get("x-api-key").and_then(|v| v.to_str().ok())
}

/// Authenticate a request, returning the verified claims.
#[allow(clippy::result_large_err)]
pub(crate) fn authenticate(
    req: &Request<Incoming>,
    state: &AppState,
) -> Result<Claims, Response<FullBody>> {
    let token = match extract_token_from_header(get_auth_header(req)) {
        Some(t) => t,
        None => {
            return Err(error_response(
                StatusCode::UNAUTHORIZED,
                "No token provided",
                Some("NO_TOKEN"),
            ))
        }
    };

    let result = state.jwt.verify_token(token);
    if !result.valid {
        return Err(error_response(
            StatusCode::UNAUTHORIZED,
            result.error.as_deref().unwrap_or("Invalid token"),
            Some("INVALID_TOKEN"),
        ));
    }

    // valid implies claims are present
    result.claims.ok_or_else(|| {
        error_response(
            StatusCode::UNAUTHORIZED,
            "Invalid token",
            Some("INVALID_TOKEN"),
        )
    })
}

/// Require a logged-in member (or better)
#[allow(clippy::result_large_err)]
pub(crate) fn require_member(
    req: &Request<Incoming>,
    state: &AppState,
) -> Result<Claims, Response<FullBody>> {
    let claims = authenticate(req, state)?;
    if claims.permission_level < PermissionLevel::Member {
        return Err(error_response(
            StatusCode::FORBIDDEN,
            "Member permission required",
            Some("FORBIDDEN"),
        ));
    }
    Ok(claims)
}

/// Require admin access.
///
/// Accepts either an admin JWT or the legacy `x-api-key` header; the
/// latter yields synthetic claims until the old admin panel migrates to
/// sessions.
#[allow(clippy::result_large_err)]
pub(crate) fn require_admin(
    req: &Request<Incoming>,
    state: &AppState,
) -> Result<Claims, Response<FullBody>> {
    if state.api_key.validate(get_api_key_header(req)) {
        let now = chrono::Utc::now().timestamp();
        return Ok(Claims {
            sub: "legacy-admin".to_string(),
            identifier: "legacy-admin".to_string(),
            permission_level: PermissionLevel::Admin,
            exp: now + 60,
            iat: now,
        });
    }

    let claims = authenticate(req, state)?;
    if claims.permission_level < PermissionLevel::Admin {
        return Err(error_response(
            StatusCode::FORBIDDEN,
            "Admin permission required",
            Some("FORBIDDEN"),
        ));
    }
    Ok(claims)
}

/// Decode `key=value` pairs from a query string
pub(crate) fn query_pairs(query: Option<&str>) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    if let Some(q) = query {
        for pair in q.split('&') {
            if let Some((key, value)) = pair.split_once('=') {
                let value = urlencoding::decode(value).unwrap_or_default();
                pairs.push((key.to_string(), value.to_string()));
            }
        }
    }
    pairs
}
