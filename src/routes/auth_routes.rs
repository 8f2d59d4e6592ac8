//! Registration, login, and session introspection
//!
//! ## Endpoints
//!
//! - `POST /auth/register` - Create an account, grant the starting bonus
//! - `POST /auth/login` - Verify credentials, issue a session token
//! - `GET /auth/me` - Current user for a presented token
//!
//! Sessions are short-lived JWTs; there is no server-side session table
//! and logout is client-side token disposal.

use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::auth::{hash_password, verify_password, PermissionLevel};
use crate::db::activity;
use crate::db::users::{self, CreateUserInput, UserRow};
use crate::routes::{
    authenticate, error_response, json_response, market_error_response, not_found, FullBody,
};
use crate::server::AppState;

const MIN_PASSWORD_CHARS: usize = 8;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    identifier: String,
    password: String,
    #[serde(default = "default_identifier_type")]
    identifier_type: String,
}

fn default_identifier_type() -> String {
    "email".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest {
    identifier: String,
    password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    token: String,
    expires_in: i64,
    user: UserRow,
}

/// Dispatch /auth/* requests
pub async fn handle_auth_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
    path: &str,
) -> Response<FullBody> {
    let method = req.method().clone();
    let subpath = path.strip_prefix("/auth").unwrap_or("");

    match (method, subpath) {
        (Method::POST, "/register") => handle_register(req, state).await,
        (Method::POST, "/login") => handle_login(req, state).await,
        (Method::GET, "/me") => handle_me(req, state).await,
        _ => not_found(path),
    }
}

async fn read_json_body<T: serde::de::DeserializeOwned>(
    req: Request<Incoming>,
) -> Result<T, Response<FullBody>> {
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
    serde_json::from_slice(&body_bytes)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, &format!("Invalid JSON: {}", e), None))
}

/// POST /auth/register
async fn handle_register(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    let request: RegisterRequest = match read_json_body(req).await {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    if request.password.len() < MIN_PASSWORD_CHARS {
        return error_response(
            StatusCode::BAD_REQUEST,
            &format!("Password must be at least {} characters", MIN_PASSWORD_CHARS),
            Some("WEAK_PASSWORD"),
        );
    }

    let password_hash = match hash_password(&request.password) {
        Ok(h) => h,
        Err(e) => return market_error_response(&e),
    };

    let input = CreateUserInput {
        identifier: request.identifier,
        identifier_type: request.identifier_type,
        password_hash,
        role: "member".to_string(),
    };

    let starting_bonus = state.args.starting_bonus;
    let user = match state
        .db
        .with_conn_mut(|conn| users::create_user(conn, input, starting_bonus))
    {
        Ok(u) => u,
        Err(e) => return market_error_response(&e),
    };

    activity::log_best_effort(&state.db, &user.id, "user_registered", "user", &user.id, None);
    info!(user_id = %user.id, "New account registered");

    session_response(&state, user)
}

/// POST /auth/login
async fn handle_login(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    let request: LoginRequest = match read_json_body(req).await {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    let user = match state
        .db
        .with_conn(|conn| users::get_user_by_identifier(conn, &request.identifier))
    {
        Ok(Some(u)) => u,
        // Same response for unknown identifier and wrong password
        Ok(None) => return invalid_credentials(),
        Err(e) => return market_error_response(&e),
    };

    match verify_password(&request.password, &user.password_hash) {
        Ok(true) => {}
        Ok(false) => return invalid_credentials(),
        Err(e) => return market_error_response(&e),
    }

    if !user.is_active {
        return error_response(
            StatusCode::FORBIDDEN,
            "Account is deactivated",
            Some("ACCOUNT_DISABLED"),
        );
    }

    info!(user_id = %user.id, "Login");
    session_response(&state, user)
}

/// GET /auth/me
async fn handle_me(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    let claims = match authenticate(&req, &state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    match state.db.with_conn(|conn| users::get_user(conn, &claims.sub)) {
        Ok(Some(user)) => json_response(StatusCode::OK, &user),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "User not found", Some("NOT_FOUND")),
        Err(e) => market_error_response(&e),
    }
}

fn invalid_credentials() -> Response<FullBody> {
    error_response(
        StatusCode::UNAUTHORIZED,
        "Invalid identifier or password",
        Some("INVALID_CREDENTIALS"),
    )
}

fn session_response(state: &AppState, user: UserRow) -> Response<FullBody> {
    let level = PermissionLevel::from_role(&user.role);
    match state.jwt.issue_token(&user.id, &user.identifier, level) {
        Ok(token) => json_response(
            StatusCode::OK,
            &SessionResponse {
                token,
                expires_in: state.jwt.expiry_seconds(),
                user,
            },
        ),
        Err(e) => market_error_response(&e),
    }
}
