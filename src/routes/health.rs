//! Health and version endpoints

use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use crate::routes::{json_response, FullBody};
use crate::server::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    uptime_seconds: u64,
    dev_mode: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VersionResponse {
    name: &'static str,
    version: &'static str,
}

/// GET /health - liveness probe
pub fn health_check(state: Arc<AppState>) -> Response<FullBody> {
    json_response(
        StatusCode::OK,
        &HealthResponse {
            status: "ok",
            uptime_seconds: state.started_at.elapsed().as_secs(),
            dev_mode: state.args.dev_mode,
        },
    )
}

/// GET /version - deployment verification
pub fn version_info() -> Response<FullBody> {
    json_response(
        StatusCode::OK,
        &VersionResponse {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
        },
    )
}
