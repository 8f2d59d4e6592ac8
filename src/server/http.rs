//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling. Dispatch is a
//! `(method, path)` match that hands prefixed groups to their route
//! modules.

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::auth::{ApiKeyValidator, JwtValidator};
use crate::config::Args;
use crate::db::MarketDb;
use crate::error::MarketError;
use crate::review::ReviewPolicy;
use crate::routes;
use crate::routes::FullBody;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub db: Arc<MarketDb>,
    pub jwt: JwtValidator,
    pub api_key: ApiKeyValidator,
    pub policy: ReviewPolicy,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(args: Args, db: Arc<MarketDb>) -> Result<Self, MarketError> {
        let jwt = if args.dev_mode {
            JwtValidator::new_dev()
        } else {
            let secret = args.jwt_secret().ok_or_else(|| {
                MarketError::Config("JWT secret not configured".to_string())
            })?;
            JwtValidator::new(&secret, args.jwt_expiry_seconds as i64)?
        };

        let api_key = ApiKeyValidator::new(args.admin_api_key.clone());
        let policy = ReviewPolicy {
            reward_coins: args.approval_reward,
            min_rationale_words: args.min_rationale_words,
        };

        Ok(Self {
            args,
            db,
            jwt,
            api_key,
            policy,
            started_at: Instant::now(),
        })
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<(), MarketError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!("Satchel listening on {}", state.args.listen);

    if state.args.dev_mode {
        warn!("Development mode enabled - insecure JWT secret in use");
    }
    if state.api_key.is_enabled() {
        warn!("Legacy admin API key enabled - migrate clients to JWT sessions");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<FullBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("[{}] {} {}", addr, method, path);

    let response = match (method, path.as_str()) {
        // Liveness probe
        (Method::GET, "/health") | (Method::GET, "/healthz") => {
            routes::health_check(Arc::clone(&state))
        }

        // Version info for deployment verification
        (Method::GET, "/version") => routes::version_info(),

        // CORS preflight
        (Method::OPTIONS, _) => preflight_response(),

        // Registration, login, session introspection
        (_, p) if p.starts_with("/auth") => {
            routes::handle_auth_request(req, Arc::clone(&state), p).await
        }

        // Review dashboard
        (_, p) if p.starts_with("/admin") => {
            routes::handle_admin_request(req, Arc::clone(&state), p).await
        }

        // Marketplace and wallet
        (_, p) if p.starts_with("/api") => {
            routes::handle_api_request(req, Arc::clone(&state), p).await
        }

        _ => routes::not_found(&path),
    };

    Ok(response)
}

/// CORS preflight response
fn preflight_response() -> Response<FullBody> {
    Response::builder()
        .status(hyper::StatusCode::OK)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Headers", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PUT, DELETE, OPTIONS")
        .body(http_body_util::Full::new(bytes::Bytes::new()))
        .unwrap_or_default()
}
