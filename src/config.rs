//! Configuration for Satchel
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Satchel - student notes marketplace backend
#[derive(Parser, Debug, Clone)]
#[command(name = "satchel")]
#[command(about = "Notes marketplace backend with review workflow and coin ledger")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Path to the SQLite database file
    #[arg(long, env = "DB_PATH", default_value = "satchel.db")]
    pub db_path: PathBuf,

    /// Enable development mode (relaxed auth, default JWT secret)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// JWT secret for session token signing (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// JWT token expiry in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "3600")]
    pub jwt_expiry_seconds: u64,

    /// Static API key for the legacy admin panel (optional, backward compat)
    #[arg(long, env = "ADMIN_API_KEY")]
    pub admin_api_key: Option<String>,

    /// Coins granted to a new account at registration
    #[arg(long, env = "STARTING_BONUS", default_value = "50")]
    pub starting_bonus: i64,

    /// Coins credited to the owner when a note is approved
    #[arg(long, env = "APPROVAL_REWARD", default_value = "20")]
    pub approval_reward: i64,

    /// Minimum word count for approve/reject rationale (0 = only non-empty)
    #[arg(long, env = "MIN_RATIONALE_WORDS", default_value = "0")]
    pub min_rationale_words: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Get effective JWT secret (uses default in dev mode)
    pub fn jwt_secret(&self) -> Option<String> {
        if self.dev_mode {
            Some(
                self.jwt_secret
                    .clone()
                    .unwrap_or_else(|| "dev-only-insecure-secret".to_string()),
            )
        } else {
            self.jwt_secret.clone()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode && self.jwt_secret.is_none() {
            return Err("JWT_SECRET is required in production mode".to_string());
        }
        if self.starting_bonus < 0 {
            return Err("STARTING_BONUS must not be negative".to_string());
        }
        if self.approval_reward <= 0 {
            return Err("APPROVAL_REWARD must be a positive integer".to_string());
        }
        Ok(())
    }
}
