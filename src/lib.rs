//! Satchel - student notes marketplace backend
//!
//! A small HTTP service around three pieces of state:
//!
//! - **Notes** move through a review lifecycle (draft, submitted,
//!   approved/rejected, published) gated by admin decisions.
//! - **Coins** live in an append-only ledger plus a cached per-user
//!   balance; approvals and paid downloads move them.
//! - **Activity** is a best-effort audit trail for the admin dashboard.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod review;
pub mod routes;
pub mod server;

pub use config::Args;
pub use db::MarketDb;
pub use error::{MarketError, Result};
pub use review::ReviewPolicy;
pub use server::AppState;
