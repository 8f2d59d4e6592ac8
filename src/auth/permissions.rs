//! Permission levels for route authorization

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered permission levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
#[derive(Default)]
pub enum PermissionLevel {
    /// Unauthenticated - browse the public marketplace
    #[default]
    Public = 0,
    /// Logged-in member - upload, download, spend coins
    Member = 1,
    /// Admin - review queue, user management, dashboard
    Admin = 2,
}

impl PermissionLevel {
    /// Map a stored user role to its permission level
    pub fn from_role(role: &str) -> Self {
        match role {
            "admin" => PermissionLevel::Admin,
            _ => PermissionLevel::Member,
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionLevel::Public => write!(f, "PUBLIC"),
            PermissionLevel::Member => write!(f, "MEMBER"),
            PermissionLevel::Admin => write!(f, "ADMIN"),
        }
    }
}
