//! Explicit caller context passed into every lifecycle operation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::UserId;
use crate::error::PlatformError;

/// Role of the calling user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Platform administrator: may override statuses and manage instances.
    Admin,
    /// Restaurant owner: may only see and act on their own subscriptions.
    User,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admin => f.write_str("admin"),
            Self::User => f.write_str("user"),
        }
    }
}

impl FromStr for Role {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "user" | "customer" => Ok(Self::User),
            other => Err(PlatformError::Unauthorized(format!("unknown role: {other}"))),
        }
    }
}

/// The authenticated caller of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    /// Caller's user id.
    pub user_id: UserId,
    /// Caller's role.
    pub role: Role,
}

impl Actor {
    /// Creates an admin actor.
    #[must_use]
    pub const fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Admin,
        }
    }

    /// Creates a regular user actor.
    #[must_use]
    pub const fn user(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::User,
        }
    }

    /// Returns `true` for administrators.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }

    /// Returns `true` if the actor may act on an entity owned by `owner`.
    #[must_use]
    pub fn can_access(&self, owner: UserId) -> bool {
        self.is_admin() || self.user_id == owner
    }

    /// Fails unless the actor is an administrator.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Forbidden`] for non-admin actors.
    pub fn require_admin(&self, action: &str) -> Result<(), PlatformError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(PlatformError::Forbidden(format!("{action} requires admin role")))
        }
    }
}
