//! # Core Domain Entities
//!
//! Accounts as seen by the core subsystems. Profile data, badges and widgets
//! live with the HTTP tier; only the fields the detector and the rollout
//! engine read are modelled here.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric user identifier as issued by the user directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl UserId {
    /// Raw numeric value.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for UserId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl std::str::FromStr for UserId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(Self)
    }
}

/// Privilege level of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular member.
    #[default]
    User,
    /// Staff / elevated privileges. Always enrolled first in rollouts.
    Admin,
}

/// A user account record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account identifier.
    pub id: UserId,
    /// Public username.
    pub username: String,
    /// Verified email, if any.
    pub email: Option<String>,
    /// Privilege level.
    pub role: Role,
}

impl Account {
    /// Convenience constructor for a regular account without email.
    pub fn new(id: impl Into<UserId>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            email: None,
            role: Role::User,
        }
    }

    /// Builder-style email setter.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Builder-style role setter.
    #[must_use]
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Whether the account carries elevated privileges.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
