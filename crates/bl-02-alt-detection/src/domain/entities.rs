//! # Domain Entities
//!
//! The `AltAccountDetected` payload and its parts.

use serde::{Deserialize, Serialize};
use shared_types::UserId;
use std::fmt;

/// Which shared identifier linked two accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    /// Same network address.
    Ip,
    /// Same verified email.
    Email,
}

/// What triggered the detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    Registration,
    Login,
    EmailVerification,
}

impl DetectionSource {
    /// Metric label and wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::Login => "login",
            Self::EmailVerification => "email_verification",
        }
    }
}

impl fmt::Display for DetectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One account linked to the subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AltMatch {
    pub user_id: UserId,
    pub username: String,
    pub reason: MatchReason,
}

/// Payload of an `AltAccountDetected` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AltAccountDetected {
    /// The account that triggered the detection.
    pub user_id: UserId,
    pub username: String,
    /// Accounts sharing an identifier with the subject.
    pub matches: Vec<AltMatch>,
    pub source: DetectionSource,
    /// Informational score in `[0, 1]`.
    pub confidence: f64,
    /// Shared address, for the address path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    pub note: String,
}
