//! # Inbound Ports
//!
//! Hooks called by the registration, login and email-verification flows.

use crate::domain::{AltAccountDetected, DetectionError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared_types::UserId;

/// Alt-account detection API - inbound port.
///
/// Each hook returns the published detection, or `None` when nothing was
/// published.
#[async_trait]
pub trait AltDetectionApi: Send + Sync {
    /// A new account was created from `ip`.
    async fn on_registration(
        &self,
        user: UserId,
        ip: &str,
    ) -> Result<Option<AltAccountDetected>, DetectionError>;

    /// An account signed in from `ip`.
    async fn on_login(
        &self,
        user: UserId,
        ip: &str,
    ) -> Result<Option<AltAccountDetected>, DetectionError>;

    /// An account verified `email`.
    async fn on_email_verified(
        &self,
        user: UserId,
        email: &str,
    ) -> Result<Option<AltAccountDetected>, DetectionError>;

    /// Accounts previously linked to `user`, ascending.
    async fn known_alts(&self, user: UserId) -> Result<Vec<UserId>, DetectionError>;

    /// When the pair was first linked.
    async fn first_detected(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Option<DateTime<Utc>>, DetectionError>;
}
