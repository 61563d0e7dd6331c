//! # Domain Events
//!
//! Defines the event record that flows through the bus and the envelope it
//! travels in on the shared channel.

use crate::errors::BusError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Event payload: an insertion-ordered mapping from key to JSON value.
pub type Payload = serde_json::Map<String, Value>;

/// All event types that can be published to the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// A new account was created.
    UserRegistered,
    /// An account signed in.
    UserLoggedIn,
    /// Two or more accounts appear to belong to the same person.
    AltAccountDetected,
    /// An account linked its Discord identity.
    DiscordLinked,
    /// A redeem code was consumed.
    RedeemCodeUsed,
    /// An account was deleted.
    UserDeleted,
    /// An account verified its email address.
    EmailVerified,
    /// A purchase went through.
    PurchaseCompleted,
}

impl EventType {
    /// Every event type, in declaration order.
    pub const ALL: [EventType; 8] = [
        Self::UserRegistered,
        Self::UserLoggedIn,
        Self::AltAccountDetected,
        Self::DiscordLinked,
        Self::RedeemCodeUsed,
        Self::UserDeleted,
        Self::EmailVerified,
        Self::PurchaseCompleted,
    ];

    /// Stable name used in logs and metric labels.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserRegistered => "user_registered",
            Self::UserLoggedIn => "user_logged_in",
            Self::AltAccountDetected => "alt_account_detected",
            Self::DiscordLinked => "discord_linked",
            Self::RedeemCodeUsed => "redeem_code_used",
            Self::UserDeleted => "user_deleted",
            Self::EmailVerified => "email_verified",
            Self::PurchaseCompleted => "purchase_completed",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable record of something that happened.
///
/// Once persisted only `processed` / `processed_at` change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Globally unique id, generated at publish time.
    pub id: Uuid,
    /// What happened.
    pub event_type: EventType,
    /// Event data.
    pub payload: Payload,
    /// When the event was published.
    pub created_at: DateTime<Utc>,
    /// Set by an explicit acknowledgement. Has no bearing on delivery.
    #[serde(default)]
    pub processed: bool,
    /// When the acknowledgement happened.
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
}

impl Event {
    /// Create a fresh, unprocessed event.
    #[must_use]
    pub fn new(event_type: EventType, payload: Payload) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            payload,
            created_at: Utc::now(),
            processed: false,
            processed_at: None,
        }
    }

    /// Look up a single payload field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Deserialize the payload into a typed record.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.payload.clone()))
    }
}

/// Convert any serializable value into a [`Payload`].
///
/// # Errors
///
/// `BusError::Validation` if serialization fails or the value is not a
/// key-value mapping (e.g. a bare string or a list).
pub fn to_payload<T: Serialize + ?Sized>(value: &T) -> Result<Payload, BusError> {
    match serde_json::to_value(value).map_err(|e| BusError::Validation(e.to_string()))? {
        Value::Object(map) => Ok(map),
        other => Err(BusError::Validation(format!(
            "payload must be a key-value mapping, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Wire format on the shared channel.
///
/// `origin` identifies the publishing bus instance so its own listener can
/// skip the echo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusEnvelope {
    /// Publishing bus instance.
    pub origin: Uuid,
    /// The full event.
    pub event: Event,
}

impl BusEnvelope {
    /// Serialize for the channel.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a channel message.
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
