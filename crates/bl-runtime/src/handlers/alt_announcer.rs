//! # Alt Account Announcer
//!
//! Renders `AltAccountDetected` events for the moderation channel.

use crate::adapters::{Notification, NotificationField, Notifier};
use async_trait::async_trait;
use bl_02_alt_detection::{AltAccountDetected, MatchReason};
use shared_bus::{Event, EventHandler, HandlerError};
use std::sync::Arc;
use tracing::debug;

/// Red: strong signal.
pub const COLOR_HIGH: u32 = 0xE7_4C_3C;
/// Orange.
pub const COLOR_MEDIUM: u32 = 0xE6_7E_22;
/// Yellow: weak signal.
pub const COLOR_LOW: u32 = 0xF1_C4_0F;

/// Accent color for a confidence score.
#[must_use]
pub fn alert_color(confidence: f64) -> u32 {
    if confidence >= 0.9 {
        COLOR_HIGH
    } else if confidence >= 0.7 {
        COLOR_MEDIUM
    } else {
        COLOR_LOW
    }
}

/// Build the moderation message for a detection.
#[must_use]
pub fn render(detection: &AltAccountDetected) -> Notification {
    let accounts = detection
        .matches
        .iter()
        .map(|m| {
            let reason = match m.reason {
                MatchReason::Ip => "ip",
                MatchReason::Email => "email",
            };
            format!("{} (#{}) - {reason}", m.username, m.user_id)
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut fields = vec![
        NotificationField {
            name: "Source".to_string(),
            value: detection.source.to_string(),
        },
        NotificationField {
            name: "Confidence".to_string(),
            value: format!("{:.0}%", detection.confidence * 100.0),
        },
        NotificationField {
            name: "Matched accounts".to_string(),
            value: accounts,
        },
    ];
    if let Some(ip) = &detection.ip {
        fields.push(NotificationField {
            name: "Address".to_string(),
            value: ip.clone(),
        });
    }

    Notification {
        title: format!(
            "Possible alt accounts: {} (#{})",
            detection.username, detection.user_id
        ),
        description: detection.note.clone(),
        color: alert_color(detection.confidence),
        fields,
    }
}

/// Sends one notification per `AltAccountDetected` event.
pub struct AltAccountAnnouncer {
    notifier: Arc<dyn Notifier>,
}

impl AltAccountAnnouncer {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl EventHandler for AltAccountAnnouncer {
    fn name(&self) -> &str {
        "alt-account-announcer"
    }

    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        let detection: AltAccountDetected = event
            .payload_as()
            .map_err(|e| HandlerError::failed(format!("malformed detection payload: {e}")))?;
        let notification = render(&detection);
        self.notifier
            .send(&notification)
            .await
            .map_err(|e| HandlerError::failed(e.to_string()))?;
        debug!(event_id = %event.id, user = %detection.user_id, "Alt detection announced");
        Ok(())
    }
}
