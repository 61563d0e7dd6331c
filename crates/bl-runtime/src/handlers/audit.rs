//! Audit trail of every event seen by this process.

use async_trait::async_trait;
use shared_bus::{Event, EventHandler, HandlerError};
use tracing::info;

/// Logs each event it receives. Subscribed to every event type.
#[derive(Debug, Default)]
pub struct AuditLogHandler;

#[async_trait]
impl EventHandler for AuditLogHandler {
    fn name(&self) -> &str {
        "audit-log"
    }

    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        info!(
            event_id = %event.id,
            event_type = %event.event_type,
            created_at = %event.created_at,
            fields = event.payload.len(),
            "Event"
        );
        Ok(())
    }
}
