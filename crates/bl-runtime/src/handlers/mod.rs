//! # Event Handlers
//!
//! Side effects subscribed to the bus by this process.

pub mod alt_announcer;
pub mod audit;

pub use alt_announcer::{alert_color, render, AltAccountAnnouncer};
pub use audit::AuditLogHandler;
