//! # Integration Flows
//!
//! Each test stands up one or more logical processes that share a single
//! in-memory store and event table, the same way separate API and bot
//! processes share one key-value server and one database.

mod alt_detection;
mod event_bus;
mod feature_rollout;
