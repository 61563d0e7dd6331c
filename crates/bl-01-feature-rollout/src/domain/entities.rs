//! # Domain Entities
//!
//! Experiment definitions and the reports the engine hands back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A time-boxed, progressively ramped feature experiment.
///
/// Stored as JSON in the `experiments:active` hash, keyed by `feature_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experiment {
    /// Human readable name.
    pub name: String,
    /// Stable identifier of the gated feature.
    pub feature_key: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Ramp start.
    pub start_date: DateTime<Utc>,
    /// Ramp end. Past this instant everyone is enrolled.
    pub end_date: DateTime<Utc>,
    /// Seed population enrolled at start.
    pub initial_user_count: usize,
}

impl Experiment {
    /// Where the experiment stands at `now`.
    #[must_use]
    pub fn phase_at(&self, now: DateTime<Utc>) -> ExperimentPhase {
        if now < self.start_date {
            ExperimentPhase::Scheduled
        } else if now > self.end_date {
            ExperimentPhase::Completed
        } else {
            ExperimentPhase::Ramping
        }
    }

    /// Strictly inside the window. Membership outside it is kept but not
    /// reported.
    #[must_use]
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.start_date < now && now < self.end_date
    }
}

/// Lifecycle position of an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentPhase {
    /// `now < start`; nothing happens on a tick.
    Scheduled,
    /// `start <= now <= end`; membership follows the ramp.
    Ramping,
    /// `now > end`; membership is the whole population.
    Completed,
}

/// Point-in-time view of one experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExperimentStatus {
    pub experiment: Experiment,
    pub phase: ExperimentPhase,
    pub members: usize,
    pub total_users: usize,
    pub target: usize,
}

/// Outcome of one `process_experiments` run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Experiments whose membership was ramped.
    pub ramped: usize,
    /// Experiments expanded to the full population.
    pub completed: usize,
    /// Experiments not started yet.
    pub skipped: usize,
    /// Users newly enrolled across all experiments.
    pub members_added: usize,
    /// Feature keys that failed; the tick moved on past them.
    pub failed: Vec<String>,
}

impl TickReport {
    /// Experiments looked at, including failed ones.
    #[must_use]
    pub fn total(&self) -> usize {
        self.ramped + self.completed + self.skipped + self.failed.len()
    }
}
