//! # Inbound Ports
//!
//! API exposed to admin tooling, feature gates and the scheduler.

use crate::domain::{Experiment, ExperimentStatus, RolloutError, TickReport};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared_types::UserId;

/// Parameters for a new experiment.
#[derive(Debug, Clone)]
pub struct NewExperiment {
    pub name: String,
    pub feature_key: String,
    pub description: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub initial_user_count: usize,
}

/// Feature rollout API - inbound port.
#[async_trait]
pub trait FeatureRolloutApi: Send + Sync {
    /// Store a definition; enrolls the seed population if already started.
    ///
    /// An existing definition with the same key is overwritten. Callers
    /// pre-check with [`FeatureRolloutApi::experiment_exists`].
    async fn create_experiment(&self, request: NewExperiment) -> Result<Experiment, RolloutError>;

    /// Remove a definition and its membership. Returns `false` if unknown.
    async fn delete_experiment(&self, feature_key: &str) -> Result<bool, RolloutError>;

    /// Whether a definition exists under `feature_key`.
    async fn experiment_exists(&self, feature_key: &str) -> Result<bool, RolloutError>;

    /// One periodic tick over every definition.
    async fn process_experiments(&self) -> Result<TickReport, RolloutError>;

    /// Feature keys of live experiments `user` is enrolled in.
    async fn get_user_experimental_features(
        &self,
        user: UserId,
    ) -> Result<Vec<String>, RolloutError>;

    /// Whether `user` currently has `feature_key`.
    async fn is_feature_enabled(&self, user: UserId, feature_key: &str)
        -> Result<bool, RolloutError>;

    /// Membership and ramp position of one experiment.
    async fn experiment_status(&self, feature_key: &str) -> Result<ExperimentStatus, RolloutError>;
}
