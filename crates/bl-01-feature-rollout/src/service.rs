//! # Rollout Service
//!
//! [`RolloutEngine`] keeps experiment definitions and membership in the
//! shared store and grows membership along a linear ramp on every tick.
//!
//! Membership only ever grows. Every write is a set add, so overlapping
//! ticks (from one process or several) converge on the same member count.

use crate::domain::{
    keys, progress, target_count, Experiment, ExperimentPhase, ExperimentStatus, RolloutError,
    TickReport,
};
use crate::ports::{FeatureRolloutApi, NewExperiment, UserDirectory};
use async_trait::async_trait;
use bl_telemetry::metrics::{ROLLOUT_MEMBERS_ADDED, ROLLOUT_TICKS};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use shared_store::SharedStore;
use shared_types::{TimeSource, UserId};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Default page size for population scans and full expansion.
pub const DEFAULT_EXPANSION_BATCH_SIZE: usize = 1000;

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct RolloutConfig {
    /// Users fetched and enrolled per round-trip when scanning the
    /// population.
    pub expansion_batch_size: usize,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            expansion_batch_size: DEFAULT_EXPANSION_BATCH_SIZE,
        }
    }
}

/// Progressive feature rollout engine.
pub struct RolloutEngine {
    store: Arc<dyn SharedStore>,
    users: Arc<dyn UserDirectory>,
    time: Arc<dyn TimeSource>,
    rng: Mutex<StdRng>,
    config: RolloutConfig,
}

impl RolloutEngine {
    /// Create an engine sampling with `rng`.
    pub fn new(
        store: Arc<dyn SharedStore>,
        users: Arc<dyn UserDirectory>,
        time: Arc<dyn TimeSource>,
        rng: StdRng,
        config: RolloutConfig,
    ) -> Self {
        Self {
            store,
            users,
            time,
            rng: Mutex::new(rng),
            config,
        }
    }

    /// Create an engine with default tuning and a generator seeded from
    /// `seed`. Two engines with the same seed over the same population pick
    /// the same users.
    pub fn with_seed(
        store: Arc<dyn SharedStore>,
        users: Arc<dyn UserDirectory>,
        time: Arc<dyn TimeSource>,
        seed: u64,
    ) -> Self {
        Self::new(
            store,
            users,
            time,
            StdRng::seed_from_u64(seed),
            RolloutConfig::default(),
        )
    }

    /// Load one definition.
    pub async fn get_experiment(&self, feature_key: &str) -> Result<Option<Experiment>, RolloutError> {
        match self.store.hget(keys::ACTIVE_EXPERIMENTS, feature_key).await? {
            Some(raw) => parse_definition(feature_key, &raw).map(Some),
            None => Ok(None),
        }
    }

    /// Every readable definition, ordered by feature key. Unreadable ones
    /// are logged and left out.
    pub async fn list_experiments(&self) -> Result<Vec<Experiment>, RolloutError> {
        Ok(self
            .load_definitions()
            .await?
            .into_iter()
            .filter_map(|(feature_key, parsed)| match parsed {
                Ok(experiment) => Some(experiment),
                Err(e) => {
                    warn!(%feature_key, error = %e, "Skipping unreadable experiment");
                    None
                }
            })
            .collect())
    }

    async fn load_definitions(
        &self,
    ) -> Result<Vec<(String, Result<Experiment, RolloutError>)>, RolloutError> {
        let mut definitions: Vec<_> = self
            .store
            .hgetall(keys::ACTIVE_EXPERIMENTS)
            .await?
            .into_iter()
            .map(|(feature_key, raw)| {
                let parsed = parse_definition(&feature_key, &raw);
                (feature_key, parsed)
            })
            .collect();
        definitions.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(definitions)
    }

    async fn members(&self, feature_key: &str) -> Result<HashSet<UserId>, RolloutError> {
        Ok(self
            .store
            .smembers(&keys::members(feature_key))
            .await?
            .iter()
            .filter_map(|raw| raw.parse().ok())
            .collect())
    }

    async fn enroll(&self, feature_key: &str, users: &[UserId]) -> Result<usize, RolloutError> {
        if users.is_empty() {
            return Ok(0);
        }
        let ids: Vec<String> = users.iter().map(ToString::to_string).collect();
        let added = self.store.sadd(&keys::members(feature_key), &ids).await?;
        if added > 0 {
            ROLLOUT_MEMBERS_ADDED
                .with_label_values(&[feature_key])
                .inc_by(added as f64);
        }
        Ok(added)
    }

    /// Whole population, paged through the directory.
    async fn population(&self) -> Result<Vec<UserId>, RolloutError> {
        let batch = self.config.expansion_batch_size.max(1);
        let mut all = Vec::new();
        loop {
            let page = self.users.list_all(all.len(), batch).await?;
            let last = page.len() < batch;
            all.extend(page);
            if last {
                break;
            }
        }
        Ok(all)
    }

    /// Uniform sample without replacement.
    fn sample(&self, pool: Vec<UserId>, count: usize) -> Vec<UserId> {
        if count >= pool.len() {
            return pool;
        }
        let mut rng = self.rng.lock();
        pool.choose_multiple(&mut *rng, count).copied().collect()
    }

    /// Admins unconditionally, then a random top-up to the seed size.
    async fn initial_assignment(&self, experiment: &Experiment) -> Result<usize, RolloutError> {
        let key = &experiment.feature_key;
        let admins = self.users.list_admins().await?;
        let mut added = self.enroll(key, &admins).await?;

        let wanted = experiment.initial_user_count.saturating_sub(admins.len());
        if wanted > 0 {
            let admin_set: HashSet<_> = admins.into_iter().collect();
            let members = self.members(key).await?;
            let pool: Vec<_> = self
                .population()
                .await?
                .into_iter()
                .filter(|id| !admin_set.contains(id) && !members.contains(id))
                .collect();
            let picked = self.sample(pool, wanted);
            added += self.enroll(key, &picked).await?;
        }

        info!(feature_key = %key, added, "Initial assignment done");
        Ok(added)
    }

    /// Run the initial assignment unless some process already has. Claims
    /// the seeded marker first so only one process seeds; the marker is
    /// dropped again if the assignment fails.
    async fn seed_once(&self, experiment: &Experiment) -> Result<usize, RolloutError> {
        let key = &experiment.feature_key;
        let marker = keys::seeded(key);
        let stamp = self.time.now().to_rfc3339();
        if !self.store.set_nx(&marker, &stamp, None).await? {
            return Ok(0);
        }
        match self.initial_assignment(experiment).await {
            Ok(added) => Ok(added),
            Err(e) => {
                if let Err(release) = self.store.del(&marker).await {
                    warn!(feature_key = %key, error = %release, "Failed to release seeded marker");
                }
                Err(e)
            }
        }
    }

    /// Grow membership to the ramp target for `now`.
    async fn ramp(&self, experiment: &Experiment, now: DateTime<Utc>) -> Result<usize, RolloutError> {
        let key = &experiment.feature_key;
        let total = self.users.count_all().await?;
        let members = self.members(key).await?;
        let target = target_count(
            experiment.initial_user_count,
            total,
            progress(experiment.start_date, experiment.end_date, now),
        );

        if target <= members.len() {
            debug!(feature_key = %key, target, members = members.len(), "At target");
            return Ok(0);
        }
        let needed = target - members.len();

        let mut picked: Vec<UserId> = self
            .users
            .list_admins()
            .await?
            .into_iter()
            .filter(|id| !members.contains(id))
            .take(needed)
            .collect();

        let remaining = needed - picked.len();
        if remaining > 0 {
            let chosen: HashSet<_> = picked.iter().copied().collect();
            let pool: Vec<_> = self
                .population()
                .await?
                .into_iter()
                .filter(|id| !members.contains(id) && !chosen.contains(id))
                .collect();
            picked.extend(self.sample(pool, remaining));
        }

        let added = self.enroll(key, &picked).await?;
        debug!(feature_key = %key, target, added, "Ramped experiment");
        Ok(added)
    }

    /// Experiments created before their start are seeded on the first tick
    /// inside the window.
    async fn seed_and_ramp(
        &self,
        experiment: &Experiment,
        now: DateTime<Utc>,
    ) -> Result<usize, RolloutError> {
        let seeded = self.seed_once(experiment).await?;
        Ok(seeded + self.ramp(experiment, now).await?)
    }

    /// Enroll everyone, one batch at a time. Re-running adds nothing.
    async fn complete(&self, experiment: &Experiment) -> Result<usize, RolloutError> {
        let key = &experiment.feature_key;
        let batch = self.config.expansion_batch_size.max(1);
        let mut offset = 0;
        let mut added = 0;
        loop {
            let page = self.users.list_all(offset, batch).await?;
            if page.is_empty() {
                break;
            }
            added += self.enroll(key, &page).await?;
            offset += page.len();
            if page.len() < batch {
                break;
            }
        }
        if added > 0 {
            info!(feature_key = %key, added, "Experiment expanded to all users");
        }
        Ok(added)
    }
}

fn parse_definition(feature_key: &str, raw: &str) -> Result<Experiment, RolloutError> {
    serde_json::from_str(raw).map_err(|e| RolloutError::Corrupt {
        feature_key: feature_key.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl FeatureRolloutApi for RolloutEngine {
    async fn create_experiment(&self, request: NewExperiment) -> Result<Experiment, RolloutError> {
        if request.name.trim().is_empty() {
            return Err(RolloutError::InvalidDefinition("name is empty".to_string()));
        }
        if request.feature_key.trim().is_empty() {
            return Err(RolloutError::InvalidDefinition(
                "feature key is empty".to_string(),
            ));
        }
        if request.start_date >= request.end_date {
            return Err(RolloutError::InvalidWindow {
                start: request.start_date,
                end: request.end_date,
            });
        }

        let experiment = Experiment {
            name: request.name,
            feature_key: request.feature_key,
            description: request.description,
            start_date: request.start_date,
            end_date: request.end_date,
            initial_user_count: request.initial_user_count,
        };
        let raw = serde_json::to_string(&experiment).map_err(|e| RolloutError::Corrupt {
            feature_key: experiment.feature_key.clone(),
            reason: e.to_string(),
        })?;
        self.store
            .hset(keys::ACTIVE_EXPERIMENTS, &experiment.feature_key, &raw)
            .await?;
        info!(
            feature_key = %experiment.feature_key,
            start = %experiment.start_date,
            end = %experiment.end_date,
            initial = experiment.initial_user_count,
            "Experiment created"
        );

        if self.time.now() >= experiment.start_date {
            self.seed_once(&experiment).await?;
        }
        Ok(experiment)
    }

    async fn delete_experiment(&self, feature_key: &str) -> Result<bool, RolloutError> {
        let existed = self.store.hdel(keys::ACTIVE_EXPERIMENTS, feature_key).await?;
        self.store.del(&keys::members(feature_key)).await?;
        self.store.del(&keys::seeded(feature_key)).await?;
        if existed {
            info!(%feature_key, "Experiment deleted");
        }
        Ok(existed)
    }

    async fn experiment_exists(&self, feature_key: &str) -> Result<bool, RolloutError> {
        Ok(self
            .store
            .hget(keys::ACTIVE_EXPERIMENTS, feature_key)
            .await?
            .is_some())
    }

    async fn process_experiments(&self) -> Result<TickReport, RolloutError> {
        let now = self.time.now();
        let mut report = TickReport::default();

        for (feature_key, parsed) in self.load_definitions().await? {
            let experiment = match parsed {
                Ok(experiment) => experiment,
                Err(e) => {
                    error!(%feature_key, error = %e, "Unreadable experiment definition");
                    report.failed.push(feature_key);
                    continue;
                }
            };

            let outcome = match experiment.phase_at(now) {
                ExperimentPhase::Scheduled => {
                    report.skipped += 1;
                    continue;
                }
                ExperimentPhase::Completed => self
                    .complete(&experiment)
                    .await
                    .map(|added| (ExperimentPhase::Completed, added)),
                ExperimentPhase::Ramping => self
                    .seed_and_ramp(&experiment, now)
                    .await
                    .map(|added| (ExperimentPhase::Ramping, added)),
            };

            match outcome {
                Ok((phase, added)) => {
                    if phase == ExperimentPhase::Completed {
                        report.completed += 1;
                    } else {
                        report.ramped += 1;
                    }
                    report.members_added += added;
                }
                Err(e) => {
                    error!(%feature_key, error = %e, "Failed to process experiment");
                    report.failed.push(feature_key);
                }
            }
        }

        ROLLOUT_TICKS.inc();
        info!(
            ramped = report.ramped,
            completed = report.completed,
            skipped = report.skipped,
            failed = report.failed.len(),
            added = report.members_added,
            "Rollout tick finished"
        );
        Ok(report)
    }

    async fn get_user_experimental_features(
        &self,
        user: UserId,
    ) -> Result<Vec<String>, RolloutError> {
        let now = self.time.now();
        let member = user.to_string();
        let mut features = Vec::new();
        for experiment in self.list_experiments().await? {
            if !experiment.is_live_at(now) {
                continue;
            }
            if self
                .store
                .sismember(&keys::members(&experiment.feature_key), &member)
                .await?
            {
                features.push(experiment.feature_key);
            }
        }
        Ok(features)
    }

    async fn is_feature_enabled(
        &self,
        user: UserId,
        feature_key: &str,
    ) -> Result<bool, RolloutError> {
        let Some(experiment) = self.get_experiment(feature_key).await? else {
            return Ok(false);
        };
        if !experiment.is_live_at(self.time.now()) {
            return Ok(false);
        }
        Ok(self
            .store
            .sismember(&keys::members(feature_key), &user.to_string())
            .await?)
    }

    async fn experiment_status(&self, feature_key: &str) -> Result<ExperimentStatus, RolloutError> {
        let experiment = self
            .get_experiment(feature_key)
            .await?
            .ok_or_else(|| RolloutError::NotFound(feature_key.to_string()))?;
        let now = self.time.now();
        let members = self.store.scard(&keys::members(feature_key)).await?;
        let total_users = self.users.count_all().await?;
        let phase = experiment.phase_at(now);
        let target = match phase {
            ExperimentPhase::Scheduled => 0,
            ExperimentPhase::Ramping => target_count(
                experiment.initial_user_count,
                total_users,
                progress(experiment.start_date, experiment.end_date, now),
            ),
            ExperimentPhase::Completed => total_users,
        };
        Ok(ExperimentStatus {
            experiment,
            phase,
            members,
            total_users,
            target,
        })
    }
}
