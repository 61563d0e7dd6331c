//! # Process Runtime
//!
//! Owns every long-lived component of one process and their lifecycles.
//!
//! ## Startup Sequence
//!
//! 1. Register bus handlers (notifiers only for `bot` / `all`)
//! 2. Start the event listener on the shared channel
//! 3. Start the rollout scheduler (only for `api` / `all`)
//!
//! If the listener cannot subscribe, the handlers from step 1 are removed
//! again and `start` may be retried.
//!
//! ## Shutdown Sequence
//!
//! 1. Signal the listener and the scheduler
//! 2. Wait for both to exit
//! 3. Drain queued handler invocations

use crate::adapters::{LoggingNotifier, Notifier};
use crate::config::RuntimeConfig;
use crate::handlers::{AltAccountAnnouncer, AuditLogHandler};
use bl_01_feature_rollout::{
    FeatureRolloutApi, InMemoryUserDirectory, RolloutEngine, UserDirectory,
};
use bl_02_alt_detection::{AccountDirectory, AltDetector, InMemoryAccountDirectory};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared_bus::{
    BusError, EventBus, EventListener, EventStore, EventType, HandlerId, InMemoryEventStore,
};
use shared_store::{InMemoryStore, SharedStore};
use shared_types::{SystemTimeSource, TimeSource};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Runtime errors.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Runtime already started")]
    AlreadyStarted,

    #[error(transparent)]
    Bus(#[from] BusError),
}

/// External collaborators of one process.
pub struct RuntimeDeps {
    pub store: Arc<dyn SharedStore>,
    pub events: Arc<dyn EventStore>,
    pub users: Arc<dyn UserDirectory>,
    pub accounts: Arc<dyn AccountDirectory>,
    pub notifier: Arc<dyn Notifier>,
    pub time: Arc<dyn TimeSource>,
}

impl RuntimeDeps {
    /// Dependencies around a deployed shared store. The event table and the
    /// directories stay in-process.
    #[must_use]
    pub fn with_store(store: Arc<dyn SharedStore>) -> Self {
        Self {
            store,
            events: Arc::new(InMemoryEventStore::new()),
            users: Arc::new(InMemoryUserDirectory::new()),
            accounts: Arc::new(InMemoryAccountDirectory::new()),
            notifier: Arc::new(LoggingNotifier),
            time: Arc::new(SystemTimeSource),
        }
    }

    /// Self-contained dependencies for a single process.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::with_store(Arc::new(InMemoryStore::new()))
    }
}

/// One Biolink core process.
pub struct BiolinkRuntime {
    config: RuntimeConfig,
    notifier: Arc<dyn Notifier>,
    bus: Arc<EventBus>,
    rollout: Arc<RolloutEngine>,
    detector: Arc<AltDetector>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl BiolinkRuntime {
    /// Build every component. Must be called from within a Tokio runtime.
    pub fn new(config: RuntimeConfig, deps: RuntimeDeps) -> Self {
        info!(role = %config.role, "Creating Biolink runtime");

        let bus = Arc::new(EventBus::new(
            deps.events,
            Arc::clone(&deps.store),
            config.bus.clone(),
        ));

        let rng = match config.rollout_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let rollout = Arc::new(RolloutEngine::new(
            Arc::clone(&deps.store),
            deps.users,
            Arc::clone(&deps.time),
            rng,
            config.rollout.clone(),
        ));

        let detector = Arc::new(AltDetector::new(
            deps.store,
            deps.accounts,
            bus.clone(),
            deps.time,
            config.detector.clone(),
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            config,
            notifier: deps.notifier,
            bus,
            rollout,
            detector,
            shutdown_tx,
            shutdown_rx,
            tasks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    /// Register handlers and start background tasks.
    pub async fn start(&self) -> Result<(), RuntimeError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(RuntimeError::AlreadyStarted);
        }

        let registered = self.register_handlers();
        let listener = match EventListener::new(Arc::clone(&self.bus))
            .start(self.shutdown_rx.clone())
            .await
        {
            Ok(listener) => listener,
            Err(e) => {
                for (event_type, id) in registered {
                    self.bus.unsubscribe(event_type, id);
                }
                self.started.store(false, Ordering::SeqCst);
                error!(error = %e, "Event listener failed to start");
                return Err(e.into());
            }
        };
        self.tasks.lock().push(listener);

        if self.config.role.runs_scheduler() {
            let scheduler = tokio::spawn(run_rollout_scheduler(
                Arc::clone(&self.rollout),
                self.config.rollout_interval,
                self.shutdown_rx.clone(),
            ));
            self.tasks.lock().push(scheduler);
        }

        info!(
            role = %self.config.role,
            channel = %self.config.bus.channel,
            rollout_interval = ?self.config.rollout_interval,
            "Biolink runtime started"
        );
        Ok(())
    }

    fn register_handlers(&self) -> Vec<(EventType, HandlerId)> {
        let audit = self
            .bus
            .subscribe_many(&EventType::ALL, Arc::new(AuditLogHandler));
        let mut registered: Vec<_> = EventType::ALL.iter().copied().zip(audit).collect();

        if self.config.role.runs_notifiers() {
            let announcer = self.bus.subscribe(
                EventType::AltAccountDetected,
                Arc::new(AltAccountAnnouncer::new(Arc::clone(&self.notifier))),
            );
            registered.push((EventType::AltAccountDetected, announcer));
        }
        registered
    }

    /// Stop background tasks and drain the bus.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown...");

        if self.shutdown_tx.send(true).is_err() {
            debug!("No background task was listening for shutdown");
        }

        let tasks: Vec<_> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }

        self.bus.shutdown().await;
        info!("Shutdown complete");
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    #[must_use]
    pub fn bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }

    #[must_use]
    pub fn rollout(&self) -> Arc<RolloutEngine> {
        Arc::clone(&self.rollout)
    }

    #[must_use]
    pub fn detector(&self) -> Arc<AltDetector> {
        Arc::clone(&self.detector)
    }
}

/// Run a rollout tick every `interval` until shutdown.
///
/// A slow tick delays the next one rather than bunching them up.
pub async fn run_rollout_scheduler(
    engine: Arc<RolloutEngine>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(?interval, "Rollout scheduler started");

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                if let Err(e) = engine.process_experiments().await {
                    error!(error = %e, "Rollout tick failed");
                }
            }
        }
    }
    info!("Rollout scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::RecordingNotifier;
    use crate::config::ProcessRole;
    use bl_01_feature_rollout::NewExperiment;
    use bl_02_alt_detection::AltDetectionApi;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use shared_types::{Account, ManualTimeSource, UserId};

    fn config(role: ProcessRole) -> RuntimeConfig {
        let mut config = RuntimeConfig::default();
        config.role = role;
        config.rollout_seed = Some(7);
        config.bus.listener_backoff = Duration::from_millis(10);
        config
    }

    struct Shared {
        store: Arc<InMemoryStore>,
        events: Arc<InMemoryEventStore>,
        accounts: Arc<InMemoryAccountDirectory>,
    }

    impl Shared {
        fn new() -> Self {
            Self {
                store: Arc::new(InMemoryStore::new()),
                events: Arc::new(InMemoryEventStore::new()),
                accounts: Arc::new(InMemoryAccountDirectory::new()),
            }
        }

        fn deps(&self, notifier: Arc<dyn Notifier>) -> RuntimeDeps {
            RuntimeDeps {
                store: self.store.clone(),
                events: self.events.clone(),
                users: Arc::new(InMemoryUserDirectory::with_population(1, 20)),
                accounts: self.accounts.clone(),
                notifier,
                time: Arc::new(SystemTimeSource),
            }
        }
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
        for _ in 0..200 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        condition()
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let runtime = BiolinkRuntime::new(config(ProcessRole::All), RuntimeDeps::in_memory());
        runtime.start().await.unwrap();
        assert!(matches!(
            runtime.start().await,
            Err(RuntimeError::AlreadyStarted)
        ));
        runtime.shutdown().await;
        assert!(runtime.bus().is_closed());
    }

    #[tokio::test]
    async fn test_start_can_be_retried_after_store_outage() {
        let shared = Shared::new();
        let runtime = BiolinkRuntime::new(
            config(ProcessRole::Bot),
            shared.deps(Arc::new(RecordingNotifier::new())),
        );

        let bus = runtime.bus();
        shared.store.set_offline(true);
        assert!(matches!(runtime.start().await, Err(RuntimeError::Bus(_))));
        assert_eq!(bus.registry().handler_count(EventType::UserRegistered), 0);
        assert_eq!(bus.registry().handler_count(EventType::AltAccountDetected), 0);

        shared.store.set_offline(false);
        runtime.start().await.unwrap();
        assert_eq!(bus.registry().handler_count(EventType::UserRegistered), 1);
        assert_eq!(bus.registry().handler_count(EventType::AltAccountDetected), 2);

        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_bot_announces_detection_from_api_process() {
        let shared = Shared::new();
        shared.accounts.upsert(Account::new(1u64, "alice"));
        shared.accounts.upsert(Account::new(2u64, "mallory"));

        let api_notifier = Arc::new(RecordingNotifier::new());
        let bot_notifier = Arc::new(RecordingNotifier::new());
        let api = BiolinkRuntime::new(config(ProcessRole::Api), shared.deps(api_notifier.clone()));
        let bot = BiolinkRuntime::new(config(ProcessRole::Bot), shared.deps(bot_notifier.clone()));
        api.start().await.unwrap();
        bot.start().await.unwrap();

        let detector = api.detector();
        assert!(detector
            .on_registration(UserId(1), "203.0.113.7")
            .await
            .unwrap()
            .is_none());
        let detection = detector
            .on_registration(UserId(2), "203.0.113.7")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(detection.matches.len(), 1);

        assert!(wait_for(|| bot_notifier.sent().len() == 1).await);
        assert_eq!(
            bot_notifier.sent()[0].title,
            "Possible alt accounts: mallory (#2)"
        );
        assert!(api_notifier.sent().is_empty());

        api.shutdown().await;
        bot.shutdown().await;
    }

    #[tokio::test]
    async fn test_scheduler_completes_experiment() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let time = Arc::new(ManualTimeSource::new(start));
        let store: Arc<dyn SharedStore> = Arc::new(InMemoryStore::new());
        let engine = Arc::new(RolloutEngine::with_seed(
            store,
            Arc::new(InMemoryUserDirectory::with_population(2, 48)),
            time.clone(),
            3,
        ));
        engine
            .create_experiment(NewExperiment {
                name: "New editor".to_string(),
                feature_key: "new-editor".to_string(),
                description: String::new(),
                start_date: start,
                end_date: start + ChronoDuration::days(7),
                initial_user_count: 5,
            })
            .await
            .unwrap();
        time.advance(ChronoDuration::days(8));

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(run_rollout_scheduler(
            Arc::clone(&engine),
            Duration::from_millis(10),
            rx,
        ));

        let mut completed = false;
        for _ in 0..200 {
            let status = engine.experiment_status("new-editor").await.unwrap();
            if status.members == status.total_users {
                completed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(completed);

        tx.send(true).unwrap();
        task.await.unwrap();
    }
}
