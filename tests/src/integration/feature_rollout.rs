//! # Feature Rollout Flows
//!
//! A ramp driven by several processes over one shared store.
//!
//! ## Properties Tested:
//!
//! 1. **Monotonic ramp**: membership never shrinks between ticks
//! 2. **Overlapping ticks**: two schedulers on the same experiment converge
//! 3. **Completion**: past the end date everyone is enrolled, re-running adds nothing
//! 4. **Gating**: features are reported only inside the window

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, TimeZone, Utc};

    use bl_01_feature_rollout::{
        ExperimentPhase, FeatureRolloutApi, InMemoryUserDirectory, NewExperiment, RolloutEngine,
    };
    use shared_store::{InMemoryStore, SharedStore};
    use shared_types::{ManualTimeSource, UserId};

    const ADMINS: u64 = 3;
    const USERS: u64 = 197;
    const POPULATION: usize = 200;

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    fn launch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    struct Cluster {
        time: Arc<ManualTimeSource>,
        api: RolloutEngine,
        worker: RolloutEngine,
    }

    fn cluster() -> Cluster {
        let store: Arc<dyn SharedStore> = Arc::new(InMemoryStore::new());
        let users = Arc::new(InMemoryUserDirectory::with_population(ADMINS, USERS));
        let time = Arc::new(ManualTimeSource::new(launch() - Duration::hours(1)));
        Cluster {
            api: RolloutEngine::with_seed(store.clone(), users.clone(), time.clone(), 11),
            worker: RolloutEngine::with_seed(store, users, time.clone(), 29),
            time,
        }
    }

    fn dark_mode(initial_user_count: usize) -> NewExperiment {
        NewExperiment {
            name: "Dark mode".to_string(),
            feature_key: "dark-mode".to_string(),
            description: "Dark theme for the profile editor".to_string(),
            start_date: launch(),
            end_date: launch() + Duration::days(10),
            initial_user_count,
        }
    }

    // =========================================================================
    // INTEGRATION TESTS
    // =========================================================================

    #[tokio::test]
    async fn test_ramp_is_monotonic_across_processes() {
        let c = cluster();
        c.api.create_experiment(dark_mode(10)).await.unwrap();

        // Created before launch: nothing enrolled yet
        let status = c.api.experiment_status("dark-mode").await.unwrap();
        assert_eq!(status.phase, ExperimentPhase::Scheduled);
        assert_eq!(status.members, 0);

        let mut previous = 0;
        c.time.set(launch());
        for day in 0..=10 {
            // Both processes tick at the same instant
            c.api.process_experiments().await.unwrap();
            c.worker.process_experiments().await.unwrap();

            let status = c.worker.experiment_status("dark-mode").await.unwrap();
            assert!(
                status.members >= previous,
                "membership shrank on day {day}: {} < {previous}",
                status.members
            );
            assert_eq!(status.members, status.target.max(previous));
            previous = status.members;
            c.time.advance(Duration::days(1));
        }
        assert_eq!(previous, POPULATION);
    }

    #[tokio::test]
    async fn test_completion_enrolls_everyone_once() {
        let c = cluster();
        c.time.set(launch() + Duration::minutes(1));
        c.api.create_experiment(dark_mode(5)).await.unwrap();

        let early = c.api.experiment_status("dark-mode").await.unwrap();
        assert_eq!(early.members, 5);
        for admin in 1..=ADMINS {
            assert!(c
                .api
                .is_feature_enabled(UserId(admin), "dark-mode")
                .await
                .unwrap());
        }

        c.time.advance(Duration::days(11));
        let report = c.worker.process_experiments().await.unwrap();
        assert_eq!(report.completed, 1);
        assert_eq!(report.members_added, POPULATION - 5);

        let status = c.api.experiment_status("dark-mode").await.unwrap();
        assert_eq!(status.phase, ExperimentPhase::Completed);
        assert_eq!(status.members, POPULATION);

        let again = c.api.process_experiments().await.unwrap();
        assert_eq!(again.completed, 1);
        assert_eq!(again.members_added, 0);
    }

    #[tokio::test]
    async fn test_features_reported_only_inside_window() {
        let c = cluster();
        c.time.set(launch() + Duration::hours(1));
        c.api.create_experiment(dark_mode(3)).await.unwrap();

        let admin = UserId(1);
        assert_eq!(
            c.worker.get_user_experimental_features(admin).await.unwrap(),
            vec!["dark-mode".to_string()]
        );

        c.time.set(launch() + Duration::days(10));
        assert!(c
            .worker
            .get_user_experimental_features(admin)
            .await
            .unwrap()
            .is_empty());
        assert!(!c.api.is_feature_enabled(admin, "dark-mode").await.unwrap());

        assert!(c.api.delete_experiment("dark-mode").await.unwrap());
        assert!(!c.worker.experiment_exists("dark-mode").await.unwrap());
    }
}
