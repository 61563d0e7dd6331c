//! # Alt Detection Flows
//!
//! Detection in the API process, announcement in the bot process.
//!
//! ## Flow Tested:
//!
//! ```text
//! API: AltDetector ──publish──→ EventBus ──broadcast──→ shared channel
//! Bot: EventListener ──→ AltAccountAnnouncer ──→ Notifier
//! ```

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bl_02_alt_detection::{AltDetectionApi, DetectionSource, InMemoryAccountDirectory};
    use bl_runtime::adapters::{Notification, RecordingNotifier};
    use bl_runtime::handlers::alt_announcer::{COLOR_HIGH, COLOR_LOW, COLOR_MEDIUM};
    use bl_runtime::{BiolinkRuntime, ProcessRole, RuntimeConfig, RuntimeDeps};
    use bl_01_feature_rollout::InMemoryUserDirectory;
    use shared_bus::InMemoryEventStore;
    use shared_store::InMemoryStore;
    use shared_types::{Account, SystemTimeSource, UserId};

    const SHARED_IP: &str = "198.51.100.20";

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    struct Deployment {
        api: BiolinkRuntime,
        bot: BiolinkRuntime,
        events: Arc<InMemoryEventStore>,
        accounts: Arc<InMemoryAccountDirectory>,
        notifier: Arc<RecordingNotifier>,
    }

    impl Deployment {
        async fn start() -> Self {
            let store = Arc::new(InMemoryStore::new());
            let events = Arc::new(InMemoryEventStore::new());
            let accounts = Arc::new(InMemoryAccountDirectory::new());
            let notifier = Arc::new(RecordingNotifier::new());

            let process = |role: ProcessRole| {
                let mut config = RuntimeConfig::default();
                config.role = role;
                config.rollout_seed = Some(1);
                config.bus.listener_backoff = Duration::from_millis(10);
                let deps = RuntimeDeps {
                    store: store.clone(),
                    events: events.clone(),
                    users: Arc::new(InMemoryUserDirectory::new()),
                    accounts: accounts.clone(),
                    notifier: notifier.clone(),
                    time: Arc::new(SystemTimeSource),
                };
                BiolinkRuntime::new(config, deps)
            };

            let api = process(ProcessRole::Api);
            let bot = process(ProcessRole::Bot);
            api.start().await.unwrap();
            bot.start().await.unwrap();

            Self {
                api,
                bot,
                events,
                accounts,
                notifier,
            }
        }

        fn account(&self, id: u64, username: &str, email: Option<&str>) {
            let mut account = Account::new(id, username);
            if let Some(email) = email {
                account = account.with_email(email);
            }
            self.accounts.upsert(account);
        }

        /// Wait until `count` notifications arrived, then give stragglers a
        /// moment to show up.
        async fn notifications(&self, count: usize) -> Vec<Notification> {
            for _ in 0..200 {
                if self.notifier.sent().len() >= count {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.bot.bus().wait_idle().await;
            self.notifier.sent()
        }

        async fn stop(self) {
            self.api.shutdown().await;
            self.bot.shutdown().await;
        }
    }

    // =========================================================================
    // INTEGRATION TESTS
    // =========================================================================

    #[tokio::test]
    async fn test_ip_path_notifies_once_per_group() {
        let deployment = Deployment::start().await;
        deployment.account(1, "alice", None);
        deployment.account(2, "alice_alt", None);
        deployment.account(3, "alice_alt2", None);
        let detector = deployment.api.detector();

        assert!(detector
            .on_registration(UserId(1), "203.0.113.1")
            .await
            .unwrap()
            .is_none());
        assert!(detector
            .on_registration(UserId(2), "203.0.113.2")
            .await
            .unwrap()
            .is_none());
        assert!(detector
            .on_login(UserId(1), SHARED_IP)
            .await
            .unwrap()
            .is_none());

        let first = detector
            .on_login(UserId(2), SHARED_IP)
            .await
            .unwrap()
            .expect("first shared login is reported");
        assert_eq!(first.source, DetectionSource::Login);
        assert!((first.confidence - 0.5).abs() < f64::EPSILON);

        // Same address again, and away and back: the pair is already known
        assert!(detector
            .on_login(UserId(1), SHARED_IP)
            .await
            .unwrap()
            .is_none());
        assert!(detector
            .on_login(UserId(1), "203.0.113.1")
            .await
            .unwrap()
            .is_none());
        assert!(detector
            .on_login(UserId(1), SHARED_IP)
            .await
            .unwrap()
            .is_none());

        // A third account joins the address group
        let second = detector
            .on_login(UserId(3), SHARED_IP)
            .await
            .unwrap()
            .expect("new member is reported");
        assert_eq!(second.matches.len(), 2);
        assert!((second.confidence - 0.7).abs() < 1e-9);

        let mut sent = deployment.notifications(2).await;
        assert_eq!(sent.len(), 2);
        sent.sort_by(|a, b| a.title.cmp(&b.title));
        assert_eq!(sent[0].title, "Possible alt accounts: alice_alt (#2)");
        assert_eq!(sent[0].color, COLOR_LOW);
        assert_eq!(sent[1].title, "Possible alt accounts: alice_alt2 (#3)");
        assert_eq!(sent[1].color, COLOR_MEDIUM);

        assert_eq!(
            detector.known_alts(UserId(1)).await.unwrap(),
            vec![UserId(2), UserId(3)]
        );
        deployment.stop().await;
    }

    #[tokio::test]
    async fn test_login_after_event_table_outage_still_reports() {
        let deployment = Deployment::start().await;
        deployment.account(30, "carol", None);
        deployment.account(31, "carol_alt", None);
        let detector = deployment.api.detector();

        assert!(detector
            .on_login(UserId(30), SHARED_IP)
            .await
            .unwrap()
            .is_none());

        deployment.events.set_offline(true);
        assert!(detector.on_login(UserId(31), SHARED_IP).await.is_err());
        deployment.events.set_offline(false);

        let detection = detector
            .on_login(UserId(31), SHARED_IP)
            .await
            .unwrap()
            .expect("retried login is reported");
        assert_eq!(detection.matches.len(), 1);

        let sent = deployment.notifications(1).await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].title, "Possible alt accounts: carol_alt (#31)");
        deployment.stop().await;
    }

    #[tokio::test]
    async fn test_email_match_does_not_hide_shared_address() {
        let deployment = Deployment::start().await;
        deployment.account(40, "dave", Some("dave@example.com"));
        deployment.account(41, "dave2", Some("dave@example.com"));
        let detector = deployment.api.detector();

        detector
            .on_email_verified(UserId(41), "dave@example.com")
            .await
            .unwrap()
            .expect("email match is reported");
        detector.on_login(UserId(40), SHARED_IP).await.unwrap();
        let shared = detector
            .on_login(UserId(41), SHARED_IP)
            .await
            .unwrap()
            .expect("shared address is reported");
        assert_eq!(shared.source, DetectionSource::Login);

        let sent = deployment.notifications(2).await;
        assert_eq!(sent.len(), 2);
        deployment.stop().await;
    }

    #[tokio::test]
    async fn test_registration_always_reports() {
        let deployment = Deployment::start().await;
        deployment.account(10, "first", None);
        deployment.account(11, "second", None);
        let detector = deployment.api.detector();

        detector.on_registration(UserId(10), SHARED_IP).await.unwrap();
        let detection = detector
            .on_registration(UserId(11), SHARED_IP)
            .await
            .unwrap()
            .expect("shared registration is reported");
        assert_eq!(detection.source, DetectionSource::Registration);
        assert!((detection.confidence - 0.6).abs() < 1e-9);

        // The registration cached the address, so the first login is quiet
        assert!(detector
            .on_login(UserId(11), SHARED_IP)
            .await
            .unwrap()
            .is_none());

        let sent = deployment.notifications(1).await;
        assert_eq!(sent.len(), 1);
        deployment.stop().await;
    }

    #[tokio::test]
    async fn test_email_path_reports_every_verification() {
        let deployment = Deployment::start().await;
        deployment.account(20, "owner", Some("same@example.com"));
        deployment.account(21, "copy", Some("same@example.com"));
        let detector = deployment.api.detector();

        for _ in 0..2 {
            let detection = detector
                .on_email_verified(UserId(21), "same@example.com")
                .await
                .unwrap()
                .expect("email match is reported");
            assert!((detection.confidence - 0.95).abs() < 1e-9);
        }

        let sent = deployment.notifications(2).await;
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|n| n.color == COLOR_HIGH));
        deployment.stop().await;
    }
}
