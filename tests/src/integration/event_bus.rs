//! # Event Bus Flows
//!
//! Publishing, cross-process fan-out and handler isolation.
//!
//! ## Flows Tested:
//!
//! 1. **Publish**: durable record first, then local dispatch
//! 2. **Fan-out**: a second process receives the broadcast through its listener
//! 3. **Self-skip**: a process never re-dispatches its own broadcast
//! 4. **Idempotence**: handlers running in two processes apply a side effect once
//! 5. **Replay**: unacknowledged events are re-dispatched after a restart

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::{mpsc, watch};
    use tokio::time::timeout;

    use shared_bus::{
        handler_fn, BusConfig, Event, EventBus, EventHandler, EventListener, EventPublisher,
        EventStore, EventType, HandlerError, InMemoryEventStore,
    };
    use shared_store::{InMemoryStore, SharedStore};

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    /// Store and event table shared by every process in a test.
    struct Backend {
        store: Arc<InMemoryStore>,
        events: Arc<InMemoryEventStore>,
    }

    impl Backend {
        fn new() -> Self {
            Self {
                store: Arc::new(InMemoryStore::new()),
                events: Arc::new(InMemoryEventStore::new()),
            }
        }

        fn process(&self) -> Arc<EventBus> {
            let config = BusConfig {
                listener_backoff: Duration::from_millis(10),
                ..BusConfig::default()
            };
            Arc::new(EventBus::new(
                self.events.clone(),
                self.store.clone(),
                config,
            ))
        }
    }

    fn recorder(name: &str) -> (Arc<dyn EventHandler>, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler = handler_fn(name.to_string(), move |event: Event| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(event);
                Ok(())
            }
        });
        (Arc::new(handler), rx)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timeout waiting for event")
            .expect("handler channel closed")
    }

    /// Grants a welcome bonus once per event, however many processes see it.
    struct WelcomeBonus {
        store: Arc<dyn SharedStore>,
        invocations: AtomicUsize,
        granted: AtomicUsize,
    }

    #[async_trait]
    impl EventHandler for WelcomeBonus {
        fn name(&self) -> &str {
            "welcome-bonus"
        }

        async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            let claimed = self
                .store
                .set_nx(&format!("bonus:{}", event.id), "1", None)
                .await
                .map_err(|e| HandlerError::failed(e.to_string()))?;
            if claimed {
                self.granted.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    struct Panics;

    #[async_trait]
    impl EventHandler for Panics {
        async fn handle(&self, _event: &Event) -> Result<(), HandlerError> {
            panic!("handler bug")
        }
    }

    // =========================================================================
    // INTEGRATION TESTS
    // =========================================================================

    #[tokio::test]
    async fn test_user_registered_end_to_end() {
        let backend = Backend::new();
        let bus = backend.process();
        let (handler, mut rx) = recorder("welcome-mail");
        bus.subscribe(EventType::UserRegistered, handler);

        let payload = json!({"uid": 42, "username": "abc"});
        let event = bus
            .publish(EventType::UserRegistered, &payload)
            .await
            .unwrap();

        let seen = next(&mut rx).await;
        assert_eq!(seen.id, event.id);
        assert_eq!(seen.event_type, EventType::UserRegistered);
        assert_eq!(serde_json::Value::Object(seen.payload.clone()), payload);

        let pending = backend.events.list_unprocessed(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, event.id);
        assert!(!pending[0].processed);
        assert!(pending[0].processed_at.is_none());

        bus.shutdown().await;
    }

    #[tokio::test]
    async fn test_broadcast_reaches_other_process_once() {
        let backend = Backend::new();
        let api = backend.process();
        let bot = backend.process();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let (api_handler, mut api_rx) = recorder("api-side");
        let (bot_handler, mut bot_rx) = recorder("bot-side");
        api.subscribe(EventType::DiscordLinked, api_handler);
        bot.subscribe(EventType::DiscordLinked, bot_handler);

        let api_listener = EventListener::new(api.clone())
            .start(shutdown_rx.clone())
            .await
            .unwrap();
        let bot_listener = EventListener::new(bot.clone())
            .start(shutdown_rx)
            .await
            .unwrap();

        let event = api
            .publish(EventType::DiscordLinked, &json!({"uid": 7, "discord_id": "123"}))
            .await
            .unwrap();

        assert_eq!(next(&mut api_rx).await.id, event.id);
        assert_eq!(next(&mut bot_rx).await.id, event.id);

        // The publisher's own listener must not deliver a second copy
        tokio::time::sleep(Duration::from_millis(100)).await;
        api.wait_idle().await;
        assert!(api_rx.try_recv().is_err());
        assert!(bot_rx.try_recv().is_err());

        shutdown_tx.send(true).unwrap();
        api_listener.await.unwrap();
        bot_listener.await.unwrap();
        api.shutdown().await;
        bot.shutdown().await;
    }

    #[tokio::test]
    async fn test_idempotent_handler_across_processes() {
        let backend = Backend::new();
        let api = backend.process();
        let bot = backend.process();
        let bonus = Arc::new(WelcomeBonus {
            store: backend.store.clone(),
            invocations: AtomicUsize::new(0),
            granted: AtomicUsize::new(0),
        });
        api.subscribe(EventType::UserRegistered, bonus.clone());
        bot.subscribe(EventType::UserRegistered, bonus.clone());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let listener = EventListener::new(bot.clone())
            .start(shutdown_rx)
            .await
            .unwrap();

        api.publish(EventType::UserRegistered, &json!({"uid": 1, "username": "ann"}))
            .await
            .unwrap();

        for _ in 0..200 {
            if bonus.invocations.load(Ordering::SeqCst) == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        api.wait_idle().await;
        bot.wait_idle().await;

        assert_eq!(bonus.invocations.load(Ordering::SeqCst), 2);
        assert_eq!(bonus.granted.load(Ordering::SeqCst), 1);

        shutdown_tx.send(true).unwrap();
        listener.await.unwrap();
    }

    #[tokio::test]
    async fn test_handler_failures_are_isolated() {
        let backend = Backend::new();
        let bus = backend.process();
        bus.subscribe(EventType::PurchaseCompleted, Arc::new(Panics));
        bus.subscribe(
            EventType::PurchaseCompleted,
            Arc::new(handler_fn("receipt-mailer", |_| async {
                Err(HandlerError::failed("mail server refused"))
            })),
        );
        let (handler, mut rx) = recorder("ledger");
        bus.subscribe(EventType::PurchaseCompleted, handler);

        let event = bus
            .publish(EventType::PurchaseCompleted, &json!({"order": 99}))
            .await
            .unwrap();

        assert_eq!(next(&mut rx).await.id, event.id);
        bus.wait_idle().await;

        let stats = bus.dispatch_stats();
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.panicked, 1);
        assert_eq!(bus.events_published(), 1);

        // The bus keeps working after a handler panicked
        bus.publish(EventType::PurchaseCompleted, &json!({"order": 100}))
            .await
            .unwrap();
        assert_eq!(next(&mut rx).await.get("order"), Some(&json!(100)));
    }

    #[tokio::test]
    async fn test_replay_after_restart() {
        let backend = Backend::new();
        let first = backend.process();
        let acknowledged = first
            .publish(EventType::RedeemCodeUsed, &json!({"code": "A"}))
            .await
            .unwrap();
        let pending = first
            .publish(EventType::RedeemCodeUsed, &json!({"code": "B"}))
            .await
            .unwrap();
        first.acknowledge(acknowledged.id).await.unwrap();
        first.shutdown().await;

        let restarted = backend.process();
        let (handler, mut rx) = recorder("code-audit");
        restarted.subscribe(EventType::RedeemCodeUsed, handler);

        assert_eq!(restarted.replay_unprocessed(10).await.unwrap(), 1);
        assert_eq!(next(&mut rx).await.id, pending.id);
        restarted.wait_idle().await;
        assert!(rx.try_recv().is_err());
    }
}
