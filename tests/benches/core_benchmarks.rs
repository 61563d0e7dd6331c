//! # Biolink Core Benchmarks
//!
//! | Area | Operation | Scale |
//! |------|-----------|-------|
//! | Event bus | publish + local dispatch | 1, 4, 16 handlers |
//! | Feature rollout | first tick of a ramp | 1k, 10k, 50k users |
//! | Alt detection | login from a crowded address | 10, 100 accounts |

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use tokio::runtime::Runtime;

use bl_01_feature_rollout::{FeatureRolloutApi, InMemoryUserDirectory, NewExperiment, RolloutEngine};
use bl_02_alt_detection::{AltDetectionApi, AltDetector, DetectorConfig, InMemoryAccountDirectory};
use shared_bus::{handler_fn, BusConfig, EventBus, EventType, InMemoryEventStore};
use shared_store::{InMemoryStore, SharedStore};
use shared_types::{Account, ManualTimeSource, SystemTimeSource, UserId};

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("tokio runtime")
}

// ============================================================================
// Event bus
// ============================================================================

fn bench_publish(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("event-bus");
    group.measurement_time(Duration::from_secs(5));

    for handlers in [1usize, 4, 16] {
        let bus = rt.block_on(async {
            let bus = EventBus::new(
                Arc::new(InMemoryEventStore::new()),
                Arc::new(InMemoryStore::new()),
                BusConfig::default(),
            );
            for i in 0..handlers {
                bus.subscribe(
                    EventType::UserLoggedIn,
                    Arc::new(handler_fn(format!("noop-{i}"), |_| async { Ok(()) })),
                );
            }
            bus
        });

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::new("publish_and_drain", handlers),
            &handlers,
            |b, _| {
                b.iter(|| {
                    rt.block_on(async {
                        let event = bus
                            .publish(EventType::UserLoggedIn, &json!({"uid": 1}))
                            .await
                            .expect("publish");
                        bus.wait_idle().await;
                        black_box(event)
                    })
                })
            },
        );
    }
    group.finish();
}

// ============================================================================
// Feature rollout
// ============================================================================

fn bench_rollout_tick(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("feature-rollout");
    group.sample_size(10);

    let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    for population in [1_000u64, 10_000, 50_000] {
        let users = Arc::new(InMemoryUserDirectory::with_population(10, population - 10));
        group.throughput(Throughput::Elements(population));
        group.bench_with_input(
            BenchmarkId::new("first_ramp_tick", population),
            &population,
            |b, _| {
                b.iter(|| {
                    rt.block_on(async {
                        let time = Arc::new(ManualTimeSource::new(start));
                        let engine = RolloutEngine::with_seed(
                            Arc::new(InMemoryStore::new()),
                            users.clone(),
                            time.clone(),
                            42,
                        );
                        engine
                            .create_experiment(NewExperiment {
                                name: "Bench".to_string(),
                                feature_key: "bench".to_string(),
                                description: String::new(),
                                start_date: start,
                                end_date: start + ChronoDuration::days(10),
                                initial_user_count: 100,
                            })
                            .await
                            .expect("create");
                        time.advance(ChronoDuration::days(5));
                        black_box(engine.process_experiments().await.expect("tick"))
                    })
                })
            },
        );
    }
    group.finish();
}

// ============================================================================
// Alt detection
// ============================================================================

fn bench_crowded_login(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("alt-detection");
    group.sample_size(20);

    for crowd in [10u64, 100] {
        group.bench_with_input(BenchmarkId::new("login_new_member", crowd), &crowd, |b, _| {
            b.iter(|| {
                rt.block_on(async {
                    let store: Arc<dyn SharedStore> = Arc::new(InMemoryStore::new());
                    let accounts = Arc::new(InMemoryAccountDirectory::new());
                    for id in 1..=crowd + 1 {
                        accounts.upsert(Account::new(id, format!("user{id}")));
                    }
                    let bus = Arc::new(EventBus::new(
                        Arc::new(InMemoryEventStore::new()),
                        store.clone(),
                        BusConfig::default(),
                    ));
                    let detector = AltDetector::new(
                        store,
                        accounts,
                        bus,
                        Arc::new(SystemTimeSource),
                        DetectorConfig::default(),
                    );
                    for id in 1..=crowd {
                        detector
                            .on_login(UserId(id), "192.0.2.1")
                            .await
                            .expect("login");
                    }
                    black_box(
                        detector
                            .on_login(UserId(crowd + 1), "192.0.2.1")
                            .await
                            .expect("login"),
                    )
                })
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_publish, bench_rollout_tick, bench_crowded_login);
criterion_main!(benches);
