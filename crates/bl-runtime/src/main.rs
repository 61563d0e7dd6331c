//! # Biolink Core Process
//!
//! Runs the event bus, the rollout scheduler and the moderation notifiers
//! for the role selected by `BL_PROCESS_ROLE`, coordinating with the other
//! processes through the Redis instance at `BL_REDIS_URL`.

use std::sync::Arc;

use anyhow::{Context, Result};
use bl_runtime::{BiolinkRuntime, RuntimeConfig, RuntimeDeps};
use bl_telemetry::{init_telemetry, TelemetryConfig};
use shared_store::RedisStore;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let _guard =
        init_telemetry(&TelemetryConfig::from_env()).context("Failed to initialize telemetry")?;

    let config = RuntimeConfig::from_env();

    let store = RedisStore::connect(&config.redis_url)
        .await
        .context("Failed to connect to the shared store")?;
    let deps = RuntimeDeps::with_store(Arc::new(store));

    let runtime = BiolinkRuntime::new(config, deps);
    runtime
        .start()
        .await
        .context("Failed to start Biolink runtime")?;

    info!("Biolink core is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    runtime.shutdown().await;

    Ok(())
}
