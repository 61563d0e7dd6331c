//! # Runtime Configuration
//!
//! Process-level settings read from the environment. Every value has a
//! default; malformed values are logged and the default is kept.

use bl_02_alt_detection::DetectorConfig;
use bl_01_feature_rollout::RolloutConfig;
use shared_bus::BusConfig;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Default rollout tick interval.
pub const DEFAULT_ROLLOUT_INTERVAL_SECS: u64 = 300;

/// Shared store used when `BL_REDIS_URL` is unset.
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Which duties this process takes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessRole {
    /// Serves user traffic and runs the rollout scheduler.
    Api,
    /// Runs the downstream notifiers.
    Bot,
    /// Both, in one process.
    #[default]
    All,
}

impl ProcessRole {
    #[must_use]
    pub fn runs_scheduler(&self) -> bool {
        matches!(self, Self::Api | Self::All)
    }

    #[must_use]
    pub fn runs_notifiers(&self) -> bool {
        matches!(self, Self::Bot | Self::All)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Bot => "bot",
            Self::All => "all",
        }
    }
}

impl fmt::Display for ProcessRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "api" => Ok(Self::Api),
            "bot" => Ok(Self::Bot),
            "all" => Ok(Self::All),
            other => Err(format!("unknown process role '{other}'")),
        }
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub role: ProcessRole,
    /// Shared store connection URL.
    pub redis_url: String,
    pub bus: BusConfig,
    pub rollout: RolloutConfig,
    pub detector: DetectorConfig,
    /// Time between rollout ticks.
    pub rollout_interval: Duration,
    /// Seed for rollout sampling. Random when unset.
    pub rollout_seed: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            role: ProcessRole::default(),
            redis_url: DEFAULT_REDIS_URL.to_string(),
            bus: BusConfig::default(),
            rollout: RolloutConfig::default(),
            detector: DetectorConfig::default(),
            rollout_interval: Duration::from_secs(DEFAULT_ROLLOUT_INTERVAL_SECS),
            rollout_seed: None,
        }
    }
}

impl RuntimeConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `BL_PROCESS_ROLE`: api, bot or all (default: all)
    /// - `BL_REDIS_URL`: shared store URL (default: redis://127.0.0.1:6379)
    /// - `BL_ROLLOUT_INTERVAL_SECS`: rollout tick interval (default: 300)
    /// - `BL_ROLLOUT_SEED`: rollout sampling seed (default: random)
    /// - `BL_DISPATCH_WORKERS`: concurrent handler invocations (default: 8)
    /// - `BL_DISPATCH_QUEUE`: queued handler invocations (default: 1024)
    /// - `BL_EVENT_CHANNEL`: shared channel name (default: biolink:events)
    /// - `BL_LISTENER_BACKOFF_MS`: listener re-subscribe delay (default: 1000)
    /// - `BL_DEDUP_EMAIL_MATCHES`: dedup email detections (default: false)
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`RuntimeConfig::from_env`] over an arbitrary lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(role) = parsed(&lookup, "BL_PROCESS_ROLE") {
            config.role = role;
        }
        if let Some(url) = lookup("BL_REDIS_URL").filter(|u| !u.trim().is_empty()) {
            config.redis_url = url.trim().to_string();
        }
        if let Some(secs) = parsed::<u64, _>(&lookup, "BL_ROLLOUT_INTERVAL_SECS") {
            if secs == 0 {
                warn!("BL_ROLLOUT_INTERVAL_SECS must be positive, keeping default");
            } else {
                config.rollout_interval = Duration::from_secs(secs);
            }
        }
        config.rollout_seed = parsed(&lookup, "BL_ROLLOUT_SEED");
        if let Some(workers) = parsed(&lookup, "BL_DISPATCH_WORKERS") {
            config.bus.dispatch_workers = workers;
        }
        if let Some(capacity) = parsed(&lookup, "BL_DISPATCH_QUEUE") {
            config.bus.queue_capacity = capacity;
        }
        if let Some(channel) = lookup("BL_EVENT_CHANNEL").filter(|c| !c.trim().is_empty()) {
            config.bus.channel = channel;
        }
        if let Some(ms) = parsed(&lookup, "BL_LISTENER_BACKOFF_MS") {
            config.bus.listener_backoff = Duration::from_millis(ms);
        }
        if let Some(flag) = lookup("BL_DEDUP_EMAIL_MATCHES") {
            config.detector.dedup_email_matches = flag.to_lowercase() == "true" || flag == "1";
        }

        config
    }
}

fn parsed<T, F>(lookup: &F, name: &str) -> Option<T>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(variable = name, value = %raw, error = %e, "Ignoring malformed setting");
            None
        }
    }
}
