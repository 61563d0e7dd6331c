//! Shared store key layout.

/// Hash of every experiment definition, field = feature key.
pub const ACTIVE_EXPERIMENTS: &str = "experiments:active";

/// Membership set of one experiment.
#[must_use]
pub fn members(feature_key: &str) -> String {
    format!("experiment:{feature_key}:users")
}

/// Set once the initial assignment of an experiment has run.
#[must_use]
pub fn seeded(feature_key: &str) -> String {
    format!("experiment:{feature_key}:seeded")
}
