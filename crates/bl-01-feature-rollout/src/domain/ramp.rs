//! # Rollout Ramp
//!
//! Pure functions mapping elapsed time inside an experiment window to a
//! target member count.

use chrono::{DateTime, Utc};

/// Fraction of the window elapsed at `now`, clamped to `[0, 1]`.
#[must_use]
pub fn progress(start: DateTime<Utc>, end: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let span = (end - start).num_milliseconds();
    if span <= 0 {
        return 1.0;
    }
    let elapsed = (now - start).num_milliseconds();
    (elapsed as f64 / span as f64).clamp(0.0, 1.0)
}

/// Linear ramp from the seed population to the whole population.
///
/// `initial + floor(progress * (total - initial))`, never above `total`.
#[must_use]
pub fn target_count(initial: usize, total: usize, progress: f64) -> usize {
    let remaining = total.saturating_sub(initial);
    let extra = (progress.clamp(0.0, 1.0) * remaining as f64).floor() as usize;
    initial.saturating_add(extra).min(total)
}
