//! Confidence heuristic.
//!
//! | Matches | Login | Registration |
//! |---------|-------|--------------|
//! | 1       | 0.5   | 0.6          |
//! | 2-3     | 0.7   | 0.8          |
//! | > 3     | 0.9   | 1.0          |
//!
//! Email matches are always `0.95`.

use crate::domain::DetectionSource;

/// Fixed score for verified-email matches.
pub const EMAIL_CONFIDENCE: f64 = 0.95;

/// Score a detection. Worked in hundredths to keep the table values exact.
#[must_use]
pub fn confidence(source: DetectionSource, matches: usize) -> f64 {
    if source == DetectionSource::EmailVerification {
        return EMAIL_CONFIDENCE;
    }

    let mut score: u32 = 50;
    if matches > 3 {
        score += 20;
    }
    if matches > 1 {
        score += 20;
    }
    if source == DetectionSource::Registration {
        score += 10;
    }
    f64::from(score.min(100)) / 100.0
}
