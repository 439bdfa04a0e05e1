//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the protection runtime."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Convert a std duration into a chrono duration, saturating at the chrono maximum.
pub fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

/// Seconds elapsed from `earlier` to `later` as a float; negative if the clock went backwards.
pub fn elapsed_seconds(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    let delta = later - earlier;
    delta.num_milliseconds() as f64 / 1_000.0
}

/// Offset a start instant by a number of cadence steps, saturating at the
/// latest representable instant.
pub fn offset_by(start: DateTime<Utc>, cadence: Duration, steps: u64) -> DateTime<Utc> {
    let steps = i32::try_from(steps).unwrap_or(i32::MAX);
    to_chrono(cadence)
        .checked_mul(steps)
        .and_then(|delta| start.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
