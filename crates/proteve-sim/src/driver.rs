//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Feeds a sample source through the protection engine."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::time::Duration;

use chrono::{DateTime, Utc};
use proteve_common::time::offset_by;
use proteve_core::{ProtectionEvent, ProtectionState, Sample, SharedProtectionEngine, StepOutcome};

use crate::SampleSource;

/// Sampling schedule for a bounded run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrivePlan {
    pub start: DateTime<Utc>,
    pub cadence: Duration,
    pub max_samples: u64,
}

/// Summary of a bounded run. `events` holds every event emitted, not only
/// what survived in the engine's bounded log.
#[derive(Debug, Clone)]
pub struct DriveReport {
    pub samples: u64,
    pub rejected: u64,
    pub events: Vec<ProtectionEvent>,
    pub final_state: ProtectionState,
}

/// Step `engine` with samples from `source` until the source is exhausted or
/// `plan.max_samples` readings have been taken. Each sample is evaluated at
/// its own timestamp.
pub fn drive<S>(source: &mut S, engine: &SharedProtectionEngine, plan: &DrivePlan) -> DriveReport
where
    S: SampleSource + ?Sized,
{
    drive_with(source, engine, plan, |_, _| {})
}

/// Same as [`drive`], calling `observer` after every step.
pub fn drive_with<S, F>(
    source: &mut S,
    engine: &SharedProtectionEngine,
    plan: &DrivePlan,
    mut observer: F,
) -> DriveReport
where
    S: SampleSource + ?Sized,
    F: FnMut(&Sample, &proteve_core::Result<StepOutcome>),
{
    let mut samples = 0;
    let mut rejected = 0;
    let mut events = Vec::new();
    while samples < plan.max_samples {
        let at = offset_by(plan.start, plan.cadence, samples);
        let Some(sample) = source.next_sample(at) else {
            break;
        };
        samples += 1;
        let result = engine.step(&sample, sample.timestamp);
        match &result {
            Ok(outcome) => events.extend(outcome.events.iter().cloned()),
            Err(_) => rejected += 1,
        }
        observer(&sample, &result);
    }
    tracing::debug!(samples, rejected, events = events.len(), "drive finished");
    DriveReport {
        samples,
        rejected,
        events,
        final_state: engine.snapshot(),
    }
}
