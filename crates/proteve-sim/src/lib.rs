//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "01-bootstrap"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Sample source exports and the driver loop."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! Swappable sample sources for exercising the protection engine.
//!
//! Sources only produce [`Sample`](proteve_core::Sample) values; the
//! [`drive`] loop is the single place that calls into the engine.

pub mod driver;
pub mod injector;
pub mod replay;

use chrono::{DateTime, Utc};
use proteve_core::Sample;

pub use driver::{drive, drive_with, DrivePlan, DriveReport};
pub use injector::{FaultInjector, FaultInjectorSettings};
pub use replay::{ScenarioReplay, ScenarioRow};

/// Producer of line readings.
pub trait SampleSource {
    /// Next reading for the nominal sampling instant `at`, or `None` when exhausted.
    ///
    /// Sources that carry their own timeline (scenario files) may ignore `at`.
    fn next_sample(&mut self, at: DateTime<Utc>) -> Option<Sample>;
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn next_sample(&mut self, at: DateTime<Utc>) -> Option<Sample> {
        (**self).next_sample(at)
    }
}
