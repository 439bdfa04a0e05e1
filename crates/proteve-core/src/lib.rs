//! ---
//! ems_section: "02-protection-logic"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Protection state machine and event history."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! Protection engine for the PROTEVE voltage relay.
//!
//! The engine consumes one [`Sample`] at a time, opens contactor K1 when the
//! line voltage leaves the configured band, counts fault edges, latches a
//! lockout after repeated faults, and re-arms once the voltage has been stable
//! for the configured debounce. Every transition lands in a bounded
//! [`EventLog`]. The engine performs no I/O; callers supply the clock.

pub mod engine;
pub mod error;
pub mod event_log;
pub mod shared;
pub mod telemetry;
pub mod types;

pub use engine::{ProtectionEngine, StepOutcome};
pub use error::{ProtectionError, Result};
pub use event_log::{EventKind, EventLog, ProtectionEvent};
pub use shared::SharedProtectionEngine;
pub use telemetry::TelemetryFrame;
pub use types::{ProtectionState, Sample, SystemStatus};

pub use proteve_common::config::{ClockPolicy, ProtectionConfig};
