//! ---
//! ems_section: "02-protection-logic"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Protection state machine and event history."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::engine::{ProtectionEngine, StepOutcome};
use crate::error::Result;
use crate::event_log::ProtectionEvent;
use crate::telemetry::TelemetryFrame;
use crate::types::{ProtectionState, Sample, SystemStatus};

/// Cloneable handle serialising writers over one [`ProtectionEngine`].
///
/// `step` and `remote_reset` each run inside a single write lock; readers take
/// the read lock and receive point-in-time copies.
#[derive(Debug, Clone)]
pub struct SharedProtectionEngine {
    inner: Arc<RwLock<ProtectionEngine>>,
}

impl SharedProtectionEngine {
    pub fn new(engine: ProtectionEngine) -> Self {
        Self {
            inner: Arc::new(RwLock::new(engine)),
        }
    }

    pub fn step(&self, sample: &Sample, now: DateTime<Utc>) -> Result<StepOutcome> {
        self.inner.write().step(sample, now)
    }

    pub fn remote_reset(&self) -> StepOutcome {
        self.inner.write().remote_reset()
    }

    pub fn snapshot(&self) -> ProtectionState {
        self.inner.read().snapshot()
    }

    pub fn recent_events(&self, n: usize) -> Vec<ProtectionEvent> {
        self.inner.read().recent_events(n)
    }

    pub fn events_after(&self, id: u64) -> Vec<ProtectionEvent> {
        self.inner.read().events_after(id)
    }

    pub fn status(&self) -> SystemStatus {
        self.inner.read().status()
    }

    pub fn telemetry_frame(&self) -> TelemetryFrame {
        self.inner.read().telemetry_frame()
    }
}

impl From<ProtectionEngine> for SharedProtectionEngine {
    fn from(engine: ProtectionEngine) -> Self {
        Self::new(engine)
    }
}
