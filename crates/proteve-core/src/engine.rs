//! ---
//! ems_section: "02-protection-logic"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Protection state machine and event history."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use proteve_common::config::{ClockPolicy, ProtectionConfig};
use proteve_common::time::{elapsed_seconds, to_chrono};
use tracing::{debug, info, warn};

use crate::error::{ProtectionError, Result};
use crate::event_log::{EventKind, EventLog, ProtectionEvent};
use crate::telemetry::TelemetryFrame;
use crate::types::{ProtectionState, Sample, SystemStatus};

/// State and events produced by a single engine call.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub state: ProtectionState,
    /// Events appended during this call, oldest first.
    pub events: Vec<ProtectionEvent>,
}

/// Deterministic protection state machine for one relay.
///
/// Mutated only through [`ProtectionEngine::step`] and
/// [`ProtectionEngine::remote_reset`]; wrap it in a
/// [`SharedProtectionEngine`](crate::SharedProtectionEngine) when more than
/// one task needs access.
#[derive(Debug, Clone)]
pub struct ProtectionEngine {
    settings: ProtectionConfig,
    lockout_window: chrono::Duration,
    rearm_delay: chrono::Duration,
    state: ProtectionState,
    log: EventLog,
}

impl ProtectionEngine {
    /// Build an engine with K1 armed and a single startup event in the log.
    pub fn new(settings: ProtectionConfig, now: DateTime<Utc>) -> Result<Self> {
        settings
            .validate()
            .map_err(|err| ProtectionError::InvalidSettings(err.to_string()))?;
        let mut log = EventLog::with_capacity(settings.event_log_capacity);
        log.append(
            now,
            EventKind::Normal,
            None,
            None,
            "protection engine online; contactor K1 armed",
        );
        info!(
            v_min = settings.v_min,
            v_max = settings.v_max,
            fault_threshold = settings.fault_threshold,
            lockout_window_s = settings.lockout_window.as_secs(),
            rearm_delay_s = settings.rearm_delay.as_secs(),
            "protection engine initialised"
        );
        Ok(Self {
            lockout_window: to_chrono(settings.lockout_window),
            rearm_delay: to_chrono(settings.rearm_delay),
            state: ProtectionState::armed(settings.v_nominal, now),
            settings,
            log,
        })
    }

    /// Engine with the factory thresholds.
    pub fn with_defaults(now: DateTime<Utc>) -> Result<Self> {
        Self::new(ProtectionConfig::default(), now)
    }

    /// Consume one sample at clock value `now`.
    ///
    /// Rejected samples and clock regressions (under [`ClockPolicy::Reject`])
    /// return an error before any state is touched.
    pub fn step(&mut self, sample: &Sample, now: DateTime<Utc>) -> Result<StepOutcome> {
        self.validate_sample(sample)?;
        let now = self.admit_clock(now)?;
        let mut emitted = Vec::new();

        self.state.voltage = sample.voltage;
        self.state.current = sample.current;
        self.state.updated_at = now;

        self.expire_lockout(now, &mut emitted);

        if self.state.locked_out {
            self.state.contactor_closed = false;
        } else if !self.settings.in_band(sample.voltage) {
            self.handle_out_of_band(sample.voltage, now, &mut emitted);
        } else if !self.state.contactor_closed {
            self.advance_rearm(now, &mut emitted);
        }

        Ok(StepOutcome {
            state: self.state.clone(),
            events: emitted,
        })
    }

    /// Clear a latched lockout on operator request. No-op when not locked out.
    pub fn remote_reset(&mut self) -> StepOutcome {
        if !self.state.locked_out {
            debug!("remote reset ignored; no lockout active");
            return StepOutcome {
                state: self.state.clone(),
                events: Vec::new(),
            };
        }
        let faults = self.state.fault_count;
        self.clear_lockout();
        let event = self.log.append(
            self.state.updated_at,
            EventKind::RemoteReset,
            None,
            None,
            "manual remote reset cleared lockout",
        );
        info!(event_id = event.id, cleared_faults = faults, "lockout cleared by remote reset");
        StepOutcome {
            state: self.state.clone(),
            events: vec![event],
        }
    }

    pub fn snapshot(&self) -> ProtectionState {
        self.state.clone()
    }

    /// Last `n` events, newest last.
    pub fn recent_events(&self, n: usize) -> Vec<ProtectionEvent> {
        self.log.recent(n)
    }

    /// Retained events newer than `id`, for pollers tracking what they have seen.
    pub fn events_after(&self, id: u64) -> Vec<ProtectionEvent> {
        self.log.after(id)
    }

    pub fn status(&self) -> SystemStatus {
        self.state.status(&self.settings)
    }

    pub fn telemetry_frame(&self) -> TelemetryFrame {
        TelemetryFrame::from_state(&self.state)
    }

    pub fn event_log(&self) -> &EventLog {
        &self.log
    }

    fn validate_sample(&self, sample: &Sample) -> Result<()> {
        check_reading("voltage", sample.voltage, self.settings.max_plausible_voltage)
            .and_then(|_| {
                check_reading("current", sample.current, self.settings.max_plausible_current)
            })
            .inspect_err(|err| warn!(error = %err, sampled_at = %sample.timestamp, "sample rejected"))
    }

    fn admit_clock(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let previous = self.state.updated_at;
        if now >= previous {
            return Ok(now);
        }
        match self.settings.clock_policy {
            ClockPolicy::Reject => {
                warn!(%previous, %now, "clock regression rejected");
                Err(ProtectionError::ClockRegression { previous, now })
            }
            ClockPolicy::Clamp => {
                debug!(%previous, %now, "clock regression clamped to previous instant");
                Ok(previous)
            }
        }
    }

    fn expire_lockout(&mut self, now: DateTime<Utc>, emitted: &mut Vec<ProtectionEvent>) {
        if !self.state.locked_out {
            return;
        }
        let Some(last_fault_at) = self.state.last_fault_at else {
            return;
        };
        if now - last_fault_at <= self.lockout_window {
            return;
        }
        let quiet_for = elapsed_seconds(last_fault_at, now);
        self.clear_lockout();
        let event = self.log.append(
            now,
            EventKind::RemoteReset,
            None,
            Some(quiet_for),
            format!(
                "lockout expired after {} min without new faults",
                self.settings.lockout_window.as_secs() / 60
            ),
        );
        info!(event_id = event.id, quiet_for_s = quiet_for, "lockout expired");
        emitted.push(event);
    }

    fn handle_out_of_band(
        &mut self,
        voltage: f64,
        now: DateTime<Utc>,
        emitted: &mut Vec<ProtectionEvent>,
    ) {
        if self.state.rearm_started_at.take().is_some() {
            debug!(voltage, "re-arm debounce interrupted");
        }
        if self.state.contactor_closed {
            self.state.fault_count += 1;
            self.state.last_fault_at = Some(now);
            if self.state.fault_count >= self.settings.fault_threshold {
                self.state.locked_out = true;
                let event = self.log.append(
                    now,
                    EventKind::LockoutEngaged,
                    Some(voltage),
                    None,
                    format!(
                        "lockout engaged after {} faults ({:.1} V)",
                        self.state.fault_count, voltage
                    ),
                );
                warn!(
                    event_id = event.id,
                    voltage,
                    fault_count = self.state.fault_count,
                    "lockout engaged; contactor K1 latched open"
                );
                emitted.push(event);
            } else {
                let (kind, label) = if voltage < self.settings.v_min {
                    (EventKind::Undervoltage, "undervoltage")
                } else {
                    (EventKind::Overvoltage, "overvoltage")
                };
                let event = self.log.append(
                    now,
                    kind,
                    Some(voltage),
                    None,
                    format!("{} fault detected: {:.1} V", label, voltage),
                );
                info!(
                    event_id = event.id,
                    kind = %kind,
                    voltage,
                    fault_count = self.state.fault_count,
                    "fault detected; contactor K1 opened"
                );
                emitted.push(event);
            }
        }
        self.state.contactor_closed = false;
    }

    fn advance_rearm(&mut self, now: DateTime<Utc>, emitted: &mut Vec<ProtectionEvent>) {
        match self.state.rearm_started_at {
            None => {
                self.state.rearm_started_at = Some(now);
                let event = self.log.append(
                    now,
                    EventKind::RearmStarted,
                    Some(self.state.voltage),
                    None,
                    format!(
                        "voltage back in band; waiting {} s of stability before re-arm",
                        self.settings.rearm_delay.as_secs()
                    ),
                );
                debug!(event_id = event.id, voltage = self.state.voltage, "re-arm debounce started");
                emitted.push(event);
            }
            Some(started_at) if now - started_at >= self.rearm_delay => {
                let waited = elapsed_seconds(started_at, now);
                self.state.contactor_closed = true;
                self.state.rearm_started_at = None;
                let event = self.log.append(
                    now,
                    EventKind::RearmCompleted,
                    Some(self.state.voltage),
                    Some(waited),
                    "contactor K1 re-armed",
                );
                info!(
                    event_id = event.id,
                    waited_s = waited,
                    fault_count = self.state.fault_count,
                    "contactor K1 re-armed"
                );
                emitted.push(event);
            }
            Some(_) => {}
        }
    }

    fn clear_lockout(&mut self) {
        self.state.locked_out = false;
        self.state.fault_count = 0;
        self.state.last_fault_at = None;
    }
}

fn check_reading(field: &'static str, value: f64, max: f64) -> Result<()> {
    if value.is_finite() && (0.0..=max).contains(&value) {
        Ok(())
    } else {
        Err(ProtectionError::InvalidSample { field, value })
    }
}
