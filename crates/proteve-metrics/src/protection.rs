//! ---
//! ems_section: "03-observability"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Prometheus series for relay state, events and rejections."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use anyhow::Result;
use prometheus::{Gauge, GaugeVec, IntCounter, IntCounterVec, IntGauge, Opts};
use proteve_core::{EventKind, ProtectionError, ProtectionEvent, ProtectionState, StepOutcome};

use crate::SharedRegistry;

/// Live view of the relay exported as gauges and counters.
#[derive(Clone, Debug)]
pub struct ProtectionMetrics {
    voltage: Gauge,
    current: Gauge,
    contactor_closed: IntGauge,
    fault_count: IntGauge,
    locked_out: IntGauge,
    events: IntCounterVec,
    rejected: IntCounterVec,
}

impl ProtectionMetrics {
    pub fn new(registry: &SharedRegistry) -> Result<Self> {
        let voltage = Gauge::with_opts(Opts::new(
            "proteve_voltage_volts",
            "Most recent accepted line voltage",
        ))?;
        registry.register(Box::new(voltage.clone()))?;

        let current = Gauge::with_opts(Opts::new(
            "proteve_current_amperes",
            "Most recent accepted line current",
        ))?;
        registry.register(Box::new(current.clone()))?;

        let contactor_closed = IntGauge::with_opts(Opts::new(
            "proteve_contactor_closed",
            "Indicator (0/1) whether contactor K1 is closed",
        ))?;
        registry.register(Box::new(contactor_closed.clone()))?;

        let fault_count = IntGauge::with_opts(Opts::new(
            "proteve_fault_count",
            "Faults counted since the last reset",
        ))?;
        registry.register(Box::new(fault_count.clone()))?;

        let locked_out = IntGauge::with_opts(Opts::new(
            "proteve_locked_out",
            "Indicator (0/1) whether the relay is locked out",
        ))?;
        registry.register(Box::new(locked_out.clone()))?;

        let events = IntCounterVec::new(
            Opts::new("proteve_events_total", "Protection events emitted by kind"),
            &["kind"],
        )?;
        registry.register(Box::new(events.clone()))?;

        let rejected = IntCounterVec::new(
            Opts::new(
                "proteve_rejected_samples_total",
                "Samples refused by the engine by reason",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(rejected.clone()))?;

        // Pre-create every kind so dashboards see zeroes before the first event.
        for kind in EventKind::ALL {
            events.with_label_values(&[kind.as_str()]);
        }

        Ok(Self {
            voltage,
            current,
            contactor_closed,
            fault_count,
            locked_out,
            events,
            rejected,
        })
    }

    pub fn observe_state(&self, state: &ProtectionState) {
        self.voltage.set(state.voltage);
        self.current.set(state.current);
        self.contactor_closed.set(i64::from(state.contactor_closed));
        self.fault_count.set(i64::from(state.fault_count));
        self.locked_out.set(i64::from(state.locked_out));
    }

    pub fn record_event(&self, event: &ProtectionEvent) {
        self.events.with_label_values(&[event.kind.as_str()]).inc();
    }

    pub fn record_outcome(&self, outcome: &StepOutcome) {
        self.observe_state(&outcome.state);
        for event in &outcome.events {
            self.record_event(event);
        }
    }

    pub fn record_rejected(&self, error: &ProtectionError) {
        self.rejected.with_label_values(&[error.reason()]).inc();
    }
}

/// Metrics about the daemon process itself.
#[derive(Clone, Debug)]
pub struct DaemonMetrics {
    starts_total: IntCounter,
    build_info: GaugeVec,
}

impl DaemonMetrics {
    pub fn new(registry: &SharedRegistry) -> Result<Self> {
        let starts_total = IntCounter::with_opts(Opts::new(
            "proteved_starts_total",
            "Total number of times the daemon has initialised",
        ))?;
        registry.register(Box::new(starts_total.clone()))?;

        let build_info = GaugeVec::new(
            Opts::new("proteved_build_info", "Build metadata for the running daemon"),
            &["version", "profile"],
        )?;
        registry.register(Box::new(build_info.clone()))?;

        Ok(Self {
            starts_total,
            build_info,
        })
    }

    pub fn inc_start(&self) {
        self.starts_total.inc();
    }

    pub fn set_build_info(&self, version: &str, profile: &str) {
        self.build_info.with_label_values(&[version, profile]).set(1.0);
    }
}
