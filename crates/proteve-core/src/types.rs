//! ---
//! ems_section: "02-protection-logic"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Protection state machine and event history."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::fmt;

use chrono::{DateTime, Utc};
use proteve_common::config::ProtectionConfig;
use serde::{Deserialize, Serialize};

/// One instantaneous RMS reading from the sampler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub voltage: f64,
    pub current: f64,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, voltage: f64, current: f64) -> Self {
        Self {
            timestamp,
            voltage,
            current,
        }
    }
}

/// Point-in-time copy of the protection state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectionState {
    pub voltage: f64,
    pub current: f64,
    /// `true` while K1 is engaged and the load is connected.
    pub contactor_closed: bool,
    pub fault_count: u32,
    pub locked_out: bool,
    /// Start of the current escalation window.
    pub last_fault_at: Option<DateTime<Utc>>,
    /// Set while a re-arm debounce is pending.
    pub rearm_started_at: Option<DateTime<Utc>>,
    /// Clock value of the last accepted call.
    pub updated_at: DateTime<Utc>,
}

impl ProtectionState {
    /// Startup state: contactor armed, no fault history.
    pub fn armed(voltage: f64, at: DateTime<Utc>) -> Self {
        Self {
            voltage,
            current: 0.0,
            contactor_closed: true,
            fault_count: 0,
            locked_out: false,
            last_fault_at: None,
            rearm_started_at: None,
            updated_at: at,
        }
    }

    /// Classify the state for operator display.
    pub fn status(&self, config: &ProtectionConfig) -> SystemStatus {
        if self.locked_out {
            SystemStatus::Lockout
        } else if !config.in_band(self.voltage) || self.fault_count > 0 {
            SystemStatus::Critical
        } else if !self.contactor_closed {
            SystemStatus::Warning
        } else {
            SystemStatus::Normal
        }
    }
}

/// Operator-facing health classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemStatus {
    /// Armed, in band, no fault history.
    Normal,
    /// Fault history cleared but K1 still waiting on the re-arm debounce.
    Warning,
    /// Voltage out of band or faults counted in the current window.
    Critical,
    /// Latched lockout; K1 forced open.
    Lockout,
}

impl SystemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemStatus::Normal => "NORMAL",
            SystemStatus::Warning => "WARNING",
            SystemStatus::Critical => "CRITICAL",
            SystemStatus::Lockout => "LOCKOUT",
        }
    }
}

impl fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
