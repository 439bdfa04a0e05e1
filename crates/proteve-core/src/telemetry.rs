//! ---
//! ems_section: "02-protection-logic"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Protection state machine and event history."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};

use crate::types::ProtectionState;

/// Status payload in the layout published by the relay firmware.
///
/// Keys follow the device payload (`tensao`, `corrente`, `status_k1`, `falhas`);
/// readings are rounded to one decimal place as the firmware does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    /// Unix seconds.
    pub timestamp: i64,
    #[serde(rename = "tensao")]
    pub voltage: f64,
    #[serde(rename = "corrente")]
    pub current: f64,
    #[serde(rename = "status_k1")]
    pub contactor_closed: bool,
    #[serde(rename = "falhas")]
    pub fault_count: u32,
    pub lockout: bool,
}

impl TelemetryFrame {
    pub fn from_state(state: &ProtectionState) -> Self {
        Self {
            timestamp: state.updated_at.timestamp(),
            voltage: round_tenth(state.voltage),
            current: round_tenth(state.current),
            contactor_closed: state.contactor_closed,
            fault_count: state.fault_count,
            lockout: state.locked_out,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
