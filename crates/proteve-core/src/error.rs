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
use thiserror::Error;

/// Result alias used throughout the protection crate.
pub type Result<T> = std::result::Result<T, ProtectionError>;

/// Errors surfaced by the protection engine. None of them mutate state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtectionError {
    #[error("invalid sample: {field} = {value} is not a plausible reading")]
    InvalidSample { field: &'static str, value: f64 },
    #[error("clock regression: {now} precedes previously accepted {previous}")]
    ClockRegression {
        previous: DateTime<Utc>,
        now: DateTime<Utc>,
    },
    #[error("invalid protection settings: {0}")]
    InvalidSettings(String),
}

impl ProtectionError {
    /// Short label for metrics and structured logs.
    pub fn reason(&self) -> &'static str {
        match self {
            ProtectionError::InvalidSample { .. } => "invalid_sample",
            ProtectionError::ClockRegression { .. } => "clock_regression",
            ProtectionError::InvalidSettings(_) => "invalid_settings",
        }
    }
}
