//! ---
//! ems_section: "02-protection-logic"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Protection state machine and event history."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transition categories recorded by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Undervoltage,
    Overvoltage,
    RearmStarted,
    RearmCompleted,
    LockoutEngaged,
    RemoteReset,
    Normal,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::Undervoltage,
        EventKind::Overvoltage,
        EventKind::RearmStarted,
        EventKind::RearmCompleted,
        EventKind::LockoutEngaged,
        EventKind::RemoteReset,
        EventKind::Normal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Undervoltage => "UNDERVOLTAGE",
            EventKind::Overvoltage => "OVERVOLTAGE",
            EventKind::RearmStarted => "REARM_STARTED",
            EventKind::RearmCompleted => "REARM_COMPLETED",
            EventKind::LockoutEngaged => "LOCKOUT_ENGAGED",
            EventKind::RemoteReset => "REMOTE_RESET",
            EventKind::Normal => "NORMAL",
        }
    }

    /// Kinds that record a counted fault edge.
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            EventKind::Undervoltage | EventKind::Overvoltage | EventKind::LockoutEngaged
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of a protection transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectionEvent {
    /// Monotonic identifier, starting at 1. Never reused after eviction.
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voltage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    pub description: String,
}

const PREALLOCATED_ENTRIES: usize = 64;

/// Bounded FIFO history of protection events.
#[derive(Debug, Clone)]
pub struct EventLog {
    capacity: usize,
    entries: VecDeque<ProtectionEvent>,
    last_id: u64,
}

impl EventLog {
    /// Create a log retaining at most `capacity` entries (minimum one).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(PREALLOCATED_ENTRIES)),
            last_id: 0,
        }
    }

    /// Append an event, evicting the oldest entry once the log is full.
    pub fn append(
        &mut self,
        timestamp: DateTime<Utc>,
        kind: EventKind,
        voltage: Option<f64>,
        duration_seconds: Option<f64>,
        description: impl Into<String>,
    ) -> ProtectionEvent {
        self.last_id += 1;
        let event = ProtectionEvent {
            id: self.last_id,
            timestamp,
            kind,
            voltage,
            duration_seconds,
            description: description.into(),
        };
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(event.clone());
        event
    }

    /// Last `n` events, oldest first.
    pub fn recent(&self, n: usize) -> Vec<ProtectionEvent> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    /// Retained events with an id greater than `id`, oldest first.
    pub fn after(&self, id: u64) -> Vec<ProtectionEvent> {
        self.entries
            .iter()
            .filter(|event| event.id > id)
            .cloned()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProtectionEvent> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Identifier of the most recently appended event, or 0 if none.
    pub fn last_id(&self) -> u64 {
        self.last_id
    }
}
