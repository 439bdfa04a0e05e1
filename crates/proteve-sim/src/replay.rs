//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Deterministic scenario replay from JSON or CSV files."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use csv::ReaderBuilder;
use proteve_core::Sample;
use serde::Deserialize;

use crate::SampleSource;

/// Scenario offsets beyond a century are treated as corrupt input.
const MAX_OFFSET_SECONDS: f64 = 100.0 * 365.25 * 24.0 * 60.0 * 60.0;

/// One scenario row: a reading taken `offset_seconds` after the replay start.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScenarioRow {
    pub offset_seconds: f64,
    pub voltage: f64,
    pub current: f64,
    #[serde(default)]
    pub label: Option<String>,
}

/// Finite, scripted sample stream. Each row is replayed once, in file order.
#[derive(Debug, Clone)]
pub struct ScenarioReplay {
    rows: Vec<ScenarioRow>,
    timestamps: Vec<DateTime<Utc>>,
    cursor: usize,
}

impl ScenarioReplay {
    /// Anchor `rows` at `start`. Fails when an offset is not finite or lands
    /// outside the representable time range.
    pub fn new(rows: Vec<ScenarioRow>, start: DateTime<Utc>) -> Result<Self> {
        let timestamps = rows
            .iter()
            .enumerate()
            .map(|(index, row)| {
                timestamp_for(start, row.offset_seconds).with_context(|| {
                    format!(
                        "scenario row {} has unusable offset_seconds {}",
                        index + 1,
                        row.offset_seconds
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            rows,
            timestamps,
            cursor: 0,
        })
    }

    pub fn from_path(path: &Path, start: DateTime<Utc>) -> Result<Self> {
        let rows = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::rows_from_json(path)?,
            Some("csv") => Self::rows_from_csv(path)?,
            _ => anyhow::bail!("unsupported scenario format: {}", path.display()),
        };
        tracing::debug!(path = %path.display(), rows = rows.len(), "scenario loaded");
        Self::new(rows, start).with_context(|| format!("invalid scenario {}", path.display()))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.rows.len() - self.cursor
    }

    fn rows_from_json(path: &Path) -> Result<Vec<ScenarioRow>> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read scenario file {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("invalid scenario JSON {}", path.display()))
    }

    fn rows_from_csv(path: &Path) -> Result<Vec<ScenarioRow>> {
        let file = fs::File::open(path)
            .with_context(|| format!("unable to open scenario csv {}", path.display()))?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(file);
        let mut rows = Vec::new();
        for row in reader.deserialize::<ScenarioRow>() {
            rows.push(row.with_context(|| format!("invalid scenario row in {}", path.display()))?);
        }
        Ok(rows)
    }
}

fn timestamp_for(start: DateTime<Utc>, offset_seconds: f64) -> Option<DateTime<Utc>> {
    if !offset_seconds.is_finite() || offset_seconds.abs() > MAX_OFFSET_SECONDS {
        return None;
    }
    let millis = (offset_seconds * 1_000.0).round() as i64;
    start.checked_add_signed(chrono::Duration::try_milliseconds(millis)?)
}

impl SampleSource for ScenarioReplay {
    fn next_sample(&mut self, _at: DateTime<Utc>) -> Option<Sample> {
        let row = self.rows.get(self.cursor)?;
        let timestamp = *self.timestamps.get(self.cursor)?;
        self.cursor += 1;
        if let Some(label) = &row.label {
            tracing::debug!(label = %label, offset = row.offset_seconds, "scenario marker");
        }
        Some(Sample::new(timestamp, row.voltage, row.current))
    }
}
