//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the protection runtime."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

/// Largest accepted event history.
pub const MAX_EVENT_LOG_CAPACITY: usize = 100_000;
/// Longest accepted lockout window or re-arm delay.
pub const MAX_PROTECTION_TIMER: Duration = Duration::from_secs(7 * 24 * 60 * 60);
/// Longest accepted sampling cadence.
pub const MAX_CADENCE: Duration = Duration::from_secs(60 * 60);

fn default_v_min() -> f64 {
    190.0
}

fn default_v_max() -> f64 {
    247.0
}

fn default_v_nominal() -> f64 {
    220.0
}

fn default_fault_threshold() -> u32 {
    3
}

fn default_lockout_window() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_rearm_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_event_log_capacity() -> usize {
    50
}

fn default_max_plausible_voltage() -> f64 {
    600.0
}

fn default_max_plausible_current() -> f64 {
    1000.0
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9899))
}

fn default_simulation_seed() -> u64 {
    0x5EED_u64
}

fn default_cadence() -> Duration {
    Duration::from_secs(3)
}

fn default_undervoltage_probability() -> f64 {
    0.05
}

fn default_overvoltage_probability() -> f64 {
    0.03
}

fn default_near_limit_probability() -> f64 {
    0.07
}

fn default_base_current() -> f64 {
    12.0
}

fn default_current_sigma() -> f64 {
    0.75
}

/// Primary configuration object for the PROTEVE runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub protection: ProtectionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    /// `None` when no file was found and built-in defaults are in effect.
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &'static str = "PROTEVE_CONFIG";

    /// Load configuration from disk, respecting the `PROTEVE_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        let loaded = Self::load_or_default(candidates)?;
        if loaded.source.is_none() {
            return Err(anyhow!(
                "no configuration files found. inspected: {}",
                candidates
                    .iter()
                    .map(|p| p.as_ref().display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        Ok(loaded.config)
    }

    /// Load the first existing candidate, falling back to defaults when none exists.
    ///
    /// An explicit `PROTEVE_CONFIG` path must exist; it is never silently skipped.
    pub fn load_or_default<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        let config = AppConfig::default();
        config.validate()?;
        Ok(LoadedAppConfig {
            config,
            source: None,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse::<AppConfig>()
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.protection.validate()?;
        self.simulation.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// How the engine treats a `now` earlier than the previously accepted one.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClockPolicy {
    /// Refuse the call and leave state untouched.
    #[default]
    Reject,
    /// Treat the regressed instant as the previously accepted instant.
    Clamp,
}

/// Protection thresholds and timers.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectionConfig {
    #[serde(default = "default_v_min")]
    pub v_min: f64,
    #[serde(default = "default_v_max")]
    pub v_max: f64,
    #[serde(default = "default_v_nominal")]
    pub v_nominal: f64,
    #[serde(default = "default_fault_threshold")]
    pub fault_threshold: u32,
    #[serde(default = "default_lockout_window")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub lockout_window: Duration,
    #[serde(default = "default_rearm_delay")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub rearm_delay: Duration,
    #[serde(default = "default_event_log_capacity")]
    pub event_log_capacity: usize,
    #[serde(default = "default_max_plausible_voltage")]
    pub max_plausible_voltage: f64,
    #[serde(default = "default_max_plausible_current")]
    pub max_plausible_current: f64,
    #[serde(default)]
    pub clock_policy: ClockPolicy,
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            v_min: default_v_min(),
            v_max: default_v_max(),
            v_nominal: default_v_nominal(),
            fault_threshold: default_fault_threshold(),
            lockout_window: default_lockout_window(),
            rearm_delay: default_rearm_delay(),
            event_log_capacity: default_event_log_capacity(),
            max_plausible_voltage: default_max_plausible_voltage(),
            max_plausible_current: default_max_plausible_current(),
            clock_policy: ClockPolicy::default(),
        }
    }
}

impl ProtectionConfig {
    /// True when `voltage` lies inside the inclusive safe band.
    pub fn in_band(&self, voltage: f64) -> bool {
        voltage >= self.v_min && voltage <= self.v_max
    }

    pub fn validate(&self) -> Result<()> {
        let limits = [
            ("v_min", self.v_min),
            ("v_max", self.v_max),
            ("v_nominal", self.v_nominal),
            ("max_plausible_voltage", self.max_plausible_voltage),
            ("max_plausible_current", self.max_plausible_current),
        ];
        if let Some((name, value)) = limits.iter().find(|(_, v)| !v.is_finite() || *v <= 0.0) {
            return Err(anyhow!("protection.{} must be positive, got {}", name, value));
        }
        if self.v_min >= self.v_max {
            return Err(anyhow!(
                "protection.v_min ({}) must be below protection.v_max ({})",
                self.v_min,
                self.v_max
            ));
        }
        if !self.in_band(self.v_nominal) {
            return Err(anyhow!(
                "protection.v_nominal ({}) must lie within [{}, {}]",
                self.v_nominal,
                self.v_min,
                self.v_max
            ));
        }
        if self.max_plausible_voltage <= self.v_max {
            return Err(anyhow!(
                "protection.max_plausible_voltage ({}) must exceed protection.v_max ({})",
                self.max_plausible_voltage,
                self.v_max
            ));
        }
        if self.fault_threshold == 0 {
            return Err(anyhow!("protection.fault_threshold must be at least 1"));
        }
        if !(1..=MAX_EVENT_LOG_CAPACITY).contains(&self.event_log_capacity) {
            return Err(anyhow!(
                "protection.event_log_capacity must lie within [1, {}], got {}",
                MAX_EVENT_LOG_CAPACITY,
                self.event_log_capacity
            ));
        }
        let timers = [
            ("lockout_window", self.lockout_window),
            ("rearm_delay", self.rearm_delay),
        ];
        if let Some((name, value)) = timers.iter().find(|(_, v)| *v > MAX_PROTECTION_TIMER) {
            return Err(anyhow!(
                "protection.{} must not exceed {} s, got {} s",
                name,
                MAX_PROTECTION_TIMER.as_secs(),
                value.as_secs()
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}

/// Sample generator settings used by the daemon and demo drivers.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_simulation_seed")]
    pub seed: u64,
    #[serde(default = "default_cadence")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub cadence: Duration,
    #[serde(default)]
    pub scenario: Option<PathBuf>,
    #[serde(default = "default_undervoltage_probability")]
    pub undervoltage_probability: f64,
    #[serde(default = "default_overvoltage_probability")]
    pub overvoltage_probability: f64,
    #[serde(default = "default_near_limit_probability")]
    pub near_limit_probability: f64,
    #[serde(default = "default_base_current")]
    pub base_current: f64,
    #[serde(default = "default_current_sigma")]
    pub current_sigma: f64,
    #[serde(default)]
    pub max_samples: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: default_simulation_seed(),
            cadence: default_cadence(),
            scenario: None,
            undervoltage_probability: default_undervoltage_probability(),
            overvoltage_probability: default_overvoltage_probability(),
            near_limit_probability: default_near_limit_probability(),
            base_current: default_base_current(),
            current_sigma: default_current_sigma(),
            max_samples: None,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        let probabilities = [
            self.undervoltage_probability,
            self.overvoltage_probability,
            self.near_limit_probability,
        ];
        if probabilities
            .iter()
            .any(|p| !p.is_finite() || !(0.0..=1.0).contains(p))
        {
            return Err(anyhow!("simulation probabilities must lie within [0, 1]"));
        }
        if probabilities.iter().sum::<f64>() > 1.0 {
            return Err(anyhow!("simulation probabilities must not sum above 1"));
        }
        if !self.current_sigma.is_finite() || self.current_sigma < 0.0 {
            return Err(anyhow!("simulation.current_sigma must be non-negative"));
        }
        if !self.base_current.is_finite() || self.base_current < 0.0 {
            return Err(anyhow!("simulation.base_current must be non-negative"));
        }
        if self.cadence.is_zero() || self.cadence > MAX_CADENCE {
            return Err(anyhow!(
                "simulation.cadence must lie within [1, {}] s, got {} s",
                MAX_CADENCE.as_secs(),
                self.cadence.as_secs()
            ));
        }
        Ok(())
    }
}
