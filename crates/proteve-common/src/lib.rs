//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the protection runtime."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! Shared primitives for the PROTEVE workspace.
//! This crate exposes configuration loading, tracing setup, and the clock
//! arithmetic used by the protection engine and its drivers.

pub mod config;
pub mod logging;
pub mod time;

pub use config::{
    AppConfig, ClockPolicy, LoadedAppConfig, LoggingConfig, MetricsConfig, ProtectionConfig,
    SimulationConfig,
};
pub use logging::{init_tracing, LogFormat};
