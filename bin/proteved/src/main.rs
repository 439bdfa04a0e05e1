//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Binary entrypoint for the PROTEVE daemon."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use proteve_common::config::AppConfig;
use proteve_common::logging::init_tracing;
use proteve_core::{ProtectionEngine, ProtectionEvent, SharedProtectionEngine};
use proteve_metrics::{
    new_registry, spawn_http_server, DaemonMetrics, ProtectionMetrics, ResetControl,
};
use proteve_sim::{drive_with, DrivePlan, FaultInjector, SampleSource, ScenarioReplay};
use tokio::signal;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const DEFAULT_CONFIG_CANDIDATES: &[&str] = &["configs/proteve.toml", "/etc/proteve/proteve.toml"];

#[derive(Debug, Parser)]
#[command(author, version, about = "PROTEVE voltage protection daemon", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Override the sample generator seed")]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the live protection loop")]
    Run,
    #[command(about = "Feed a scenario file through the engine and print the events")]
    Replay {
        #[arg(value_name = "FILE", help = "Scenario file (.json or .csv)")]
        file: PathBuf,
        #[arg(long, help = "Scenario start instant (RFC 3339); defaults to now")]
        start: Option<DateTime<Utc>>,
    },
    #[command(about = "Load and validate configuration, then print it")]
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.extend(DEFAULT_CONFIG_CANDIDATES.iter().map(PathBuf::from));

    let loaded = AppConfig::load_or_default(&candidates)?;
    let mut config = loaded.config;
    if let Some(seed) = cli.seed {
        config.simulation.seed = seed;
    }
    init_tracing("proteved", &config.logging)?;

    match &loaded.source {
        Some(path) => info!(config_path = %path.display(), "configuration loaded"),
        None => info!("no configuration file found; using built-in defaults"),
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_daemon(config).await?,
        Commands::Replay { file, start } => {
            replay_scenario(&config, &file, start.unwrap_or_else(Utc::now))?
        }
        Commands::CheckConfig => {
            let rendered = serde_json::to_string_pretty(&config)
                .context("failed to render configuration")?;
            println!("{rendered}");
        }
    }

    Ok(())
}

async fn run_daemon(config: AppConfig) -> Result<()> {
    let registry = new_registry();
    let daemon_metrics = DaemonMetrics::new(&registry)?;
    daemon_metrics.inc_start();
    daemon_metrics.set_build_info(env!("CARGO_PKG_VERSION"), build_profile());
    let protection_metrics = ProtectionMetrics::new(&registry)?;

    let engine = SharedProtectionEngine::new(ProtectionEngine::new(
        config.protection.clone(),
        Utc::now(),
    )?);
    for event in engine.events_after(0) {
        log_event(&event);
        protection_metrics.record_event(&event);
    }
    protection_metrics.observe_state(&engine.snapshot());

    let metrics_server = if config.metrics.enabled {
        let control = ResetControl::new(engine.clone(), protection_metrics.clone());
        let server = spawn_http_server(registry, config.metrics.listen, Some(control))?;
        info!(address = %server.addr(), "metrics exporter and reset route enabled");
        Some(server)
    } else {
        info!("metrics exporter disabled by configuration");
        None
    };

    let mut source: Box<dyn SampleSource> = match &config.simulation.scenario {
        Some(path) => {
            info!(scenario = %path.display(), "replaying scenario at live cadence");
            Box::new(ScenarioReplay::from_path(path, Utc::now())?)
        }
        None => {
            info!(seed = config.simulation.seed, "sampling from fault injector");
            Box::new(FaultInjector::from_config(
                &config.protection,
                &config.simulation,
            )?)
        }
    };

    let mut ticker = tokio::time::interval(config.simulation.cadence);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut taken: u64 = 0;

    info!(cadence_s = config.simulation.cadence.as_secs(), "daemon running; waiting for termination signal");
    loop {
        tokio::select! {
            result = &mut shutdown => {
                result.context("failed to listen for ctrl-c")?;
                info!("ctrl-c received; shutting down");
                break;
            }
            _ = ticker.tick() => {
                if config.simulation.max_samples.is_some_and(|max| taken >= max) {
                    info!(samples = taken, "sample limit reached; shutting down");
                    break;
                }
                let now = Utc::now();
                let Some(sample) = source.next_sample(now) else {
                    info!(samples = taken, "sample source exhausted; shutting down");
                    break;
                };
                taken += 1;
                match engine.step(&sample, now) {
                    Ok(outcome) => {
                        for event in &outcome.events {
                            log_event(event);
                        }
                        protection_metrics.record_outcome(&outcome);
                        match engine.telemetry_frame().to_json() {
                            Ok(frame) => debug!(frame = %frame, "telemetry"),
                            Err(err) => warn!(error = %err, "failed to encode telemetry frame"),
                        }
                    }
                    Err(err) => {
                        debug!(reason = err.reason(), "rejection recorded");
                        protection_metrics.record_rejected(&err);
                    }
                }
            }
        }
    }

    let state = engine.snapshot();
    info!(
        status = %engine.status(),
        fault_count = state.fault_count,
        locked_out = state.locked_out,
        "final protection state"
    );

    if let Some(server) = metrics_server {
        server.shutdown().await?;
    }

    Ok(())
}

fn replay_scenario(config: &AppConfig, file: &Path, start: DateTime<Utc>) -> Result<()> {
    let engine =
        SharedProtectionEngine::new(ProtectionEngine::new(config.protection.clone(), start)?);
    let startup = engine.events_after(0);
    let mut replay = ScenarioReplay::from_path(file, start)?;
    let plan = DrivePlan {
        start,
        cadence: config.simulation.cadence,
        max_samples: config.simulation.max_samples.unwrap_or(u64::MAX),
    };
    let report = drive_with(&mut replay, &engine, &plan, |sample, result| {
        if let Err(err) = result {
            debug!(reason = err.reason(), timestamp = %sample.timestamp, "scenario sample rejected");
        }
    });

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for event in startup.iter().chain(report.events.iter()) {
        let line = serde_json::to_string(event).context("failed to encode event")?;
        writeln!(out, "{line}")?;
    }
    let frame = engine
        .telemetry_frame()
        .to_json()
        .context("failed to encode telemetry frame")?;
    writeln!(out, "{frame}")?;
    out.flush()?;

    info!(
        scenario = %file.display(),
        samples = report.samples,
        rejected = report.rejected,
        events = report.events.len(),
        "replay complete"
    );
    Ok(())
}

fn log_event(event: &ProtectionEvent) {
    if event.kind.is_fault() {
        warn!(
            event_id = event.id,
            kind = %event.kind,
            voltage = event.voltage,
            description = %event.description,
            "protection event"
        );
    } else {
        info!(
            event_id = event.id,
            kind = %event.kind,
            voltage = event.voltage,
            duration_s = event.duration_seconds,
            description = %event.description,
            "protection event"
        );
    }
}

fn build_profile() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "release"
    }
}
