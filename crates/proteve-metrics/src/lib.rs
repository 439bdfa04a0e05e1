//! ---
//! ems_section: "03-observability"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Metrics registry and HTTP exporter."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, StatusCode};
use axum::routing::{get, post};
use axum::{response::IntoResponse, Json, Router};
use prometheus::{Registry, TextEncoder};
use proteve_core::{ProtectionEvent, SharedProtectionEngine};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

mod protection;

pub use protection::{DaemonMetrics, ProtectionMetrics};

/// Shared registry type used across the daemon.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Engine handle and metrics used by the `/reset` route.
#[derive(Clone, Debug)]
pub struct ResetControl {
    engine: SharedProtectionEngine,
    metrics: ProtectionMetrics,
}

impl ResetControl {
    pub fn new(engine: SharedProtectionEngine, metrics: ProtectionMetrics) -> Self {
        Self { engine, metrics }
    }
}

/// Spawn an HTTP server that exposes the registry at `/metrics`.
///
/// With a [`ResetControl`], `POST /reset` performs a remote reset and answers
/// with the events it emitted (empty when the relay was not locked out).
/// Binding to port 0 picks a free port; [`MetricsServer::addr`] reports it.
pub fn spawn_http_server(
    registry: SharedRegistry,
    addr: SocketAddr,
    control: Option<ResetControl>,
) -> Result<MetricsServer> {
    let mut app = Router::new().route(
        "/metrics",
        get({
            let registry = registry.clone();
            move || metrics_handler(registry.clone())
        }),
    );
    if let Some(control) = control {
        app = app.route("/reset", post(move || reset_handler(control.clone())));
    }

    let std_listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind metrics listener {}", addr))?;
    std_listener
        .set_nonblocking(true)
        .with_context(|| "failed to configure metrics listener as non-blocking")?;
    let bound = std_listener
        .local_addr()
        .with_context(|| "failed to read metrics listener address")?;
    let listener = TcpListener::from_std(std_listener)
        .with_context(|| "failed to convert std listener into tokio listener")?;

    info!(address = %bound, "metrics server starting");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let service = app.into_make_service();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        axum::serve(listener, service)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .context("metrics server encountered an error")?;
        Ok(())
    });

    Ok(MetricsServer {
        addr: bound,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

/// Render the registry in the Prometheus text format.
pub fn render(registry: &Registry) -> Result<String> {
    TextEncoder::new()
        .encode_to_string(&registry.gather())
        .context("failed to encode metrics")
}

async fn metrics_handler(registry: SharedRegistry) -> impl IntoResponse {
    match render(&registry) {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static(prometheus::TEXT_FORMAT),
            )],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                String::from("metrics encoding error"),
            )
                .into_response()
        }
    }
}

async fn reset_handler(control: ResetControl) -> Json<Vec<ProtectionEvent>> {
    let outcome = control.engine.remote_reset();
    control.metrics.record_outcome(&outcome);
    debug!(events = outcome.events.len(), "remote reset requested over http");
    Json(outcome.events)
}

/// Handle to the running HTTP exporter.
#[derive(Debug)]
pub struct MetricsServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl MetricsServer {
    /// Address the exporter is actually listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal shutdown and await task completion.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err),
            Err(join_err) => Err(anyhow::Error::new(join_err)),
        }
    }
}
