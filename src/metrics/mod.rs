//! Operational metrics for the ride ingestion pipeline
//!
//! Each pipeline phase defines its metrics in a dedicated submodule. Recording
//! is a no-op until [`init_metrics`] installs a Prometheus recorder, so the
//! library and its tests never depend on an exporter being present.

pub mod collaborators;
pub mod core;
pub mod ingest;

pub use collaborators::CollaboratorMetrics;
pub use ingest::IngestMetrics;

use std::net::SocketAddr;
use std::sync::{Once, OnceLock};
use tracing::{info, warn};

static INIT: Once = Once::new();
static HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> = OnceLock::new();

/// Installs the Prometheus recorder, with an HTTP listener when `listen` is set.
///
/// Idempotent.
pub fn init_metrics(listen: Option<SocketAddr>) {
    INIT.call_once(|| {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
        let handle = match listen {
            // The listener variant needs a running Tokio runtime to serve scrapes
            Some(addr) => match builder.with_http_listener(addr).build() {
                Ok((recorder, exporter)) => {
                    let handle = recorder.handle();
                    if ::metrics::set_global_recorder(recorder).is_err() {
                        warn!("A metrics recorder was already installed");
                        return;
                    }
                    tokio::spawn(async move {
                        if let Err(_e) = exporter.await {
                            // ExporterError implements neither Debug nor Display in 0.15
                            warn!("Prometheus exporter stopped");
                        }
                    });
                    info!("Prometheus HTTP exporter listening on http://{}/metrics", addr);
                    handle
                }
                Err(e) => {
                    warn!("Failed to build Prometheus exporter: {}", e);
                    return;
                }
            },
            None => match builder.install_recorder() {
                Ok(handle) => handle,
                Err(e) => {
                    warn!("Failed to install Prometheus recorder: {}", e);
                    return;
                }
            },
        };

        let _ = HANDLE.set(handle);
        register_all_metrics();
        info!("Ride ingest metrics registered");
    });
}

/// Renders the current snapshot, if a recorder was installed.
pub fn render() -> Option<String> {
    HANDLE.get().map(|h| h.render())
}

pub fn register_all_metrics() {
    IngestMetrics::register_metrics();
    CollaboratorMetrics::register_metrics();
}

/// Metric documentation grouped by phase, in pipeline order.
pub fn phase_documentation() -> Vec<(&'static str, Vec<MetricDoc>)> {
    vec![
        (IngestMetrics::phase_name(), IngestMetrics::metrics_documentation()),
        (CollaboratorMetrics::phase_name(), CollaboratorMetrics::metrics_documentation()),
    ]
}

/// Trait for phase-specific metrics collections
pub trait PhaseMetrics {
    /// Register all metrics for this phase
    fn register_metrics();

    /// Get the phase name for prefixing metrics
    fn phase_name() -> &'static str;

    /// Get documentation for all metrics in this phase
    fn metrics_documentation() -> Vec<MetricDoc>;
}

/// Documentation for a single metric
#[derive(Debug, Clone)]
pub struct MetricDoc {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub help: &'static str,
    pub labels: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Histogram,
}

/// Builds metric names of the form ride_ingest_{phase}_{metric_name}[_total]
macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("ride_ingest_", $phase, "_", $name, "_total")
    };
    (histogram, $phase:literal, $name:literal) => {
        concat!("ride_ingest_", $phase, "_", $name)
    };
}

pub(crate) use phase_metric;
