//! Ingest phase metrics
//!
//! Counts what happens to each polled record: parsed, ignored, malformed,
//! paired, and how sessions open and close.

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct IngestMetrics;

impl IngestMetrics {
    pub fn record_polled() {
        ::metrics::counter!(phase_metric!(counter, "ingest", "records_polled")).increment(1);
    }

    pub fn record_unrecognized() {
        ::metrics::counter!(phase_metric!(counter, "ingest", "records_unrecognized")).increment(1);
    }

    pub fn record_malformed(marker: &'static str) {
        ::metrics::counter!(phase_metric!(counter, "ingest", "records_malformed"), "marker" => marker)
            .increment(1);
    }

    pub fn record_pairing_anomaly() {
        ::metrics::counter!(phase_metric!(counter, "ingest", "pairing_anomalies")).increment(1);
    }

    pub fn record_rider_detected() {
        ::metrics::counter!(phase_metric!(counter, "ingest", "riders_detected")).increment(1);
    }

    pub fn record_metrics_paired() {
        ::metrics::counter!(phase_metric!(counter, "ingest", "metrics_paired")).increment(1);
    }

    pub fn record_unsafe_heart_rate() {
        ::metrics::counter!(phase_metric!(counter, "ingest", "unsafe_heart_rates")).increment(1);
    }

    pub fn record_ride_completed() {
        ::metrics::counter!(phase_metric!(counter, "ingest", "rides_completed")).increment(1);
    }

    pub fn record_poll_error() {
        ::metrics::counter!(phase_metric!(counter, "ingest", "poll_errors")).increment(1);
    }
}

impl PhaseMetrics for IngestMetrics {
    fn register_metrics() {
        use metrics::counter;

        let _ = counter!(phase_metric!(counter, "ingest", "records_polled"));
        let _ = counter!(phase_metric!(counter, "ingest", "records_unrecognized"));
        let _ = counter!(phase_metric!(counter, "ingest", "records_malformed"));
        let _ = counter!(phase_metric!(counter, "ingest", "pairing_anomalies"));
        let _ = counter!(phase_metric!(counter, "ingest", "riders_detected"));
        let _ = counter!(phase_metric!(counter, "ingest", "metrics_paired"));
        let _ = counter!(phase_metric!(counter, "ingest", "unsafe_heart_rates"));
        let _ = counter!(phase_metric!(counter, "ingest", "rides_completed"));
        let _ = counter!(phase_metric!(counter, "ingest", "poll_errors"));
    }

    fn phase_name() -> &'static str {
        "ingest"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "ingest", "records_polled"),
                metric_type: MetricType::Counter,
                help: "Raw records delivered by the stream source",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "ingest", "records_unrecognized"),
                metric_type: MetricType::Counter,
                help: "Records matching no known marker",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "ingest", "records_malformed"),
                metric_type: MetricType::Counter,
                help: "Records whose marker matched but a required field was missing",
                labels: vec!["marker"],
            },
            MetricDoc {
                name: phase_metric!(counter, "ingest", "pairing_anomalies"),
                metric_type: MetricType::Counter,
                help: "Orphan telemetry, replaced fragments and out-of-order session boundaries",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "ingest", "riders_detected"),
                metric_type: MetricType::Counter,
                help: "Ride sessions opened from a system-info record",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "ingest", "metrics_paired"),
                metric_type: MetricType::Counter,
                help: "Metrics records built from a ride/telemetry pair",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "ingest", "unsafe_heart_rates"),
                metric_type: MetricType::Counter,
                help: "Telemetry readings outside the rider's safe heart-rate band",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "ingest", "rides_completed"),
                metric_type: MetricType::Counter,
                help: "Ride sessions closed by an end boundary",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "ingest", "poll_errors"),
                metric_type: MetricType::Counter,
                help: "Recoverable stream poll errors",
                labels: vec![],
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_metrics_registration() {
        IngestMetrics::register_metrics();
        IngestMetrics::record_malformed("telemetry");
    }

    #[test]
    fn test_metrics_documentation() {
        let docs = IngestMetrics::metrics_documentation();
        assert_eq!(docs.len(), 9);
        for doc in docs {
            assert!(doc.name.starts_with("ride_ingest_ingest_"));
        }
    }
}
