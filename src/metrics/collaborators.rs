//! Collaborator call metrics: staging writes, alert sends, notification publishes.

use crate::metrics::core::{time_operation, TimingGuard};
use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct CollaboratorMetrics;

impl CollaboratorMetrics {
    pub fn start_call(collaborator: &'static str) -> TimingGuard {
        time_operation(phase_metric!(histogram, "collaborator", "call_duration_seconds"))
            .with_label("collaborator", collaborator)
    }

    pub fn record_failure(collaborator: &'static str) {
        ::metrics::counter!(phase_metric!(counter, "collaborator", "failures"), "collaborator" => collaborator)
            .increment(1);
    }

    pub fn record_alert_sent() {
        ::metrics::counter!(phase_metric!(counter, "collaborator", "alerts_sent")).increment(1);
    }

    pub fn record_alert_failed() {
        ::metrics::counter!(phase_metric!(counter, "collaborator", "alerts_failed")).increment(1);
    }
}

impl PhaseMetrics for CollaboratorMetrics {
    fn register_metrics() {
        use metrics::{counter, histogram};

        let _ = counter!(phase_metric!(counter, "collaborator", "failures"));
        let _ = counter!(phase_metric!(counter, "collaborator", "alerts_sent"));
        let _ = counter!(phase_metric!(counter, "collaborator", "alerts_failed"));
        let _ = histogram!(phase_metric!(histogram, "collaborator", "call_duration_seconds"));
    }

    fn phase_name() -> &'static str {
        "collaborator"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "collaborator", "failures"),
                metric_type: MetricType::Counter,
                help: "Collaborator calls that failed or timed out",
                labels: vec!["collaborator"],
            },
            MetricDoc {
                name: phase_metric!(counter, "collaborator", "alerts_sent"),
                metric_type: MetricType::Counter,
                help: "Heart-rate alerts accepted by the alert channel",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "collaborator", "alerts_failed"),
                metric_type: MetricType::Counter,
                help: "Heart-rate alerts the alert channel rejected",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(histogram, "collaborator", "call_duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Duration of collaborator calls",
                labels: vec!["collaborator"],
            },
        ]
    }
}
