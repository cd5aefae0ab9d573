use ride_ingest::metrics::{self, CollaboratorMetrics, IngestMetrics};

// Installs the global recorder, so this lives in its own test binary.
#[test]
fn recorded_counters_reach_the_prometheus_snapshot() {
    metrics::init_metrics(None);

    IngestMetrics::record_polled();
    IngestMetrics::record_polled();
    CollaboratorMetrics::record_failure("publisher");

    let snapshot = metrics::render().expect("recorder installed");
    assert!(
        snapshot.contains("ride_ingest_ingest_records_polled_total 2"),
        "snapshot was:\n{}",
        snapshot
    );
    assert!(snapshot.contains(r#"ride_ingest_collaborator_failures_total{collaborator="publisher"} 1"#));
}
