//! The ingestion loop drives parser, session tracker and collaborators over
//! one stream, strictly in arrival order.
//!
//! Collaborator calls are bounded by a timeout and never abort the loop. Only
//! a transport failure, end of stream or a shutdown request ends it; open
//! session state is then discarded without being finalized.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::app::ports::{AlertChannel, CompletionNotice, EventPublisher, StagingStore, StreamPoll, StreamSource};
use crate::constants::{
    ALERT_COLLABORATOR, COMPLETION_MESSAGE, COMPLETION_SUBJECT, DEFAULT_COLLABORATOR_TIMEOUT_MS,
    DEFAULT_NOTIFY_TOPIC, PUBLISHER_COLLABORATOR, STAGING_COLLABORATOR,
};
use crate::domain::{ParsedEvent, RawRecord};
use crate::error::{IngestError, Result};
use crate::metrics::{CollaboratorMetrics, IngestMetrics};
use crate::parser::parse_record;
use crate::pipeline::heart_rate::Clock;
use crate::pipeline::session::{SessionEffect, SessionPhase, SessionTracker};

/// Shared handles to the side-effecting collaborators.
#[derive(Clone)]
pub struct Collaborators {
    pub staging: Arc<dyn StagingStore>,
    pub alerts: Arc<dyn AlertChannel>,
    pub publisher: Arc<dyn EventPublisher>,
}

#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub collaborator_timeout: Duration,
    pub notify_topic: String,
    pub completion_subject: String,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            collaborator_timeout: Duration::from_millis(DEFAULT_COLLABORATOR_TIMEOUT_MS),
            notify_topic: DEFAULT_NOTIFY_TOPIC.to_string(),
            completion_subject: COMPLETION_SUBJECT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoopExit {
    #[default]
    EndOfStream,
    Shutdown,
    TransportFailure(String),
}

/// Per-loop tallies, returned when the loop ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopReport {
    pub records: u64,
    pub unrecognized: u64,
    pub malformed: u64,
    pub anomalies: u64,
    pub riders: u64,
    pub metrics: u64,
    pub unsafe_readings: u64,
    pub alerts_sent: u64,
    pub alerts_failed: u64,
    pub rides_completed: u64,
    pub collaborator_failures: u64,
    pub poll_errors: u64,
    pub exit: LoopExit,
}

pub struct IngestLoop<S: StreamSource> {
    source: S,
    tracker: SessionTracker,
    effects: EffectDispatcher,
    clock: Arc<dyn Clock>,
}

/// Executes tracker effects against the collaborators. Must not reach the
/// source: effects are awaited while the loop is spawned, and sources are
/// `Send` but not `Sync`.
struct EffectDispatcher {
    collaborators: Collaborators,
    settings: LoopSettings,
}

impl<S: StreamSource> IngestLoop<S> {
    pub fn new(source: S, collaborators: Collaborators, settings: LoopSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            tracker: SessionTracker::new(),
            effects: EffectDispatcher { collaborators, settings },
            clock,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.tracker.phase()
    }

    /// Runs until end of stream, transport failure or shutdown.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> LoopReport {
        let span = info_span!("ingest_loop", stream = %self.source.name());
        async move {
            let mut report = LoopReport::default();
            info!("Ingestion loop started");

            report.exit = loop {
                let stop = *shutdown.borrow();
                if stop {
                    break LoopExit::Shutdown;
                }

                let polled = tokio::select! {
                    biased;
                    _ = shutdown_requested(&mut shutdown) => break LoopExit::Shutdown,
                    polled = self.source.poll() => polled,
                };

                match polled {
                    Ok(StreamPoll::Record(record)) => {
                        let sequence = record.sequence;
                        self.process(record, &mut report).await;
                        if let Err(e) = self.source.commit(sequence).await {
                            if e.is_fatal() {
                                error!(sequence, error = %e, "Commit failed; stream unusable");
                                break LoopExit::TransportFailure(e.to_string());
                            }
                            warn!(sequence, error = %e, "Commit failed; will retry on next record");
                        }
                    }
                    Ok(StreamPoll::Empty) => continue,
                    Ok(StreamPoll::EndOfStream) => break LoopExit::EndOfStream,
                    Err(e) if e.is_fatal() => {
                        error!(error = %e, "Stream transport failed");
                        break LoopExit::TransportFailure(e.to_string());
                    }
                    Err(e) => {
                        report.poll_errors += 1;
                        IngestMetrics::record_poll_error();
                        warn!(error = %e, "Stream poll error; continuing");
                    }
                }
            };

            if let Some(session) = self.tracker.discard() {
                warn!(
                    ride_id = %session.ride_id,
                    rider_id = session.rider.rider_id,
                    "Discarding unfinished ride on loop exit"
                );
            }
            if let Err(e) = self.source.close().await {
                warn!(error = %e, "Failed to close stream source");
            }

            info!(exit = ?report.exit, records = report.records, "Ingestion loop stopped");
            report
        }
        .instrument(span)
        .await
    }

    /// Parses one record and dispatches whatever the tracker asks for.
    pub async fn process(&mut self, record: RawRecord, report: &mut LoopReport) {
        report.records += 1;
        IngestMetrics::record_polled();

        let event = match parse_record(&record) {
            Ok(ParsedEvent::Unrecognized) => {
                report.unrecognized += 1;
                IngestMetrics::record_unrecognized();
                debug!(sequence = record.sequence, "Unrecognized record");
                return;
            }
            Ok(event) => event,
            Err(e) => {
                note_malformed(record.sequence, &e, report);
                return;
            }
        };

        let step = self.tracker.handle(event, self.clock.today());

        if let Some(e) = step.malformed {
            note_malformed(record.sequence, &e, report);
        }
        if let Some(anomaly) = step.anomaly {
            report.anomalies += 1;
            IngestMetrics::record_pairing_anomaly();
            warn!(sequence = record.sequence, "{}", anomaly);
        }
        for effect in step.effects {
            self.effects.dispatch(effect, report).await;
        }
    }
}

fn note_malformed(sequence: u64, e: &IngestError, report: &mut LoopReport) {
    report.malformed += 1;
    let marker = match e {
        IngestError::MalformedRecord { marker, .. } => *marker,
        _ => "unknown",
    };
    IngestMetrics::record_malformed(marker);
    warn!(sequence, error = %e, "Dropping malformed record");
}

impl EffectDispatcher {
    async fn dispatch(&self, effect: SessionEffect, report: &mut LoopReport) {
        let c = &self.collaborators;
        match effect {
            SessionEffect::RiderDetected { rider, link } => {
                report.riders += 1;
                IngestMetrics::record_rider_detected();
                info!(rider_id = rider.rider_id, ride_id = %link.ride_id, "New ride detected");
                self.call(STAGING_COLLABORATOR, c.staging.upsert_rider(&rider), report)
                    .await;
                self.call(STAGING_COLLABORATOR, c.staging.link_ride_to_rider(&link), report)
                    .await;
            }
            SessionEffect::HeartRateChecked {
                rider_name,
                rider_email,
                assessment,
            } => {
                info!(
                    rider = %rider_name,
                    heart_rate = assessment.heart_rate,
                    age = assessment.age,
                    "Heart rate reading"
                );
                if assessment.safe {
                    return;
                }
                report.unsafe_readings += 1;
                IngestMetrics::record_unsafe_heart_rate();
                warn!(
                    heart_rate = assessment.heart_rate,
                    age = assessment.age,
                    lower = assessment.lower_limit,
                    upper = assessment.upper_limit,
                    "Heart rate outside safe range"
                );
                let send = async {
                    Ok::<bool, IngestError>(
                        c.alerts
                            .send_heart_rate_alert(&rider_name, &rider_email, assessment.heart_rate)
                            .await,
                    )
                };
                match self.call(ALERT_COLLABORATOR, send, report).await {
                    Some(true) => {
                        report.alerts_sent += 1;
                        CollaboratorMetrics::record_alert_sent();
                        info!(email = %rider_email, "Heart rate alert sent");
                    }
                    Some(false) => {
                        report.alerts_failed += 1;
                        report.collaborator_failures += 1;
                        CollaboratorMetrics::record_alert_failed();
                        CollaboratorMetrics::record_failure(ALERT_COLLABORATOR);
                        error!(email = %rider_email, "Alert channel rejected heart rate alert");
                    }
                    None => {
                        report.alerts_failed += 1;
                        CollaboratorMetrics::record_alert_failed();
                    }
                }
            }
            SessionEffect::MetricsReady(metrics) => {
                report.metrics += 1;
                IngestMetrics::record_metrics_paired();
                self.call(STAGING_COLLABORATOR, c.staging.insert_metrics(&metrics), report)
                    .await;
            }
            SessionEffect::RideCompleted { ride_id, rider_id } => {
                report.rides_completed += 1;
                IngestMetrics::record_ride_completed();
                let notice = CompletionNotice {
                    ride_id,
                    rider_id,
                    subject: self.settings.completion_subject.clone(),
                    message: COMPLETION_MESSAGE.to_string(),
                };
                let topic = &self.settings.notify_topic;
                info!(%ride_id, topic = %topic, "Publishing ride completion");
                if let Some(message_id) = self
                    .call(PUBLISHER_COLLABORATOR, c.publisher.publish(topic, &notice), report)
                    .await
                {
                    info!(%ride_id, message_id = %message_id, "Ride completion published");
                }
            }
        }
    }

    /// Runs one collaborator call under the configured timeout. Failures are
    /// logged and counted, never propagated.
    async fn call<T, F>(&self, collaborator: &'static str, fut: F, report: &mut LoopReport) -> Option<T>
    where
        F: Future<Output = Result<T>>,
    {
        let _timing = CollaboratorMetrics::start_call(collaborator);
        let outcome = match tokio::time::timeout(self.settings.collaborator_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(IngestError::Timeout {
                collaborator,
                after_ms: self.settings.collaborator_timeout.as_millis() as u64,
            }),
        };
        match outcome {
            Ok(value) => Some(value),
            Err(e) => {
                report.collaborator_failures += 1;
                CollaboratorMetrics::record_failure(collaborator);
                error!(collaborator, error = %e, "Collaborator call failed");
                None
            }
        }
    }
}

/// Resolves once shutdown is requested. A dropped sender means nobody can
/// ask for shutdown any more, so this then never resolves.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    let sender_gone = rx.wait_for(|stop| *stop).await.is_err();
    if sender_gone {
        std::future::pending::<()>().await;
    }
}
