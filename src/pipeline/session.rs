//! Per-stream ride session state machine.
//!
//! The tracker never performs I/O. Each event yields a [`Step`]: the side
//! effects the ingestion loop must dispatch, in order, plus any pairing
//! anomaly detected along the way.

use chrono::NaiveDate;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{MetricsRecord, ParsedEvent, RiderPayload, RiderProfile, RideFragment, RideLink, TelemetryFragment};
use crate::error::IngestError;
use crate::pipeline::heart_rate::{assess_for_rider, HeartRateAssessment};
use crate::pipeline::pairing::pair_metrics;

/// The ride currently being reconstructed on one stream.
#[derive(Debug, Clone, PartialEq)]
pub struct RideSession {
    pub ride_id: Uuid,
    pub rider: RiderProfile,
    pending_ride: Option<RideFragment>,
}

impl RideSession {
    fn start(rider: RiderProfile) -> Self {
        Self {
            ride_id: Uuid::new_v4(),
            rider,
            pending_ride: None,
        }
    }

    pub fn pending_ride(&self) -> Option<&RideFragment> {
        self.pending_ride.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SessionState {
    Idle,
    AwaitingSystemInfo,
    InRide(RideSession),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    AwaitingSystemInfo,
    InRide,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEffect {
    /// A new rider/ride pair was detected and must be staged.
    RiderDetected { rider: RiderProfile, link: RideLink },
    /// Every telemetry reading taken during a ride is assessed.
    HeartRateChecked {
        rider_name: String,
        rider_email: String,
        assessment: HeartRateAssessment,
    },
    MetricsReady(MetricsRecord),
    RideCompleted { ride_id: Uuid, rider_id: i64 },
}

/// Outcome of feeding one event to the tracker.
#[derive(Debug, Default)]
pub struct Step {
    pub effects: Vec<SessionEffect>,
    pub anomaly: Option<IngestError>,
    /// Set when a system-info payload could not be turned into a profile.
    pub malformed: Option<IngestError>,
}

impl Step {
    fn anomaly(mut self, message: impl Into<String>) -> Self {
        self.anomaly = Some(IngestError::PairingAnomaly(message.into()));
        self
    }

    fn effect(mut self, effect: SessionEffect) -> Self {
        self.effects.push(effect);
        self
    }
}

#[derive(Debug)]
pub struct SessionTracker {
    state: SessionState,
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTracker {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        match self.state {
            SessionState::Idle => SessionPhase::Idle,
            SessionState::AwaitingSystemInfo => SessionPhase::AwaitingSystemInfo,
            SessionState::InRide(_) => SessionPhase::InRide,
        }
    }

    pub fn active_ride(&self) -> Option<&RideSession> {
        match &self.state {
            SessionState::InRide(session) => Some(session),
            _ => None,
        }
    }

    /// Drops any open session without finalizing it.
    pub fn discard(&mut self) -> Option<RideSession> {
        match std::mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::InRide(session) => Some(session),
            _ => None,
        }
    }

    pub fn handle(&mut self, event: ParsedEvent, today: NaiveDate) -> Step {
        let state = std::mem::replace(&mut self.state, SessionState::Idle);
        let (next, step) = match state {
            SessionState::Idle => Self::on_idle(event),
            SessionState::AwaitingSystemInfo => Self::on_awaiting(event),
            SessionState::InRide(session) => Self::on_ride(session, event, today),
        };
        self.state = next;
        step
    }

    fn on_idle(event: ParsedEvent) -> (SessionState, Step) {
        match event {
            ParsedEvent::RideBoundaryStart => (SessionState::AwaitingSystemInfo, Step::default()),
            other => {
                debug!(event = other.kind(), "no ride in progress; ignoring event");
                (SessionState::Idle, Step::default())
            }
        }
    }

    fn on_awaiting(event: ParsedEvent) -> (SessionState, Step) {
        match event {
            ParsedEvent::SystemInfo(payload) => Self::open_session(&payload, Step::default())
                .unwrap_or_else(|step| (SessionState::AwaitingSystemInfo, step)),
            ParsedEvent::RideBoundaryEnd => (
                SessionState::Idle,
                Step::default().anomaly("ride ended before any rider was identified"),
            ),
            other => {
                debug!(event = other.kind(), "awaiting rider info; ignoring event");
                (SessionState::AwaitingSystemInfo, Step::default())
            }
        }
    }

    fn on_ride(mut session: RideSession, event: ParsedEvent, today: NaiveDate) -> (SessionState, Step) {
        match event {
            ParsedEvent::RideFragment(ride) => {
                let mut step = Step::default();
                if session.pending_ride.is_some() {
                    step = step.anomaly(format!(
                        "ride {} received a second ride fragment before telemetry; replacing the buffered one",
                        session.ride_id
                    ));
                }
                session.pending_ride = Some(ride);
                (SessionState::InRide(session), step)
            }
            ParsedEvent::TelemetryFragment(telemetry) => {
                let step = Self::on_telemetry(&mut session, &telemetry, today);
                (SessionState::InRide(session), step)
            }
            ParsedEvent::RideBoundaryEnd => {
                let step = Step::default().effect(SessionEffect::RideCompleted {
                    ride_id: session.ride_id,
                    rider_id: session.rider.rider_id,
                });
                (SessionState::Idle, step)
            }
            ParsedEvent::SystemInfo(payload) => {
                let step = Step::default().anomaly(format!(
                    "rider {} arrived while ride {} for rider {} was still open; discarding it",
                    payload.user_id, session.ride_id, session.rider.rider_id
                ));
                match Self::open_session(&payload, step) {
                    Ok(opened) => opened,
                    Err(step) => (SessionState::AwaitingSystemInfo, step),
                }
            }
            ParsedEvent::RideBoundaryStart => (
                SessionState::AwaitingSystemInfo,
                Step::default().anomaly(format!(
                    "new ride started while ride {} was still open; discarding it",
                    session.ride_id
                )),
            ),
            ParsedEvent::Unrecognized => (SessionState::InRide(session), Step::default()),
        }
    }

    fn on_telemetry(session: &mut RideSession, telemetry: &TelemetryFragment, today: NaiveDate) -> Step {
        let assessment = assess_for_rider(session.rider.birth_date(), telemetry.heart_rate, today);
        let mut step = Step::default().effect(SessionEffect::HeartRateChecked {
            rider_name: session.rider.full_name(),
            rider_email: session.rider.email.clone(),
            assessment,
        });

        match session.pending_ride.take() {
            Some(ride) => step.effect(SessionEffect::MetricsReady(pair_metrics(ride, telemetry, session.ride_id))),
            None => {
                step = step.anomaly(format!(
                    "telemetry for ride {} arrived with no buffered ride fragment; discarded",
                    session.ride_id
                ));
                step
            }
        }
    }

    fn open_session(payload: &RiderPayload, step: Step) -> Result<(SessionState, Step), Step> {
        match RiderProfile::from_payload(payload) {
            Ok(rider) => {
                let session = RideSession::start(rider.clone());
                let link = RideLink {
                    rider_id: rider.rider_id,
                    ride_id: session.ride_id,
                };
                let step = step.effect(SessionEffect::RiderDetected { rider, link });
                Ok((SessionState::InRide(session), step))
            }
            Err(e) => Err(Step {
                malformed: Some(e),
                ..step
            }),
        }
    }
}
