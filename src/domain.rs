use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::constants::WIRE_LOG_FIELD;
use crate::error::{IngestError, Result};

static POSTCODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Z]{1,2}\d[A-Z\d]?\s\d[A-Z]{2}").expect("valid postcode pattern"));

/// One raw log line as delivered by the stream, with its arrival position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub sequence: u64,
    pub payload: String,
}

impl RawRecord {
    pub fn new(sequence: u64, payload: impl Into<String>) -> Self {
        Self {
            sequence,
            payload: payload.into(),
        }
    }

    /// Builds a record from a stream message. Messages are usually JSON
    /// objects carrying the line under `log`; anything else is taken verbatim.
    pub fn from_wire(sequence: u64, message: &str) -> Self {
        let trimmed = message.trim_end_matches(['\r', '\n']);
        if let Ok(serde_json::Value::Object(obj)) = serde_json::from_str(trimmed) {
            if let Some(line) = obj.get(WIRE_LOG_FIELD).and_then(|v| v.as_str()) {
                return Self::new(sequence, line);
            }
        }
        Self::new(sequence, trimmed)
    }
}

/// Typed event extracted from exactly one raw record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParsedEvent {
    SystemInfo(RiderPayload),
    RideFragment(RideFragment),
    TelemetryFragment(TelemetryFragment),
    RideBoundaryStart,
    RideBoundaryEnd,
    Unrecognized,
}

impl ParsedEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ParsedEvent::SystemInfo(_) => "system_info",
            ParsedEvent::RideFragment(_) => "ride",
            ParsedEvent::TelemetryFragment(_) => "telemetry",
            ParsedEvent::RideBoundaryStart => "ride_start",
            ParsedEvent::RideBoundaryEnd => "ride_end",
            ParsedEvent::Unrecognized => "unrecognized",
        }
    }
}

/// Rider data embedded in a `[SYSTEM]` line, as the bike reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiderPayload {
    pub user_id: i64,
    pub name: String,
    pub gender: String,
    pub address: String,
    #[serde(deserialize_with = "millis_from_number_or_string")]
    pub date_of_birth: i64,
    pub email_address: String,
    pub height_cm: f64,
    pub weight_kg: f64,
    #[serde(deserialize_with = "millis_from_number_or_string")]
    pub account_create_date: i64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MillisRepr {
    Int(i64),
    Float(f64),
    Text(String),
}

fn millis_from_number_or_string<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match MillisRepr::deserialize(deserializer)? {
        MillisRepr::Int(ms) => Ok(ms),
        MillisRepr::Float(ms) => Ok(ms as i64),
        MillisRepr::Text(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| serde::de::Error::custom(format!("invalid millisecond timestamp '{}': {}", s, e))),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiderProfile {
    pub rider_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub gender: String,
    pub postcode: Option<String>,
    pub date_of_birth: NaiveDateTime,
    pub email: String,
    pub height_cm: f64,
    pub weight_kg: f64,
    pub account_created: NaiveDateTime,
}

impl RiderProfile {
    pub fn from_payload(payload: &RiderPayload) -> Result<Self> {
        let mut parts = payload.name.split_whitespace();
        let first_name = parts
            .next()
            .ok_or_else(|| IngestError::malformed("system", "rider name is empty"))?
            .to_string();
        let last_name = parts.collect::<Vec<_>>().join(" ");

        Ok(Self {
            rider_id: payload.user_id,
            first_name,
            last_name,
            gender: payload.gender.clone(),
            postcode: extract_postcode(&payload.address),
            date_of_birth: datetime_from_millis(payload.date_of_birth, "date_of_birth")?,
            email: payload.email_address.clone(),
            height_cm: payload.height_cm,
            weight_kg: payload.weight_kg,
            account_created: datetime_from_millis(payload.account_create_date, "account_create_date")?,
        })
    }

    pub fn full_name(&self) -> String {
        if self.last_name.is_empty() {
            self.first_name.clone()
        } else {
            format!("{} {}", self.first_name, self.last_name)
        }
    }

    pub fn birth_date(&self) -> NaiveDate {
        self.date_of_birth.date()
    }
}

pub fn extract_postcode(address: &str) -> Option<String> {
    POSTCODE.find(address).map(|m| m.as_str().to_string())
}

fn datetime_from_millis(ms: i64, field: &str) -> Result<NaiveDateTime> {
    DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| IngestError::malformed("system", format!("{} out of range: {}", field, ms)))
}

/// Ride-data half of a metrics pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideFragment {
    pub recorded_at: NaiveDateTime,
    pub bike_model: String,
    pub duration_secs: f64,
    pub resistance: u32,
}

/// Telemetry half of a metrics pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFragment {
    pub heart_rate: u32,
    pub rpm: u32,
    pub power: f64,
}

/// Staging row tying a ride to the rider who took it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RideLink {
    pub rider_id: i64,
    pub ride_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub ride_id: Uuid,
    pub recorded_at: NaiveDateTime,
    pub bike_model: String,
    pub duration_secs: f64,
    pub resistance: u32,
    pub heart_rate: u32,
    pub rpm: u32,
    pub power: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> RiderPayload {
        serde_json::from_value(json!({
            "user_id": 42,
            "name": "Ada Lovelace",
            "gender": "female",
            "address": "Flat 3, 12 Byron Road, London N7 6LP",
            "date_of_birth": 961027200000i64,
            "email_address": "ada@example.com",
            "height_cm": 170,
            "weight_kg": 61,
            "account_create_date": "1600000000000",
            "bike_serial": "SN0042"
        }))
        .unwrap()
    }

    #[test]
    fn wire_messages_unwrap_log_field() {
        let rec = RawRecord::from_wire(7, r#"{"log": "2022-07-25 16:25:35.2 mendoza v9: [INFO]: Ride - duration = 1.0; resistance = 30\n"}"#);
        assert_eq!(rec.sequence, 7);
        assert!(rec.payload.starts_with("2022-07-25"));

        let plain = RawRecord::from_wire(8, "not json at all\n");
        assert_eq!(plain.payload, "not json at all");
    }

    #[test]
    fn profile_derivation_splits_name_and_finds_postcode() {
        let profile = RiderProfile::from_payload(&payload()).unwrap();
        assert_eq!(profile.rider_id, 42);
        assert_eq!(profile.first_name, "Ada");
        assert_eq!(profile.last_name, "Lovelace");
        assert_eq!(profile.postcode.as_deref(), Some("N7 6LP"));
        assert_eq!(profile.birth_date(), NaiveDate::from_ymd_opt(2000, 6, 15).unwrap());
        assert_eq!(profile.account_created.and_utc().timestamp_millis(), 1_600_000_000_000);
        assert_eq!(profile.full_name(), "Ada Lovelace");
    }

    #[test]
    fn address_without_postcode_yields_none() {
        assert_eq!(extract_postcode("somewhere without a code"), None);
        assert_eq!(extract_postcode("1 High St, EC1A 1BB"), Some("EC1A 1BB".to_string()));
    }

    #[test]
    fn empty_name_is_malformed() {
        let mut p = payload();
        p.name = "   ".into();
        assert!(matches!(
            RiderProfile::from_payload(&p),
            Err(IngestError::MalformedRecord { .. })
        ));
    }
}
