//! Record parser: classifies one raw log line by its markers and extracts
//! typed fields from it.
//!
//! Classification is a fixed, ordered list of substring checks. A line that
//! matches no marker is `Unrecognized` (normal, silently ignored). A line that
//! matches a marker but lacks a required field is a `MalformedRecord` error.

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::constants::{
    RIDE_END_MARKER, RIDE_MARKER, RIDE_START_MARKER, SYSTEM_MARKER, TELEMETRY_MARKER,
};
use crate::domain::{ParsedEvent, RawRecord, RiderPayload, RideFragment, TelemetryFragment};
use crate::error::{IngestError, Result};

static HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<ts>\d{4}-\d{2}-\d{2}\s\d{2}:\d{2}:\d{2}(?:\.\d+)?)\s+(?P<bike>\w+\sv\d+)")
        .expect("valid header pattern")
});
static SYSTEM_DATA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"data = (\{.+\})").expect("valid system data pattern"));
static DURATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"duration = (\d+(?:\.\d*)?)").expect("valid duration pattern"));
static RESISTANCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"resistance = (\d+)").expect("valid resistance pattern"));
static HEART_RATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"hrt = (\d+)").expect("valid heart rate pattern"));
static RPM: Lazy<Regex> = Lazy::new(|| Regex::new(r"rpm = (\d+)").expect("valid rpm pattern"));
static POWER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"power = (\d+(?:\.\d*)?)").expect("valid power pattern"));

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    RideStart,
    RideEnd,
    System,
    Telemetry,
    Ride,
}

impl Marker {
    fn detect(line: &str) -> Option<Marker> {
        // Boundary phrases first: they are lowercase prose and must win over
        // any data marker that happens to appear on the same line.
        const ORDER: [(&str, Marker); 5] = [
            (RIDE_START_MARKER, Marker::RideStart),
            (RIDE_END_MARKER, Marker::RideEnd),
            (SYSTEM_MARKER, Marker::System),
            (TELEMETRY_MARKER, Marker::Telemetry),
            (RIDE_MARKER, Marker::Ride),
        ];
        ORDER
            .iter()
            .find(|(needle, _)| line.contains(*needle))
            .map(|(_, marker)| *marker)
    }

    fn label(self) -> &'static str {
        match self {
            Marker::RideStart => "ride_start",
            Marker::RideEnd => "ride_end",
            Marker::System => "system",
            Marker::Telemetry => "telemetry",
            Marker::Ride => "ride",
        }
    }
}

/// Parses one raw record into a typed event.
pub fn parse_record(record: &RawRecord) -> Result<ParsedEvent> {
    parse_line(&record.payload)
}

pub fn parse_line(line: &str) -> Result<ParsedEvent> {
    let Some(marker) = Marker::detect(line) else {
        return Ok(ParsedEvent::Unrecognized);
    };

    match marker {
        Marker::RideStart => Ok(ParsedEvent::RideBoundaryStart),
        Marker::RideEnd => Ok(ParsedEvent::RideBoundaryEnd),
        Marker::System => parse_system(line).map(ParsedEvent::SystemInfo),
        Marker::Telemetry => parse_telemetry(line).map(ParsedEvent::TelemetryFragment),
        Marker::Ride => parse_ride(line).map(ParsedEvent::RideFragment),
    }
}

fn parse_system(line: &str) -> Result<RiderPayload> {
    let data = capture(&SYSTEM_DATA, line, Marker::System, "data")?;
    serde_json::from_str(data)
        .map_err(|e| IngestError::malformed(Marker::System.label(), format!("rider payload: {}", e)))
}

fn parse_ride(line: &str) -> Result<RideFragment> {
    let header = HEADER
        .captures(line)
        .ok_or_else(|| IngestError::malformed(Marker::Ride.label(), "missing timestamp or bike model"))?;
    let recorded_at = parse_timestamp(&header["ts"])?;

    Ok(RideFragment {
        recorded_at,
        bike_model: header["bike"].to_string(),
        duration_secs: number(&DURATION, line, Marker::Ride, "duration")?,
        resistance: number(&RESISTANCE, line, Marker::Ride, "resistance")?,
    })
}

fn parse_telemetry(line: &str) -> Result<TelemetryFragment> {
    Ok(TelemetryFragment {
        heart_rate: number(&HEART_RATE, line, Marker::Telemetry, "hrt")?,
        rpm: number(&RPM, line, Marker::Telemetry, "rpm")?,
        power: number(&POWER, line, Marker::Telemetry, "power")?,
    })
}

fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| IngestError::malformed(Marker::Ride.label(), format!("bad timestamp '{}'", raw)))
}

fn capture<'a>(re: &Regex, line: &'a str, marker: Marker, field: &str) -> Result<&'a str> {
    re.captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| IngestError::malformed(marker.label(), format!("missing {} field", field)))
}

fn number<T>(re: &Regex, line: &str, marker: Marker, field: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = capture(re, line, marker, field)?;
    raw.parse::<T>()
        .map_err(|e| IngestError::malformed(marker.label(), format!("{} '{}': {}", field, raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const RIDE: &str =
        "2022-07-25 16:25:35.212894 mendoza v9: [INFO]: Ride - duration = 12.0; resistance = 30";
    const TELEMETRY: &str =
        "2022-07-25 16:25:35.712894 mendoza v9: [INFO]: Telemetry - hrt = 87; rpm = 51; power = 12.6553";
    const SYSTEM: &str = r#"2022-07-25 16:25:34.212894 mendoza v9: [SYSTEM] data = {"user_id": 42, "name": "Ada Lovelace", "gender": "female", "address": "12 Byron Road, London N7 6LP", "date_of_birth": 961027200000, "email_address": "ada@example.com", "height_cm": 170, "weight_kg": 61, "account_create_date": 1600000000000}"#;

    #[test]
    fn ride_line_extracts_all_fields() {
        let ParsedEvent::RideFragment(ride) = parse_line(RIDE).unwrap() else {
            panic!("expected ride fragment");
        };
        assert_eq!(ride.bike_model, "mendoza v9");
        assert_eq!(ride.duration_secs, 12.0);
        assert_eq!(ride.resistance, 30);
        assert_eq!(
            ride.recorded_at.date(),
            NaiveDate::from_ymd_opt(2022, 7, 25).unwrap()
        );
    }

    #[test]
    fn integer_duration_is_accepted() {
        let line = "2024-10-01 09:00:00.000000 X v2: [INFO]: Ride - duration = 300; resistance = 5";
        let ParsedEvent::RideFragment(ride) = parse_line(line).unwrap() else {
            panic!("expected ride fragment");
        };
        assert_eq!(ride.bike_model, "X v2");
        assert_eq!(ride.duration_secs, 300.0);
    }

    #[test]
    fn telemetry_line_extracts_all_fields() {
        let ParsedEvent::TelemetryFragment(t) = parse_line(TELEMETRY).unwrap() else {
            panic!("expected telemetry fragment");
        };
        assert_eq!(t.heart_rate, 87);
        assert_eq!(t.rpm, 51);
        assert!((t.power - 12.6553).abs() < 1e-9);
    }

    #[test]
    fn system_line_carries_rider_payload() {
        let ParsedEvent::SystemInfo(p) = parse_line(SYSTEM).unwrap() else {
            panic!("expected system info");
        };
        assert_eq!(p.user_id, 42);
        assert_eq!(p.email_address, "ada@example.com");
    }

    #[test]
    fn boundaries_are_classified() {
        assert_eq!(
            parse_line("2022-07-25 16:25:34 mendoza v9: [INFO]: --------- beginning of a new ride ---------").unwrap(),
            ParsedEvent::RideBoundaryStart
        );
        assert_eq!(
            parse_line("--------- beginning of main ---------").unwrap(),
            ParsedEvent::RideBoundaryEnd
        );
    }

    #[test]
    fn unmarked_lines_are_unrecognized() {
        assert_eq!(parse_line("").unwrap(), ParsedEvent::Unrecognized);
        assert_eq!(
            parse_line("2022-07-25 16:25:34 mendoza v9: [INFO]: firmware ok").unwrap(),
            ParsedEvent::Unrecognized
        );
    }

    #[test]
    fn telemetry_without_heart_rate_is_malformed() {
        let err = parse_line("2022-07-25 16:25:35 mendoza v9: [INFO]: Telemetry - rpm = 51; power = 1.0")
            .unwrap_err();
        match err {
            IngestError::MalformedRecord { marker, reason } => {
                assert_eq!(marker, "telemetry");
                assert!(reason.contains("hrt"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn system_line_with_broken_json_is_malformed() {
        let err = parse_line("x [SYSTEM] data = {\"user_id\": }").unwrap_err();
        assert!(matches!(err, IngestError::MalformedRecord { marker: "system", .. }));
    }

    #[test]
    fn ride_without_header_is_malformed() {
        let err = parse_line("[INFO]: Ride - duration = 1.0; resistance = 3").unwrap_err();
        assert!(matches!(err, IngestError::MalformedRecord { marker: "ride", .. }));
    }

    #[test]
    fn parse_record_reads_payload() {
        let rec = RawRecord::new(1, TELEMETRY);
        assert!(matches!(parse_record(&rec).unwrap(), ParsedEvent::TelemetryFragment(_)));
    }
}
