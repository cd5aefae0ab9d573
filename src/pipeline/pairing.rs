use uuid::Uuid;

use crate::domain::{MetricsRecord, RideFragment, TelemetryFragment};

/// Fuses a ride fragment with the telemetry fragment that followed it.
pub fn pair_metrics(ride: RideFragment, telemetry: &TelemetryFragment, ride_id: Uuid) -> MetricsRecord {
    MetricsRecord {
        ride_id,
        recorded_at: ride.recorded_at,
        bike_model: ride.bike_model,
        duration_secs: ride.duration_secs,
        resistance: ride.resistance,
        heart_rate: telemetry.heart_rate,
        rpm: telemetry.rpm,
        power: telemetry.power,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn pair_takes_ride_fields_and_telemetry_fields() {
        let ride_id = Uuid::new_v4();
        let recorded_at = NaiveDate::from_ymd_opt(2024, 10, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let ride = RideFragment {
            recorded_at,
            bike_model: "X v2".into(),
            duration_secs: 300.0,
            resistance: 5,
        };
        let telemetry = TelemetryFragment {
            heart_rate: 110,
            rpm: 80,
            power: 150.0,
        };

        let m = pair_metrics(ride, &telemetry, ride_id);
        assert_eq!(m.ride_id, ride_id);
        assert_eq!(m.recorded_at, recorded_at);
        assert_eq!(m.bike_model, "X v2");
        assert_eq!(m.duration_secs, 300.0);
        assert_eq!(m.resistance, 5);
        assert_eq!(m.heart_rate, 110);
        assert_eq!(m.rpm, 80);
        assert_eq!(m.power, 150.0);
    }
}
