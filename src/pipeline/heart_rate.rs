//! Heart-rate safety band derived from rider age.

use chrono::{Datelike, NaiveDate, Utc};
use serde::Serialize;

/// Source of "today" for age calculation.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// Always reports the same day.
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// Whole years elapsed, minus one if this year's birthday is still ahead.
pub fn age_on(date_of_birth: NaiveDate, today: NaiveDate) -> i32 {
    let years = today.year() - date_of_birth.year();
    let before_birthday = (today.month(), today.day()) < (date_of_birth.month(), date_of_birth.day());
    years - i32::from(before_birthday)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeartRateAssessment {
    pub age: i32,
    pub heart_rate: u32,
    pub max_heart_rate: i32,
    pub lower_limit: f64,
    pub upper_limit: f64,
    pub safe: bool,
}

/// Zero counts as safe: the sensor is not reporting.
pub fn assess(age: i32, heart_rate: u32) -> HeartRateAssessment {
    let max_heart_rate = 220 - age;
    let lower_limit = f64::from(max_heart_rate) * 0.5;
    let upper_limit = f64::from(max_heart_rate) * 0.7;
    let bpm = f64::from(heart_rate);
    let safe = heart_rate == 0 || (lower_limit <= bpm && bpm <= upper_limit);

    HeartRateAssessment {
        age,
        heart_rate,
        max_heart_rate,
        lower_limit,
        upper_limit,
        safe,
    }
}

pub fn assess_for_rider(date_of_birth: NaiveDate, heart_rate: u32, today: NaiveDate) -> HeartRateAssessment {
    assess(age_on(date_of_birth, today), heart_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn band_for_thirty_year_old_is_inclusive() {
        let a = assess(30, 95);
        assert_eq!(a.max_heart_rate, 190);
        assert_eq!(a.lower_limit, 95.0);
        assert!((a.upper_limit - 133.0).abs() < 1e-9);
        assert!(a.safe);
        assert!(assess(30, 133).safe);
        assert!(!assess(30, 94).safe);
        assert!(!assess(30, 134).safe);
    }

    #[test]
    fn zero_is_always_safe() {
        for age in [5, 30, 70, 110] {
            assert!(assess(age, 0).safe);
        }
    }

    #[test]
    fn birthday_today_counts_new_age() {
        let dob = ymd(2000, 6, 15);
        assert_eq!(age_on(dob, ymd(2024, 6, 14)), 23);
        assert_eq!(age_on(dob, ymd(2024, 6, 15)), 24);
        assert_eq!(age_on(dob, ymd(2024, 6, 16)), 24);
    }

    #[test]
    fn leap_day_birthday_waits_for_march_in_common_years() {
        let dob = ymd(2004, 2, 29);
        assert_eq!(age_on(dob, ymd(2025, 2, 28)), 20);
        assert_eq!(age_on(dob, ymd(2025, 3, 1)), 21);
    }

    #[test]
    fn rider_aged_24_band() {
        let a = assess_for_rider(ymd(2000, 6, 15), 110, ymd(2024, 10, 1));
        assert_eq!(a.age, 24);
        assert_eq!(a.max_heart_rate, 196);
        assert_eq!(a.lower_limit, 98.0);
        assert!((a.upper_limit - 137.2).abs() < 1e-9);
        assert!(a.safe);
    }

    #[test]
    fn fixed_clock_reports_its_day() {
        assert_eq!(FixedClock(ymd(2024, 1, 2)).today(), ymd(2024, 1, 2));
    }
}
