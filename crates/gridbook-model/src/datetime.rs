//! Date/time serial numbers in the 1900 date system.
//!
//! A serial counts days: `1.0` is 1900-01-01 and the fraction is the time of day. Serial 60
//! is 1900-02-29, a day that never existed but that spreadsheet applications keep for
//! compatibility; every later serial is offset by it.

use std::fmt;

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::DateTimeError;
use crate::value::{CellValue, FromCellValue, ValueType};

const SECONDS_PER_DAY: i64 = 86_400;
/// Serial of the phantom 1900-02-29.
const PHANTOM_LEAP_DAY: i64 = 60;
/// Serial of 1970-01-01.
const UNIX_EPOCH_SERIAL: f64 = 25_569.0;
/// First serial past 9999-12-31.
const SERIAL_LIMIT: f64 = 2_958_466.0;

/// The day every serial from 61 onwards counts from.
fn epoch() -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)
}

/// A point in time stored as a serial number, as dates are kept in cells.
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DateTime {
    serial: f64,
}

impl DateTime {
    /// From a serial number in `1.0..2958466.0`.
    pub fn from_serial(serial: f64) -> Result<Self, DateTimeError> {
        if !serial.is_finite() || !(1.0..SERIAL_LIMIT).contains(&serial) {
            return Err(DateTimeError::SerialOutOfRange(serial));
        }
        Ok(Self { serial })
    }

    /// From a calendar date and time. Years before 1900 cannot be represented.
    pub fn from_naive(value: NaiveDateTime) -> Result<Self, DateTimeError> {
        let epoch = epoch().ok_or(DateTimeError::DateOutOfRange(value))?;
        let elapsed = value - epoch;
        let mut days = elapsed.num_days();
        let seconds = (elapsed - Duration::days(days)).num_seconds();
        // 1900-01-01 through 1900-02-28 sit before the phantom day.
        if days < PHANTOM_LEAP_DAY + 1 {
            days -= 1;
        }
        let serial = days as f64 + seconds as f64 / SECONDS_PER_DAY as f64;
        Self::from_serial(serial).map_err(|_| DateTimeError::DateOutOfRange(value))
    }

    /// From seconds since 1970-01-01T00:00:00.
    pub fn from_unix(seconds: i64) -> Result<Self, DateTimeError> {
        Self::from_serial(seconds as f64 / SECONDS_PER_DAY as f64 + UNIX_EPOCH_SERIAL)
    }

    pub fn serial(self) -> f64 {
        self.serial
    }

    /// The calendar date and time, rounded to the nearest second.
    ///
    /// Serial 60 has no calendar date and fails with [`DateTimeError::PhantomLeapDay`].
    pub fn to_naive(self) -> Result<NaiveDateTime, DateTimeError> {
        let mut days = self.serial.floor() as i64;
        let mut seconds = ((self.serial - days as f64) * SECONDS_PER_DAY as f64).round() as i64;
        if seconds >= SECONDS_PER_DAY {
            seconds -= SECONDS_PER_DAY;
            days += 1;
        }
        if days == PHANTOM_LEAP_DAY {
            return Err(DateTimeError::PhantomLeapDay);
        }
        if days < PHANTOM_LEAP_DAY {
            days += 1;
        }
        let epoch = epoch().ok_or(DateTimeError::SerialOutOfRange(self.serial))?;
        epoch
            .checked_add_signed(Duration::days(days) + Duration::seconds(seconds))
            .ok_or(DateTimeError::SerialOutOfRange(self.serial))
    }

    /// Seconds since 1970-01-01T00:00:00, rounded to the nearest second.
    pub fn to_unix(self) -> i64 {
        ((self.serial - UNIX_EPOCH_SERIAL) * SECONDS_PER_DAY as f64).round() as i64
    }
}

impl TryFrom<NaiveDateTime> for DateTime {
    type Error = DateTimeError;

    fn try_from(value: NaiveDateTime) -> Result<Self, Self::Error> {
        Self::from_naive(value)
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_naive() {
            Ok(dt) if dt.num_seconds_from_midnight() == 0 => write!(f, "{}", dt.date()),
            Ok(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            Err(_) => f.write_str("1900-02-29"),
        }
    }
}

impl From<DateTime> for CellValue {
    fn from(value: DateTime) -> Self {
        CellValue::Float(value.serial)
    }
}

/// Numbers in the serial range read as dates; integers count as whole days.
impl FromCellValue for DateTime {
    const VALUE_TYPE: ValueType = ValueType::Float;

    fn from_cell_value(value: &CellValue) -> Option<Self> {
        match value {
            CellValue::Float(v) => Self::from_serial(*v).ok(),
            CellValue::Integer(v) => Self::from_serial(*v as f64).ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    #[test]
    fn known_serials_map_to_calendar_dates() {
        let cases = [
            (1.0, at(1900, 1, 1, 0, 0, 0)),
            (59.0, at(1900, 2, 28, 0, 0, 0)),
            (61.0, at(1900, 3, 1, 0, 0, 0)),
            (25_569.0, at(1970, 1, 1, 0, 0, 0)),
            (36_526.5, at(2000, 1, 1, 12, 0, 0)),
            (45_292.75, at(2024, 1, 1, 18, 0, 0)),
        ];
        for (serial, expected) in cases {
            let dt = DateTime::from_serial(serial).unwrap();
            assert_eq!(dt.to_naive().unwrap(), expected, "{serial}");
            assert_eq!(DateTime::from_naive(expected).unwrap().serial(), serial, "{expected}");
        }
    }

    #[test]
    fn phantom_leap_day_has_no_calendar_date() {
        let dt = DateTime::from_serial(60.0).unwrap();
        assert_eq!(dt.to_naive(), Err(DateTimeError::PhantomLeapDay));
        assert_eq!(dt.to_string(), "1900-02-29");
    }

    #[test]
    fn out_of_range_inputs_are_rejected() {
        for serial in [0.0, 0.99, -3.0, f64::NAN, f64::INFINITY, 2_958_466.0] {
            assert!(DateTime::from_serial(serial).is_err(), "{serial}");
        }
        assert!(DateTime::from_naive(at(1899, 12, 31, 0, 0, 0)).is_err());
        assert!(DateTime::from_naive(at(1900, 1, 1, 0, 0, 0)).is_ok());
    }

    #[test]
    fn unix_time_round_trips() {
        let dt = DateTime::from_unix(946_728_000).unwrap();
        assert_eq!(dt.serial(), 36_526.5);
        assert_eq!(dt.to_unix(), 946_728_000);
    }

    #[test]
    fn times_round_to_the_nearest_second() {
        // 23:59:59.9 rounds up into the next day.
        let serial = 45_000.0 + (86_399.9 / 86_400.0);
        let dt = DateTime::from_serial(serial).unwrap();
        assert_eq!(dt.to_naive().unwrap(), at(2023, 3, 15, 0, 0, 0));
        assert_eq!(DateTime::from_serial(45_000.25).unwrap().to_string(), "2023-03-14 06:00:00");
    }

    #[test]
    fn cells_hold_dates_as_serial_numbers() {
        let dt = DateTime::from_naive(at(2021, 6, 30, 0, 0, 0)).unwrap();
        let value = CellValue::from(dt);
        assert_eq!(value, CellValue::Float(44_377.0));
        assert_eq!(value.get::<DateTime>().unwrap(), dt);
        assert_eq!(CellValue::Integer(44_377).get::<DateTime>().unwrap(), dt);
        assert!(CellValue::from("2021-06-30").get::<DateTime>().is_err());
        assert!(CellValue::Float(0.5).get::<DateTime>().is_err());
    }
}
