//! Calendar bounds of quota periods
//!
//! Bounds are a pure function of the current time and the period type, all
//! in UTC: hours start on the hour, days at midnight, weeks on Monday
//! (ISO 8601) and months on the first.

use crate::core::clock::{seconds_to_utc, utc_to_seconds};
use crate::core::scope::QuotaPeriod;
use crate::utils::error::{AdmissionError, Result};
use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};

/// `[start, end)` of the period containing `now`
pub fn period_bounds(period: QuotaPeriod, now: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let (start, end) = match period {
        QuotaPeriod::Hour => {
            let start = utc(now.year(), now.month(), now.day(), now.hour())?;
            (start, start + Duration::hours(1))
        }
        QuotaPeriod::Day => {
            let start = utc(now.year(), now.month(), now.day(), 0)?;
            (start, start + Duration::days(1))
        }
        QuotaPeriod::Week => {
            let today = utc(now.year(), now.month(), now.day(), 0)?;
            let start = today - Duration::days(i64::from(now.weekday().num_days_from_monday()));
            (start, start + Duration::days(7))
        }
        QuotaPeriod::Month => {
            let start = utc(now.year(), now.month(), 1, 0)?;
            let end = if now.month() == 12 {
                utc(now.year() + 1, 1, 1, 0)?
            } else {
                utc(now.year(), now.month() + 1, 1, 0)?
            };
            (start, end)
        }
    };
    Ok((start, end))
}

/// [`period_bounds`] in epoch seconds
pub fn period_bounds_secs(period: QuotaPeriod, now: f64) -> Result<(f64, f64)> {
    let (start, end) = period_bounds(period, seconds_to_utc(now))?;
    Ok((utc_to_seconds(start), utc_to_seconds(end)))
}

fn utc(year: i32, month: u32, day: u32, hour: u32) -> Result<DateTime<Utc>> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0)
        .single()
        .ok_or_else(|| {
            AdmissionError::internal(format!(
                "invalid period boundary {:04}-{:02}-{:02}T{:02}:00Z",
                year, month, day, hour
            ))
        })
}
