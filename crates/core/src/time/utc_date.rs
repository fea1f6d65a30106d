use crate::domain::error::WatchlistError;
use chrono::{DateTime, NaiveDate, Utc};

/// Calendar date of `now` in UTC; the default as-of for a publish.
pub fn today_utc(now_utc: DateTime<Utc>) -> NaiveDate {
    now_utc.date_naive()
}

/// Strict `YYYY-MM-DD`. chrono alone accepts signs and extra year digits, so
/// the shape is checked before the calendar.
pub fn parse_iso_date(s: &str) -> anyhow::Result<NaiveDate> {
    let invalid = || WatchlistError::InvalidInput(format!("Invalid date format: {s}"));

    if !has_iso_date_shape(s) {
        return Err(invalid().into());
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| invalid().into())
}

pub fn resolve_as_of(as_of_arg: Option<&str>, now_utc: DateTime<Utc>) -> anyhow::Result<NaiveDate> {
    match as_of_arg {
        Some(s) => parse_iso_date(s),
        None => Ok(today_utc(now_utc)),
    }
}

fn has_iso_date_shape(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 10
        && b.iter().enumerate().all(|(i, c)| match i {
            4 | 7 => *c == b'-',
            _ => c.is_ascii_digit(),
        })
}
