//! Display helpers for durations and dates.

use chrono::{Datelike, NaiveDate};

use crate::model::DayOfWeek;

/// `MM:SS`, minutes unbounded. Used for the live session clock.
#[must_use]
pub fn format_clock(total_secs: u64) -> String {
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}

/// `HH:MM:SS`.
#[must_use]
pub fn format_hms(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs / 60) % 60;
    let seconds = total_secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Study totals such as `"2h 5min"`. Negative input renders as zero.
#[must_use]
pub fn format_study_minutes(minutes: i64) -> String {
    if minutes < 0 {
        return "0h 0min".to_string();
    }
    format!("{}h {}min", minutes / 60, minutes % 60)
}

/// Parse a `HH:MM:SS` or `MM:SS` clock string into seconds.
///
/// Returns `None` for any other shape, non-numeric parts, or out-of-range
/// minutes/seconds.
#[must_use]
pub fn parse_clock(value: &str) -> Option<u32> {
    let parts: Vec<u32> = value
        .trim()
        .split(':')
        .map(|part| part.trim().parse::<u32>().ok())
        .collect::<Option<_>>()?;

    match parts.as_slice() {
        [hours, minutes, seconds] if *minutes < 60 && *seconds < 60 => hours
            .checked_mul(3600)?
            .checked_add(minutes * 60)?
            .checked_add(*seconds),
        [minutes, seconds] if *seconds < 60 => minutes.checked_mul(60)?.checked_add(*seconds),
        _ => None,
    }
}

/// `"Tuesday 14/11/2023"`, the header shown above the day's plan.
#[must_use]
pub fn format_long_date(date: NaiveDate) -> String {
    format!(
        "{} {:02}/{:02}/{}",
        DayOfWeek::of(date),
        date.day(),
        date.month(),
        date.year()
    )
}
