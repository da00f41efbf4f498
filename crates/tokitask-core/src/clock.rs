//! `HH:MM` wall-clock helpers.

use chrono::{NaiveTime, Timelike};

use crate::TokiError;

/// Parse `HH:MM` (24h).
pub fn parse_clock(input: &str) -> Result<NaiveTime, TokiError> {
    NaiveTime::parse_from_str(input.trim(), "%H:%M")
        .map_err(|_| TokiError::Validation(format!("\"{}\" is not a HH:MM time", input.trim())))
}

/// Render as `HH:MM`, dropping seconds.
pub fn format_clock(time: NaiveTime) -> String {
    format!("{:02}:{:02}", time.hour(), time.minute())
}

/// Whole minutes from `now` until `end_of_day`, zero once it has passed.
pub fn minutes_until(now: NaiveTime, end_of_day: NaiveTime) -> u32 {
    let now = now.hour() * 60 + now.minute();
    let end = end_of_day.hour() * 60 + end_of_day.minute();
    end.saturating_sub(now)
}
