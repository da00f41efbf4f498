//! Free-text durations as users type them ("45 min", "1h30", "1:15").

use crate::TokiError;

/// Quantum every planned duration is rounded to.
pub const SLOT_MINUTES: u32 = 5;

/// Longest duration accepted anywhere: one full day.
pub const MAX_MINUTES: u32 = 24 * 60;

/// Parse a free-text duration into whole minutes.
pub fn parse_minutes(input: &str) -> Result<u32, TokiError> {
    let text = input.trim().to_lowercase();
    if text.is_empty() {
        return Err(invalid(input));
    }

    if let Some((hours, minutes)) = text.split_once(':') {
        let hours: u32 = hours.trim().parse().map_err(|_| invalid(input))?;
        let minutes: u32 = minutes.trim().parse().map_err(|_| invalid(input))?;
        if minutes >= 60 {
            return Err(invalid(input));
        }
        let total = hours
            .checked_mul(60)
            .and_then(|h| h.checked_add(minutes))
            .ok_or_else(|| out_of_range(input))?;
        return within_day(total, input);
    }

    let mut total = 0.0_f64;
    let mut saw_hours = false;
    let mut terms = 0;
    let mut chars = text.chars().peekable();

    while chars.peek().is_some() {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            break;
        }

        let mut number = String::new();
        while let Some(c) = chars.next_if(|c| c.is_ascii_digit() || *c == '.' || *c == ',') {
            number.push(if c == ',' { '.' } else { c });
        }
        if number.is_empty() {
            return Err(invalid(input));
        }
        let value: f64 = number.parse().map_err(|_| invalid(input))?;

        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let mut unit = String::new();
        while let Some(c) = chars.next_if(|c| c.is_alphabetic()) {
            unit.push(c);
        }

        let factor = match unit.as_str() {
            "h" | "hr" | "hrs" | "hour" | "hours" => {
                saw_hours = true;
                60.0
            }
            "m" | "min" | "mins" | "minute" | "minutes" => 1.0,
            // A bare trailing number after hours means minutes ("1h30").
            "" if terms == 0 || saw_hours => 1.0,
            _ => return Err(invalid(input)),
        };
        total += value * factor;
        terms += 1;
    }

    if terms == 0 {
        return Err(invalid(input));
    }
    let total = total.round();
    if !total.is_finite() || total > f64::from(MAX_MINUTES) {
        return Err(out_of_range(input));
    }
    Ok(total as u32)
}

/// Canonical rendering: `"1h 30min"`, `"45min"`, `"2h"`, `"0min"`.
pub fn format_minutes(minutes: u32) -> String {
    let hours = minutes / 60;
    let rest = minutes % 60;
    match (hours, rest) {
        (0, rest) => format!("{rest}min"),
        (hours, 0) => format!("{hours}h"),
        (hours, rest) => format!("{hours}h {rest}min"),
    }
}

/// Round to the nearest multiple of [`SLOT_MINUTES`].
pub fn round_to_slot(minutes: u32) -> u32 {
    minutes.saturating_add(SLOT_MINUTES / 2) / SLOT_MINUTES * SLOT_MINUTES
}

/// Parse and re-render in canonical form.
pub fn normalize(input: &str) -> Result<String, TokiError> {
    parse_minutes(input).map(format_minutes)
}

fn within_day(minutes: u32, input: &str) -> Result<u32, TokiError> {
    if minutes > MAX_MINUTES {
        return Err(out_of_range(input));
    }
    Ok(minutes)
}

fn out_of_range(input: &str) -> TokiError {
    TokiError::Validation(format!(
        "duration \"{}\" is longer than a day",
        input.trim()
    ))
}

fn invalid(input: &str) -> TokiError {
    TokiError::Validation(format!("unrecognized duration \"{}\"", input.trim()))
}
