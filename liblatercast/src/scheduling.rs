//! Parsing of human-readable schedule times
//!
//! Accepts the formats the CLI surface takes for "when should this post go
//! out": relative durations ("30m", "2h", "1 day", optionally prefixed with
//! '+') and natural-language expressions ("tomorrow 3pm", "next friday").

use crate::{LatercastError, Result};
use chrono::{DateTime, Duration, Utc};

/// Parse a schedule string into a UTC timestamp.
///
/// # Errors
///
/// Returns `InvalidInput` if the string is empty or matches none of the
/// supported formats.
pub fn parse_when(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return Err(LatercastError::InvalidInput(
            "Schedule time cannot be empty".to_string(),
        ));
    }

    // "+2h" and "2h" mean the same thing
    let duration_input = input.strip_prefix('+').unwrap_or(input);
    if let Ok(duration) = parse_duration(duration_input) {
        return Ok(Utc::now() + duration);
    }

    if let Ok(dt) = parse_natural_language(input) {
        return Ok(dt);
    }

    Err(LatercastError::InvalidInput(format!(
        "Could not parse schedule time: {}",
        input
    )))
}

/// Parse a duration string into a chrono::Duration
fn parse_duration(input: &str) -> Result<Duration> {
    let std_duration = humantime::parse_duration(input).map_err(|_| {
        LatercastError::InvalidInput(format!("Could not parse duration: {}", input))
    })?;

    Duration::try_seconds(std_duration.as_secs() as i64)
        .ok_or_else(|| LatercastError::InvalidInput("Duration out of range".to_string()))
}

/// Parse natural language time expression
fn parse_natural_language(input: &str) -> Result<DateTime<Utc>> {
    chrono_english::parse_date_string(input, Utc::now(), chrono_english::Dialect::Us)
        .map_err(|e| LatercastError::InvalidInput(format!("Could not parse time: {}", e)))
}
