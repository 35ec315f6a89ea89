//! Serde helper for duration settings such as `timeout: 5s` or `timeout: 250ms`.
//!
//! Bare numbers are read as seconds, so `timeout: 5` and `timeout: "5s"` are equivalent.

use serde::{self, Deserialize, Deserializer};
use std::time::Duration;

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Seconds(f64),
    Text(String),
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawDuration>::deserialize(deserializer)? {
        Some(RawDuration::Seconds(secs)) => Duration::try_from_secs_f64(secs)
            .map_err(|e| serde::de::Error::custom(format!("invalid duration {}: {}", secs, e))),
        Some(RawDuration::Text(s)) => parse_duration(&s).map_err(serde::de::Error::custom),
        None => Ok(Duration::ZERO),
    }
}

pub(crate) fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(Duration::ZERO);
    }

    let split = s
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(s.len());
    let (value, unit) = s.split_at(split);

    let value: f64 = value
        .parse()
        .map_err(|_| format!("invalid duration number: {}", value))?;

    let seconds = match unit.trim() {
        "ms" => value / 1_000.0,
        "s" | "" => value,
        "m" => value * 60.0,
        "h" => value * 3_600.0,
        other => return Err(format!("unknown duration unit: {}", other)),
    };

    Duration::try_from_secs_f64(seconds).map_err(|e| format!("invalid duration {}: {}", s, e))
}
