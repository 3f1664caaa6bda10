// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Duration parsing for Go-style duration strings.
//!
//! Configuration intervals and TTLs are written the way Go's
//! `time.ParseDuration` reads them: one or more `<number><unit>` terms, such as
//! `30s`, `5m` or `1h30m`. Days (`d`) are accepted as well.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Deserializer};
use std::fmt::Write as _;
use std::time::Duration;

const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 3600;
const SECONDS_PER_DAY: u64 = 86400;

/// Parse a Go-style duration string into a Rust `Duration`.
///
/// Supported units: `ms`, `s`, `m`, `h`, `d`. Terms may be combined and are
/// summed (`1h30m` is 90 minutes). The result must be non-zero.
///
/// # Examples
///
/// ```
/// use tailscale_bind_ddns::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
/// assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
/// assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
///
/// assert!(parse_duration("").is_err());
/// assert!(parse_duration("10").is_err());  // Missing unit
/// assert!(parse_duration("0s").is_err());  // Zero
/// ```
///
/// # Errors
///
/// Returns an error if:
/// - The string is empty or a term lacks a number or a unit
/// - A unit is not recognized
/// - The total overflows or is zero
pub fn parse_duration(duration_str: &str) -> Result<Duration> {
    let total = parse_terms(duration_str)?;
    if total.is_zero() {
        bail!("Duration '{}' must be greater than zero", duration_str.trim());
    }
    Ok(total)
}

/// Parse a configured duration: a Go-style string or a bare number of seconds.
///
/// Zero is allowed (`0`, `0s`); callers that need a positive interval check
/// that themselves.
///
/// ```
/// use tailscale_bind_ddns::duration::parse_setting;
/// use std::time::Duration;
///
/// assert_eq!(parse_setting("600").unwrap(), Duration::from_secs(600));
/// assert_eq!(parse_setting("0s").unwrap(), Duration::ZERO);
/// assert_eq!(parse_setting("5m").unwrap(), Duration::from_secs(300));
/// ```
///
/// # Errors
///
/// Returns an error for anything [`parse_duration`] rejects other than zero.
pub fn parse_setting(value: &str) -> Result<Duration> {
    let input = value.trim();
    if !input.is_empty() && input.bytes().all(|b| b.is_ascii_digit()) {
        let secs: u64 = input
            .parse()
            .with_context(|| format!("Duration value '{input}' is too large"))?;
        return Ok(Duration::from_secs(secs));
    }
    parse_terms(input)
}

fn parse_terms(duration_str: &str) -> Result<Duration> {
    let input = duration_str.trim();
    if input.is_empty() {
        bail!("Duration string cannot be empty");
    }

    let mut total = Duration::ZERO;
    let mut rest = input;

    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .with_context(|| format!("Duration '{input}' must end with a unit (ms, s, m, h, d)"))?;
        if digits_end == 0 {
            bail!("Duration '{input}' has a unit without a value");
        }

        let (value_str, tail) = rest.split_at(digits_end);
        let unit_end = tail
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_end);

        let value: u64 = value_str
            .parse()
            .with_context(|| format!("Duration value '{value_str}' is too large"))?;

        let term = match unit {
            "ms" => Some(Duration::from_millis(value)),
            "s" => Some(Duration::from_secs(value)),
            "m" => value.checked_mul(SECONDS_PER_MINUTE).map(Duration::from_secs),
            "h" => value.checked_mul(SECONDS_PER_HOUR).map(Duration::from_secs),
            "d" => value.checked_mul(SECONDS_PER_DAY).map(Duration::from_secs),
            _ => bail!(
                "Unsupported duration unit '{unit}' in '{input}'. Use ms, s, m, h or d"
            ),
        }
        .context("Duration value too large (overflow)")?;

        total = total
            .checked_add(term)
            .context("Duration value too large (overflow)")?;
        rest = next;
    }

    Ok(total)
}

/// Render a duration the way [`parse_duration`] reads it (e.g., `1h30m`).
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.subsec_millis();
    let mut secs = duration.as_secs();

    if secs == 0 {
        return format!("{millis}ms");
    }

    let mut out = String::new();
    for (unit, size) in [("h", SECONDS_PER_HOUR), ("m", SECONDS_PER_MINUTE)] {
        if secs >= size {
            let _ = write!(out, "{}{unit}", secs / size);
            secs %= size;
        }
    }
    if secs > 0 || out.is_empty() {
        let _ = write!(out, "{secs}s");
    }
    if millis > 0 {
        let _ = write!(out, "{millis}ms");
    }
    out
}

/// Deserialize an optional duration from a string (`"30s"`, `"30"`) or a bare
/// number of seconds (`30`). Zero passes through; see [`parse_setting`].
///
/// # Errors
///
/// Returns a deserialization error if the value cannot be parsed.
pub fn deserialize_optional<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Seconds(secs)) => Ok(Some(Duration::from_secs(secs))),
        Some(Raw::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(Raw::Text(text)) => parse_setting(&text)
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("{e:#}"))),
    }
}

#[cfg(test)]
#[path = "duration_tests.rs"]
mod duration_tests;
