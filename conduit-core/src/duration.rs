//! Duration parsing
//!
//! Accepts the duration syntax of Go's `time.ParseDuration`: a sequence of
//! decimal numbers, each with an optional fraction and a mandatory unit,
//! such as `500ms`, `1.5s` or `1h30m`. Valid units are `ns`, `us` (or `µs`),
//! `ms`, `s`, `m` and `h`. A bare `0` is accepted without a unit.
//! Negative durations are rejected since a delay cannot run backwards;
//! a negative zero such as `-0s` is still zero and is accepted.

use std::time::Duration;
use thiserror::Error;

/// Errors returned by [`parse_duration`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseDurationError {
    #[error("invalid duration \"{0}\"")]
    Invalid(String),

    #[error("missing unit in duration \"{0}\"")]
    MissingUnit(String),

    #[error("unknown unit \"{unit}\" in duration \"{input}\"")]
    UnknownUnit { unit: String, input: String },

    #[error("negative duration \"{0}\" is not allowed")]
    Negative(String),

    #[error("duration \"{0}\" is out of range")]
    Overflow(String),
}

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SECOND: u128 = 1_000_000_000;

// Go stores durations as i64 nanoseconds.
const MAX_NANOS: u128 = i64::MAX as u128;

// Digits beyond this in a fraction are below nanosecond precision.
const MAX_FRACTION_DIGITS: usize = 18;

/// Parse a Go-style duration string
pub fn parse_duration(input: &str) -> Result<Duration, ParseDurationError> {
    let (negative, mut rest) = if let Some(stripped) = input.strip_prefix('-') {
        (true, stripped)
    } else {
        (false, input.strip_prefix('+').unwrap_or(input))
    };

    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(ParseDurationError::Invalid(input.to_string()));
    }

    let mut total: u128 = 0;

    while !rest.is_empty() {
        let (whole, after) = split_digits(rest);
        let (fraction, after) = match after.strip_prefix('.') {
            Some(after_dot) => split_digits(after_dot),
            None => ("", after),
        };

        if whole.is_empty() && fraction.is_empty() {
            return Err(ParseDurationError::Invalid(input.to_string()));
        }

        let unit_len = after
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after.len());
        let (unit, after) = after.split_at(unit_len);

        let scale = match unit {
            "" => return Err(ParseDurationError::MissingUnit(input.to_string())),
            "ns" => 1,
            "us" | "µs" | "μs" => NANOS_PER_MICRO,
            "ms" => NANOS_PER_MILLI,
            "s" => NANOS_PER_SECOND,
            "m" => 60 * NANOS_PER_SECOND,
            "h" => 3600 * NANOS_PER_SECOND,
            other => {
                return Err(ParseDurationError::UnknownUnit {
                    unit: other.to_string(),
                    input: input.to_string(),
                });
            }
        };

        let overflow = || ParseDurationError::Overflow(input.to_string());

        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| overflow())?
        };
        let mut nanos = whole.checked_mul(scale).ok_or_else(overflow)?;

        if !fraction.is_empty() {
            let mut numerator: u128 = 0;
            let mut denominator: u128 = 1;
            for digit in fraction.bytes().take(MAX_FRACTION_DIGITS) {
                numerator = numerator * 10 + u128::from(digit - b'0');
                denominator *= 10;
            }
            nanos = nanos
                .checked_add(numerator * scale / denominator)
                .ok_or_else(overflow)?;
        }

        total = total.checked_add(nanos).ok_or_else(overflow)?;
        if total > MAX_NANOS {
            return Err(overflow());
        }

        rest = after;
    }

    if negative && total > 0 {
        return Err(ParseDurationError::Negative(input.to_string()));
    }

    Ok(Duration::from_nanos(total as u64))
}

fn split_digits(s: &str) -> (&str, &str) {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s.split_at(end)
}
