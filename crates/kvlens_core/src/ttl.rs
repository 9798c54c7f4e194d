//! Human TTL expressions (`10s`, `1h`, `1d`, `-1s`) and remaining-time rendering.

use crate::error::TtlParseError;
use crate::key_value::Expiry;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 60 * SECONDS_PER_MINUTE;
const SECONDS_PER_DAY: u64 = 24 * SECONDS_PER_HOUR;
/// Keeps `now + ttl`, counted in milliseconds, inside a signed 64-bit range.
const MAX_TTL_SECONDS: u64 = i64::MAX as u64 / 1000 / 2;

/// Parsed outcome of a TTL expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlDirective {
    /// Empty expression: keep whatever TTL the key has.
    Unchanged,
    /// The key never expires.
    NoExpiry,
    /// Zero or negative expression.
    ExpireNow,
    Expire(Duration),
}

impl TtlDirective {
    /// On create there is no previous TTL to keep, so `Unchanged` means no expiry.
    pub fn for_create(self) -> Self {
        match self {
            TtlDirective::Unchanged => TtlDirective::NoExpiry,
            other => other,
        }
    }

    /// Expiry to hand to the store, if any.
    pub fn resolve(self, policy: NegativeTtlPolicy) -> Option<Expiry> {
        match self {
            TtlDirective::Unchanged | TtlDirective::NoExpiry => None,
            TtlDirective::Expire(duration) => Some(Expiry::After(duration)),
            TtlDirective::ExpireNow => match policy {
                NegativeTtlPolicy::NoExpiry => None,
                NegativeTtlPolicy::ExpireImmediately => Some(Expiry::Immediately),
            },
        }
    }
}

/// What the store does with an `ExpireNow` directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegativeTtlPolicy {
    /// Treat `-1s` like an empty TTL: the key is written without expiry.
    #[default]
    NoExpiry,
    /// Give the key a zero TTL; it is gone on the next read.
    ExpireImmediately,
}

/// Parses `[-|+]<digits>[s|m|h|d]`. Digits without a unit are seconds.
pub fn parse_ttl(expr: &str) -> Result<TtlDirective, TtlParseError> {
    let trimmed = expr.trim();
    if trimmed.is_empty() {
        return Ok(TtlDirective::Unchanged);
    }

    let invalid = || TtlParseError::InvalidFormat(expr.to_string());

    let (negative, unsigned) = match trimmed.as_bytes()[0] {
        b'-' => (true, &trimmed[1..]),
        b'+' => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let digits_end = unsigned
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(unsigned.len());
    let (digits, suffix) = unsigned.split_at(digits_end);

    if digits.is_empty() {
        return Err(invalid());
    }

    let multiplier = match suffix.to_ascii_lowercase().as_str() {
        "" | "s" => 1,
        "m" => SECONDS_PER_MINUTE,
        "h" => SECONDS_PER_HOUR,
        "d" => SECONDS_PER_DAY,
        _ => return Err(invalid()),
    };

    let amount = digits.parse::<u64>().map_err(|_| invalid())?;

    if negative || amount == 0 {
        return Ok(TtlDirective::ExpireNow);
    }

    let seconds = amount
        .checked_mul(multiplier)
        .filter(|seconds| *seconds <= MAX_TTL_SECONDS)
        .ok_or_else(invalid)?;
    Ok(TtlDirective::Expire(Duration::from_secs(seconds)))
}

/// Renders a remaining TTL, e.g. `1h2m3s`, or `no expiry`.
pub fn format_remaining(ttl: Option<Duration>) -> String {
    let Some(ttl) = ttl else {
        return "no expiry".to_string();
    };

    let total = ttl.as_secs();
    if total == 0 {
        return if ttl.is_zero() { "0s" } else { "<1s" }.to_string();
    }

    let parts = [
        (total / SECONDS_PER_DAY, 'd'),
        ((total % SECONDS_PER_DAY) / SECONDS_PER_HOUR, 'h'),
        ((total % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE, 'm'),
        (total % SECONDS_PER_MINUTE, 's'),
    ];

    parts
        .iter()
        .filter(|(amount, _)| *amount > 0)
        .map(|(amount, unit)| format!("{}{}", amount, unit))
        .collect()
}
