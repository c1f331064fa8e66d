//! Human-readable duration parsing and formatting utilities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid duration format: {0}")]
    InvalidFormat(String),

    #[error("Invalid number: {0}")]
    InvalidNumber(#[from] std::num::ParseIntError),

    #[error("Invalid unit: {0}")]
    InvalidUnit(String),
}

const MILLIS_PER_SECOND: u64 = 1000;
const MILLIS_PER_MINUTE: u64 = 60 * MILLIS_PER_SECOND;
const MILLIS_PER_HOUR: u64 = 60 * MILLIS_PER_MINUTE;
const MILLIS_PER_DAY: u64 = 24 * MILLIS_PER_HOUR;
const MILLIS_PER_WEEK: u64 = 7 * MILLIS_PER_DAY;
const MILLIS_PER_MONTH: u64 = 30 * MILLIS_PER_DAY;
const MILLIS_PER_YEAR: u64 = 365 * MILLIS_PER_DAY;
/// Fraction digits beyond this cannot change a millisecond count
const MAX_FRACTION_DIGITS: usize = 12;

/// Duration wrapper with human-readable parsing ("7 days", "1 second", "2h 30m")
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HumanDuration(pub Duration);

impl HumanDuration {
    pub fn as_duration(&self) -> Duration {
        self.0
    }

    pub fn to_human_readable(&self) -> String {
        const UNITS: &[(&str, u64)] = &[
            ("day", MILLIS_PER_DAY),
            ("hour", MILLIS_PER_HOUR),
            ("minute", MILLIS_PER_MINUTE),
            ("second", MILLIS_PER_SECOND),
        ];

        let millis = self.0.as_millis() as u64;
        for &(unit, divisor) in UNITS {
            if millis >= divisor && millis % divisor == 0 {
                let value = millis / divisor;
                let plural = if value == 1 { "" } else { "s" };
                return format!("{} {}{}", value, unit, plural);
            }
        }

        format!("{}ms", millis)
    }
}

fn unit_millis(unit: &str) -> Result<u64, ParseError> {
    let millis = match unit {
        "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => 1,
        "s" | "sec" | "secs" | "second" | "seconds" => MILLIS_PER_SECOND,
        "m" | "min" | "mins" | "minute" | "minutes" => MILLIS_PER_MINUTE,
        "h" | "hr" | "hrs" | "hour" | "hours" => MILLIS_PER_HOUR,
        "d" | "day" | "days" => MILLIS_PER_DAY,
        "w" | "wk" | "wks" | "week" | "weeks" => MILLIS_PER_WEEK,
        "mo" | "mos" | "mth" | "mths" | "month" | "months" => MILLIS_PER_MONTH,
        "y" | "yr" | "yrs" | "year" | "years" => MILLIS_PER_YEAR,
        _ => return Err(ParseError::InvalidUnit(unit.to_string())),
    };
    Ok(millis)
}

/// `amount * multiplier` for a decimal amount such as "1.5", truncated to
/// whole milliseconds. `None` on overflow.
fn scaled_millis(amount: &str, multiplier: u64) -> Result<Option<u64>, ParseError> {
    let (whole, fraction) = amount.split_once('.').unwrap_or((amount, ""));
    let whole: u64 = whole.parse()?;
    let fraction = &fraction[..fraction.len().min(MAX_FRACTION_DIGITS)];
    let numerator: u128 = if fraction.is_empty() { 0 } else { fraction.parse()? };
    let denominator = 10u128.pow(fraction.len() as u32);

    let partial = u64::try_from(numerator * u128::from(multiplier) / denominator).ok();
    Ok(whole
        .checked_mul(multiplier)
        .zip(partial)
        .and_then(|(millis, partial)| millis.checked_add(partial)))
}

impl FromStr for HumanDuration {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if s.is_empty() {
            return Err(ParseError::InvalidFormat(s));
        }

        // A bare number is a count of seconds
        if let Ok(secs) = s.parse::<u64>() {
            return Ok(HumanDuration(Duration::from_secs(secs)));
        }

        let mut total_millis: u64 = 0;
        let mut rest = s.as_str();

        loop {
            rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ',');
            if rest.is_empty() {
                break;
            }

            let amount_end = rest
                .find(|c: char| !c.is_ascii_digit() && c != '.')
                .unwrap_or(rest.len());
            let amount = &rest[..amount_end];
            if amount.is_empty()
                || amount.starts_with('.')
                || amount.ends_with('.')
                || amount.matches('.').count() > 1
            {
                return Err(ParseError::InvalidFormat(s.clone()));
            }
            rest = rest[amount_end..].trim_start();

            let unit_end = rest
                .find(|c: char| !c.is_ascii_alphabetic())
                .unwrap_or(rest.len());
            if unit_end == 0 {
                return Err(ParseError::InvalidFormat(s.clone()));
            }
            let multiplier = unit_millis(&rest[..unit_end])?;
            rest = &rest[unit_end..];

            total_millis = scaled_millis(amount, multiplier)?
                .and_then(|millis| total_millis.checked_add(millis))
                .ok_or_else(|| ParseError::InvalidFormat(s.clone()))?;
        }

        Ok(HumanDuration(Duration::from_millis(total_millis)))
    }
}

impl<'de> Deserialize<'de> for HumanDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct HumanDurationVisitor;

        impl<'de> serde::de::Visitor<'de> for HumanDurationVisitor {
            type Value = HumanDuration;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a duration as string (e.g., \"7 days\", \"30s\") or seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(HumanDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(|secs| HumanDuration(Duration::from_secs(secs)))
                    .map_err(|_| E::custom(format!("duration must not be negative: {}", v)))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                v.parse::<HumanDuration>().map_err(serde::de::Error::custom)
            }
        }

        deserializer.deserialize_any(HumanDurationVisitor)
    }
}

impl Serialize for HumanDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_human_readable())
    }
}

impl From<Duration> for HumanDuration {
    fn from(value: Duration) -> Self {
        HumanDuration(value)
    }
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_human_readable())
    }
}
