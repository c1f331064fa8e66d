use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeDelta, Timelike, Utc};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Cron expression '{expression}' has {count} fields, expected 5 or 6")]
    InvalidFieldCount { expression: String, count: usize },

    #[error("Invalid {field} field: '{value}'")]
    InvalidField { field: &'static str, value: String },

    #[error("{field} value {value} out of range {min}-{max}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
}

/// Searching further than this many years ahead means the expression can
/// never fire (e.g. February 30th).
const SEARCH_HORIZON_YEARS: i32 = 5;

const MONTH_NAMES: &[&str] = &[
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const WEEKDAY_NAMES: &[&str] = &["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

#[derive(Debug, Clone, Copy)]
struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
    names_offset: u32,
}

const SECONDS: FieldSpec = FieldSpec { name: "seconds", min: 0, max: 59, names: &[], names_offset: 0 };
const MINUTES: FieldSpec = FieldSpec { name: "minutes", min: 0, max: 59, names: &[], names_offset: 0 };
const HOURS: FieldSpec = FieldSpec { name: "hours", min: 0, max: 23, names: &[], names_offset: 0 };
const DAYS_OF_MONTH: FieldSpec = FieldSpec { name: "day-of-month", min: 1, max: 31, names: &[], names_offset: 0 };
const MONTHS: FieldSpec = FieldSpec { name: "month", min: 1, max: 12, names: MONTH_NAMES, names_offset: 1 };
// 7 is accepted as an alias for Sunday and folded into bit 0 after parsing
const DAYS_OF_WEEK: FieldSpec = FieldSpec { name: "day-of-week", min: 0, max: 7, names: WEEKDAY_NAMES, names_offset: 0 };

/// Set of allowed values for one cron column, one bit per value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldSet {
    bits: u64,
    restricted: bool,
}

impl FieldSet {
    fn contains(&self, value: u32) -> bool {
        self.bits & (1u64 << value) != 0
    }
}

fn parse_value(field_def: &FieldSpec, raw: &str) -> Result<u32, ScheduleError> {
    let lowered = raw.to_ascii_lowercase();
    if let Some(pos) = field_def.names.iter().position(|name| *name == lowered) {
        return Ok(pos as u32 + field_def.names_offset);
    }

    let value: u32 = raw.parse().map_err(|_| ScheduleError::InvalidField {
        field: field_def.name,
        value: raw.to_string(),
    })?;

    if value < field_def.min || value > field_def.max {
        return Err(ScheduleError::OutOfRange {
            field: field_def.name,
            value,
            min: field_def.min,
            max: field_def.max,
        });
    }
    Ok(value)
}

fn parse_field(field_def: &FieldSpec, raw: &str) -> Result<FieldSet, ScheduleError> {
    let invalid = || ScheduleError::InvalidField {
        field: field_def.name,
        value: raw.to_string(),
    };

    let mut bits = 0u64;
    let mut restricted = false;

    for part in raw.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step.parse().map_err(|_| invalid())?;
                if step == 0 {
                    return Err(invalid());
                }
                (range, step)
            }
            None => (part, 1),
        };

        let (start, end) = if range == "*" || range == "?" {
            if step > 1 {
                restricted = true;
            }
            (field_def.min, field_def.max)
        } else if let Some((lo, hi)) = range.split_once('-') {
            restricted = true;
            (parse_value(field_def, lo)?, parse_value(field_def, hi)?)
        } else {
            restricted = true;
            let start = parse_value(field_def, range)?;
            // "5/15" means from 5 to the end of the range in steps of 15
            let end = if part.contains('/') { field_def.max } else { start };
            (start, end)
        };

        if start > end {
            return Err(invalid());
        }

        let mut value = start;
        while value <= end {
            bits |= 1u64 << value;
            match value.checked_add(step) {
                Some(next) => value = next,
                None => break,
            }
        }
    }

    Ok(FieldSet { bits, restricted })
}

/// A parsed cron expression able to compute upcoming fire times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    seconds: FieldSet,
    minutes: FieldSet,
    hours: FieldSet,
    days_of_month: FieldSet,
    months: FieldSet,
    days_of_week: FieldSet,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self, ScheduleError> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        let (seconds, rest) = match fields.len() {
            6 => (fields[0], &fields[1..]),
            5 => ("0", &fields[..]),
            count => {
                return Err(ScheduleError::InvalidFieldCount {
                    expression: expression.to_string(),
                    count,
                });
            }
        };

        let mut days_of_week = parse_field(&DAYS_OF_WEEK, rest[4])?;
        if days_of_week.contains(7) {
            days_of_week.bits = (days_of_week.bits & !(1 << 7)) | 1;
        }

        Ok(Self {
            expression: fields.join(" "),
            seconds: parse_field(&SECONDS, seconds)?,
            minutes: parse_field(&MINUTES, rest[0])?,
            hours: parse_field(&HOURS, rest[1])?,
            days_of_month: parse_field(&DAYS_OF_MONTH, rest[2])?,
            months: parse_field(&MONTHS, rest[3])?,
            days_of_week,
        })
    }

    /// The normalized expression this schedule was parsed from
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Day matching follows classic cron: when both day columns are
    /// restricted, either one matching is enough.
    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = self.days_of_month.contains(date.day());
        let dow = self
            .days_of_week
            .contains(date.weekday().num_days_from_sunday());

        match (self.days_of_month.restricted, self.days_of_week.restricted) {
            (true, true) => dom || dow,
            _ => dom && dow,
        }
    }

    /// First fire time strictly after `after`, or `None` if the expression
    /// can never match.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let horizon = after.year() + SEARCH_HORIZON_YEARS;
        let mut candidate: NaiveDateTime =
            after.naive_utc().with_nanosecond(0)? + TimeDelta::seconds(1);

        while candidate.year() <= horizon {
            let date = candidate.date();

            if !self.months.contains(date.month()) {
                let (year, month) = if date.month() == 12 {
                    (date.year() + 1, 1)
                } else {
                    (date.year(), date.month() + 1)
                };
                candidate = NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)?;
                continue;
            }

            if !self.day_matches(date) {
                candidate = date.succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }

            if !self.hours.contains(candidate.hour()) {
                candidate = date.and_hms_opt(candidate.hour(), 0, 0)? + TimeDelta::hours(1);
                continue;
            }

            if !self.minutes.contains(candidate.minute()) {
                candidate = date.and_hms_opt(candidate.hour(), candidate.minute(), 0)?
                    + TimeDelta::minutes(1);
                continue;
            }

            if !self.seconds.contains(candidate.second()) {
                candidate += TimeDelta::seconds(1);
                continue;
            }

            return Some(candidate.and_utc());
        }

        None
    }

    /// Up to `count` consecutive fire times strictly after `after`
    pub fn next_fire_times_after(&self, after: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        let mut times = Vec::with_capacity(count);
        let mut cursor = after;
        while times.len() < count {
            match self.next_after(cursor) {
                Some(next) => {
                    times.push(next);
                    cursor = next;
                }
                None => break,
            }
        }
        times
    }
}

impl FromStr for CronSchedule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}
