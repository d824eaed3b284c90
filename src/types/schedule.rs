// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Schedule expressions for recurring triggers.
//!
//! Two forms are accepted:
//!
//! - `rate(<value> <unit>)` where unit is `minute`/`hour`/`day`, singular when
//!   the value is 1 and plural otherwise
//! - `cron(<minutes> <hours> <day-of-month> <month> <day-of-week> <year>)`
//!
//! Cron expressions are evaluated with the `cron` crate. The six fields map onto
//! its seven-field form with a leading zero seconds field, and `?` reads as `*`.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;

/// Number of fields in a cron expression.
const CRON_FIELDS: usize = 6;

/// Unit of a `rate(...)` expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateUnit {
    /// Minutes.
    Minutes,
    /// Hours.
    Hours,
    /// Days.
    Days,
}

impl RateUnit {
    const fn seconds(self) -> u64 {
        match self {
            Self::Minutes => 60,
            Self::Hours => 3_600,
            Self::Days => 86_400,
        }
    }

    const fn name(self, plural: bool) -> &'static str {
        match (self, plural) {
            (Self::Minutes, false) => "minute",
            (Self::Minutes, true) => "minutes",
            (Self::Hours, false) => "hour",
            (Self::Hours, true) => "hours",
            (Self::Days, false) => "day",
            (Self::Days, true) => "days",
        }
    }
}

/// A parsed cron schedule, compared by its source fields.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    fields: String,
    schedule: Schedule,
}

impl CronSchedule {
    fn parse(fields: &[&str]) -> Result<Self, cron::error::Error> {
        let translated: Vec<&str> = fields
            .iter()
            .map(|&field| if field == "?" { "*" } else { field })
            .collect();
        let schedule = Schedule::from_str(&format!("0 {}", translated.join(" ")))?;
        Ok(Self {
            fields: fields.join(" "),
            schedule,
        })
    }

    /// Returns the six fields as written, separated by single spaces.
    #[must_use]
    pub fn fields(&self) -> &str {
        &self.fields
    }

    /// Returns the first firing strictly after `after`.
    #[must_use]
    pub fn next_after(&self, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(after).next()
    }
}

impl PartialEq for CronSchedule {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Eq for CronSchedule {}

impl Hash for CronSchedule {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fields.hash(state);
    }
}

/// How often a recurring trigger fires.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use mcsync::types::ScheduleExpression;
///
/// let every_five: ScheduleExpression = "rate(5 minutes)".parse().unwrap();
/// assert_eq!(every_five.interval(), Some(Duration::from_secs(300)));
///
/// let nightly: ScheduleExpression = "cron(0 2 * * ? *)".parse().unwrap();
/// assert_eq!(nightly.interval(), None);
///
/// assert!("rate(1 minutes)".parse::<ScheduleExpression>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ScheduleExpression {
    /// Fixed-rate schedule.
    Rate {
        /// Number of units between firings.
        value: u32,
        /// Unit of `value`.
        unit: RateUnit,
    },
    /// Cron schedule.
    Cron(CronSchedule),
}

impl ScheduleExpression {
    /// Creates a fixed-rate schedule.
    ///
    /// # Errors
    ///
    /// Returns `ScheduleError::InvalidExpression` if `value` is zero.
    pub fn rate(value: u32, unit: RateUnit) -> Result<Self, ScheduleError> {
        if value == 0 {
            return Err(ScheduleError::InvalidExpression {
                expression: format!("rate(0 {})", unit.name(true)),
                reason: "rate value must be at least 1".to_string(),
            });
        }
        Ok(Self::Rate { value, unit })
    }

    /// Returns the fixed interval between firings, if this is a rate schedule.
    #[must_use]
    pub fn interval(&self) -> Option<Duration> {
        match self {
            Self::Rate { value, unit } => {
                Some(Duration::from_secs(u64::from(*value) * unit.seconds()))
            }
            Self::Cron(_) => None,
        }
    }

    /// Returns the first firing strictly after `after`, or `None` once the
    /// schedule has no further firings.
    #[must_use]
    pub fn next_after(&self, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Rate { .. } => {
                let step = TimeDelta::from_std(self.interval()?).ok()?;
                after.checked_add_signed(step)
            }
            Self::Cron(schedule) => schedule.next_after(after),
        }
    }
}

impl fmt::Display for ScheduleExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rate { value, unit } => write!(f, "rate({value} {})", unit.name(*value != 1)),
            Self::Cron(schedule) => write!(f, "cron({})", schedule.fields()),
        }
    }
}

impl FromStr for ScheduleExpression {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ScheduleError::InvalidExpression {
            expression: s.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = s.trim();
        if let Some(body) = trimmed
            .strip_prefix("rate(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let parts: Vec<&str> = body.split_whitespace().collect();
            let [value, unit] = parts.as_slice() else {
                return Err(invalid("expected rate(<value> <unit>)"));
            };
            let value: u32 = value
                .parse()
                .map_err(|_| invalid("rate value must be a positive integer"))?;
            if value == 0 {
                return Err(invalid("rate value must be at least 1"));
            }
            let (unit, plural) = match *unit {
                "minute" => (RateUnit::Minutes, false),
                "minutes" => (RateUnit::Minutes, true),
                "hour" => (RateUnit::Hours, false),
                "hours" => (RateUnit::Hours, true),
                "day" => (RateUnit::Days, false),
                "days" => (RateUnit::Days, true),
                _ => return Err(invalid("unit must be minute(s), hour(s) or day(s)")),
            };
            if plural == (value == 1) {
                return Err(invalid("use the singular unit for 1 and the plural otherwise"));
            }
            return Ok(Self::Rate { value, unit });
        }

        if let Some(body) = trimmed
            .strip_prefix("cron(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let fields: Vec<&str> = body.split_whitespace().collect();
            if fields.len() != CRON_FIELDS {
                return Err(invalid("cron expressions have exactly six fields"));
            }
            return CronSchedule::parse(&fields)
                .map(Self::Cron)
                .map_err(|e| invalid(&e.to_string()));
        }

        Err(invalid("expected rate(...) or cron(...)"))
    }
}

impl TryFrom<String> for ScheduleExpression {
    type Error = ScheduleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ScheduleExpression> for String {
    fn from(expression: ScheduleExpression) -> Self {
        expression.to_string()
    }
}
