use crate::error::{Error, Result};
use chrono::Datelike;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Calendar field compared against `next_call`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Month,
    Year,
}

impl Granularity {
    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::Day => "day",
            Granularity::Month => "month",
            Granularity::Year => "year",
        }
    }

    /// Value of this field in `now`: day of month, month 1-12, or the full year.
    pub fn field_of<T: Datelike>(self, now: &T) -> i64 {
        match self {
            Granularity::Day => i64::from(now.day()),
            Granularity::Month => i64::from(now.month()),
            Granularity::Year => i64::from(now.year()),
        }
    }

    /// Largest value the field can take, `None` for years.
    fn upper_bound(self) -> Option<i64> {
        match self {
            Granularity::Day => Some(31),
            Granularity::Month => Some(12),
            Granularity::Year => None,
        }
    }
}

impl FromStr for Granularity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(Granularity::Day),
            "month" => Ok(Granularity::Month),
            "year" => Ok(Granularity::Year),
            other => Err(Error::Configuration(format!(
                "invalid period {other:?}, expected one of: day, month, year"
            ))),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one scheduling check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub fire: bool,
    pub next_call: i64,
}

/// Recurring schedule keyed on a single calendar field.
///
/// `next_call` is a raw field value (e.g. day 22), not a date. The schedule
/// fires only while the current field equals it exactly; a check that misses
/// the matching day/month/year waits until the field cycles back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schedule {
    pub granularity: Granularity,
    pub interval: u32,
    pub next_call: i64,
}

impl Schedule {
    pub fn new(granularity: Granularity, interval: u32, next_call: i64) -> Result<Self> {
        if interval == 0 {
            return Err(Error::Configuration(
                "send interval must be a positive integer".to_string(),
            ));
        }
        Ok(Self {
            granularity,
            interval,
            next_call,
        })
    }

    /// Builds a schedule from the raw persisted strings.
    pub fn parse(send_every: &str, interval: &str, next_call: &str) -> Result<Self> {
        let granularity = send_every.parse::<Granularity>()?;
        let interval = interval.trim().parse::<u32>().map_err(|_| {
            Error::Configuration(format!("invalid send interval {interval:?}"))
        })?;
        let next_call = next_call.trim().parse::<i64>().map_err(|_| {
            Error::Configuration(format!("invalid next send value {next_call:?}"))
        })?;
        Self::new(granularity, interval, next_call)
    }

    /// Decides whether to fire at `now` without touching the schedule.
    ///
    /// The next value is the current field plus the interval, with no
    /// rollover: day 31 + 1 gives 32.
    pub fn evaluate<T: Datelike>(&self, now: &T) -> Decision {
        let current = self.granularity.field_of(now);
        if current == self.next_call {
            Decision {
                fire: true,
                next_call: current + i64::from(self.interval),
            }
        } else {
            Decision {
                fire: false,
                next_call: self.next_call,
            }
        }
    }

    /// Like [`evaluate`](Self::evaluate) but stores the advanced `next_call` on fire.
    pub fn should_fire_and_advance<T: Datelike>(&mut self, now: &T) -> Decision {
        let decision = self.evaluate(now);
        self.next_call = decision.next_call;
        decision
    }

    /// False when `next_call` lies outside the field's range and can never match.
    pub fn is_reachable(&self) -> bool {
        match self.granularity.upper_bound() {
            Some(max) => (1..=max).contains(&self.next_call),
            None => true,
        }
    }
}
