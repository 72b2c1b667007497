//! Calendar-aware relative durations such as `2w` or `11m`.

use std::{fmt, str::FromStr, sync::LazyLock};

use chrono::{DateTime, Months, TimeDelta, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// `<integer><unit>`; the unit is validated separately so that anything
/// other than a single known letter is rejected.
static DURATION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]+)(.*)$").unwrap());

/// A span of calendar time, subtracted from instants month-aware.
///
/// Years and months are applied before weeks and days, and a day-of-month that
/// does not exist in the target month is clamped to that month's last day
/// (March 31st minus one month is February 28th or 29th).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelativeDuration {
    pub years: u32,
    pub months: u32,
    pub weeks: u32,
    pub days: u32,
}

impl RelativeDuration {
    pub const ZERO: Self = Self {
        years: 0,
        months: 0,
        weeks: 0,
        days: 0,
    };

    pub const fn days(days: u32) -> Self {
        Self { days, ..Self::ZERO }
    }

    pub const fn weeks(weeks: u32) -> Self {
        Self { weeks, ..Self::ZERO }
    }

    pub const fn months(months: u32) -> Self {
        Self { months, ..Self::ZERO }
    }

    pub const fn years(years: u32) -> Self {
        Self { years, ..Self::ZERO }
    }

    /// A zero duration disables down-sampling entirely.
    pub fn is_zero(&self) -> bool {
        self.years == 0 && self.months == 0 && self.weeks == 0 && self.days == 0
    }

    /// Step `instant` back by this duration.
    ///
    /// Returns `None` when the result is not representable.
    pub fn subtract_from(&self, instant: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let total_months = self.years.checked_mul(12)?.checked_add(self.months)?;
        let total_days = i64::from(self.weeks) * 7 + i64::from(self.days);

        instant
            .checked_sub_months(Months::new(total_months))?
            .checked_sub_signed(TimeDelta::try_days(total_days)?)
    }
}

impl fmt::Display for RelativeDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return f.write_str("0d");
        }
        for (value, unit) in [
            (self.years, 'y'),
            (self.months, 'm'),
            (self.weeks, 'w'),
            (self.days, 'd'),
        ] {
            if value > 0 {
                write!(f, "{}{}", value, unit)?;
            }
        }
        Ok(())
    }
}

/// Error returned when a string is not a valid duration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid duration \"{0}\": expected <integer><d|w|m|y>, e.g. \"30d\"")]
pub struct ParseDurationError(pub String);

impl FromStr for RelativeDuration {
    type Err = ParseDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_duration(Some(s)).ok_or_else(|| ParseDurationError(s.to_string()))
    }
}

impl TryFrom<String> for RelativeDuration {
    type Error = ParseDurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RelativeDuration> for String {
    fn from(duration: RelativeDuration) -> Self {
        duration.to_string()
    }
}

/// Parse a duration such as `30d`, `2w`, `11m` or `14y`.
///
/// Returns `None` for an absent value, a missing or spelled-out unit, trailing
/// characters, or a count that does not fit in `u32`. Never panics.
pub fn parse_duration(value: Option<&str>) -> Option<RelativeDuration> {
    let caps = DURATION_REGEX.captures(value?)?;
    let count: u32 = caps[1].parse().ok()?;

    match &caps[2] {
        "d" => Some(RelativeDuration::days(count)),
        "w" => Some(RelativeDuration::weeks(count)),
        "m" => Some(RelativeDuration::months(count)),
        "y" => Some(RelativeDuration::years(count)),
        _ => None,
    }
}
