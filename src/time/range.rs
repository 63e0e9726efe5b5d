use super::error::TimeError;
use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Advances `date` by `months` calendar months.
///
/// The day of month is kept when it exists in the target month and clamped to the
/// last day otherwise (`2019-01-31` + 1 month is `2019-02-28`).
/// Returns `None` when the result leaves chrono's supported range.
pub fn advance_months(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    date.checked_add_months(Months::new(months))
}

/// A half-open interval of calendar days, `[start, end)`, evaluated at midnight UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "DateRangeFields", into = "DateRangeFields")]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

#[derive(Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct DateRangeFields {
    start: NaiveDate,
    end: NaiveDate,
}

impl TryFrom<DateRangeFields> for DateRange {
    type Error = TimeError;

    fn try_from(fields: DateRangeFields) -> Result<Self, Self::Error> {
        Self::new(fields.start, fields.end)
    }
}

impl From<DateRange> for DateRangeFields {
    fn from(range: DateRange) -> Self {
        Self {
            start: range.start,
            end: range.end,
        }
    }
}

impl DateRange {
    /// # Errors
    ///
    /// Returns [`TimeError::EmptyRange`] unless `end > start`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, TimeError> {
        if end <= start {
            return Err(TimeError::EmptyRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Builds `[start, start + months)` from a `(year, month, day)` triple.
    ///
    /// `months` must be at least 1; zero would produce an empty interval.
    ///
    /// ```rust
    /// # use s2_composite::DateRange;
    /// let range = DateRange::from_ymd_plus_months(2019, 5, 1, 5).unwrap();
    /// assert_eq!(range.to_string(), "2019-05-01..2019-10-01");
    /// ```
    pub fn from_ymd_plus_months(
        year: i32,
        month: u32,
        day: u32,
        months: u32,
    ) -> Result<Self, TimeError> {
        let start = NaiveDate::from_ymd_opt(year, month, day)
            .ok_or(TimeError::InvalidDate { year, month, day })?;
        Self::starting_at(start, months)
    }

    pub fn starting_at(start: NaiveDate, months: u32) -> Result<Self, TimeError> {
        let end = advance_months(start, months).ok_or(TimeError::OutOfRange { start, months })?;
        Self::new(start, end)
    }

    /// Parses two `YYYY-MM-DD` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self, TimeError> {
        Self::new(parse_date(start)?, parse_date(end)?)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn start_millis(&self) -> i64 {
        midnight_millis(self.start)
    }

    pub fn end_millis(&self) -> i64 {
        midnight_millis(self.end)
    }

    /// Whether a `system:time_start` style millisecond timestamp falls inside the range.
    pub fn contains_millis(&self, millis: i64) -> bool {
        millis >= self.start_millis() && millis < self.end_millis()
    }

    pub fn contains(&self, datetime: DateTime<Utc>) -> bool {
        self.contains_millis(datetime.timestamp_millis())
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}..{}",
            self.start.format(DATE_FORMAT),
            self.end.format(DATE_FORMAT)
        )
    }
}

pub(crate) fn parse_date(s: &str) -> Result<NaiveDate, TimeError> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).map_err(|_| TimeError::Parse(s.to_string()))
}

fn midnight_millis(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp_millis())
        .unwrap_or_default()
}
