use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum TimeError {
    #[error("Invalid calendar date {year:04}-{month:02}-{day:02}")]
    InvalidDate { year: i32, month: u32, day: u32 },

    #[error("Could not parse date '{0}', expected YYYY-MM-DD")]
    Parse(String),

    #[error("Date range is empty: end {end} is not after start {start}")]
    EmptyRange { start: NaiveDate, end: NaiveDate },

    #[error("Advancing {start} by {months} months leaves the supported calendar")]
    OutOfRange { start: NaiveDate, months: u32 },
}
