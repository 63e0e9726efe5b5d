//! Acquisition time from Sentinel-2 product identifiers.

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;

// e.g. 20190503T105031_20190503T105347_T31UFU
static PRODUCT_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|_)(\d{8}T\d{6})(?:_|$)").expect("Failed to compile product id regex")
});

/// Extracts the sensing time from a `system:index` such as
/// `20190503T105031_20190503T105347_T31UFU`.
///
/// The first `YYYYMMDDTHHMMSS` token is the datatake sensing start and is read as UTC.
pub fn timestamp_from_product_id(id: &str) -> Option<DateTime<Utc>> {
    let token = PRODUCT_ID_RE.captures(id)?.get(1)?.as_str();
    NaiveDateTime::parse_from_str(token, "%Y%m%dT%H%M%S")
        .ok()
        .map(|naive| naive.and_utc())
}
