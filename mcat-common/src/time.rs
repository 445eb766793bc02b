//! Timestamp utilities

use chrono::{DateTime, Datelike, NaiveDate, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// First day of the calendar month containing `at` (UTC)
///
/// Billing/usage cycles are calendar months; this is the cycle key.
pub fn month_start(at: DateTime<Utc>) -> NaiveDate {
    // Day 1 always exists for a valid year/month pair
    NaiveDate::from_ymd_opt(at.year(), at.month(), 1).unwrap_or_else(|| at.date_naive())
}
