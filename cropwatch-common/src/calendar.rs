//! Agricultural calendar utilities
//!
//! Phenology repeats by calendar date, not by elapsed days, so historical
//! seasons are aligned by projecting dates forward in whole years. The
//! season-year cutover rule groups dates into agricultural seasons: with a
//! cutover month of 8, 2023-09-10 and 2024-02-01 both belong to season 2023.

use chrono::{Datelike, Days, NaiveDate};

/// Default month boundary for the season-year cutover rule.
pub const DEFAULT_SEASON_CUTOVER_MONTH: u32 = 8;

/// Agricultural season year for a date, given the cutover month.
///
/// A date with `month >= cutover_month` belongs to the season starting that
/// calendar year; earlier months belong to the previous season.
pub fn season_year(date: NaiveDate, cutover_month: u32) -> i32 {
    if date.month() >= cutover_month {
        date.year()
    } else {
        date.year() - 1
    }
}

/// Project a date forward by a whole number of years, preserving month and
/// day-of-month. Feb 29 maps to Feb 28 when the target year is not a leap
/// year.
pub fn project_years(date: NaiveDate, year_offset: i32) -> NaiveDate {
    let target_year = date.year() + year_offset;
    NaiveDate::from_ymd_opt(target_year, date.month(), date.day())
        .or_else(|| NaiveDate::from_ymd_opt(target_year, date.month(), 28))
        .unwrap_or(date)
}

/// Days from `from` to `to` (negative when `to` precedes `from`).
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

/// Add a signed number of days to a date.
pub fn shift_days(date: NaiveDate, days: i64) -> NaiveDate {
    if days >= 0 {
        date.checked_add_days(Days::new(days as u64)).unwrap_or(date)
    } else {
        date.checked_sub_days(Days::new((-days) as u64)).unwrap_or(date)
    }
}
