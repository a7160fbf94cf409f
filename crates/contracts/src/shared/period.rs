//! ISO-8601 period arithmetic used by cash register rollups.
//!
//! Weeks start on Monday and week 1 is the week holding the year's first
//! Thursday. Months are always the Gregorian month of the date itself, so a
//! week crossing a month boundary contributes to two monthly rollups.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// (ISO year, ISO week, calendar month) of a single date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IsoPeriod {
    pub iso_year: i32,
    pub iso_week: u32,
    pub month: u32,
}

pub fn iso_period_of(date: NaiveDate) -> IsoPeriod {
    let week = date.iso_week();
    IsoPeriod {
        iso_year: week.year(),
        iso_week: week.week(),
        month: date.month(),
    }
}

/// Monday of the ISO week containing `date`
pub fn monday_of(date: NaiveDate) -> NaiveDate {
    let offset = date.weekday().number_from_monday() as i64 - 1;
    date - Duration::days(offset)
}

/// Monday and Sunday of an ISO week. `None` for weeks the ISO year does not have.
pub fn week_bounds(iso_year: i32, iso_week: u32) -> Option<(NaiveDate, NaiveDate)> {
    let monday = NaiveDate::from_isoywd_opt(iso_year, iso_week, Weekday::Mon)?;
    Some((monday, monday + Duration::days(6)))
}

/// First and last day of a calendar month
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let last = NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()?;
    Some((first, last))
}

/// First and last day of a calendar year
pub fn year_bounds(year: i32) -> Option<(NaiveDate, NaiveDate)> {
    Some((
        NaiveDate::from_ymd_opt(year, 1, 1)?,
        NaiveDate::from_ymd_opt(year, 12, 31)?,
    ))
}

/// Calendar year of the days of an ISO week that fall in `month`.
///
/// Differs from `iso_year` only for weeks straddling New Year: the week of
/// 2024-12-30 is ISO 2025-W01, but its December days belong to 2024.
/// Returns `None` when no day of the week lies in `month`.
pub fn calendar_year_of(iso_year: i32, iso_week: u32, month: u32) -> Option<i32> {
    let (monday, _) = week_bounds(iso_year, iso_week)?;
    (0..7)
        .map(|offset| monday + Duration::days(offset))
        .find(|day| day.month() == month)
        .map(|day| day.year())
}
