//! Calendar window enumeration for recurring-weekday analysis.

use chrono::{Datelike, Duration, NaiveDate, Weekday};

use crate::error::AttendanceError;

/// Parse a weekday name ("thursday", "thu", ...). Unknown names are a
/// caller error, never silently defaulted.
pub fn parse_weekday(name: &str) -> Result<Weekday, AttendanceError> {
    name.parse::<Weekday>().map_err(|_| {
        AttendanceError::InvalidArgument(format!("unknown weekday name '{name}'"))
    })
}

/// First and last day of a month. Rejects invalid year/month pairs.
pub fn month_bounds(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate), AttendanceError> {
    let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
        AttendanceError::InvalidArgument(format!("invalid month {year}-{month:02}"))
    })?;
    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or_else(|| AttendanceError::InvalidArgument(format!("invalid month {year}-{month:02}")))?;
    Ok((first, next_month - Duration::days(1)))
}

/// Every date in the month falling on `weekday`, ascending.
///
/// Deliberately a day-by-day scan (at most 31 steps) instead of a stride
/// calculation: month lengths and leap years come from the calendar's own
/// arithmetic rather than hand-rolled day counts.
pub fn enumerate_weekday_dates(
    year: i32,
    month: u32,
    weekday: Weekday,
) -> Result<Vec<NaiveDate>, AttendanceError> {
    let (first, last) = month_bounds(year, month)?;
    let mut dates = Vec::new();
    let mut day = first;
    while day <= last {
        if day.weekday() == weekday {
            dates.push(day);
        }
        day += Duration::days(1);
    }
    Ok(dates)
}
