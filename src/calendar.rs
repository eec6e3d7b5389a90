//! Jalali (Solar Hijri) to Gregorian conversion and site date parsing.
//!
//! The source site renders publish dates as Jalali wall-clock strings like
//! `دوشنبه ۱ فروردین ۱۴۰۲ - ۱۰:۳۰` (optional weekday, day, month name, year,
//! optional ` - HH:MM`). Timestamps only become comparable across the store
//! once converted to absolute UTC instants, so conversion happens before
//! ingestion, not at read time.
//!
//! The arithmetic uses the 33-year cycle. No I/O, no store access; the only
//! failure modes are the ones named in [`CalendarError`].

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CalendarError {
    /// Month or day falls outside the Jalali calendar's valid range, or the
    /// wall-clock tuple does not exist in the target zone.
    #[error("invalid Jalali date: {year}-{month}-{day} {hour:02}:{minute:02}")]
    InvalidDate {
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
    },

    /// The month name is not in the configured 12-entry locale table.
    #[error("unknown month name: {0}")]
    UnknownMonthName(String),

    /// The raw date string does not have the expected token structure.
    #[error("unexpected date format: {0}")]
    MalformedDate(String),
}

/// Days in the given Jalali month. Months 1-6 have 31 days, 7-11 have 30,
/// and month 12 has 29 or 30 depending on the leap cycle.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1..=6 => 31,
        7..=11 => 30,
        12 if is_leap_year(year) => 30,
        _ => 29,
    }
}

/// Whether the Jalali year has 366 days.
pub fn is_leap_year(year: i32) -> bool {
    day_number(year + 1, 1, 1) - day_number(year, 1, 1) == 366
}

// Linear day count for a Jalali date, consistent across the 33-year leap
// cycle. Only differences and the Gregorian split below give it meaning.
fn day_number(year: i32, month: u32, day: u32) -> i64 {
    let jy = i64::from(year) + 1595;
    let month_offset = if month < 7 {
        i64::from(month - 1) * 31
    } else {
        i64::from(month - 7) * 30 + 186
    };
    -355668 + 365 * jy + (jy / 33) * 8 + ((jy % 33) + 3) / 4 + i64::from(day) + month_offset
}

/// Convert a valid Jalali date to the Gregorian (year, month, day).
fn jalali_to_gregorian(year: i32, month: u32, day: u32) -> (i32, u32, u32) {
    let mut days = day_number(year, month, day);

    let mut gy = 400 * (days / 146097);
    days %= 146097;
    if days > 36524 {
        days -= 1;
        gy += 100 * (days / 36524);
        days %= 36524;
        if days >= 365 {
            days += 1;
        }
    }
    gy += 4 * (days / 1461);
    days %= 1461;
    if days > 365 {
        gy += (days - 1) / 365;
        days = (days - 1) % 365;
    }

    let gy = gy as i32;
    let feb = if (gy % 4 == 0 && gy % 100 != 0) || gy % 400 == 0 {
        29
    } else {
        28
    };
    let month_lengths = [31u32, feb, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

    let mut gd = (days + 1) as u32;
    let mut gm = 1u32;
    for len in month_lengths {
        if gd <= len {
            break;
        }
        gd -= len;
        gm += 1;
    }
    (gy, gm, gd)
}

/// Convert a Jalali wall-clock tuple in the named zone to an absolute UTC
/// timestamp.
///
/// The zone offset applied is the zone's offset *at the converted date*, not
/// at fetch time; for zones that have dropped DST this is simply the standard
/// offset.
pub fn convert(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    tz: Tz,
) -> Result<DateTime<Utc>, CalendarError> {
    let invalid = || CalendarError::InvalidDate {
        year,
        month,
        day,
        hour,
        minute,
    };

    if !(1..=12).contains(&month) {
        return Err(invalid());
    }
    if day < 1 || day > days_in_month(year, month) {
        return Err(invalid());
    }

    let (gy, gm, gd) = jalali_to_gregorian(year, month, day);
    let naive = NaiveDate::from_ymd_opt(gy, gm, gd)
        .and_then(|d| d.and_hms_opt(hour, minute, 0))
        .ok_or_else(invalid)?;

    match tz.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        // DST fall-back repeats an hour; take the first occurrence.
        chrono::LocalResult::Ambiguous(dt, _) => Ok(dt.with_timezone(&Utc)),
        // Spring-forward gap: the wall-clock time never happened.
        chrono::LocalResult::None => Err(invalid()),
    }
}

/// Fold Persian (U+06F0..U+06F9) and Arabic-Indic (U+0660..U+0669) digits to
/// ASCII so the numeric parses below work on either script.
pub fn fold_digits(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '۰'..='۹' => char::from(b'0' + (c as u32 - '۰' as u32) as u8),
            '٠'..='٩' => char::from(b'0' + (c as u32 - '٠' as u32) as u8),
            _ => c,
        })
        .collect()
}

/// Parse a raw site date string into an absolute timestamp.
///
/// Accepted shapes, after trimming:
/// - `<weekday> <day> <month-name> <year> - HH:MM`
/// - `<day> <month-name> <year> - HH:MM`
/// - either of the above without the ` - HH:MM` suffix (midnight assumed)
pub fn parse_site_date(
    raw: &str,
    month_names: &HashMap<String, u32>,
    tz: Tz,
) -> Result<DateTime<Utc>, CalendarError> {
    let raw = raw.trim();
    let mut parts = raw.splitn(2, " - ");
    let date_part = parts
        .next()
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| CalendarError::MalformedDate(raw.to_string()))?
        .trim();
    let time_part = parts.next().map(str::trim).unwrap_or("00:00");

    let tokens: Vec<&str> = date_part.split_whitespace().collect();
    let (day_str, month_name, year_str) = match tokens.as_slice() {
        // Leading token is the weekday name; the site includes it on article
        // pages but not everywhere.
        [_, day, month, year] => (*day, *month, *year),
        [day, month, year] => (*day, *month, *year),
        _ => return Err(CalendarError::MalformedDate(raw.to_string())),
    };

    let month = *month_names
        .get(month_name)
        .ok_or_else(|| CalendarError::UnknownMonthName(month_name.to_string()))?;

    let day: u32 = fold_digits(day_str)
        .parse()
        .map_err(|_| CalendarError::MalformedDate(raw.to_string()))?;
    let year: i32 = fold_digits(year_str)
        .parse()
        .map_err(|_| CalendarError::MalformedDate(raw.to_string()))?;

    let (hour_str, minute_str) = time_part
        .split_once(':')
        .ok_or_else(|| CalendarError::MalformedDate(raw.to_string()))?;
    let hour: u32 = fold_digits(hour_str)
        .trim()
        .parse()
        .map_err(|_| CalendarError::MalformedDate(raw.to_string()))?;
    let minute: u32 = fold_digits(minute_str)
        .trim()
        .parse()
        .map_err(|_| CalendarError::MalformedDate(raw.to_string()))?;

    convert(year, month, day, hour, minute, tz)
}
