//! Record timestamps: Unix milliseconds in storage, UTC ISO-8601 on screen.

use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// `1719000000000` → `"2024-06-21T20:00:00Z"`. Sub-second digits are dropped.
pub fn unix_millis_to_iso8601(millis: u64) -> String {
    let secs = millis / 1000;
    let (year, month, day) = ymd_from_epoch_days(secs / 86_400);
    let rem = secs % 86_400;
    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}Z",
        rem / 3600,
        rem % 3600 / 60,
        rem % 60
    )
}

/// Gregorian date for a day count since 1970-01-01.
///
/// Counts in 400-year eras whose years start on March 1st, so the leap day
/// is always the last day of a year and month lengths repeat every five
/// months from March on.
fn ymd_from_epoch_days(days: u64) -> (u64, u64, u64) {
    // 0000-03-01 is 719468 days before the Unix epoch.
    let shifted = days + 719_468;
    let era = shifted / 146_097;
    let day_of_era = shifted % 146_097;
    let year_of_era =
        (day_of_era - day_of_era / 1_460 + day_of_era / 36_524 - day_of_era / 146_096) / 365;
    let day_of_year = day_of_era - (365 * year_of_era + year_of_era / 4 - year_of_era / 100);
    // 0 = March .. 11 = February
    let month_index = (5 * day_of_year + 2) / 153;
    let day = day_of_year - (153 * month_index + 2) / 5 + 1;
    let month = if month_index < 10 {
        month_index + 3
    } else {
        month_index - 9
    };
    let year = era * 400 + year_of_era + u64::from(month <= 2);
    (year, month, day)
}
