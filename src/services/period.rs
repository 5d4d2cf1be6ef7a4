//! Calendar-aware period arithmetic for offer items.
//!
//! HOURS/DAYS are exact durations; MONTHS/YEARS are calendar increments that
//! preserve day-of-month and clamp to the end of the target month (there is
//! no `relativedelta` in this stack — this hand-implements the same rule
//! over `chrono::NaiveDate`).

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};

use crate::models::PeriodUnit;

/// Computes `expires_at` for a grant starting at `from`, or `None` for
/// `PeriodUnit::Forever`.
pub fn compute_expiry(
    from: DateTime<Utc>,
    unit: PeriodUnit,
    value: Option<i32>,
) -> Option<DateTime<Utc>> {
    let value = match unit {
        PeriodUnit::Forever => return None,
        _ => value.unwrap_or(0) as i64,
    };

    match unit {
        PeriodUnit::Hours => Some(from + chrono::Duration::hours(value)),
        PeriodUnit::Days => Some(from + chrono::Duration::days(value)),
        PeriodUnit::Months => Some(add_months(from, value)),
        PeriodUnit::Years => Some(add_months(from, value * 12)),
        PeriodUnit::Forever => unreachable!(),
    }
}

/// Adds `months` to `from`, preserving day-of-month and clamping to the end
/// of the resulting month (e.g. Jan 31 + 1 month = Feb 28/29).
fn add_months(from: DateTime<Utc>, months: i64) -> DateTime<Utc> {
    let date = from.date_naive();
    let total_months = date.year() as i64 * 12 + (date.month() as i64 - 1) + months;
    let target_year = total_months.div_euclid(12) as i32;
    let target_month = (total_months.rem_euclid(12)) as u32 + 1;

    let last_day = days_in_month(target_year, target_month);
    let target_day = date.day().min(last_day);

    let target_date = NaiveDate::from_ymd_opt(target_year, target_month, target_day)
        .expect("clamped day is always valid for its month");

    Utc.from_utc_datetime(&target_date.and_time(from.time()))
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let next_month_first = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .expect("valid next-month anchor");
    let this_month_first =
        NaiveDate::from_ymd_opt(year, month, 1).expect("valid this-month anchor");
    (next_month_first - this_month_first).num_days() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn month_add_clamps_to_month_end() {
        let jan31 = Utc.with_ymd_and_hms(2024, 1, 31, 12, 0, 0).unwrap();
        let result = compute_expiry(jan31, PeriodUnit::Months, Some(1)).unwrap();
        assert_eq!(result.date_naive(), NaiveDate::from_ymd_opt(2024, 2, 29, ).unwrap());
    }

    #[test]
    fn month_add_clamps_to_month_end_non_leap_year() {
        let jan31 = Utc.with_ymd_and_hms(2023, 1, 31, 12, 0, 0).unwrap();
        let result = compute_expiry(jan31, PeriodUnit::Months, Some(1)).unwrap();
        assert_eq!(result.date_naive(), NaiveDate::from_ymd_opt(2023, 2, 28).unwrap());
    }

    #[test]
    fn year_add_preserves_day_of_month() {
        let start = Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap();
        let result = compute_expiry(start, PeriodUnit::Years, Some(1)).unwrap();
        assert_eq!(result.date_naive(), NaiveDate::from_ymd_opt(2025, 3, 15).unwrap());
    }

    #[test]
    fn hours_and_days_are_exact_durations() {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        assert_eq!(
            compute_expiry(start, PeriodUnit::Hours, Some(30)).unwrap(),
            start + chrono::Duration::hours(30)
        );
        assert_eq!(
            compute_expiry(start, PeriodUnit::Days, Some(30)).unwrap(),
            start + chrono::Duration::days(30)
        );
    }

    #[test]
    fn forever_has_no_expiry() {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        assert_eq!(compute_expiry(start, PeriodUnit::Forever, None), None);
    }
}
