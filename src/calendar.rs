//! Upload-status calendar derivation.
//!
//! Builds the month (or week) grid the dashboard renders: Monday-first,
//! leading/trailing padding cells carry no status, and each real day is
//! classified against the store's uploaded-date set. Cells are derived on
//! every call and never stored.

use std::collections::HashSet;

use chrono::{Datelike, Duration, NaiveDate};

use crate::types::{CalendarCell, DayStatus};

/// Status for one day. Precedence matters: an uploaded date wins even when
/// it lies in the future, so an early (or erroneous) upload still shows as
/// uploaded rather than future.
pub fn day_status(date: NaiveDate, uploaded: &HashSet<NaiveDate>, today: NaiveDate) -> DayStatus {
    if uploaded.contains(&date) {
        DayStatus::Uploaded
    } else if date > today {
        DayStatus::Future
    } else if date == today {
        DayStatus::TodayPending
    } else {
        DayStatus::Missing
    }
}

/// Month grid, Monday-first, padded to whole weeks with `None` cells.
///
/// An out-of-range month yields an empty grid.
pub fn derive_month(
    year: i32,
    month: u32,
    uploaded: &HashSet<NaiveDate>,
    today: NaiveDate,
) -> Vec<Option<CalendarCell>> {
    let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
        return Vec::new();
    };

    let lead = first.weekday().num_days_from_monday() as usize;
    let days = days_in_month(first);

    let mut cells: Vec<Option<CalendarCell>> = Vec::with_capacity(lead + days as usize + 6);
    cells.resize(lead, None);

    for day in 1..=days {
        // Every day of a valid month is a valid date.
        let date = NaiveDate::from_ymd_opt(year, month, day).expect("day within month");
        cells.push(Some(CalendarCell {
            date,
            status: day_status(date, uploaded, today),
        }));
    }

    while cells.len() % 7 != 0 {
        cells.push(None);
    }
    cells
}

/// The Monday-to-Sunday week containing `anchor`.
pub fn derive_week(
    anchor: NaiveDate,
    uploaded: &HashSet<NaiveDate>,
    today: NaiveDate,
) -> Vec<CalendarCell> {
    let monday = anchor - Duration::days(anchor.weekday().num_days_from_monday() as i64);
    (0..7)
        .map(|offset| {
            let date = monday + Duration::days(offset);
            CalendarCell {
                date,
                status: day_status(date, uploaded, today),
            }
        })
        .collect()
}

fn days_in_month(first: NaiveDate) -> u32 {
    let (next_year, next_month) = if first.month() == 12 {
        (first.year() + 1, 1)
    } else {
        (first.year(), first.month() + 1)
    };
    let next_first = NaiveDate::from_ymd_opt(next_year, next_month, 1).expect("first of month");
    (next_first - first).num_days() as u32
}
