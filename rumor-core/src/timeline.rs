//! Timeline densifier
//!
//! Turns a sparse list of daily mention counts into a fixed-length series
//! for a trailing window ending on a reference day (inclusive). Index 0 is
//! the oldest day, the last index is the reference day.

use chrono::{Duration, NaiveDate};

use crate::{DailyMention, RumorError, MAX_TIMELINE_DAYS};

/// Densify `sparse` over the `days` calendar days ending on `today`.
///
/// Days missing from `sparse` are zero, dates outside the window are
/// ignored, and when a date repeats the last entry wins.
pub fn fill_timeline(
    sparse: &[DailyMention],
    days: i64,
    today: NaiveDate,
) -> Result<Vec<u32>, RumorError> {
    check_window(days, today)?;

    let len = days as usize;
    let mut series = vec![0u32; len];
    for mention in sparse {
        let age = (today - mention.date).num_days();
        if age < 0 || age >= days {
            continue;
        }
        series[len - 1 - age as usize] = mention.count;
    }
    Ok(series)
}

/// Calendar days covered by a window, oldest first
pub fn window_dates(days: i64, today: NaiveDate) -> Result<Vec<NaiveDate>, RumorError> {
    check_window(days, today)?;
    (0..days)
        .rev()
        .map(|age| day_before(today, age))
        .collect()
}

/// Windows must be `1..=MAX_TIMELINE_DAYS` days and start on a representable date
fn check_window(days: i64, today: NaiveDate) -> Result<(), RumorError> {
    if days <= 0 || days > MAX_TIMELINE_DAYS {
        return Err(RumorError::validation(format!(
            "timeline window must be between 1 and {} days, got {}",
            MAX_TIMELINE_DAYS, days
        )));
    }
    day_before(today, days - 1).map(|_| ())
}

fn day_before(today: NaiveDate, age: i64) -> Result<NaiveDate, RumorError> {
    today
        .checked_sub_signed(Duration::days(age))
        .ok_or_else(|| {
            RumorError::validation(format!("window start before {} is out of range", today))
        })
}
