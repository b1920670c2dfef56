use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::{
    error::{AppError, AppResult},
    models::TimeWindow,
};

/// The three mutually exclusive ways to pick a harvest window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowSelector {
    Day(NaiveDate),
    TrailingDays(u32),
    Range { from: NaiveDate, to: NaiveDate },
}

impl Default for WindowSelector {
    fn default() -> Self {
        WindowSelector::TrailingDays(1)
    }
}

/// Parse a `YYYY-MM-DD` date
pub fn parse_date(raw: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|e| AppError::Validation(format!("invalid date '{raw}' (expected YYYY-MM-DD): {e}")))
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    start_of_day(date) + Duration::days(1) - Duration::seconds(1)
}

/// Turn a selector into a concrete inclusive UTC window
pub fn resolve_window(selector: WindowSelector, now: DateTime<Utc>) -> AppResult<TimeWindow> {
    match selector {
        WindowSelector::Day(date) => Ok(TimeWindow {
            start: start_of_day(date),
            end: end_of_day(date),
        }),
        WindowSelector::TrailingDays(0) => {
            Err(AppError::Validation("--days must be at least 1".to_string()))
        }
        WindowSelector::TrailingDays(days) => {
            let start = Duration::try_days(i64::from(days))
                .and_then(|span| now.checked_sub_signed(span))
                .ok_or_else(|| AppError::Validation(format!("--days {days} reaches past the earliest date")))?;
            Ok(TimeWindow { start, end: now })
        }
        WindowSelector::Range { from, to } => {
            if from > to {
                return Err(AppError::Validation(format!(
                    "--from {from} is after --to {to}"
                )));
            }
            Ok(TimeWindow {
                start: start_of_day(from),
                end: end_of_day(to),
            })
        }
    }
}
