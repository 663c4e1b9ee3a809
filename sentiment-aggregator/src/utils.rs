use crate::types::{EngineError, Result};
use chrono::{Days, Duration, NaiveDate};

/// Parse an ISO `YYYY-MM-DD` date.
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|e| EngineError::InvalidDate(format!("{}: {}", raw, e)))
}

/// `date` minus `days`, or `InvalidDate` when that leaves chrono's range.
pub fn days_before(date: NaiveDate, days: u32) -> Result<NaiveDate> {
    date.checked_sub_days(Days::new(u64::from(days)))
        .ok_or_else(|| EngineError::InvalidDate(format!("{} days before {}", days, date)))
}

/// Every calendar date from `start` through `end`, inclusive.
pub fn days_inclusive(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    let len = (end - start).num_days().max(-1) + 1;
    (0..len).map(move |offset| start + Duration::days(offset))
}

/// Split an ordered date list into query-sized batches.
pub fn date_chunks<'a>(
    dates: &'a [NaiveDate],
    size: usize,
) -> impl Iterator<Item = &'a [NaiveDate]> {
    dates.chunks(size.max(1))
}

/// Compact `a, b, c (+n more)` rendering for log lines.
pub fn format_dates<'a>(dates: impl IntoIterator<Item = &'a NaiveDate>) -> String {
    let dates: Vec<&NaiveDate> = dates.into_iter().collect();
    let shown: Vec<String> = dates.iter().take(5).map(|d| d.to_string()).collect();
    if dates.len() > shown.len() {
        format!("{} (+{} more)", shown.join(", "), dates.len() - shown.len())
    } else {
        shown.join(", ")
    }
}

/// Hide the password part of a connection URL before logging it.
pub fn mask_database_url(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let rest = &url[scheme_end + 3..];
    let Some(at) = rest.find('@') else {
        return url.to_string();
    };
    match rest[..at].find(':') {
        Some(colon) => format!(
            "{}{}:***{}",
            &url[..scheme_end + 3],
            &rest[..colon],
            &rest[at..]
        ),
        None => url.to_string(),
    }
}
