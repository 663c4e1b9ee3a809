use crate::aggregator::SessionTotals;
use crate::counter::DateCounts;
use crate::resolver::AffectedSessionMap;
use crate::types::SentimentCounts;
use chrono::NaiveDate;
use std::collections::BTreeSet;

/// Sum each session's contributing raw dates. Duplicate raw dates under one
/// session are counted once.
pub fn group_by_session(sessions: &AffectedSessionMap, by_date: &DateCounts) -> SessionTotals {
    let mut totals = SessionTotals::new();
    for (session, raw_dates) in sessions {
        let unique: BTreeSet<&NaiveDate> = raw_dates.iter().collect();
        let total: SentimentCounts = unique.into_iter().filter_map(|d| by_date.get(d)).sum();
        if !total.is_zero() {
            totals.insert(*session, total);
        }
    }
    totals
}

/// Each counted date inside `[start, end]` becomes its own session key.
pub fn passthrough(by_date: &DateCounts, start: NaiveDate, end: NaiveDate) -> SessionTotals {
    if end < start {
        return SessionTotals::new();
    }
    let identity: AffectedSessionMap = by_date
        .range(start..=end)
        .map(|(date, _)| (*date, vec![*date]))
        .collect();
    group_by_session(&identity, by_date)
}
