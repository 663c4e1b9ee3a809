use crate::aggregator::SessionTotals;
use crate::counter::{DateCounts, SessionSpan};
use crate::types::SentimentCounts;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Accumulates off-session sentiment until the next session closes the bucket.
#[derive(Debug, Default)]
pub struct RollForwardBucket {
    pending: SentimentCounts,
    totals: SessionTotals,
}

impl RollForwardBucket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, counts: SentimentCounts) {
        self.pending += counts;
    }

    /// Move everything pending onto `session` and start a fresh bucket.
    pub fn flush_into(&mut self, session: NaiveDate) {
        if self.pending.is_zero() {
            return;
        }
        let pending = std::mem::take(&mut self.pending);
        debug!("Trading day {}: {}", session, pending);
        *self.totals.entry(session).or_default() += pending;
    }

    /// Close the sweep. Whatever is still pending lands on `latest`.
    pub fn finish(mut self, latest: Option<NaiveDate>) -> SessionTotals {
        if !self.pending.is_zero() {
            match latest {
                Some(latest) => {
                    debug!("Adding tail sentiment {} to last trading day {}", self.pending, latest);
                    self.flush_into(latest);
                }
                None => warn!("Dropping {} with no trading day to carry it", self.pending),
            }
        }
        self.totals
    }
}

/// Walk sentiment dates and sessions in date order, flushing the bucket on
/// every session. `sessions` must be ascending.
pub fn sweep(by_date: &DateCounts, sessions: &[NaiveDate]) -> SessionTotals {
    let session_set: BTreeSet<NaiveDate> = sessions.iter().copied().collect();
    let timeline: BTreeSet<NaiveDate> =
        by_date.keys().copied().chain(sessions.iter().copied()).collect();

    let mut bucket = RollForwardBucket::new();
    for date in timeline {
        if let Some(counts) = by_date.get(&date) {
            bucket.add(*counts);
        }
        if session_set.contains(&date) {
            bucket.flush_into(date);
        }
    }
    bucket.finish(sessions.last().copied())
}

/// Sum each span directly, without walking the whole calendar.
pub fn sum_spans(spans: &[SessionSpan], by_date: &DateCounts) -> SessionTotals {
    let mut totals = SessionTotals::new();
    for span in spans {
        let total: SentimentCounts = match span.end {
            Some(end) if end < span.start => SentimentCounts::default(),
            Some(end) => by_date.range(span.start..=end).map(|(_, c)| *c).sum(),
            None => by_date.range(span.start..).map(|(_, c)| *c).sum(),
        };
        if !total.is_zero() {
            totals.insert(span.session, total);
        }
    }
    totals
}
