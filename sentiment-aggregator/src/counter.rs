use crate::calendar::TradingCalendar;
use crate::resolver::AffectedSessionMap;
use crate::types::{EngineConfig, NewsCollection, Result, SentimentCounts, Strategy};
use crate::utils::{date_chunks, days_before, days_inclusive, format_dates};
use chrono::{Duration, NaiveDate};
use interfaces::defs::columns;
use interfaces::{NewsRecord, Query, Row, TabularStore};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error, info};

/// Labeled-article tallies keyed by raw news date.
pub type DateCounts = BTreeMap<NaiveDate, SentimentCounts>;

/// Raw news dates whose sentiment belongs to one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSpan {
    pub session: NaiveDate,
    pub start: NaiveDate,
    /// `None` leaves the span open towards the future (latest known session).
    pub end: Option<NaiveDate>,
}

impl SessionSpan {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && self.end.map_or(true, |end| date <= end)
    }
}

/// Work out which raw dates each affected session must be recounted from.
///
/// Daily sessions cover only their own date. Roll-forward sessions cover the
/// day after the previous session through the session itself (or a fixed
/// lookback when there is no previous session); the latest session also
/// absorbs everything dated after it.
pub fn plan_session_spans(
    sessions: &AffectedSessionMap,
    calendar: &TradingCalendar,
    strategy: Strategy,
    fallback_lookback_days: u32,
) -> Result<Vec<SessionSpan>> {
    sessions
        .keys()
        .map(|&session| match strategy {
            Strategy::Daily => Ok(SessionSpan {
                session,
                start: session,
                end: Some(session),
            }),
            Strategy::RollForward => {
                let start = match calendar.previous_before(session) {
                    Some(prev) => prev + Duration::days(1),
                    None => days_before(session, fallback_lookback_days)?,
                };
                let end = if calendar.latest() == Some(session) {
                    None
                } else {
                    Some(session)
                };
                Ok(SessionSpan { session, start, end })
            }
        })
        .collect()
}

/// Raw dates mapped onto a session whose span does not reach them. Their
/// sentiment is never counted.
pub fn outside_spans(sessions: &AffectedSessionMap, spans: &[SessionSpan]) -> Vec<NaiveDate> {
    let mut dropped: Vec<NaiveDate> = spans
        .iter()
        .filter_map(|span| sessions.get(&span.session).map(|raw| (span, raw)))
        .flat_map(|(span, raw)| raw.iter().copied().filter(move |date| !span.contains(*date)))
        .collect();
    dropped.sort_unstable();
    dropped.dedup();
    dropped
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountOutcome {
    pub by_date: DateCounts,
    /// Dates that sat in a batch the store failed to answer.
    pub failed_dates: BTreeSet<NaiveDate>,
    /// Sessions whose span could not be read in full.
    pub incomplete_sessions: BTreeSet<NaiveDate>,
}

/// Counts labeled news per raw date in batched store queries.
pub struct SentimentCounter<'a> {
    store: &'a dyn TabularStore,
    daily_batch_size: usize,
    range_batch_size: usize,
}

impl<'a> SentimentCounter<'a> {
    pub fn new(store: &'a dyn TabularStore, config: &EngineConfig) -> Self {
        Self {
            store,
            daily_batch_size: config.daily_batch_size,
            range_batch_size: config.range_batch_size,
        }
    }

    fn labeled_news(table: &str) -> Query {
        Query::table(table)
            .columns(&[columns::DATE, columns::SENTIMENT])
            .not_null(columns::SENTIMENT)
            .neq(columns::SENTIMENT, "")
    }

    /// Tally the given dates, `batch_size` dates per query. A failing batch is
    /// logged and reported in `failed_dates`; the rest still count.
    pub async fn count_dates(
        &self,
        collection: &NewsCollection,
        dates: &[NaiveDate],
        batch_size: usize,
    ) -> CountOutcome {
        let table = collection.table_name();
        let mut outcome = CountOutcome::default();

        for chunk in date_chunks(dates, batch_size) {
            // One date is an equality lookup, several a membership lookup.
            let query = match chunk {
                [single] => Self::labeled_news(&table).eq(columns::DATE, *single),
                many => Self::labeled_news(&table).in_(columns::DATE, many.iter().copied()),
            };

            match self.store.select(&query).await {
                Ok(rows) => {
                    debug!(
                        "Found {} sentiment records in chunk of {} dates",
                        rows.len(),
                        chunk.len()
                    );
                    tally(&rows, &mut outcome.by_date);
                }
                Err(e) => {
                    error!("Error querying {} for {}: {}", table, format_dates(chunk), e);
                    outcome.failed_dates.extend(chunk.iter().copied());
                }
            }
        }

        outcome
    }

    /// Tally every labeled article dated in `[start, end]` (open-ended when
    /// `end` is `None`) with one range query.
    pub async fn count_range(
        &self,
        collection: &NewsCollection,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Result<DateCounts> {
        let table = collection.table_name();
        let mut query = Self::labeled_news(&table).gte(columns::DATE, start);
        if let Some(end) = end {
            query = query.lte(columns::DATE, end);
        }

        let rows = self.store.select(&query).await?;
        let mut by_date = DateCounts::new();
        tally(&rows, &mut by_date);
        debug!("Found sentiment for {} days in {} from {}", by_date.len(), table, start);
        Ok(by_date)
    }

    /// Tally everything the given spans cover. Bounded spans are expanded to
    /// dates and batched; open spans use a range query each.
    pub async fn count_for_sessions(
        &self,
        collection: &NewsCollection,
        spans: &[SessionSpan],
        strategy: Strategy,
    ) -> CountOutcome {
        let batch_size = match strategy {
            Strategy::Daily => self.daily_batch_size,
            Strategy::RollForward => self.range_batch_size,
        };

        let bounded: BTreeSet<NaiveDate> = spans
            .iter()
            .filter_map(|span| span.end.map(|end| days_inclusive(span.start, end)))
            .flatten()
            .collect();
        let bounded: Vec<NaiveDate> = bounded.into_iter().collect();

        info!(
            "Checking {} sentiment for {} dates across {} sessions",
            collection.table_name(),
            bounded.len(),
            spans.len()
        );

        let mut outcome = self.count_dates(collection, &bounded, batch_size).await;

        for span in spans {
            match span.end {
                Some(_) => {
                    if outcome.failed_dates.iter().any(|d| span.contains(*d)) {
                        outcome.incomplete_sessions.insert(span.session);
                    }
                }
                None => match self.count_range(collection, span.start, None).await {
                    Ok(by_date) => {
                        for (date, counts) in by_date {
                            outcome.by_date.entry(date).or_insert(counts);
                        }
                    }
                    Err(e) => {
                        error!(
                            "Error querying {} from {} for session {}: {}",
                            collection.table_name(),
                            span.start,
                            span.session,
                            e
                        );
                        outcome.incomplete_sessions.insert(span.session);
                    }
                },
            }
        }

        outcome
    }
}

fn tally(rows: &[Row], by_date: &mut DateCounts) {
    for row in rows {
        let Some(record) = NewsRecord::from_row(row) else {
            debug!("Skipping news row without a usable date");
            continue;
        };
        if let Some(label) = record.sentiment {
            by_date.entry(record.date).or_default().record(label);
        }
    }
}
