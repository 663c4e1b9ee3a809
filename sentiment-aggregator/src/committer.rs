use crate::aggregator::SessionTotals;
use crate::types::{CommitReport, Instrument, Result, SentimentCounts, SentimentLabel};
use crate::utils::date_chunks;
use chrono::NaiveDate;
use interfaces::defs::columns;
use interfaces::{date_value, Assignment, FieldValue, Query, TabularStore, TradingSession};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error, info, warn};

fn counter_fields(counts: &SentimentCounts) -> Vec<Assignment> {
    SentimentLabel::ALL
        .iter()
        .map(|label| (label.column().to_string(), FieldValue::from(counts.get(*label))))
        .collect()
}

/// Zeroes and rewrites the three sentiment counters of existing session rows.
/// Never inserts a row and never touches any other column.
pub struct Committer<'a> {
    store: &'a dyn TabularStore,
}

impl<'a> Committer<'a> {
    pub fn new(store: &'a dyn TabularStore) -> Self {
        Self { store }
    }

    /// Dates of every session row in `[start, end]`, with or without a close.
    pub async fn session_dates_between(
        &self,
        instrument: &Instrument,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeSet<NaiveDate>> {
        let query = Query::table(instrument.stock_table())
            .columns(&[columns::DATE])
            .gte(columns::DATE, start)
            .lte(columns::DATE, end);
        let rows = self.store.select(&query).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get(columns::DATE).and_then(date_value))
            .collect())
    }

    /// Reset every target to zero, then write `totals` onto the targets that
    /// were reset. Failures are per date; the remaining dates still commit.
    pub async fn reset_then_write(
        &self,
        instrument: &Instrument,
        targets: &BTreeSet<NaiveDate>,
        totals: &SessionTotals,
    ) -> CommitReport {
        let table = instrument.stock_table();
        let mut report = CommitReport::default();
        let mut reset = BTreeSet::new();
        let zero = counter_fields(&SentimentCounts::default());

        for &date in targets {
            let query = Query::table(&table).eq(columns::DATE, date);
            match self.store.update(&query, &zero).await {
                Ok(rows) if rows.is_empty() => {
                    warn!("No session row for {} in {} - skipping", date, table);
                    report.missing.push(date);
                }
                Ok(_) => {
                    debug!("Reset {}: P=0, N=0, Neu=0", date);
                    report.reset += 1;
                    reset.insert(date);
                }
                Err(e) => {
                    error!("Error resetting {} in {}: {}", date, table, e);
                    report.failed.push(date);
                }
            }
        }

        info!("Reset sentiment for {}/{} sessions in {}", report.reset, targets.len(), table);

        for (date, counts) in totals {
            if !reset.contains(date) {
                if !targets.contains(date) {
                    warn!("Session {} was not targeted for reset - not writing {}", date, counts);
                }
                continue;
            }

            let query = Query::table(&table).eq(columns::DATE, *date);
            match self.store.update(&query, &counter_fields(counts)).await {
                Ok(rows) if rows.is_empty() => {
                    warn!("Session {} disappeared from {} before write", date, table);
                    report.missing.push(*date);
                }
                Ok(_) => {
                    info!("Updated {}: {}", date, counts);
                    report.written += 1;
                }
                Err(e) => {
                    error!("Error updating {} in {}: {}", date, table, e);
                    report.failed.push(*date);
                }
            }
        }

        info!("Sentiment update completed: {}/{} sessions written", report.written, totals.len());
        report
    }

    /// Replace NULL counters with 0. Returns how many column values changed.
    pub async fn ensure_counters_not_null(&self, instrument: &Instrument) -> Result<usize> {
        let table = instrument.stock_table();
        let mut changed = 0;
        for label in SentimentLabel::ALL {
            let query = Query::table(&table).is_null(label.column());
            let rows = self
                .store
                .update(&query, &[(label.column().to_string(), FieldValue::Int(0))])
                .await?;
            changed += rows.len();
        }
        if changed > 0 {
            info!("Set {} NULL sentiment counters to 0 in {}", changed, table);
        }
        Ok(changed)
    }

    /// Read the stored counters back; malformed values read as 0.
    pub async fn read_session_counts(
        &self,
        instrument: &Instrument,
        dates: &[NaiveDate],
        batch_size: usize,
    ) -> Result<BTreeMap<NaiveDate, SentimentCounts>> {
        let table = instrument.stock_table();
        let mut sessions = BTreeMap::new();
        for chunk in date_chunks(dates, batch_size) {
            let query = Query::table(&table)
                .columns(&[columns::DATE, columns::POSITIVE, columns::NEGATIVE, columns::NEUTRAL])
                .in_(columns::DATE, chunk.iter().copied());
            for row in self.store.select(&query).await? {
                if let Some(session) = TradingSession::from_row(&row) {
                    sessions.insert(session.date, session.counts);
                }
            }
        }
        Ok(sessions)
    }
}
