use crate::aggregator::{AggregationPlan, Aggregator};
use crate::calendar::CalendarProvider;
use crate::committer::Committer;
use crate::counter::{outside_spans, plan_session_spans, SentimentCounter};
use crate::resolver::resolve_affected_sessions;
use crate::strategy::StrategySelector;
use crate::types::{
    BatchReport, EngineConfig, EngineError, Instrument, InstrumentStatus, NewsCollection,
    Result, RunReport, SentimentCounts, Strategy, UpdateScope,
};
use crate::utils::{days_before, format_dates};
use chrono::{Duration, NaiveDate, Utc};
use interfaces::TabularStore;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Drives calendar lookup, resolution, counting, aggregation and commit for
/// one instrument at a time.
///
/// Two runs over the same instrument must not overlap: the reset and the
/// write of a session are separate store calls. Callers serialise them.
pub struct SentimentEngine {
    store: Arc<dyn TabularStore>,
    config: EngineConfig,
}

impl SentimentEngine {
    pub fn new(store: Arc<dyn TabularStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Recount only the sessions touched by newly ingested news dates.
    /// Returns the number of sessions written; failures are logged and count as 0.
    pub async fn incremental_update(
        &self,
        instrument: &Instrument,
        newly_ingested_news_dates: &BTreeSet<NaiveDate>,
    ) -> usize {
        if newly_ingested_news_dates.is_empty() {
            info!("No updated dates for {}", instrument);
            return 0;
        }

        let scope = UpdateScope::Incremental(newly_ingested_news_dates.clone());
        match self.run(instrument, &scope).await {
            Ok(report) => report.commit.written,
            Err(EngineError::CalendarEmpty { table }) => {
                info!("No trading days found in {} - nothing to update", table);
                0
            }
            Err(e) => {
                error!("Incremental update failed for {}: {}", instrument, e);
                0
            }
        }
    }

    /// Recompute the trailing `window_days` ending today (UTC).
    pub async fn full_window_reconciliation(
        &self,
        instrument: &Instrument,
        window_days: u32,
    ) -> bool {
        let today = Utc::now().date_naive();
        self.full_window_reconciliation_as_of(instrument, window_days, today)
            .await
    }

    /// Recompute the trailing `window_days` ending at `as_of`.
    pub async fn full_window_reconciliation_as_of(
        &self,
        instrument: &Instrument,
        window_days: u32,
        as_of: NaiveDate,
    ) -> bool {
        let scope = UpdateScope::FullWindow {
            days: window_days,
            as_of,
        };
        match self.run(instrument, &scope).await {
            Ok(report) => report.commit.failed.is_empty(),
            Err(e) => {
                error!("Error processing {}: {}", instrument, e);
                false
            }
        }
    }

    /// Run one instrument through the whole chain for the given scope.
    pub async fn run(&self, instrument: &Instrument, scope: &UpdateScope) -> Result<RunReport> {
        self.config.validate()?;
        let store = self.store.as_ref();

        let calendar = CalendarProvider::new(store).get_trading_days(instrument).await?;
        if calendar.is_empty() {
            return Err(EngineError::CalendarEmpty {
                table: instrument.stock_table(),
            });
        }

        let strategy = StrategySelector::new(store, self.config.low_activity_threshold)
            .select(instrument)
            .await;
        let collection = NewsCollection::from(instrument);
        let counter = SentimentCounter::new(store, &self.config);
        let committer = Committer::new(store);

        match scope {
            UpdateScope::Incremental(news_dates) => {
                info!(
                    "Incremental sentiment update for {}: {} news dates",
                    instrument,
                    news_dates.len()
                );

                let mut resolution = resolve_affected_sessions(news_dates, &calendar, strategy);
                if resolution.sessions.is_empty() {
                    info!("No affected trading days for {}", instrument);
                    return Ok(RunReport {
                        instrument: instrument.clone(),
                        strategy,
                        affected_sessions: 0,
                        unreachable: resolution.unreachable,
                        incomplete: Vec::new(),
                        commit: Default::default(),
                    });
                }

                let spans = plan_session_spans(
                    &resolution.sessions,
                    &calendar,
                    strategy,
                    self.config.fallback_lookback_days,
                )?;
                for date in outside_spans(&resolution.sessions, &spans) {
                    warn!("News date {} falls outside its session's span - dropped", date);
                    resolution.unreachable.push(date);
                }
                resolution.unreachable.sort_unstable();

                let counted = counter.count_for_sessions(&collection, &spans, strategy).await;

                let plan = AggregationPlan::Incremental {
                    sessions: resolution.sessions.clone(),
                    spans,
                };
                let totals = Aggregator::new(strategy).aggregate(&plan, &counted.by_date);

                // A session whose sentiment was only partly readable keeps its old counts.
                let targets: BTreeSet<NaiveDate> = resolution
                    .sessions
                    .keys()
                    .filter(|session| !counted.incomplete_sessions.contains(session))
                    .copied()
                    .collect();
                if !counted.incomplete_sessions.is_empty() {
                    warn!(
                        "Leaving {} sessions of {} untouched after failed reads: {}",
                        counted.incomplete_sessions.len(),
                        instrument,
                        format_dates(&counted.incomplete_sessions)
                    );
                }

                let commit = committer.reset_then_write(instrument, &targets, &totals).await;

                info!(
                    "Completed {} for {}: {} affected, {} reset, {} written",
                    strategy,
                    instrument,
                    resolution.sessions.len(),
                    commit.reset,
                    commit.written
                );

                Ok(RunReport {
                    instrument: instrument.clone(),
                    strategy,
                    affected_sessions: resolution.sessions.len(),
                    unreachable: resolution.unreachable,
                    incomplete: counted.incomplete_sessions.into_iter().collect(),
                    commit,
                })
            }
            UpdateScope::FullWindow { days, as_of } => {
                let (start, end) = (days_before(*as_of, *days)?, *as_of);
                info!("Reset & aggregate sentiment for {} from {} to {}", instrument, start, end);

                let sessions = calendar.within(start, end).to_vec();
                if sessions.is_empty() {
                    return Err(EngineError::CalendarEmpty {
                        table: format!("{} ({} to {})", instrument.stock_table(), start, end),
                    });
                }

                // Roll-forward spans match the incremental ones: the first in-window
                // session owns everything since the session before it, and news
                // after the last in-window session only stays when that session
                // is the latest one known.
                let (query_start, query_end) = match strategy {
                    Strategy::Daily => (start, end),
                    Strategy::RollForward => {
                        let first = sessions[0];
                        let last = sessions[sessions.len() - 1];
                        let query_start = match calendar.previous_before(first) {
                            Some(prev) => prev + Duration::days(1),
                            None => {
                                start.max(days_before(first, self.config.fallback_lookback_days)?)
                            }
                        };
                        let query_end = if calendar.latest() == Some(last) { end } else { last };
                        (query_start, query_end)
                    }
                };

                let by_date = counter
                    .count_range(&collection, query_start, Some(query_end))
                    .await?;
                info!("Found sentiment for {} days for {}", by_date.len(), instrument);

                let targets = committer.session_dates_between(instrument, start, end).await?;

                let plan = AggregationPlan::FullWindow {
                    sessions,
                    start,
                    end,
                };
                let totals = Aggregator::new(strategy).aggregate(&plan, &by_date);
                let commit = committer.reset_then_write(instrument, &targets, &totals).await;

                info!(
                    "Completed! Updated {}/{} sessions for {}",
                    commit.written,
                    totals.len(),
                    instrument
                );

                Ok(RunReport {
                    instrument: instrument.clone(),
                    strategy,
                    affected_sessions: targets.len(),
                    unreachable: Vec::new(),
                    incomplete: Vec::new(),
                    commit,
                })
            }
        }
    }

    /// Incremental updates for several instruments. Instruments without new
    /// dates are skipped; one failure never stops the rest.
    pub async fn incremental_batch(
        &self,
        updates: &BTreeMap<Instrument, BTreeSet<NaiveDate>>,
    ) -> BatchReport {
        let mut report = BatchReport::default();

        for (instrument, dates) in updates {
            if dates.is_empty() {
                info!("Skipping {} - no new predictions", instrument);
                report.skipped.push(instrument.clone());
                continue;
            }

            report.processed += 1;
            if let Err(e) = self.ensure_counters_not_null(instrument).await {
                warn!("Could not normalise counters for {}: {}", instrument, e);
            }

            let scope = UpdateScope::Incremental(dates.clone());
            match self.run(instrument, &scope).await {
                Ok(run) => {
                    report.sessions_updated += run.commit.written;
                    if run.commit.failed.is_empty() {
                        report.succeeded.push(instrument.clone());
                    } else {
                        report.failed.push(instrument.clone());
                    }
                }
                Err(EngineError::CalendarEmpty { table }) => {
                    info!("No trading days found in {} - nothing to update", table);
                    report.succeeded.push(instrument.clone());
                }
                Err(e) => {
                    error!("Error optimized processing {}: {}", instrument, e);
                    report.failed.push(instrument.clone());
                }
            }
        }

        log_batch_summary("Incremental", &report);
        report
    }

    /// Full-window reconciliation for several instruments, anchored at
    /// `as_of` (today when `None`).
    pub async fn reconciliation_batch(
        &self,
        instruments: &[Instrument],
        window_days: u32,
        as_of: Option<NaiveDate>,
    ) -> BatchReport {
        let as_of = as_of.unwrap_or_else(|| Utc::now().date_naive());
        let mut report = BatchReport::default();

        for instrument in instruments {
            report.processed += 1;
            let scope = UpdateScope::FullWindow {
                days: window_days,
                as_of,
            };
            match self.run(instrument, &scope).await {
                Ok(run) if run.commit.failed.is_empty() => {
                    report.sessions_updated += run.commit.written;
                    report.succeeded.push(instrument.clone());
                }
                Ok(run) => {
                    report.sessions_updated += run.commit.written;
                    report.failed.push(instrument.clone());
                }
                Err(e) => {
                    error!("Error 30-day aggregation {}: {}", instrument, e);
                    report.failed.push(instrument.clone());
                }
            }
        }

        log_batch_summary("Reconciliation", &report);
        report
    }

    pub async fn ensure_counters_not_null(&self, instrument: &Instrument) -> Result<usize> {
        Committer::new(self.store.as_ref())
            .ensure_counters_not_null(instrument)
            .await
    }

    pub async fn read_session_counts(
        &self,
        instrument: &Instrument,
        dates: &[NaiveDate],
    ) -> Result<BTreeMap<NaiveDate, SentimentCounts>> {
        Committer::new(self.store.as_ref())
            .read_session_counts(instrument, dates, self.config.daily_batch_size)
            .await
    }

    /// Calendar extent, news volume and the strategy a run would pick.
    pub async fn instrument_status(&self, instrument: &Instrument) -> Result<InstrumentStatus> {
        let store = self.store.as_ref();
        let calendar = CalendarProvider::new(store).get_trading_days(instrument).await?;
        let selector = StrategySelector::new(store, self.config.low_activity_threshold);

        let news_total = match selector.news_total(instrument).await {
            Ok(total) => Some(total),
            Err(e) => {
                warn!("Could not count news for {}: {}", instrument, e);
                None
            }
        };
        let strategy = news_total
            .map(|total| crate::strategy::classify(total, self.config.low_activity_threshold))
            .unwrap_or(Strategy::RollForward);

        Ok(InstrumentStatus {
            instrument: instrument.clone(),
            trading_days: calendar.len(),
            first_trading_day: calendar.earliest(),
            last_trading_day: calendar.latest(),
            news_total,
            strategy,
        })
    }
}

fn log_batch_summary(kind: &str, report: &BatchReport) {
    info!(
        "{} completed: {}/{} instruments processed successfully, {} skipped, {} sessions updated",
        kind,
        report.succeeded.len(),
        report.processed,
        report.skipped.len(),
        report.sessions_updated
    );
    if !report.failed.is_empty() {
        let failed: Vec<&str> = report.failed.iter().map(|i| i.code()).collect();
        warn!("{} failed for: {}", kind, failed.join(", "));
    }
}
