use crate::aggregators::{daily, roll_forward};
use crate::counter::{DateCounts, SessionSpan};
use crate::resolver::AffectedSessionMap;
use crate::types::{SentimentCounts, Strategy};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::info;

/// Final per-session tallies, ready to commit.
pub type SessionTotals = BTreeMap<NaiveDate, SentimentCounts>;

/// What an aggregation pass covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregationPlan {
    /// Only the affected sessions, each summed over its own span.
    Incremental {
        sessions: AffectedSessionMap,
        spans: Vec<SessionSpan>,
    },
    /// All of `[start, end]`. `sessions` are the in-window trading days, ascending.
    FullWindow {
        sessions: Vec<NaiveDate>,
        start: NaiveDate,
        end: NaiveDate,
    },
}

/// One aggregation entry point for both run scopes, so the incremental and
/// full-window paths share their arithmetic.
pub struct Aggregator {
    strategy: Strategy,
}

impl Aggregator {
    pub fn new(strategy: Strategy) -> Self {
        Self { strategy }
    }

    pub fn aggregate(&self, plan: &AggregationPlan, by_date: &DateCounts) -> SessionTotals {
        let totals = match (self.strategy, plan) {
            (Strategy::Daily, AggregationPlan::Incremental { sessions, .. }) => {
                daily::group_by_session(sessions, by_date)
            }
            (Strategy::Daily, AggregationPlan::FullWindow { start, end, .. }) => {
                daily::passthrough(by_date, *start, *end)
            }
            (Strategy::RollForward, AggregationPlan::Incremental { spans, .. }) => {
                roll_forward::sum_spans(spans, by_date)
            }
            (Strategy::RollForward, AggregationPlan::FullWindow { sessions, .. }) => {
                roll_forward::sweep(by_date, sessions)
            }
        };

        info!(
            "{} aggregation produced totals for {} sessions",
            self.strategy,
            totals.len()
        );
        totals
    }
}
