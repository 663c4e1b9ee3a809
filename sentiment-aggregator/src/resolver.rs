use crate::calendar::TradingCalendar;
use crate::types::{EngineError, Strategy};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Session date -> raw news dates that feed it. In daily mode a key may be a
/// "virtual" session with no backing row.
pub type AffectedSessionMap = BTreeMap<NaiveDate, Vec<NaiveDate>>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub sessions: AffectedSessionMap,
    pub unreachable: Vec<NaiveDate>,
}

/// Map newly dated news onto the sessions they influence.
pub fn resolve_affected_sessions(
    news_dates: &BTreeSet<NaiveDate>,
    calendar: &TradingCalendar,
    strategy: Strategy,
) -> Resolution {
    let mut resolution = Resolution::default();
    if news_dates.is_empty() {
        return resolution;
    }

    info!("Finding affected trading days for {} news dates", news_dates.len());

    for &news_date in news_dates {
        let target = match strategy {
            Strategy::Daily => {
                if !calendar.is_trading_day(news_date) {
                    debug!("Virtual trading day: {}", news_date);
                }
                Some(news_date)
            }
            Strategy::RollForward => roll_forward_target(news_date, calendar),
        };

        match target {
            Some(session) => {
                if session != news_date {
                    debug!("Non-trading day {} -> affects {}", news_date, session);
                }
                resolution.sessions.entry(session).or_default().push(news_date);
            }
            None => {
                warn!("{}", EngineError::MappingExhausted { date: news_date });
                resolution.unreachable.push(news_date);
            }
        }
    }

    info!("Total affected trading days: {}", resolution.sessions.len());
    resolution
}

/// Session that receives news dated `date` under roll-forward rules:
/// the date itself, else the next session, else the latest session when the
/// news is not older than it.
pub fn roll_forward_target(date: NaiveDate, calendar: &TradingCalendar) -> Option<NaiveDate> {
    if calendar.is_trading_day(date) {
        return Some(date);
    }
    if let Some(next) = calendar.next_after(date) {
        return Some(next);
    }
    calendar.latest().filter(|latest| date >= *latest)
}
