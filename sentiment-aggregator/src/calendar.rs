use crate::types::{Instrument, Result};
use chrono::NaiveDate;
use interfaces::defs::columns;
use interfaces::{date_value, Query, StoreError, TabularStore};
use tracing::{debug, info, warn};

/// Ascending, de-duplicated trading-session dates of one instrument.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TradingCalendar {
    days: Vec<NaiveDate>,
}

impl TradingCalendar {
    pub fn new(mut days: Vec<NaiveDate>) -> Self {
        days.sort_unstable();
        days.dedup();
        Self { days }
    }

    pub fn days(&self) -> &[NaiveDate] {
        &self.days
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn earliest(&self) -> Option<NaiveDate> {
        self.days.first().copied()
    }

    pub fn latest(&self) -> Option<NaiveDate> {
        self.days.last().copied()
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        self.days.binary_search(&date).is_ok()
    }

    /// Smallest trading day strictly after `date`.
    pub fn next_after(&self, date: NaiveDate) -> Option<NaiveDate> {
        let idx = self.days.partition_point(|d| *d <= date);
        self.days.get(idx).copied()
    }

    /// Largest trading day strictly before `date`.
    pub fn previous_before(&self, date: NaiveDate) -> Option<NaiveDate> {
        let idx = self.days.partition_point(|d| *d < date);
        idx.checked_sub(1).map(|i| self.days[i])
    }

    /// Trading days inside `[start, end]`.
    pub fn within(&self, start: NaiveDate, end: NaiveDate) -> &[NaiveDate] {
        let lo = self.days.partition_point(|d| *d < start);
        let hi = self.days.partition_point(|d| *d <= end);
        if lo >= hi {
            &[]
        } else {
            &self.days[lo..hi]
        }
    }
}

/// Reads trading calendars from the session collections.
pub struct CalendarProvider<'a> {
    store: &'a dyn TabularStore,
}

impl<'a> CalendarProvider<'a> {
    pub fn new(store: &'a dyn TabularStore) -> Self {
        Self { store }
    }

    /// Sessions with a recorded close, oldest first. A missing table is an
    /// empty calendar, not an error.
    pub async fn get_trading_days(&self, instrument: &Instrument) -> Result<TradingCalendar> {
        let table = instrument.stock_table();
        let query = Query::table(&table)
            .columns(&[columns::DATE])
            .not_null(columns::CLOSE_PRICE)
            .order_by(columns::DATE, true);

        let rows = match self.store.select(&query).await {
            Ok(rows) => rows,
            Err(StoreError::UnknownTable(_)) => {
                warn!("Session table {} does not exist", table);
                return Ok(TradingCalendar::default());
            }
            Err(e) => return Err(e.into()),
        };

        let mut days = Vec::with_capacity(rows.len());
        for row in &rows {
            match row.get(columns::DATE).and_then(date_value) {
                Some(date) => days.push(date),
                None => debug!("Skipping session row without a usable date in {}", table),
            }
        }

        let calendar = TradingCalendar::new(days);
        info!("Found {} trading days in {}", calendar.len(), table);
        Ok(calendar)
    }
}
