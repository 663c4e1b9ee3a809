#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use interfaces::{
    Assignment, FieldValue, Filter, Query, Row, StoreError, StoreResult, TabularStore,
};
use sentiment_aggregator::{
    EngineConfig, Instrument, MemoryStore, SentimentCounts, SentimentEngine,
};
use serde_json::{json, Value};
use std::sync::{Arc, Once};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

pub fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap()
}

/// A session row with a close price and zeroed counters.
pub fn session(date: &str) -> Row {
    row(json!({
        "date": date,
        "close_price": 100.0,
        "Positive": 0,
        "Negative": 0,
        "Neutral": 0,
    }))
}

pub fn session_with_counts(date: &str, counts: (u32, u32, u32)) -> Row {
    row(json!({
        "date": date,
        "close_price": 100.0,
        "Positive": counts.0,
        "Negative": counts.1,
        "Neutral": counts.2,
    }))
}

/// `n` news rows on `date`. `None` leaves them unlabeled.
pub fn news(date: &str, label: Option<&str>, n: usize) -> Vec<Row> {
    (0..n)
        .map(|_| row(json!({ "date": date, "sentiment": label })))
        .collect()
}

pub async fn seed_calendar(store: &MemoryStore, instrument: &Instrument, dates: &[&str]) {
    store
        .seed(&instrument.stock_table(), dates.iter().map(|date| session(date)))
        .await;
}

/// Pad the news table with unlabeled rows until it holds `total` records.
pub async fn pad_news_to(store: &MemoryStore, instrument: &Instrument, total: usize, on: &str) {
    let table = instrument.news_table();
    let have = store.rows(&table).await.len();
    if total > have {
        store.seed(&table, news(on, None, total - have)).await;
    } else {
        store.create_table(&table).await;
    }
}

/// FPT with the August 2025 holiday week: Wed 13th and Thu 14th closed.
pub async fn august_store(news_total: usize) -> (Arc<MemoryStore>, Instrument) {
    let store = Arc::new(MemoryStore::new());
    let fpt = Instrument::new("FPT");
    seed_calendar(&store, &fpt, &["2025-08-11", "2025-08-12", "2025-08-15"]).await;

    let table = fpt.news_table();
    store.seed(&table, news("2025-08-11", Some("Positive"), 1)).await;
    store.seed(&table, news("2025-08-13", Some("Negative"), 2)).await;
    store.seed(&table, news("2025-08-14", Some("Neutral"), 1)).await;
    pad_news_to(&store, &fpt, news_total, "2025-08-12").await;
    (store, fpt)
}

pub fn engine_over(store: Arc<dyn TabularStore>) -> SentimentEngine {
    SentimentEngine::new(store, EngineConfig::default())
}

pub async fn counts_on(
    engine: &SentimentEngine,
    instrument: &Instrument,
    date: &str,
) -> Option<SentimentCounts> {
    engine
        .read_session_counts(instrument, &[d(date)])
        .await
        .unwrap()
        .get(&d(date))
        .copied()
}

pub fn mentions_date(query: &Query, date: NaiveDate) -> bool {
    let target = FieldValue::Date(date);
    query.filters.iter().any(|filter| match filter {
        Filter::Eq(_, v) => *v == target,
        Filter::In(_, values) => values.contains(&target),
        _ => false,
    })
}

type Predicate = Box<dyn Fn(&Query) -> bool + Send + Sync>;

/// Wraps a `MemoryStore` and fails the calls the predicates pick.
pub struct FaultyStore {
    pub inner: Arc<MemoryStore>,
    fail_select: Predicate,
    fail_update: Predicate,
    fail_count: bool,
}

impl FaultyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            fail_select: Box::new(|_| false),
            fail_update: Box::new(|_| false),
            fail_count: false,
        }
    }

    pub fn failing_select(
        mut self,
        predicate: impl Fn(&Query) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.fail_select = Box::new(predicate);
        self
    }

    pub fn failing_update(
        mut self,
        predicate: impl Fn(&Query) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.fail_update = Box::new(predicate);
        self
    }

    pub fn failing_count(mut self) -> Self {
        self.fail_count = true;
        self
    }
}

fn injected(table: &str) -> StoreError {
    StoreError::Query {
        table: table.to_string(),
        message: "injected failure".to_string(),
    }
}

#[async_trait]
impl TabularStore for FaultyStore {
    async fn select(&self, query: &Query) -> StoreResult<Vec<Row>> {
        if (self.fail_select)(query) {
            return Err(injected(&query.table));
        }
        self.inner.select(query).await
    }

    async fn update(&self, query: &Query, fields: &[Assignment]) -> StoreResult<Vec<Row>> {
        if (self.fail_update)(query) {
            return Err(injected(&query.table));
        }
        self.inner.update(query, fields).await
    }

    async fn insert(&self, table: &str, fields: &[Assignment]) -> StoreResult<Vec<Row>> {
        self.inner.insert(table, fields).await
    }

    async fn count(&self, query: &Query) -> StoreResult<u64> {
        if self.fail_count {
            return Err(StoreError::Connection("injected failure".to_string()));
        }
        self.inner.count(query).await
    }
}
