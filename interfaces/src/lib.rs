pub mod defs;
pub mod store;

pub use defs::{
    Instrument, NewsCollection, NewsRecord, SentimentCounts, SentimentLabel, TradingSession,
};
pub use store::{
    Assignment, FieldValue, Filter, OrderBy, Query, Row, StoreError, StoreResult, TabularStore,
    date_value,
};
