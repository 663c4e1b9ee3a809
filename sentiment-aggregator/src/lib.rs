pub mod types;
pub mod utils;
pub mod calendar;
pub mod resolver;
pub mod counter;
pub mod aggregators;
pub mod aggregator;
pub mod strategy;
pub mod committer;
pub mod engine;
pub mod stores;

pub use types::*;
pub use calendar::{CalendarProvider, TradingCalendar};
pub use resolver::{resolve_affected_sessions, AffectedSessionMap, Resolution};
pub use counter::{CountOutcome, DateCounts, SentimentCounter, SessionSpan};
pub use aggregator::{AggregationPlan, Aggregator, SessionTotals};
pub use strategy::StrategySelector;
pub use committer::Committer;
pub use engine::SentimentEngine;
pub use stores::{MemoryStore, PgStore};
