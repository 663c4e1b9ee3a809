use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;
use std::env;
use std::fmt;
use std::str::FromStr;

pub use interfaces::{Instrument, NewsCollection, SentimentCounts, SentimentLabel, StoreError};

/// How sentiment is laid onto an instrument's calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Strategy {
    /// Low-activity instruments: counts stay on the exact news date.
    Daily,
    /// Active instruments: off-session news rolls onto the next session.
    RollForward,
}

impl Strategy {
    pub fn label(&self) -> &'static str {
        match self {
            Strategy::Daily => "DAILY-BASED",
            Strategy::RollForward => "AGGREGATION-BASED",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which sessions a run recomputes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateScope {
    /// Only the sessions touched by these newly ingested news dates.
    Incremental(BTreeSet<NaiveDate>),
    /// Every session in the trailing `days` calendar days ending at `as_of`.
    FullWindow { days: u32, as_of: NaiveDate },
}

/// Upper bound for any configured day span (100 years).
pub const MAX_SPAN_DAYS: u32 = 36_500;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Instruments with fewer total news records than this use the daily strategy.
    pub low_activity_threshold: u64,
    pub window_days: u32,
    /// Dates per query for exact-date lookups.
    pub daily_batch_size: usize,
    /// Dates per query for span lookups.
    pub range_batch_size: usize,
    /// Lookback used for a session that has no earlier session.
    pub fallback_lookback_days: u32,
    pub instruments: Vec<Instrument>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            low_activity_threshold: 50,
            window_days: 30,
            daily_batch_size: 10,
            range_batch_size: 20,
            fallback_lookback_days: 7,
            instruments: ["FPT", "GAS", "IMP", "VCB"]
                .iter()
                .map(Instrument::new)
                .collect(),
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with any `SENTIMENT_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        env_override("SENTIMENT_LOW_ACTIVITY_THRESHOLD", &mut config.low_activity_threshold)?;
        env_override("SENTIMENT_WINDOW_DAYS", &mut config.window_days)?;
        env_override("SENTIMENT_DAILY_BATCH", &mut config.daily_batch_size)?;
        env_override("SENTIMENT_RANGE_BATCH", &mut config.range_batch_size)?;
        env_override("SENTIMENT_FALLBACK_LOOKBACK_DAYS", &mut config.fallback_lookback_days)?;

        if let Ok(raw) = env::var("SENTIMENT_INSTRUMENTS") {
            let instruments: Vec<Instrument> = raw
                .split(',')
                .filter(|code| !code.trim().is_empty())
                .map(Instrument::new)
                .collect();
            if instruments.is_empty() {
                return Err(EngineError::Config(
                    "SENTIMENT_INSTRUMENTS must name at least one instrument".to_string(),
                ));
            }
            config.instruments = instruments;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.daily_batch_size == 0 || self.range_batch_size == 0 {
            return Err(EngineError::Config("batch sizes must be positive".to_string()));
        }
        if self.window_days > MAX_SPAN_DAYS {
            return Err(EngineError::Config(format!(
                "window_days {} exceeds {}",
                self.window_days, MAX_SPAN_DAYS
            )));
        }
        if self.fallback_lookback_days > MAX_SPAN_DAYS {
            return Err(EngineError::Config(format!(
                "fallback_lookback_days {} exceeds {}",
                self.fallback_lookback_days, MAX_SPAN_DAYS
            )));
        }
        Ok(())
    }
}

fn env_override<T: FromStr>(name: &str, target: &mut T) -> Result<()> {
    match env::var(name) {
        Ok(raw) => {
            *target = raw
                .trim()
                .parse()
                .map_err(|_| {
                    EngineError::Config(format!("{} has an invalid value: {}", name, raw))
                })?;
            Ok(())
        }
        Err(_) => Ok(()),
    }
}

/// Outcome of one reset-then-write pass over a set of sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommitReport {
    pub reset: usize,
    pub written: usize,
    /// Targeted dates with no session row; nothing was stored for them.
    pub missing: Vec<NaiveDate>,
    /// Dates whose reset or write failed in the store.
    pub failed: Vec<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub instrument: Instrument,
    pub strategy: Strategy,
    pub affected_sessions: usize,
    /// News dates that could not be mapped to any session.
    pub unreachable: Vec<NaiveDate>,
    /// Sessions left untouched because part of their sentiment could not be read.
    pub incomplete: Vec<NaiveDate>,
    pub commit: CommitReport,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub processed: usize,
    pub succeeded: Vec<Instrument>,
    pub failed: Vec<Instrument>,
    pub skipped: Vec<Instrument>,
    pub sessions_updated: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstrumentStatus {
    pub instrument: Instrument,
    pub trading_days: usize,
    pub first_trading_day: Option<NaiveDate>,
    pub last_trading_day: Option<NaiveDate>,
    pub news_total: Option<u64>,
    pub strategy: Strategy,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("No trading sessions found in {table}")]
    CalendarEmpty { table: String },

    #[error("News date {date} cannot be mapped to any trading session")]
    MappingExhausted { date: NaiveDate },

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
