use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

use crate::store::{Row, date_value};

/// Column names shared by the session and news collections.
pub mod columns {
    pub const DATE: &str = "date";
    pub const SENTIMENT: &str = "sentiment";
    pub const CLOSE_PRICE: &str = "close_price";
    pub const POSITIVE: &str = "Positive";
    pub const NEGATIVE: &str = "Negative";
    pub const NEUTRAL: &str = "Neutral";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    pub const ALL: [SentimentLabel; 3] = [
        SentimentLabel::Positive,
        SentimentLabel::Negative,
        SentimentLabel::Neutral,
    ];

    /// Parse a stored label. Empty or unrecognised values mean "unset".
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Positive" => Some(SentimentLabel::Positive),
            "Negative" => Some(SentimentLabel::Negative),
            "Neutral" => Some(SentimentLabel::Neutral),
            _ => None,
        }
    }

    /// Session counter column that tallies this label.
    pub fn column(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => columns::POSITIVE,
            SentimentLabel::Negative => columns::NEGATIVE,
            SentimentLabel::Neutral => columns::NEUTRAL,
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Running Positive/Negative/Neutral tallies for one date or session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentCounts {
    pub positive: u32,
    pub negative: u32,
    pub neutral: u32,
}

impl SentimentCounts {
    pub fn new(positive: u32, negative: u32, neutral: u32) -> Self {
        Self {
            positive,
            negative,
            neutral,
        }
    }

    pub fn record(&mut self, label: SentimentLabel) {
        match label {
            SentimentLabel::Positive => self.positive += 1,
            SentimentLabel::Negative => self.negative += 1,
            SentimentLabel::Neutral => self.neutral += 1,
        }
    }

    pub fn get(&self, label: SentimentLabel) -> u32 {
        match label {
            SentimentLabel::Positive => self.positive,
            SentimentLabel::Negative => self.negative,
            SentimentLabel::Neutral => self.neutral,
        }
    }

    pub fn total(&self) -> u32 {
        self.positive + self.negative + self.neutral
    }

    pub fn is_zero(&self) -> bool {
        self.total() == 0
    }
}

impl Add for SentimentCounts {
    type Output = SentimentCounts;

    fn add(self, rhs: SentimentCounts) -> SentimentCounts {
        SentimentCounts {
            positive: self.positive + rhs.positive,
            negative: self.negative + rhs.negative,
            neutral: self.neutral + rhs.neutral,
        }
    }
}

impl AddAssign for SentimentCounts {
    fn add_assign(&mut self, rhs: SentimentCounts) {
        *self = *self + rhs;
    }
}

impl Sum for SentimentCounts {
    fn sum<I: Iterator<Item = SentimentCounts>>(iter: I) -> Self {
        iter.fold(SentimentCounts::default(), Add::add)
    }
}

impl<'a> Sum<&'a SentimentCounts> for SentimentCounts {
    fn sum<I: Iterator<Item = &'a SentimentCounts>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl fmt::Display for SentimentCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P={}, N={}, Neu={}", self.positive, self.negative, self.neutral)
    }
}

/// A listed instrument identified by its ticker code, e.g. `FPT`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Instrument(String);

impl Instrument {
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_uppercase())
    }

    pub fn code(&self) -> &str {
        &self.0
    }

    /// Collection holding the instrument's trading sessions.
    pub fn stock_table(&self) -> String {
        format!("{}_Stock", self.0)
    }

    /// Collection holding the instrument's news articles.
    pub fn news_table(&self) -> String {
        format!("{}_News", self.0)
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a batch of news articles lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NewsCollection {
    Instrument(Instrument),
    /// Market-wide articles not tied to any instrument.
    General,
}

impl NewsCollection {
    pub fn table_name(&self) -> String {
        match self {
            NewsCollection::Instrument(instrument) => instrument.news_table(),
            NewsCollection::General => "General_News".to_string(),
        }
    }
}

impl From<&Instrument> for NewsCollection {
    fn from(instrument: &Instrument) -> Self {
        NewsCollection::Instrument(instrument.clone())
    }
}

/// The slice of a news article the aggregation engine reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsRecord {
    pub date: NaiveDate,
    pub sentiment: Option<SentimentLabel>,
}

impl NewsRecord {
    /// Returns `None` when the row carries no usable date.
    pub fn from_row(row: &Row) -> Option<Self> {
        let date = row.get(columns::DATE).and_then(date_value)?;
        let sentiment = row
            .get(columns::SENTIMENT)
            .and_then(|v| v.as_str())
            .and_then(SentimentLabel::parse);
        Some(Self { date, sentiment })
    }
}

/// A trading session row as far as the engine is concerned. Price columns
/// other than the close are never read.
#[derive(Debug, Clone, PartialEq)]
pub struct TradingSession {
    pub date: NaiveDate,
    pub close_price: Option<f64>,
    pub counts: SentimentCounts,
}

impl TradingSession {
    /// Counter values that are missing, NULL, negative or not integers read as 0.
    pub fn from_row(row: &Row) -> Option<Self> {
        let date = row.get(columns::DATE).and_then(date_value)?;
        let close_price = row.get(columns::CLOSE_PRICE).and_then(|v| match v {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        });
        let counts = SentimentCounts {
            positive: coerce_count(row.get(columns::POSITIVE)),
            negative: coerce_count(row.get(columns::NEGATIVE)),
            neutral: coerce_count(row.get(columns::NEUTRAL)),
        };
        Some(Self {
            date,
            close_price,
            counts,
        })
    }
}

pub fn coerce_count(value: Option<&serde_json::Value>) -> u32 {
    match value {
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64))
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0),
        Some(serde_json::Value::String(s)) => s.trim().parse::<u32>().unwrap_or(0),
        _ => 0,
    }
}
