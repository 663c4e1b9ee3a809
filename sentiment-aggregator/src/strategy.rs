use crate::types::{Instrument, Result, Strategy};
use interfaces::{Query, TabularStore};
use tracing::{info, warn};

/// Low-activity below `threshold` total news records, active at or above it.
pub fn classify(total_news: u64, threshold: u64) -> Strategy {
    if total_news < threshold {
        Strategy::Daily
    } else {
        Strategy::RollForward
    }
}

/// Picks the aggregation strategy from an instrument's news volume.
pub struct StrategySelector<'a> {
    store: &'a dyn TabularStore,
    threshold: u64,
}

impl<'a> StrategySelector<'a> {
    pub fn new(store: &'a dyn TabularStore, threshold: u64) -> Self {
        Self { store, threshold }
    }

    /// Every news record ever ingested for the instrument, labeled or not.
    pub async fn news_total(&self, instrument: &Instrument) -> Result<u64> {
        let total = self.store.count(&Query::table(instrument.news_table())).await?;
        Ok(total)
    }

    /// Falls back to roll-forward when the count cannot be read.
    pub async fn select(&self, instrument: &Instrument) -> Strategy {
        match self.news_total(instrument).await {
            Ok(total) => {
                let strategy = classify(total, self.threshold);
                info!("{}: strategy {} (total news: {})", instrument, strategy, total);
                strategy
            }
            Err(e) => {
                warn!(
                    "Error checking news count for {}, defaulting to aggregation: {}",
                    instrument, e
                );
                Strategy::RollForward
            }
        }
    }
}
