mod common;

use common::*;
use sentiment_aggregator::{Instrument, MemoryStore, SentimentCounts, Strategy};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// FPT as in the holiday-week fixture plus a GAS calendar with its own news.
async fn two_instrument_store() -> (Arc<MemoryStore>, Instrument, Instrument) {
    let (store, fpt) = august_store(50).await;
    let gas = Instrument::new("GAS");
    seed_calendar(&store, &gas, &["2025-08-11", "2025-08-12"]).await;
    store.seed(&gas.news_table(), news("2025-08-12", Some("Negative"), 3)).await;
    (store, fpt, gas)
}

#[tokio::test]
async fn incremental_batch_skips_instruments_without_new_dates() {
    init_tracing();
    let (store, fpt, gas) = two_instrument_store().await;
    let engine = engine_over(store.clone());

    let mut updates = BTreeMap::new();
    updates.insert(fpt.clone(), BTreeSet::from([d("2025-08-13")]));
    updates.insert(gas.clone(), BTreeSet::new());
    let report = engine.incremental_batch(&updates).await;

    assert_eq!(report.processed, 1);
    assert_eq!(report.succeeded, vec![fpt.clone()]);
    assert_eq!(report.skipped, vec![gas.clone()]);
    assert_eq!(report.sessions_updated, 1);
    assert_eq!(counts_on(&engine, &fpt, "2025-08-15").await, Some(SentimentCounts::new(0, 2, 1)));
    assert_eq!(counts_on(&engine, &gas, "2025-08-12").await, Some(SentimentCounts::default()));
}

#[tokio::test]
async fn one_failing_instrument_does_not_block_the_rest() {
    init_tracing();
    let (store, fpt, gas) = two_instrument_store().await;
    let gas_news = gas.news_table();
    let faulty =
        Arc::new(FaultyStore::new(store.clone()).failing_select(move |q| q.table == gas_news));
    let engine = engine_over(faulty);

    let report = engine
        .reconciliation_batch(&[gas.clone(), fpt.clone()], 30, Some(d("2025-08-15")))
        .await;

    assert_eq!(report.processed, 2);
    assert_eq!(report.succeeded, vec![fpt.clone()]);
    assert_eq!(report.failed, vec![gas.clone()]);
    assert_eq!(report.sessions_updated, 2);
}

#[tokio::test]
async fn unusable_window_fails_every_instrument_and_finishes() {
    init_tracing();
    let (store, fpt, gas) = two_instrument_store().await;
    let engine = engine_over(store.clone());

    let report = engine
        .reconciliation_batch(&[fpt.clone(), gas.clone()], u32::MAX, Some(d("2025-08-15")))
        .await;

    assert_eq!(report.processed, 2);
    assert!(report.succeeded.is_empty());
    assert_eq!(report.failed, vec![fpt, gas]);
    assert_eq!(report.sessions_updated, 0);
}

#[tokio::test]
async fn failed_writes_mark_the_instrument_failed() {
    init_tracing();
    let (store, fpt, gas) = two_instrument_store().await;
    let gas_stock = gas.stock_table();
    let faulty =
        Arc::new(FaultyStore::new(store.clone()).failing_update(move |q| q.table == gas_stock));
    let engine = engine_over(faulty);

    let mut updates = BTreeMap::new();
    updates.insert(fpt.clone(), BTreeSet::from([d("2025-08-11")]));
    updates.insert(gas.clone(), BTreeSet::from([d("2025-08-12")]));
    let report = engine.incremental_batch(&updates).await;

    assert_eq!(report.succeeded, vec![fpt]);
    assert_eq!(report.failed, vec![gas]);
}

#[tokio::test]
async fn normalize_zeroes_null_counters_only() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let vcb = Instrument::new("VCB");
    store
        .seed(
            &vcb.stock_table(),
            vec![
                row(json!({
                    "date": "2025-08-11",
                    "close_price": 10.0,
                    "Positive": null,
                    "Negative": 3,
                    "Neutral": null,
                })),
                row(json!({
                    "date": "2025-08-12",
                    "close_price": 10.5,
                    "Positive": 1,
                    "Negative": 1,
                    "Neutral": 1,
                })),
            ],
        )
        .await;
    let engine = engine_over(store.clone());

    assert_eq!(engine.ensure_counters_not_null(&vcb).await.unwrap(), 2);
    assert_eq!(engine.ensure_counters_not_null(&vcb).await.unwrap(), 0);

    let rows = store.rows(&vcb.stock_table()).await;
    assert_eq!(rows[0]["Positive"], json!(0));
    assert_eq!(rows[0]["Negative"], json!(3));
    assert_eq!(rows[0]["Neutral"], json!(0));
    assert_eq!(rows[1]["Positive"], json!(1));
}

#[tokio::test]
async fn read_back_coerces_malformed_counters() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let imp = Instrument::new("IMP");
    store
        .seed(
            &imp.stock_table(),
            vec![row(json!({
                "date": "2025-08-11",
                "close_price": 1.0,
                "Positive": "4",
                "Negative": "n/a",
                "Neutral": 2.5,
            }))],
        )
        .await;
    let engine = engine_over(store.clone());

    assert_eq!(counts_on(&engine, &imp, "2025-08-11").await, Some(SentimentCounts::new(4, 0, 0)));
}

#[tokio::test]
async fn status_reports_calendar_and_strategy() {
    init_tracing();
    let (store, fpt, gas) = two_instrument_store().await;
    let engine = engine_over(store.clone());

    let fpt_status = engine.instrument_status(&fpt).await.unwrap();
    assert_eq!(fpt_status.trading_days, 3);
    assert_eq!(fpt_status.first_trading_day, Some(d("2025-08-11")));
    assert_eq!(fpt_status.last_trading_day, Some(d("2025-08-15")));
    assert_eq!(fpt_status.news_total, Some(50));
    assert_eq!(fpt_status.strategy, Strategy::RollForward);

    let gas_status = engine.instrument_status(&gas).await.unwrap();
    assert_eq!(gas_status.news_total, Some(3));
    assert_eq!(gas_status.strategy, Strategy::Daily);

    let missing = engine.instrument_status(&Instrument::new("XYZ")).await.unwrap();
    assert_eq!(missing.trading_days, 0);
    assert_eq!(missing.news_total, None);
}
