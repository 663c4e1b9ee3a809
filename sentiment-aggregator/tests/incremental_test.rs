mod common;

use common::*;
use sentiment_aggregator::{
    EngineConfig, Instrument, MemoryStore, SentimentCounts, SentimentEngine, Strategy,
    StrategySelector, UpdateScope,
};
use interfaces::{FieldValue, Query, TabularStore};
use std::collections::BTreeSet;
use std::sync::Arc;

fn dates(raw: &[&str]) -> BTreeSet<chrono::NaiveDate> {
    raw.iter().map(|s| d(s)).collect()
}

#[tokio::test]
async fn august_holiday_week_rolls_forward() {
    init_tracing();
    let (store, fpt) = august_store(50).await;
    let engine = engine_over(store.clone());

    let written = engine
        .incremental_update(&fpt, &dates(&["2025-08-11", "2025-08-13", "2025-08-14"]))
        .await;

    assert_eq!(written, 2);
    assert_eq!(counts_on(&engine, &fpt, "2025-08-11").await, Some(SentimentCounts::new(1, 0, 0)));
    assert_eq!(counts_on(&engine, &fpt, "2025-08-12").await, Some(SentimentCounts::default()));
    assert_eq!(counts_on(&engine, &fpt, "2025-08-15").await, Some(SentimentCounts::new(0, 2, 1)));
}

#[tokio::test]
async fn repeated_incremental_runs_do_not_double_count() {
    init_tracing();
    let (store, fpt) = august_store(50).await;
    let engine = engine_over(store.clone());
    let news_dates = dates(&["2025-08-11", "2025-08-13", "2025-08-14"]);

    engine.incremental_update(&fpt, &news_dates).await;
    let first = store.rows(&fpt.stock_table()).await;
    engine.incremental_update(&fpt, &news_dates).await;
    engine.incremental_update(&fpt, &news_dates).await;

    assert_eq!(store.rows(&fpt.stock_table()).await, first);
}

#[tokio::test]
async fn a_new_holiday_date_recounts_the_whole_span() {
    init_tracing();
    let (store, fpt) = august_store(50).await;
    let engine = engine_over(store.clone());

    // Only 08-14 is new, but 08-15 still owns the 08-13 news.
    engine.incremental_update(&fpt, &dates(&["2025-08-14"])).await;

    assert_eq!(counts_on(&engine, &fpt, "2025-08-15").await, Some(SentimentCounts::new(0, 2, 1)));
    assert_eq!(counts_on(&engine, &fpt, "2025-08-11").await, Some(SentimentCounts::default()));
}

#[tokio::test]
async fn tail_overflow_lands_on_latest_session() {
    init_tracing();
    let (store, fpt) = august_store(50).await;
    store.seed(&fpt.news_table(), news("2025-08-16", Some("Positive"), 3)).await;
    store.seed(&fpt.news_table(), news("2025-08-01", Some("Negative"), 5)).await;
    let engine = engine_over(store.clone());

    let report = engine
        .run(&fpt, &UpdateScope::Incremental(dates(&["2025-08-01", "2025-08-16"])))
        .await
        .unwrap();

    assert_eq!(report.strategy, Strategy::RollForward);
    // 08-01 is older than the first session's lookback: reported, never counted.
    assert_eq!(report.unreachable, vec![d("2025-08-01")]);
    assert_eq!(report.affected_sessions, 2);
    // 08-16 rides on 08-15 together with the holiday news.
    let friday = counts_on(&engine, &fpt, "2025-08-15").await;
    assert_eq!(friday, Some(SentimentCounts::new(3, 2, 1)));
    let monday = counts_on(&engine, &fpt, "2025-08-11").await;
    assert_eq!(monday, Some(SentimentCounts::new(1, 0, 0)));
}

#[tokio::test]
async fn news_after_the_only_session_rolls_back_onto_it() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let vcb = Instrument::new("VCB");
    seed_calendar(&store, &vcb, &["2025-08-11"]).await;
    store.seed(&vcb.news_table(), news("2025-08-12", Some("Neutral"), 1)).await;
    pad_news_to(&store, &vcb, 60, "2025-08-12").await;
    let engine = engine_over(store.clone());

    let report = engine
        .run(&vcb, &UpdateScope::Incremental(dates(&["2025-08-12"])))
        .await
        .unwrap();

    assert_eq!(report.affected_sessions, 1);
    assert_eq!(counts_on(&engine, &vcb, "2025-08-11").await, Some(SentimentCounts::new(0, 0, 1)));
}

#[tokio::test]
async fn daily_mode_never_creates_session_rows() {
    init_tracing();
    let (store, fpt) = august_store(10).await;
    store.seed(&fpt.news_table(), news("2025-08-16", Some("Positive"), 2)).await;
    let engine = engine_over(store.clone());

    let report = engine
        .run(
            &fpt,
            &UpdateScope::Incremental(dates(&["2025-08-12", "2025-08-13", "2025-08-16"])),
        )
        .await
        .unwrap();

    assert_eq!(report.strategy, Strategy::Daily);
    assert_eq!(report.commit.missing, vec![d("2025-08-13"), d("2025-08-16")]);
    assert_eq!(store.rows(&fpt.stock_table()).await.len(), 3);
    assert_eq!(counts_on(&engine, &fpt, "2025-08-13").await, None);
    assert_eq!(counts_on(&engine, &fpt, "2025-08-15").await, Some(SentimentCounts::default()));
}

#[tokio::test]
async fn daily_mode_keeps_counts_on_their_own_date() {
    init_tracing();
    let (store, fpt) = august_store(10).await;
    let engine = engine_over(store.clone());

    engine
        .incremental_update(
            &fpt,
            &dates(&["2025-08-11", "2025-08-13", "2025-08-14", "2025-08-15"]),
        )
        .await;

    assert_eq!(counts_on(&engine, &fpt, "2025-08-11").await, Some(SentimentCounts::new(1, 0, 0)));
    // Holiday news stays with its holiday and is not carried onto Friday.
    assert_eq!(counts_on(&engine, &fpt, "2025-08-15").await, Some(SentimentCounts::default()));
}

#[tokio::test]
async fn single_date_and_multi_date_chunks_agree() {
    init_tracing();
    let news_dates = dates(&["2025-08-11", "2025-08-13", "2025-08-14", "2025-08-15"]);

    for news_total in [10, 50] {
        let mut outcomes = Vec::new();
        for batch_size in [1, 2, 20] {
            let (store, fpt) = august_store(news_total).await;
            let config = EngineConfig {
                daily_batch_size: batch_size,
                range_batch_size: batch_size,
                ..EngineConfig::default()
            };
            let engine = SentimentEngine::new(store.clone(), config);

            let report = engine
                .run(&fpt, &UpdateScope::Incremental(news_dates.clone()))
                .await
                .unwrap();
            assert!(report.incomplete.is_empty());
            let monday = counts_on(&engine, &fpt, "2025-08-11").await;
            assert_eq!(monday, Some(SentimentCounts::new(1, 0, 0)));
            outcomes.push(store.rows(&fpt.stock_table()).await);
        }
        assert_eq!(outcomes[0], outcomes[1], "news_total={}", news_total);
        assert_eq!(outcomes[0], outcomes[2], "news_total={}", news_total);
    }
}

#[tokio::test]
async fn low_activity_day_keeps_both_labels() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let vcb = Instrument::new("VCB");
    seed_calendar(&store, &vcb, &["2025-08-11", "2025-08-12"]).await;
    store.seed(&vcb.news_table(), news("2025-08-12", Some("Positive"), 1)).await;
    store.seed(&vcb.news_table(), news("2025-08-12", Some("Negative"), 1)).await;
    let engine = engine_over(store.clone());

    let report = engine
        .run(&vcb, &UpdateScope::Incremental(dates(&["2025-08-12"])))
        .await
        .unwrap();

    assert_eq!(report.strategy, Strategy::Daily);
    assert_eq!(report.commit.written, 1);
    let tuesday = counts_on(&engine, &vcb, "2025-08-12").await;
    assert_eq!(tuesday, Some(SentimentCounts::new(1, 1, 0)));
    let monday = counts_on(&engine, &vcb, "2025-08-11").await;
    assert_eq!(monday, Some(SentimentCounts::default()));
}

#[tokio::test]
async fn oversized_lookback_fails_without_writing() {
    init_tracing();
    let (store, fpt) = august_store(50).await;
    let before = store.rows(&fpt.stock_table()).await;
    let config = EngineConfig {
        fallback_lookback_days: u32::MAX,
        ..EngineConfig::default()
    };
    let engine = SentimentEngine::new(store.clone(), config);

    let written = engine
        .incremental_update(&fpt, &dates(&["2025-08-11", "2025-08-13"]))
        .await;

    assert_eq!(written, 0);
    assert_eq!(store.rows(&fpt.stock_table()).await, before);
}

#[tokio::test]
async fn strategy_switches_at_fifty_records() {
    init_tracing();
    let (low, fpt) = august_store(49).await;
    let (active, _) = august_store(50).await;

    let quiet = StrategySelector::new(low.as_ref(), 50).select(&fpt).await;
    let busy = StrategySelector::new(active.as_ref(), 50).select(&fpt).await;
    assert_eq!(quiet, Strategy::Daily);
    assert_eq!(busy, Strategy::RollForward);
}

#[tokio::test]
async fn unreadable_news_count_defaults_to_roll_forward() {
    init_tracing();
    let (store, fpt) = august_store(10).await;
    let faulty = FaultyStore::new(store).failing_count();

    assert_eq!(StrategySelector::new(&faulty, 50).select(&fpt).await, Strategy::RollForward);
}

#[tokio::test]
async fn failed_chunk_leaves_its_sessions_untouched() {
    init_tracing();
    let (store, fpt) = august_store(50).await;
    store
        .update(
            &Query::table(fpt.stock_table()).eq("date", d("2025-08-12")),
            &[("Positive".to_string(), FieldValue::Int(7))],
        )
        .await
        .unwrap();
    let faulty = Arc::new(
        FaultyStore::new(store.clone()).failing_select(|q| mentions_date(q, d("2025-08-12"))),
    );
    let config = EngineConfig {
        range_batch_size: 2,
        ..EngineConfig::default()
    };
    let engine = SentimentEngine::new(faulty, config);

    let report = engine
        .run(
            &fpt,
            &UpdateScope::Incremental(dates(&["2025-08-11", "2025-08-12", "2025-08-13"])),
        )
        .await
        .unwrap();

    assert_eq!(report.incomplete, vec![d("2025-08-12")]);
    let reader = engine_over(store.clone());
    assert_eq!(counts_on(&reader, &fpt, "2025-08-12").await, Some(SentimentCounts::new(7, 0, 0)));
    assert_eq!(counts_on(&reader, &fpt, "2025-08-11").await, Some(SentimentCounts::new(1, 0, 0)));
    assert_eq!(counts_on(&reader, &fpt, "2025-08-15").await, Some(SentimentCounts::new(0, 2, 1)));
}

#[tokio::test]
async fn empty_calendar_means_nothing_to_do() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(store);

    let written = engine
        .incremental_update(&Instrument::new("IMP"), &dates(&["2025-08-11"]))
        .await;
    assert_eq!(written, 0);
    assert_eq!(
        engine.incremental_update(&Instrument::new("IMP"), &BTreeSet::new()).await,
        0
    );
}
