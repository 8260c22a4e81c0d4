// Integration coverage for the ETL pipeline (C9, §4.9) against a real
// sqlite-backed `Store`, exercising validate/transform/dedupe/load together
// rather than any single stage in isolation.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use trend_harvester::enrich::language::LanguageAggregate;
use trend_harvester::enrich::sentiment::SentimentAggregate;
use trend_harvester::etl::raw::TrendRecord;
use trend_harvester::etl::{DedupeStrategy, EtlPipeline};
use trend_harvester::scoring::EngagementBreakdown;
use trend_harvester::store::{SqliteStore, Store};
use trend_harvester::types::Platform;

async fn memory_store() -> Arc<dyn Store> {
    let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
    store.init_schema().await.unwrap();
    Arc::new(store)
}

fn record(topic: &str, url: Option<&str>, engagement_score: f64) -> TrendRecord {
    TrendRecord {
        source: Platform::TikTok,
        topic: topic.to_string(),
        url: url.map(str::to_string),
        sample_count: 1,
        avg_likes: 100.0,
        avg_comments: 10.0,
        avg_shares: 5.0,
        avg_views: 1000.0,
        audience_size: None,
        content_type_distribution: HashMap::new(),
        sentiment: SentimentAggregate::from_scores(&[]),
        language: LanguageAggregate::from_signals(&[]),
        engagement_score,
        engagement_breakdown: EngagementBreakdown {
            raw_score: engagement_score,
            normalized_score: engagement_score,
            components: Vec::new(),
        },
        scraped_at: Utc::now(),
        metadata: HashMap::new(),
    }
}

#[tokio::test]
async fn load_batch_upserts_distinct_topics_in_one_run() {
    let store = memory_store().await;
    let pipeline = EtlPipeline::new(store.clone(), DedupeStrategy::Update, 100);
    let run_id = Uuid::new_v4();

    let records = vec![
        record("#alpha", Some("https://tiktok.com/t/alpha"), 3000.0),
        record("#beta", Some("https://tiktok.com/t/beta"), 1500.0),
    ];
    let (uploaded, invalid) = pipeline.load_batch(records, run_id).await;
    assert_eq!(uploaded, 2);
    assert_eq!(invalid, 0);

    assert!(store.find_trend(Platform::TikTok, "alpha").await.unwrap().is_some());
    assert!(store.find_trend(Platform::TikTok, "beta").await.unwrap().is_some());
}

#[tokio::test]
async fn ignore_strategy_skips_without_error_on_duplicate() {
    let store = memory_store().await;
    let pipeline = EtlPipeline::new(store.clone(), DedupeStrategy::Ignore, 100);
    let run_id = Uuid::new_v4();

    let r1 = record("#viral", Some("https://tiktok.com/t/viral"), 500.0);
    let r2 = record("#viral", Some("https://tiktok.com/t/viral"), 900.0);
    let (uploaded, invalid) = pipeline.load_batch(vec![r1, r2], run_id).await;

    // First insert succeeds; the duplicate is skipped, not an error.
    assert_eq!(uploaded, 1);
    assert_eq!(invalid, 0);
}

#[tokio::test]
async fn error_strategy_enqueues_duplicates_to_the_offline_queue() {
    let store = memory_store().await;
    let pipeline = EtlPipeline::new(store.clone(), DedupeStrategy::Error, 100);
    let run_id = Uuid::new_v4();

    let r1 = record("#viral", Some("https://tiktok.com/t/viral"), 500.0);
    let r2 = record("#viral", Some("https://tiktok.com/t/viral"), 900.0);
    let (uploaded, invalid) = pipeline.load_batch(vec![r1, r2], run_id).await;

    assert_eq!(uploaded, 1);
    assert_eq!(invalid, 1);

    let due = store.due_jobs(Utc::now() + chrono::Duration::hours(1), 10).await.unwrap();
    assert_eq!(due.len(), 1, "the duplicate's DATA/duplicate failure should have been parked for retry");
}

#[tokio::test]
async fn invalid_topic_increments_invalid_count_without_failing_the_batch() {
    let store = memory_store().await;
    let pipeline = EtlPipeline::new(store.clone(), DedupeStrategy::Update, 100);

    let bad = record("#a", None, 100.0); // normalizes to 1 char, below the 2-char floor
    let good = record("#goodtopic", Some("https://tiktok.com/t/good"), 100.0);

    let (uploaded, invalid) = pipeline.load_batch(vec![bad, good], Uuid::new_v4()).await;
    assert_eq!(uploaded, 1);
    assert_eq!(invalid, 1);
}
