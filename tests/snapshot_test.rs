// Integration coverage for Snapshot & Lifecycle (C10, §4.10) against a real
// sqlite-backed `Store`, covering the deletion branch and the re-seen status
// reset that the inline unit tests in `src/snapshot/mod.rs` don't exercise.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use trend_harvester::snapshot::{LifecycleThresholds, SnapshotStage};
use trend_harvester::store::{NewTrendVersion, SqliteStore, Store};
use trend_harvester::types::{Platform, TrendStatus};

async fn memory_store() -> Arc<dyn Store> {
    let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
    store.init_schema().await.unwrap();
    Arc::new(store)
}

#[tokio::test]
async fn expired_trend_is_hard_deleted_when_archiving_is_disabled() {
    let store = memory_store().await;
    let stage = SnapshotStage::new(store.clone());
    let long_ago = Utc::now() - chrono::Duration::days(60);
    let trend = store
        .insert_trend(Platform::TikTok, "#gone", "gone", None, long_ago)
        .await
        .unwrap();

    let thresholds = LifecycleThresholds {
        decay_rate_weekly: 0.05,
        inactive_days_threshold: 7,
        expiration_days_threshold: 30,
        archive_enabled: false,
    };
    let outcome = stage
        .decay_and_archive(Platform::TikTok, Utc::now(), thresholds, Uuid::new_v4())
        .await
        .unwrap();

    assert_eq!(outcome.deleted, 1);
    assert_eq!(outcome.archived, 0);
    assert!(store.find_trend(Platform::TikTok, &trend.normalized_topic).await.unwrap().is_none());
}

#[tokio::test]
async fn archived_trends_are_skipped_by_the_decay_sweep() {
    let store = memory_store().await;
    let stage = SnapshotStage::new(store.clone());
    let long_ago = Utc::now() - chrono::Duration::days(60);
    let trend = store
        .insert_trend(Platform::TikTok, "#already_archived", "already_archived", None, long_ago)
        .await
        .unwrap();
    store
        .touch_trend(trend.id, long_ago, TrendStatus::Archived)
        .await
        .unwrap();

    let thresholds = LifecycleThresholds {
        decay_rate_weekly: 0.05,
        inactive_days_threshold: 7,
        expiration_days_threshold: 30,
        archive_enabled: true,
    };
    let outcome = stage
        .decay_and_archive(Platform::TikTok, Utc::now(), thresholds, Uuid::new_v4())
        .await
        .unwrap();

    assert_eq!(outcome.archived, 0);
    assert_eq!(outcome.deleted, 0);
}

#[tokio::test]
async fn rank_and_diff_resets_a_declining_trend_back_to_active() {
    // P10: being present in today's batch is the explicit re-seen event that
    // resets `status`, even if the trend had already started declining.
    let store = memory_store().await;
    let stage = SnapshotStage::new(store.clone());
    let now = Utc::now();
    let run_id = Uuid::new_v4();

    let trend = store.insert_trend(Platform::TikTok, "#comeback", "comeback", None, now).await.unwrap();
    store.touch_trend(trend.id, now, TrendStatus::Declining).await.unwrap();

    store
        .insert_trend_version(NewTrendVersion {
            trend_id: trend.id,
            version_date: now.date_naive(),
            engagement_score: 42.0,
            sentiment_polarity: 0.0,
            sentiment_label: "neutral".to_string(),
            language: "en".to_string(),
            language_confidence: 0.9,
            scraped_at: now,
            run_version_id: run_id,
            decayed: false,
        })
        .await
        .unwrap();

    stage.rank_and_diff(Platform::TikTok, now.date_naive()).await.unwrap();

    let found = store.find_trend(Platform::TikTok, "comeback").await.unwrap().unwrap();
    assert_eq!(found.status, TrendStatus::Active);
}

#[tokio::test]
async fn decayed_score_is_floored_at_ten_percent_of_the_latest_score() {
    let store = memory_store().await;
    let stage = SnapshotStage::new(store.clone());
    let ninety_days_ago = Utc::now() - chrono::Duration::days(90);
    let run_id = Uuid::new_v4();
    let trend = store
        .insert_trend(Platform::TikTok, "#ancient", "ancient", None, ninety_days_ago)
        .await
        .unwrap();
    store
        .insert_trend_version(NewTrendVersion {
            trend_id: trend.id,
            version_date: ninety_days_ago.date_naive(),
            engagement_score: 1000.0,
            sentiment_polarity: 0.0,
            sentiment_label: "neutral".to_string(),
            language: "en".to_string(),
            language_confidence: 0.9,
            scraped_at: ninety_days_ago,
            run_version_id: run_id,
            decayed: false,
        })
        .await
        .unwrap();

    let thresholds = LifecycleThresholds {
        decay_rate_weekly: 0.05,
        inactive_days_threshold: 7,
        // Keep this below the age so the sweep decays rather than expires it.
        expiration_days_threshold: 365,
        archive_enabled: true,
    };
    let outcome = stage
        .decay_and_archive(Platform::TikTok, Utc::now(), thresholds, Uuid::new_v4())
        .await
        .unwrap();
    assert_eq!(outcome.decayed, 1);

    let versions = store.versions_on_date(Platform::TikTok, Utc::now().date_naive()).await.unwrap();
    let (version, _) = versions.iter().find(|(_, t)| t.id == trend.id).unwrap();
    assert!(version.engagement_score >= 100.0, "decay should never drop below 10% of the prior score");
    assert!(version.engagement_score < 1000.0, "an inactive trend's score should actually decay");
}
