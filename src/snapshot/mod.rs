// =============================================================================
// Snapshot & Lifecycle (C10) — §4.10
// =============================================================================
//
// Two independent passes, both run once per source per scheduler tick after
// the ETL load has finished:
//
//   `rank_and_diff`  ranks every trend touched by today's run and attaches
//                    `change_from_previous` (step 1-5).
//   `decay_and_archive` sweeps every non-archived trend for the source,
//                    including ones *not* touched today, and applies decay
//                    or archival purely off `last_seen_at` age.
//
// Grounded on `tombelieber-claude-view`'s `TrendMetric` ranking/delta pass
// for the overall "rank the whole batch, diff against the prior snapshot"
// shape; the decay formula and thresholds are spec-defined, not teacher-derived.
// =============================================================================

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::errors::ClassifiedError;
use crate::etl::raw::{ChangeFromPrevious, FieldChange};
use crate::store::models::{MetricRow, MetricType, TrendVersionRow};
use crate::store::{NewTrendVersion, Store};
use crate::types::{Platform, TrendStatus};

/// Outcome of one `rank_and_diff` pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct RankOutcome {
    pub ranked: usize,
}

/// Outcome of one `decay_and_archive` sweep.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecayOutcome {
    pub decayed: usize,
    pub archived: usize,
    pub deleted: usize,
}

/// Lifecycle thresholds the sweep needs; mirrors the relevant subset of
/// [`crate::config::ResolvedConfig`] so the stage doesn't need the whole
/// config struct threaded through it.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleThresholds {
    pub decay_rate_weekly: f64,
    pub inactive_days_threshold: i64,
    pub expiration_days_threshold: i64,
    pub archive_enabled: bool,
}

impl From<&crate::config::ResolvedConfig> for LifecycleThresholds {
    fn from(cfg: &crate::config::ResolvedConfig) -> Self {
        Self {
            decay_rate_weekly: cfg.decay_rate_weekly,
            inactive_days_threshold: cfg.inactive_days_threshold,
            expiration_days_threshold: cfg.expiration_days_threshold,
            archive_enabled: cfg.archive_enabled,
        }
    }
}

pub struct SnapshotStage {
    store: Arc<dyn Store>,
}

impl SnapshotStage {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// §4.10 steps 1-5: rank every trend version dated `version_date` for
    /// `source`, compute `change_from_previous`, and re-touch the owning
    /// trend as seen (status resets to `active` — being present in today's
    /// batch is the "explicit re-seen event" P10 requires).
    pub async fn rank_and_diff(
        &self,
        source: Platform,
        version_date: NaiveDate,
    ) -> Result<RankOutcome, ClassifiedError> {
        let mut pairs = self.store.versions_on_date(source, version_date).await?;

        // Rank totality (P2): descending score, ties broken alphabetically by
        // normalized_topic so the permutation is reproducible.
        pairs.sort_by(|(va, ta), (vb, tb)| {
            vb.engagement_score
                .partial_cmp(&va.engagement_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| ta.normalized_topic.cmp(&tb.normalized_topic))
        });

        let mut ranked = 0usize;
        for (idx, (version, trend)) in pairs.iter().enumerate() {
            let rank = (idx + 1) as i64;
            let previous = self.store.latest_version_before(trend.id, version_date).await?;

            let change = match &previous {
                Some(prev) => Some(self.build_change(prev, version, rank).await?),
                None => None,
            };

            self.store
                .update_version_rank(version.id, rank, change.as_ref())
                .await?;
            self.store
                .touch_trend(trend.id, version.scraped_at, TrendStatus::Active)
                .await?;
            ranked += 1;
        }

        Ok(RankOutcome { ranked })
    }

    async fn build_change(
        &self,
        previous: &TrendVersionRow,
        current: &TrendVersionRow,
        current_rank: i64,
    ) -> Result<ChangeFromPrevious, ClassifiedError> {
        let previous_metrics = self.store.metrics_for_version(previous.id).await?;
        let current_metrics = self.store.metrics_for_version(current.id).await?;

        Ok(ChangeFromPrevious {
            engagement_score: FieldChange::compute(previous.engagement_score, current.engagement_score),
            likes: FieldChange::compute(
                metric_value(&previous_metrics, MetricType::Likes),
                metric_value(&current_metrics, MetricType::Likes),
            ),
            comments: FieldChange::compute(
                metric_value(&previous_metrics, MetricType::Comments),
                metric_value(&current_metrics, MetricType::Comments),
            ),
            views: FieldChange::compute(
                metric_value(&previous_metrics, MetricType::Views),
                metric_value(&current_metrics, MetricType::Views),
            ),
            rank: FieldChange::compute(previous.rank as f64, current_rank as f64),
        })
    }

    /// §4.10 decay & archival: runs after the ranking pass, over *every*
    /// non-archived trend for `source` — including ones absent from today's
    /// run, since those are exactly the ones that can go stale.
    pub async fn decay_and_archive(
        &self,
        source: Platform,
        now: DateTime<Utc>,
        thresholds: LifecycleThresholds,
        run_version_id: Uuid,
    ) -> Result<DecayOutcome, ClassifiedError> {
        let trends = self.store.list_trends(source).await?;
        let mut outcome = DecayOutcome::default();

        for trend in trends {
            if trend.status == TrendStatus::Archived {
                continue;
            }

            let inactive_days = (now - trend.last_seen_at).num_days();

            if inactive_days > thresholds.expiration_days_threshold {
                if thresholds.archive_enabled {
                    self.store.touch_trend(trend.id, trend.last_seen_at, TrendStatus::Archived).await?;
                    outcome.archived += 1;
                } else {
                    self.store.delete_trend(trend.id).await?;
                    outcome.deleted += 1;
                }
                continue;
            }

            if inactive_days > thresholds.inactive_days_threshold {
                let cutoff = now.date_naive() + chrono::Duration::days(1);
                if let Some(latest) = self.store.latest_version_before(trend.id, cutoff).await? {
                    // Already decayed today (e.g. a platform on a sub-daily
                    // `frequency_hours` already swept this trend once this
                    // day) — decay applies once per day, not once per run.
                    if latest.version_date == now.date_naive() {
                        continue;
                    }
                    let weeks_inactive = (inactive_days as f64 / 7.0).max(1.0);
                    let decayed_score = (latest.engagement_score * (1.0 - thresholds.decay_rate_weekly).powf(weeks_inactive))
                        .max(latest.engagement_score * 0.1);

                    self.store
                        .insert_trend_version(NewTrendVersion {
                            trend_id: trend.id,
                            version_date: now.date_naive(),
                            engagement_score: decayed_score,
                            sentiment_polarity: latest.sentiment_polarity,
                            sentiment_label: latest.sentiment_label.clone(),
                            language: latest.language.clone(),
                            language_confidence: latest.language_confidence,
                            scraped_at: now,
                            run_version_id,
                            decayed: true,
                        })
                        .await?;
                    outcome.decayed += 1;
                }
                self.store.touch_trend(trend.id, trend.last_seen_at, TrendStatus::Declining).await?;
            }
        }

        Ok(outcome)
    }
}

fn metric_value(metrics: &[MetricRow], want: MetricType) -> f64 {
    metrics
        .iter()
        .find(|m| m.metric_type == want)
        .map(|m| m.value as f64)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etl::raw::Direction;
    use crate::store::models::{MetricRow, MetricType};
    use crate::store::SqliteStore;
    use uuid::Uuid;

    async fn memory_store() -> Arc<dyn Store> {
        let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
        store.init_schema().await.unwrap();
        Arc::new(store)
    }

    #[tokio::test]
    async fn rank_and_diff_orders_by_score_with_alphabetical_tiebreak() {
        let store = memory_store().await;
        let stage = SnapshotStage::new(store.clone());
        let now = Utc::now();
        let run_id = Uuid::new_v4();

        let a = store.insert_trend(Platform::TikTok, "#zeta", "zeta", None, now).await.unwrap();
        let b = store.insert_trend(Platform::TikTok, "#alpha", "alpha", None, now).await.unwrap();

        for (trend, score) in [(&a, 50.0), (&b, 50.0)] {
            store
                .insert_trend_version(NewTrendVersion {
                    trend_id: trend.id,
                    version_date: now.date_naive(),
                    engagement_score: score,
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
        }

        let outcome = stage.rank_and_diff(Platform::TikTok, now.date_naive()).await.unwrap();
        assert_eq!(outcome.ranked, 2);

        let versions = store.versions_on_date(Platform::TikTok, now.date_naive()).await.unwrap();
        let alpha_version = versions.iter().find(|(_, t)| t.normalized_topic == "alpha").unwrap();
        assert_eq!(alpha_version.0.rank, 1, "alphabetically-first topic wins a tied score");
    }

    #[tokio::test]
    async fn rank_and_diff_computes_change_from_previous() {
        let store = memory_store().await;
        let stage = SnapshotStage::new(store.clone());
        let day1 = Utc::now() - chrono::Duration::days(1);
        let day2 = Utc::now();
        let run_id = Uuid::new_v4();

        let trend = store.insert_trend(Platform::TikTok, "#viral", "viral", None, day1).await.unwrap();
        let v1 = store
            .insert_trend_version(NewTrendVersion {
                trend_id: trend.id,
                version_date: day1.date_naive(),
                engagement_score: 1000.0,
                sentiment_polarity: 0.0,
                sentiment_label: "neutral".to_string(),
                language: "en".to_string(),
                language_confidence: 0.9,
                scraped_at: day1,
                run_version_id: run_id,
                decayed: false,
            })
            .await
            .unwrap();
        store
            .insert_metrics(&[MetricRow {
                trend_version_id: v1.id,
                metric_type: MetricType::Likes,
                value: 100,
                unit: "count",
                collected_at: day1,
            }])
            .await
            .unwrap();
        stage.rank_and_diff(Platform::TikTok, day1.date_naive()).await.unwrap();

        let v2 = store
            .insert_trend_version(NewTrendVersion {
                trend_id: trend.id,
                version_date: day2.date_naive(),
                engagement_score: 1500.0,
                sentiment_polarity: 0.0,
                sentiment_label: "neutral".to_string(),
                language: "en".to_string(),
                language_confidence: 0.9,
                scraped_at: day2,
                run_version_id: run_id,
                decayed: false,
            })
            .await
            .unwrap();
        store
            .insert_metrics(&[MetricRow {
                trend_version_id: v2.id,
                metric_type: MetricType::Likes,
                value: 200,
                unit: "count",
                collected_at: day2,
            }])
            .await
            .unwrap();

        stage.rank_and_diff(Platform::TikTok, day2.date_naive()).await.unwrap();

        let versions = store.versions_on_date(Platform::TikTok, day2.date_naive()).await.unwrap();
        let (version, _) = &versions[0];
        let change = version.change_from_previous.as_ref().expect("change should be present");
        assert_eq!(change.engagement_score.direction, Direction::Up);
        assert_eq!(change.likes.previous, 100.0);
        assert_eq!(change.likes.current, 200.0);
    }

    #[tokio::test]
    async fn decay_and_archive_archives_stale_trends() {
        let store = memory_store().await;
        let stage = SnapshotStage::new(store.clone());
        let long_ago = Utc::now() - chrono::Duration::days(60);
        let trend = store.insert_trend(Platform::TikTok, "#old", "old", None, long_ago).await.unwrap();

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
        assert_eq!(outcome.archived, 1);

        let found = store.find_trend(Platform::TikTok, &trend.normalized_topic).await.unwrap().unwrap();
        assert_eq!(found.status, TrendStatus::Archived);
    }

    #[tokio::test]
    async fn decay_and_archive_decays_inactive_but_not_expired_trends() {
        let store = memory_store().await;
        let stage = SnapshotStage::new(store.clone());
        let ten_days_ago = Utc::now() - chrono::Duration::days(10);
        let run_id = Uuid::new_v4();
        let trend = store.insert_trend(Platform::TikTok, "#fading", "fading", None, ten_days_ago).await.unwrap();
        store
            .insert_trend_version(NewTrendVersion {
                trend_id: trend.id,
                version_date: ten_days_ago.date_naive(),
                engagement_score: 10000.0,
                sentiment_polarity: 0.0,
                sentiment_label: "neutral".to_string(),
                language: "en".to_string(),
                language_confidence: 0.9,
                scraped_at: ten_days_ago,
                run_version_id: run_id,
                decayed: false,
            })
            .await
            .unwrap();

        let thresholds = LifecycleThresholds {
            decay_rate_weekly: 0.05,
            inactive_days_threshold: 7,
            expiration_days_threshold: 30,
            archive_enabled: true,
        };
        let outcome = stage
            .decay_and_archive(Platform::TikTok, Utc::now(), thresholds, run_id)
            .await
            .unwrap();
        assert_eq!(outcome.decayed, 1);

        let found = store.find_trend(Platform::TikTok, "fading").await.unwrap().unwrap();
        assert_eq!(found.status, TrendStatus::Declining);
    }
}
