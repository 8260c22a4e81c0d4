// =============================================================================
// Retry / Offline Queue (C13) — §4.13
// =============================================================================
//
// A durable FIFO backed by the `job_queue` table (`Store::enqueue_job` /
// `due_jobs` / `update_job_attempt` / `delete_job`). The ETL pipeline pushes
// failed records here instead of dropping them (§4.9 step 5); this worker
// drains the queue on an interval with per-item exponential backoff.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::errors::ErrorKind;
use crate::etl::raw::TrendRecord;
use crate::etl::{DedupeStrategy, EtlPipeline};
use crate::store::models::JobQueueRow;
use crate::store::Store;
use crate::telemetry::metrics;

/// Initial backoff delay. Doubles on every failed attempt, capped at
/// [`MAX_BACKOFF`] (§4.13: 1m -> 2m -> 4m -> ... capped 32m).
const INITIAL_BACKOFF: Duration = Duration::from_secs(60);
const MAX_BACKOFF: Duration = Duration::from_secs(32 * 60);

/// An item is abandoned (logged as a permanent failure and dropped) once it
/// has been attempted this many times.
const DEFAULT_MAX_ATTEMPTS: i64 = 8;

/// How often the worker polls `due_jobs` for work.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Drains the durable retry queue. One instance is shared across the
/// process; `run_forever` is spawned as its own tokio task by the scheduler
/// (§4.11).
pub struct OfflineQueueWorker {
    store: Arc<dyn Store>,
    pipeline: EtlPipeline,
    max_attempts: i64,
    poll_interval: Duration,
}

impl OfflineQueueWorker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        let pipeline = EtlPipeline::new(store.clone(), DedupeStrategy::Update, crate::etl::DEFAULT_CHUNK_SIZE);
        Self {
            store,
            pipeline,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: i64) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Drain every job currently due. Returns the number processed
    /// (succeeded + permanently failed), used by tests and by one-shot CLI
    /// invocations (`cli worker --once`).
    pub async fn drain_once(&self) -> Result<usize, crate::errors::ClassifiedError> {
        let now = Utc::now();
        let due = self.store.due_jobs(now, 100).await?;
        let mut processed = 0;
        for job in due {
            self.process_one(job).await?;
            processed += 1;
        }
        Ok(processed)
    }

    /// Poll forever until `cancel` resolves (cooperative shutdown, §4.11).
    pub async fn run_forever(&self, mut cancel: tokio::sync::watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = cancel.changed() => {
                    if *cancel.borrow() {
                        info!("offline queue worker shutting down");
                        return;
                    }
                }
                _ = tokio::time::sleep(self.poll_interval) => {
                    if let Err(err) = self.drain_once().await {
                        warn!(error = %err, "offline queue drain failed");
                    }
                }
            }
        }
    }

    /// Replay the parked payload through the ETL pipeline. On success the
    /// job is removed; on failure it's rescheduled with backoff, or dropped
    /// permanently once `max_attempts` is exceeded (§4.13).
    async fn process_one(&self, job: JobQueueRow) -> Result<(), crate::errors::ClassifiedError> {
        let record: TrendRecord = match serde_json::from_value(job.payload.clone()) {
            Ok(r) => r,
            Err(err) => {
                // The payload itself is malformed — no amount of retrying will
                // fix it, so this is a permanent failure regardless of attempts.
                warn!(job_id = job.id, error = %err, "offline queue payload is not a valid TrendRecord, dropping");
                metrics::record_queue_permanent_failure(ErrorKind::Data.tag());
                self.store.delete_job(job.id).await?;
                return Ok(());
            }
        };

        match self.pipeline.retry_one(&record).await {
            Ok(outcome) => {
                info!(job_id = job.id, topic = %record.topic, outcome = ?outcome, "offline queue item replayed successfully");
                self.mark_succeeded(job.id).await
            }
            Err(err) => {
                if job.attempts + 1 >= self.max_attempts {
                    warn!(
                        job_id = job.id,
                        kind = %job.error_kind,
                        attempts = job.attempts + 1,
                        error = %err,
                        "offline queue item permanently failed, dropping"
                    );
                    metrics::record_queue_permanent_failure(job.error_kind.tag());
                    return self.store.delete_job(job.id).await;
                }

                let attempts = job.attempts + 1;
                let backoff = backoff_for_attempt(attempts);
                let next_attempt_at = Utc::now() + chrono::Duration::from_std(backoff).unwrap_or_default();
                warn!(job_id = job.id, attempts, error = %err, "offline queue replay failed, rescheduling");
                metrics::record_queue_retry(job.error_kind.tag());
                self.store.update_job_attempt(job.id, attempts, next_attempt_at).await
            }
        }
    }

    /// Remove a job once its payload has been successfully replayed by an
    /// external caller (e.g. the ETL pipeline re-running `load_one`).
    pub async fn mark_succeeded(&self, job_id: i64) -> Result<(), crate::errors::ClassifiedError> {
        metrics::record_queue_success();
        self.store.delete_job(job_id).await
    }
}

/// Exponential backoff for the Nth attempt: `60s * 2^(N-1)`, capped at 32m.
fn backoff_for_attempt(attempt: i64) -> Duration {
    let shift = (attempt.saturating_sub(1)).min(5) as u32;
    let secs = INITIAL_BACKOFF.as_secs().saturating_mul(1u64 << shift);
    Duration::from_secs(secs).min(MAX_BACKOFF)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::language::LanguageAggregate;
    use crate::enrich::sentiment::SentimentAggregate;
    use crate::scoring::EngagementBreakdown;
    use crate::store::SqliteStore;
    use crate::types::Platform;
    use std::collections::HashMap;

    async fn memory_store() -> Arc<dyn Store> {
        let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
        store.init_schema().await.unwrap();
        Arc::new(store)
    }

    fn record_payload(topic: &str, url: Option<&str>) -> serde_json::Value {
        let record = TrendRecord {
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
            engagement_score: 500.0,
            engagement_breakdown: EngagementBreakdown {
                raw_score: 500.0,
                normalized_score: 500.0,
                components: Vec::new(),
            },
            scraped_at: Utc::now(),
            metadata: HashMap::new(),
        };
        serde_json::to_value(record).unwrap()
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_for_attempt(1), Duration::from_secs(60));
        assert_eq!(backoff_for_attempt(2), Duration::from_secs(120));
        assert_eq!(backoff_for_attempt(3), Duration::from_secs(240));
        assert_eq!(backoff_for_attempt(10), MAX_BACKOFF);
    }

    #[tokio::test]
    async fn drain_once_replays_a_valid_payload_and_marks_it_succeeded() {
        let store = memory_store().await;
        store
            .enqueue_job(record_payload("#comeback", Some("https://tiktok.com/t/comeback")), ErrorKind::Database)
            .await
            .unwrap();

        let worker = OfflineQueueWorker::new(store.clone());
        let processed = worker.drain_once().await.unwrap();
        assert_eq!(processed, 1);

        let due = store.due_jobs(Utc::now() + chrono::Duration::hours(1), 10).await.unwrap();
        assert!(due.is_empty(), "a successful replay should remove the job, not reschedule it");
        assert!(store.find_trend(Platform::TikTok, "comeback").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn drain_once_reschedules_with_backoff_on_repeated_validation_failure() {
        let store = memory_store().await;
        // "#a" normalizes to a 1-char topic, permanently below the 2-char
        // floor — this is `DATA/validation`, which `load_one_with_retry`
        // never retries internally, so the worker's own backoff kicks in.
        store
            .enqueue_job(record_payload("#a", None), ErrorKind::Data)
            .await
            .unwrap();

        let worker = OfflineQueueWorker::new(store.clone());
        let processed = worker.drain_once().await.unwrap();
        assert_eq!(processed, 1);

        let due = store.due_jobs(Utc::now() + chrono::Duration::hours(1), 10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].attempts, 1);
    }

    #[tokio::test]
    async fn drain_once_drops_item_past_max_attempts() {
        let store = memory_store().await;
        store
            .enqueue_job(record_payload("#a", None), ErrorKind::Data)
            .await
            .unwrap();
        let worker = OfflineQueueWorker::new(store.clone()).with_max_attempts(1);

        worker.drain_once().await.unwrap();

        let due = store.due_jobs(Utc::now() + chrono::Duration::hours(1), 10).await.unwrap();
        assert!(due.is_empty(), "item should have been dropped after exceeding max attempts");
    }

    #[tokio::test]
    async fn drain_once_drops_a_malformed_payload_immediately() {
        let store = memory_store().await;
        store
            .enqueue_job(serde_json::json!({"not": "a trend record"}), ErrorKind::Data)
            .await
            .unwrap();

        let worker = OfflineQueueWorker::new(store.clone());
        let processed = worker.drain_once().await.unwrap();
        assert_eq!(processed, 1);

        let due = store.due_jobs(Utc::now() + chrono::Duration::hours(1), 10).await.unwrap();
        assert!(due.is_empty(), "an unparseable payload can never succeed, so it should be dropped on the first attempt");
    }
}
