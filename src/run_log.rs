// =============================================================================
// Run Logger (C12) — §4.12
// =============================================================================
//
// Thin wrapper over `Store::start_run` / `finish_run`. `finish_run` is
// already idempotent on terminal status at the storage layer (a second call
// against an already-finished row is a no-op) — this module's job is just to
// give the scheduler a typed, single-purpose handle and to emit
// `scraper_runs_total{platform,outcome}` on the terminal transition, per
// spec.
// =============================================================================

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::errors::ClassifiedError;
use crate::store::Store;
use crate::telemetry::metrics;
use crate::types::{Platform, RunStatus};

/// One in-flight run. Created by [`RunLogger::start`], finalized exactly
/// once by [`RunLogger::finish`].
pub struct RunHandle {
    pub run_id: i64,
    pub run_version_id: Uuid,
    pub platform: Platform,
}

pub struct RunLogger {
    store: Arc<dyn Store>,
}

impl RunLogger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Start a new run: allocate a `run_version_id`, write a `running`
    /// RunLog row (§4.11 "On run start").
    pub async fn start(&self, platform: Platform, metadata: serde_json::Value) -> Result<RunHandle, ClassifiedError> {
        let run_version_id = Uuid::new_v4();
        let row = self.store.start_run(platform, run_version_id, metadata).await?;
        Ok(RunHandle {
            run_id: row.id,
            run_version_id,
            platform,
        })
    }

    /// Finalize a run. `outcome` is the Prometheus-facing label
    /// (`completed`, `completed_with_warnings`, `failed`, `cancelled`).
    pub async fn finish(
        &self,
        handle: &RunHandle,
        status: RunStatus,
        records_scraped: i64,
        records_uploaded: i64,
        error: Option<&ClassifiedError>,
    ) -> Result<(), ClassifiedError> {
        let (error_message, error_traceback) = match error {
            Some(e) => (Some(e.message.clone()), Some(format!("{e:#}"))),
            None => (None, None),
        };

        self.store
            .finish_run(
                handle.run_id,
                status,
                Utc::now(),
                records_scraped,
                records_uploaded,
                error_message.as_deref(),
                error_traceback.as_deref(),
            )
            .await?;

        metrics::record_run(handle.platform.as_str(), outcome_label(status));
        Ok(())
    }
}

fn outcome_label(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Running => "running",
        RunStatus::Completed => "completed",
        RunStatus::CompletedWithWarnings => "completed_with_warnings",
        RunStatus::Failed => "failed",
        RunStatus::Cancelled => "cancelled",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;

    async fn memory_store() -> Arc<dyn Store> {
        let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
        store.init_schema().await.unwrap();
        Arc::new(store)
    }

    #[tokio::test]
    async fn start_then_finish_round_trips() {
        let store = memory_store().await;
        let logger = RunLogger::new(store.clone());
        let handle = logger.start(Platform::TikTok, serde_json::json!({})).await.unwrap();
        logger.finish(&handle, RunStatus::Completed, 10, 9, None).await.unwrap();

        // Second finish on the same handle must be a no-op, not an error.
        logger.finish(&handle, RunStatus::Failed, 0, 0, None).await.unwrap();
    }
}
