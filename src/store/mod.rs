// =============================================================================
// Storage — `Store` trait + sqlite-backed implementation (§3, §6)
// =============================================================================
//
// The exact storage backend is an external collaborator per spec.md §1 — the
// `Store` trait is the contract the rest of the pipeline depends on; the
// bundled `SqliteStore` is the one adapter shipped with this crate (grounded
// on the pack's `sqlx` usage — see `Wolftown-io-canis/server/src/observability/storage.rs`
// for the runtime-checked-query idiom this follows, adapted from Postgres
// `$n` placeholders to sqlite `?` placeholders). Column-existence is probed
// once per store instance and cached (§4.9), mirroring the teacher's
// "resolve once, reuse" idiom for `RegimeWeights::default()`; schema
// initialization is similarly memoized per instance via `OnceCell`.
// =============================================================================

pub mod models;

use std::collections::HashSet;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};
use uuid::Uuid;

use crate::errors::{ClassifiedError, ErrorKind};
use crate::types::{Platform, RunStatus, TrendStatus};
use models::{JobQueueRow, MetricRow, RunLogRow, SchedulerSettingRow, TrendRow, TrendVersionRow};

/// Fields needed to insert a new `trend_version` row; `rank` and
/// `change_from_previous` are filled in later by the snapshot stage once the
/// whole day's batch has been ranked (§4.10).
pub struct NewTrendVersion {
    pub trend_id: i64,
    pub version_date: NaiveDate,
    pub engagement_score: f64,
    pub sentiment_polarity: f64,
    pub sentiment_label: String,
    pub language: String,
    pub language_confidence: f64,
    pub scraped_at: DateTime<Utc>,
    pub run_version_id: Uuid,
    pub decayed: bool,
}

/// Storage contract the rest of the pipeline depends on. Implemented once by
/// `SqliteStore`; a test double backed by an in-memory `Vec` lives under
/// `#[cfg(test)]` in this module for unit tests that don't need a real
/// database.
#[async_trait]
pub trait Store: Send + Sync {
    async fn init_schema(&self) -> Result<(), ClassifiedError>;

    async fn probe_columns(&self, table: &str) -> Result<HashSet<String>, ClassifiedError>;

    async fn find_trend(
        &self,
        source: Platform,
        normalized_topic: &str,
    ) -> Result<Option<TrendRow>, ClassifiedError>;

    async fn find_trend_by_url(&self, url: &str) -> Result<Option<TrendRow>, ClassifiedError>;

    /// All trends for one source, newest `last_seen_at` first. Used by the
    /// decay/archival sweep (§4.10), which must consider trends that were
    /// not touched by today's run.
    async fn list_trends(&self, source: Platform) -> Result<Vec<TrendRow>, ClassifiedError>;

    /// Hard-delete a trend and its versions/metrics (§4.10 `archive_enabled = false`).
    async fn delete_trend(&self, trend_id: i64) -> Result<(), ClassifiedError>;

    async fn insert_trend(
        &self,
        source: Platform,
        topic: &str,
        normalized_topic: &str,
        url: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<TrendRow, ClassifiedError>;

    async fn touch_trend(
        &self,
        trend_id: i64,
        last_seen_at: DateTime<Utc>,
        status: TrendStatus,
    ) -> Result<(), ClassifiedError>;

    async fn insert_trend_version(
        &self,
        new: NewTrendVersion,
    ) -> Result<TrendVersionRow, ClassifiedError>;

    async fn insert_metrics(&self, metrics: &[MetricRow]) -> Result<(), ClassifiedError>;

    /// All metric rows attached to one `trend_version`, used by the snapshot
    /// stage to diff likes/comments/views against the prior snapshot (§4.10).
    async fn metrics_for_version(&self, trend_version_id: i64) -> Result<Vec<MetricRow>, ClassifiedError>;

    async fn latest_version_before(
        &self,
        trend_id: i64,
        before: NaiveDate,
    ) -> Result<Option<TrendVersionRow>, ClassifiedError>;

    async fn max_version_number_on_date(
        &self,
        trend_id: i64,
        date: NaiveDate,
    ) -> Result<i64, ClassifiedError>;

    /// The latest `trend_version` row for `trend_id` dated exactly `date`,
    /// if one already exists — used by the ETL load step to update a
    /// same-run, same-day duplicate in place instead of minting a second
    /// version row for the day (§4.9 step 4, §8 scenario 4).
    async fn latest_version_on_date(
        &self,
        trend_id: i64,
        date: NaiveDate,
    ) -> Result<Option<TrendVersionRow>, ClassifiedError>;

    /// Overwrite the mutable fields of an existing `trend_version` row
    /// in place (engagement score, sentiment/language, scrape metadata) —
    /// the "update" half of the dedupe strategy (§4.9 step 4).
    #[allow(clippy::too_many_arguments)]
    async fn update_trend_version_fields(
        &self,
        version_id: i64,
        engagement_score: f64,
        sentiment_polarity: f64,
        sentiment_label: &str,
        language: &str,
        language_confidence: f64,
        scraped_at: DateTime<Utc>,
        run_version_id: Uuid,
    ) -> Result<(), ClassifiedError>;

    /// Remove every metric row attached to a version before re-inserting a
    /// fresh set, so an in-place update doesn't accumulate duplicate metrics.
    async fn delete_metrics_for_version(&self, trend_version_id: i64) -> Result<(), ClassifiedError>;

    /// All `(TrendVersionRow, TrendRow)` pairs for one `(source, date)`,
    /// used by the snapshot stage to rank the whole day's batch at once.
    async fn versions_on_date(
        &self,
        source: Platform,
        date: NaiveDate,
    ) -> Result<Vec<(TrendVersionRow, TrendRow)>, ClassifiedError>;

    async fn update_version_rank(
        &self,
        version_id: i64,
        rank: i64,
        change_from_previous: Option<&crate::etl::raw::ChangeFromPrevious>,
    ) -> Result<(), ClassifiedError>;

    async fn get_scheduler_setting(
        &self,
        platform: Platform,
    ) -> Result<Option<SchedulerSettingRow>, ClassifiedError>;

    async fn upsert_scheduler_setting(
        &self,
        row: &SchedulerSettingRow,
    ) -> Result<(), ClassifiedError>;

    async fn list_scheduler_settings(&self) -> Result<Vec<SchedulerSettingRow>, ClassifiedError>;

    async fn start_run(
        &self,
        platform: Platform,
        run_version_id: Uuid,
        metadata: serde_json::Value,
    ) -> Result<RunLogRow, ClassifiedError>;

    async fn finish_run(
        &self,
        run_id: i64,
        status: RunStatus,
        ended_at: DateTime<Utc>,
        records_scraped: i64,
        records_uploaded: i64,
        error_message: Option<&str>,
        error_traceback: Option<&str>,
    ) -> Result<(), ClassifiedError>;

    async fn enqueue_job(
        &self,
        payload: serde_json::Value,
        error_kind: ErrorKind,
    ) -> Result<(), ClassifiedError>;

    async fn due_jobs(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<JobQueueRow>, ClassifiedError>;

    async fn update_job_attempt(
        &self,
        id: i64,
        attempts: i64,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<(), ClassifiedError>;

    async fn delete_job(&self, id: i64) -> Result<(), ClassifiedError>;
}

/// sqlite-backed implementation. `db_dsn` is an sqlite connection string,
/// e.g. `sqlite://harvester.db` or `sqlite::memory:`.
pub struct SqliteStore {
    pool: SqlitePool,
    column_cache: tokio::sync::RwLock<std::collections::HashMap<String, HashSet<String>>>,
    schema_init: tokio::sync::OnceCell<()>,
}

impl SqliteStore {
    pub async fn connect(dsn: &str) -> Result<Self, ClassifiedError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(dsn)
            .await
            .map_err(|e| ClassifiedError::with_source(ErrorKind::Database, "connect", "failed to connect to store", e.into()))?;

        Ok(Self {
            pool,
            column_cache: tokio::sync::RwLock::new(std::collections::HashMap::new()),
            schema_init: tokio::sync::OnceCell::new(),
        })
    }

    fn status_str(status: TrendStatus) -> &'static str {
        match status {
            TrendStatus::Active => "active",
            TrendStatus::Declining => "declining",
            TrendStatus::Archived => "archived",
        }
    }

    fn run_status_str(status: RunStatus) -> &'static str {
        match status {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::CompletedWithWarnings => "completed_with_warnings",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    fn row_to_trend(row: &sqlx::sqlite::SqliteRow) -> Result<TrendRow, ClassifiedError> {
        let status_str: String = row.try_get("status").map_err(db_err)?;
        let status = match status_str.as_str() {
            "active" => TrendStatus::Active,
            "declining" => TrendStatus::Declining,
            _ => TrendStatus::Archived,
        };
        let source_str: String = row.try_get("source").map_err(db_err)?;
        let metadata_str: String = row.try_get("metadata").map_err(db_err)?;
        Ok(TrendRow {
            id: row.try_get("id").map_err(db_err)?,
            source: Platform::parse(&source_str).unwrap_or(Platform::TikTok),
            topic: row.try_get("topic").map_err(db_err)?,
            normalized_topic: row.try_get("normalized_topic").map_err(db_err)?,
            url: row.try_get("url").map_err(db_err)?,
            first_discovered_at: row.try_get("first_discovered_at").map_err(db_err)?,
            last_seen_at: row.try_get("last_seen_at").map_err(db_err)?,
            status,
            metadata: serde_json::from_str(&metadata_str).unwrap_or(serde_json::json!({})),
        })
    }

    fn row_to_version(row: &sqlx::sqlite::SqliteRow) -> Result<TrendVersionRow, ClassifiedError> {
        let version_date_str: String = row.try_get("version_date").map_err(db_err)?;
        let change_str: Option<String> = row.try_get("change_from_previous").map_err(db_err)?;
        let run_version_str: String = row.try_get("run_version_id").map_err(db_err)?;
        Ok(TrendVersionRow {
            id: row.try_get("id").map_err(db_err)?,
            trend_id: row.try_get("trend_id").map_err(db_err)?,
            version_date: NaiveDate::from_str(&version_date_str).map_err(|e| {
                ClassifiedError::with_source(ErrorKind::Database, "decode", "bad version_date", anyhow::anyhow!(e))
            })?,
            version_number: row.try_get("version_number").map_err(db_err)?,
            engagement_score: row.try_get("engagement_score").map_err(db_err)?,
            sentiment_polarity: row.try_get("sentiment_polarity").map_err(db_err)?,
            sentiment_label: row.try_get("sentiment_label").map_err(db_err)?,
            language: row.try_get("language").map_err(db_err)?,
            language_confidence: row.try_get("language_confidence").map_err(db_err)?,
            rank: row.try_get("rank").map_err(db_err)?,
            change_from_previous: change_str.and_then(|s| serde_json::from_str(&s).ok()),
            scraped_at: row.try_get("scraped_at").map_err(db_err)?,
            run_version_id: Uuid::parse_str(&run_version_str).unwrap_or_default(),
            decayed: row.try_get::<i64, _>("decayed").map_err(db_err)? != 0,
        })
    }

    fn row_to_metric(row: &sqlx::sqlite::SqliteRow) -> Result<MetricRow, ClassifiedError> {
        let type_str: String = row.try_get("metric_type").map_err(db_err)?;
        let metric_type = match type_str.as_str() {
            "posts" => models::MetricType::Posts,
            "views" => models::MetricType::Views,
            "likes" => models::MetricType::Likes,
            "shares" => models::MetricType::Shares,
            "comments" => models::MetricType::Comments,
            "followers" => models::MetricType::Followers,
            "engagement_rate" => models::MetricType::EngagementRate,
            _ => models::MetricType::Other,
        };
        let unit: String = row.try_get("metric_unit").map_err(db_err)?;
        Ok(MetricRow {
            trend_version_id: row.try_get("trend_version_id").map_err(db_err)?,
            metric_type,
            value: row.try_get::<i64, _>("metric_value").map_err(db_err)? as u64,
            unit: if unit == "count" { "count" } else { "other" },
            collected_at: row.try_get("collected_at").map_err(db_err)?,
        })
    }
}

fn db_err(e: sqlx::Error) -> ClassifiedError {
    ClassifiedError::with_source(ErrorKind::Database, "query", "storage operation failed", e.into())
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS source (
    platform TEXT PRIMARY KEY,
    display_name TEXT NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1,
    metadata TEXT NOT NULL DEFAULT '{}'
);
CREATE TABLE IF NOT EXISTS trend (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL,
    topic TEXT NOT NULL,
    normalized_topic TEXT NOT NULL,
    url TEXT,
    first_discovered_at TEXT NOT NULL,
    last_seen_at TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    metadata TEXT NOT NULL DEFAULT '{}',
    UNIQUE(source, normalized_topic)
);
CREATE TABLE IF NOT EXISTS trend_version (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    trend_id INTEGER NOT NULL REFERENCES trend(id),
    version_date TEXT NOT NULL,
    version_number INTEGER NOT NULL,
    engagement_score REAL NOT NULL,
    sentiment_polarity REAL NOT NULL,
    sentiment_label TEXT NOT NULL,
    language TEXT NOT NULL,
    language_confidence REAL NOT NULL,
    rank INTEGER NOT NULL DEFAULT 0,
    change_from_previous TEXT,
    scraped_at TEXT NOT NULL,
    run_version_id TEXT NOT NULL,
    decayed INTEGER NOT NULL DEFAULT 0,
    UNIQUE(trend_id, version_date, version_number)
);
CREATE TABLE IF NOT EXISTS metric (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    trend_version_id INTEGER NOT NULL REFERENCES trend_version(id),
    metric_type TEXT NOT NULL,
    metric_value INTEGER NOT NULL,
    metric_unit TEXT NOT NULL,
    collected_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS run_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    platform TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL,
    ended_at TEXT,
    duration_seconds REAL,
    records_scraped INTEGER NOT NULL DEFAULT 0,
    records_uploaded INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    error_traceback TEXT,
    run_version_id TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}'
);
CREATE TABLE IF NOT EXISTS scheduler_settings (
    platform TEXT PRIMARY KEY,
    enabled INTEGER NOT NULL DEFAULT 1,
    frequency_hours REAL NOT NULL CHECK (frequency_hours >= 0.5 AND frequency_hours <= 24),
    last_run_at TEXT,
    next_run_at TEXT,
    run_count INTEGER NOT NULL DEFAULT 0,
    success_count INTEGER NOT NULL DEFAULT 0,
    failure_count INTEGER NOT NULL DEFAULT 0,
    metadata TEXT NOT NULL DEFAULT '{}'
);
CREATE TABLE IF NOT EXISTS job_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    payload TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    next_attempt_at TEXT NOT NULL,
    error_kind TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;

#[async_trait]
impl Store for SqliteStore {
    async fn init_schema(&self) -> Result<(), ClassifiedError> {
        if self.schema_init.initialized() {
            return Ok(());
        }
        self.schema_init
            .get_or_try_init(|| async {
                for statement in SCHEMA_SQL.split(';').map(str::trim).filter(|s| !s.is_empty()) {
                    sqlx::query(statement).execute(&self.pool).await.map_err(db_err)?;
                }
                Ok(())
            })
            .await
            .map(|_| ())
    }

    async fn probe_columns(&self, table: &str) -> Result<HashSet<String>, ClassifiedError> {
        if let Some(cached) = self.column_cache.read().await.get(table) {
            return Ok(cached.clone());
        }

        let rows = sqlx::query(&format!("PRAGMA table_info({table})"))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        let columns: HashSet<String> = rows
            .iter()
            .filter_map(|r| r.try_get::<String, _>("name").ok())
            .collect();

        self.column_cache
            .write()
            .await
            .insert(table.to_string(), columns.clone());
        Ok(columns)
    }

    async fn find_trend(
        &self,
        source: Platform,
        normalized_topic: &str,
    ) -> Result<Option<TrendRow>, ClassifiedError> {
        let row = sqlx::query("SELECT * FROM trend WHERE source = ? AND normalized_topic = ?")
            .bind(source.as_str())
            .bind(normalized_topic)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(Self::row_to_trend).transpose()
    }

    async fn find_trend_by_url(&self, url: &str) -> Result<Option<TrendRow>, ClassifiedError> {
        let row = sqlx::query("SELECT * FROM trend WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(Self::row_to_trend).transpose()
    }

    async fn list_trends(&self, source: Platform) -> Result<Vec<TrendRow>, ClassifiedError> {
        let rows = sqlx::query("SELECT * FROM trend WHERE source = ? ORDER BY last_seen_at DESC")
            .bind(source.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(Self::row_to_trend).collect()
    }

    async fn delete_trend(&self, trend_id: i64) -> Result<(), ClassifiedError> {
        sqlx::query("DELETE FROM metric WHERE trend_version_id IN (SELECT id FROM trend_version WHERE trend_id = ?)")
            .bind(trend_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        sqlx::query("DELETE FROM trend_version WHERE trend_id = ?")
            .bind(trend_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        sqlx::query("DELETE FROM trend WHERE id = ?")
            .bind(trend_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn insert_trend(
        &self,
        source: Platform,
        topic: &str,
        normalized_topic: &str,
        url: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<TrendRow, ClassifiedError> {
        // §4.9: columns absent from storage (a pre-existing database from
        // before `url` was added to the schema) are probed once per process
        // lifetime and stripped before the write, rather than failing the
        // insert outright.
        let columns = self.probe_columns("trend").await?;
        let has_url = columns.is_empty() || columns.contains("url");

        let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> = sqlx::QueryBuilder::new(
            "INSERT INTO trend (source, topic, normalized_topic, first_discovered_at, last_seen_at, status, metadata",
        );
        if has_url {
            builder.push(", url");
        }
        builder.push(") VALUES (");
        {
            let mut sep = builder.separated(", ");
            sep.push_bind(source.as_str());
            sep.push_bind(topic);
            sep.push_bind(normalized_topic);
            sep.push_bind(now);
            sep.push_bind(now);
            sep.push_bind("active");
            sep.push_bind("{}");
            if has_url {
                sep.push_bind(url);
            }
        }
        builder.push(")");

        let id = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(db_err)?
            .last_insert_rowid();

        Ok(TrendRow {
            id,
            source,
            topic: topic.to_string(),
            normalized_topic: normalized_topic.to_string(),
            url: if has_url { url.map(str::to_string) } else { None },
            first_discovered_at: now,
            last_seen_at: now,
            status: TrendStatus::Active,
            metadata: serde_json::json!({}),
        })
    }

    async fn touch_trend(
        &self,
        trend_id: i64,
        last_seen_at: DateTime<Utc>,
        status: TrendStatus,
    ) -> Result<(), ClassifiedError> {
        sqlx::query("UPDATE trend SET last_seen_at = ?, status = ? WHERE id = ?")
            .bind(last_seen_at)
            .bind(Self::status_str(status))
            .bind(trend_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn insert_trend_version(
        &self,
        new: NewTrendVersion,
    ) -> Result<TrendVersionRow, ClassifiedError> {
        let version_number = self.max_version_number_on_date(new.trend_id, new.version_date).await? + 1;

        let columns = self.probe_columns("trend_version").await?;
        let has_decayed = columns.is_empty() || columns.contains("decayed");

        let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> = sqlx::QueryBuilder::new(
            "INSERT INTO trend_version \
             (trend_id, version_date, version_number, engagement_score, sentiment_polarity, \
              sentiment_label, language, language_confidence, rank, change_from_previous, \
              scraped_at, run_version_id",
        );
        if has_decayed {
            builder.push(", decayed");
        }
        builder.push(") VALUES (");
        {
            let mut sep = builder.separated(", ");
            sep.push_bind(new.trend_id);
            sep.push_bind(new.version_date.to_string());
            sep.push_bind(version_number);
            sep.push_bind(new.engagement_score);
            sep.push_bind(new.sentiment_polarity);
            sep.push_bind(new.sentiment_label.clone());
            sep.push_bind(new.language.clone());
            sep.push_bind(new.language_confidence);
            sep.push_bind(0i64); // rank
            sep.push_bind(Option::<String>::None); // change_from_previous
            sep.push_bind(new.scraped_at);
            sep.push_bind(new.run_version_id.to_string());
            if has_decayed {
                sep.push_bind(new.decayed);
            }
        }
        builder.push(")");

        let id = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(db_err)?
            .last_insert_rowid();

        Ok(TrendVersionRow {
            id,
            trend_id: new.trend_id,
            version_date: new.version_date,
            version_number,
            engagement_score: new.engagement_score,
            sentiment_polarity: new.sentiment_polarity,
            sentiment_label: new.sentiment_label,
            language: new.language,
            language_confidence: new.language_confidence,
            rank: 0,
            change_from_previous: None,
            scraped_at: new.scraped_at,
            run_version_id: new.run_version_id,
            decayed: has_decayed && new.decayed,
        })
    }

    async fn insert_metrics(&self, metrics: &[MetricRow]) -> Result<(), ClassifiedError> {
        let columns = self.probe_columns("metric").await?;
        let has_unit = columns.is_empty() || columns.contains("metric_unit");

        for m in metrics {
            let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> =
                sqlx::QueryBuilder::new("INSERT INTO metric (trend_version_id, metric_type, metric_value, collected_at");
            if has_unit {
                builder.push(", metric_unit");
            }
            builder.push(") VALUES (");
            {
                let mut sep = builder.separated(", ");
                sep.push_bind(m.trend_version_id);
                sep.push_bind(m.metric_type.as_str());
                sep.push_bind(m.value as i64);
                sep.push_bind(m.collected_at);
                if has_unit {
                    sep.push_bind(m.unit);
                }
            }
            builder.push(")");
            builder.build().execute(&self.pool).await.map_err(db_err)?;
        }
        Ok(())
    }

    async fn metrics_for_version(&self, trend_version_id: i64) -> Result<Vec<MetricRow>, ClassifiedError> {
        let rows = sqlx::query(
            "SELECT * FROM metric WHERE trend_version_id = ?",
        )
        .bind(trend_version_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(Self::row_to_metric).collect()
    }

    async fn latest_version_before(
        &self,
        trend_id: i64,
        before: NaiveDate,
    ) -> Result<Option<TrendVersionRow>, ClassifiedError> {
        let row = sqlx::query(
            "SELECT * FROM trend_version WHERE trend_id = ? AND version_date < ? \
             ORDER BY version_date DESC, version_number DESC LIMIT 1",
        )
        .bind(trend_id)
        .bind(before.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(Self::row_to_version).transpose()
    }

    async fn max_version_number_on_date(
        &self,
        trend_id: i64,
        date: NaiveDate,
    ) -> Result<i64, ClassifiedError> {
        let row = sqlx::query(
            "SELECT COALESCE(MAX(version_number), 0) AS max_vn FROM trend_version \
             WHERE trend_id = ? AND version_date = ?",
        )
        .bind(trend_id)
        .bind(date.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        row.try_get("max_vn").map_err(db_err)
    }

    async fn latest_version_on_date(
        &self,
        trend_id: i64,
        date: NaiveDate,
    ) -> Result<Option<TrendVersionRow>, ClassifiedError> {
        let row = sqlx::query(
            "SELECT * FROM trend_version WHERE trend_id = ? AND version_date = ? \
             ORDER BY version_number DESC LIMIT 1",
        )
        .bind(trend_id)
        .bind(date.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(Self::row_to_version).transpose()
    }

    async fn update_trend_version_fields(
        &self,
        version_id: i64,
        engagement_score: f64,
        sentiment_polarity: f64,
        sentiment_label: &str,
        language: &str,
        language_confidence: f64,
        scraped_at: DateTime<Utc>,
        run_version_id: Uuid,
    ) -> Result<(), ClassifiedError> {
        sqlx::query(
            "UPDATE trend_version SET engagement_score = ?, sentiment_polarity = ?, \
             sentiment_label = ?, language = ?, language_confidence = ?, scraped_at = ?, \
             run_version_id = ? WHERE id = ?",
        )
        .bind(engagement_score)
        .bind(sentiment_polarity)
        .bind(sentiment_label)
        .bind(language)
        .bind(language_confidence)
        .bind(scraped_at)
        .bind(run_version_id.to_string())
        .bind(version_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn delete_metrics_for_version(&self, trend_version_id: i64) -> Result<(), ClassifiedError> {
        sqlx::query("DELETE FROM metric WHERE trend_version_id = ?")
            .bind(trend_version_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn versions_on_date(
        &self,
        source: Platform,
        date: NaiveDate,
    ) -> Result<Vec<(TrendVersionRow, TrendRow)>, ClassifiedError> {
        let rows = sqlx::query(
            "SELECT tv.*, t.id AS t_id FROM trend_version tv \
             JOIN trend t ON t.id = tv.trend_id \
             WHERE t.source = ? AND tv.version_date = ? \
             AND tv.version_number = (SELECT MAX(version_number) FROM trend_version WHERE trend_id = tv.trend_id AND version_date = tv.version_date)",
        )
        .bind(source.as_str())
        .bind(date.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let version = Self::row_to_version(row)?;
            let trend_row = sqlx::query("SELECT * FROM trend WHERE id = ?")
                .bind(version.trend_id)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;
            out.push((version, Self::row_to_trend(&trend_row)?));
        }
        Ok(out)
    }

    async fn update_version_rank(
        &self,
        version_id: i64,
        rank: i64,
        change_from_previous: Option<&crate::etl::raw::ChangeFromPrevious>,
    ) -> Result<(), ClassifiedError> {
        let change_json = change_from_previous.map(|c| serde_json::to_string(c).unwrap_or_default());
        sqlx::query("UPDATE trend_version SET rank = ?, change_from_previous = ? WHERE id = ?")
            .bind(rank)
            .bind(change_json)
            .bind(version_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_scheduler_setting(
        &self,
        platform: Platform,
    ) -> Result<Option<SchedulerSettingRow>, ClassifiedError> {
        let row = sqlx::query("SELECT * FROM scheduler_settings WHERE platform = ?")
            .bind(platform.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(|r| row_to_setting(&r)).transpose()
    }

    async fn upsert_scheduler_setting(&self, row: &SchedulerSettingRow) -> Result<(), ClassifiedError> {
        sqlx::query(
            "INSERT INTO scheduler_settings \
             (platform, enabled, frequency_hours, last_run_at, next_run_at, run_count, success_count, failure_count, metadata) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(platform) DO UPDATE SET \
               enabled = excluded.enabled, frequency_hours = excluded.frequency_hours, \
               last_run_at = excluded.last_run_at, next_run_at = excluded.next_run_at, \
               run_count = excluded.run_count, success_count = excluded.success_count, \
               failure_count = excluded.failure_count, metadata = excluded.metadata",
        )
        .bind(row.platform.as_str())
        .bind(row.enabled)
        .bind(row.frequency_hours)
        .bind(row.last_run_at)
        .bind(row.next_run_at)
        .bind(row.run_count)
        .bind(row.success_count)
        .bind(row.failure_count)
        .bind(row.metadata.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn list_scheduler_settings(&self) -> Result<Vec<SchedulerSettingRow>, ClassifiedError> {
        let rows = sqlx::query("SELECT * FROM scheduler_settings")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_setting).collect()
    }

    async fn start_run(
        &self,
        platform: Platform,
        run_version_id: Uuid,
        metadata: serde_json::Value,
    ) -> Result<RunLogRow, ClassifiedError> {
        let started_at = Utc::now();
        let id = sqlx::query(
            "INSERT INTO run_log (platform, status, started_at, records_scraped, records_uploaded, run_version_id, metadata) \
             VALUES (?, 'running', ?, 0, 0, ?, ?)",
        )
        .bind(platform.as_str())
        .bind(started_at)
        .bind(run_version_id.to_string())
        .bind(metadata.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?
        .last_insert_rowid();

        Ok(RunLogRow {
            id,
            platform,
            status: RunStatus::Running,
            started_at,
            ended_at: None,
            duration_seconds: None,
            records_scraped: 0,
            records_uploaded: 0,
            error_message: None,
            error_traceback: None,
            run_version_id,
            metadata,
        })
    }

    async fn finish_run(
        &self,
        run_id: i64,
        status: RunStatus,
        ended_at: DateTime<Utc>,
        records_scraped: i64,
        records_uploaded: i64,
        error_message: Option<&str>,
        error_traceback: Option<&str>,
    ) -> Result<(), ClassifiedError> {
        // Idempotent on terminal status: a second finish_run for an already
        // non-running row is a no-op (C12).
        let current: Option<String> = sqlx::query("SELECT status FROM run_log WHERE id = ?")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .and_then(|r| r.try_get("status").ok());
        if current.as_deref() != Some("running") {
            return Ok(());
        }

        let started_at: DateTime<Utc> = sqlx::query("SELECT started_at FROM run_log WHERE id = ?")
            .bind(run_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?
            .try_get("started_at")
            .map_err(db_err)?;
        let duration_seconds = (ended_at - started_at).num_milliseconds() as f64 / 1000.0;

        sqlx::query(
            "UPDATE run_log SET status = ?, ended_at = ?, duration_seconds = ?, records_scraped = ?, \
             records_uploaded = ?, error_message = ?, error_traceback = ? WHERE id = ?",
        )
        .bind(Self::run_status_str(status))
        .bind(ended_at)
        .bind(duration_seconds)
        .bind(records_scraped)
        .bind(records_uploaded)
        .bind(error_message)
        .bind(error_traceback)
        .bind(run_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn enqueue_job(
        &self,
        payload: serde_json::Value,
        error_kind: ErrorKind,
    ) -> Result<(), ClassifiedError> {
        sqlx::query(
            "INSERT INTO job_queue (payload, attempts, next_attempt_at, error_kind, created_at) \
             VALUES (?, 0, ?, ?, ?)",
        )
        .bind(payload.to_string())
        .bind(Utc::now())
        .bind(error_kind.tag())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn due_jobs(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<JobQueueRow>, ClassifiedError> {
        let rows = sqlx::query("SELECT * FROM job_queue WHERE next_attempt_at <= ? ORDER BY id LIMIT ?")
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.iter()
            .map(|r| {
                let payload_str: String = r.try_get("payload").map_err(db_err)?;
                let kind_str: String = r.try_get("error_kind").map_err(db_err)?;
                Ok(JobQueueRow {
                    id: r.try_get("id").map_err(db_err)?,
                    payload: serde_json::from_str(&payload_str).unwrap_or(serde_json::json!({})),
                    attempts: r.try_get("attempts").map_err(db_err)?,
                    next_attempt_at: r.try_get("next_attempt_at").map_err(db_err)?,
                    error_kind: parse_error_kind(&kind_str),
                    created_at: r.try_get("created_at").map_err(db_err)?,
                })
            })
            .collect()
    }

    async fn update_job_attempt(
        &self,
        id: i64,
        attempts: i64,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<(), ClassifiedError> {
        sqlx::query("UPDATE job_queue SET attempts = ?, next_attempt_at = ? WHERE id = ?")
            .bind(attempts)
            .bind(next_attempt_at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn delete_job(&self, id: i64) -> Result<(), ClassifiedError> {
        sqlx::query("DELETE FROM job_queue WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

fn row_to_setting(row: &sqlx::sqlite::SqliteRow) -> Result<SchedulerSettingRow, ClassifiedError> {
    let platform_str: String = row.try_get("platform").map_err(db_err)?;
    let metadata_str: String = row.try_get("metadata").map_err(db_err)?;
    Ok(SchedulerSettingRow {
        platform: Platform::parse(&platform_str).unwrap_or(Platform::TikTok),
        enabled: row.try_get::<i64, _>("enabled").map_err(db_err)? != 0,
        frequency_hours: row.try_get("frequency_hours").map_err(db_err)?,
        last_run_at: row.try_get("last_run_at").map_err(db_err)?,
        next_run_at: row.try_get("next_run_at").map_err(db_err)?,
        run_count: row.try_get("run_count").map_err(db_err)?,
        success_count: row.try_get("success_count").map_err(db_err)?,
        failure_count: row.try_get("failure_count").map_err(db_err)?,
        metadata: serde_json::from_str(&metadata_str).unwrap_or(serde_json::json!({})),
    })
}

fn parse_error_kind(s: &str) -> ErrorKind {
    match s {
        "AUTH" => ErrorKind::Auth,
        "NETWORK" => ErrorKind::Network,
        "TIMEOUT" => ErrorKind::Timeout,
        "PROXY" => ErrorKind::Proxy,
        "RATE_LIMIT" => ErrorKind::RateLimit,
        "SCRAPE" => ErrorKind::Scrape,
        "DATA" => ErrorKind::Data,
        "DATABASE" => ErrorKind::Database,
        "CONFIG" => ErrorKind::Config,
        _ => ErrorKind::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> SqliteStore {
        let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
        store.init_schema().await.unwrap();
        store
    }

    #[tokio::test]
    async fn insert_and_find_trend_round_trips() {
        let store = memory_store().await;
        let now = Utc::now();
        let inserted = store
            .insert_trend(Platform::TikTok, "#Viral", "viral", Some("https://tiktok.com/x"), now)
            .await
            .unwrap();
        let found = store.find_trend(Platform::TikTok, "viral").await.unwrap().unwrap();
        assert_eq!(inserted.id, found.id);
        assert_eq!(found.status, TrendStatus::Active);
    }

    #[tokio::test]
    async fn trend_versions_increment_monotonically_per_day() {
        let store = memory_store().await;
        let now = Utc::now();
        let trend = store.insert_trend(Platform::TikTok, "#a", "a", None, now).await.unwrap();
        let date = now.date_naive();

        let v1 = store
            .insert_trend_version(NewTrendVersion {
                trend_id: trend.id,
                version_date: date,
                engagement_score: 10.0,
                sentiment_polarity: 0.0,
                sentiment_label: "neutral".to_string(),
                language: "en".to_string(),
                language_confidence: 0.9,
                scraped_at: now,
                run_version_id: Uuid::new_v4(),
                decayed: false,
            })
            .await
            .unwrap();
        let v2 = store
            .insert_trend_version(NewTrendVersion {
                trend_id: trend.id,
                version_date: date,
                engagement_score: 20.0,
                sentiment_polarity: 0.0,
                sentiment_label: "neutral".to_string(),
                language: "en".to_string(),
                language_confidence: 0.9,
                scraped_at: now,
                run_version_id: Uuid::new_v4(),
                decayed: false,
            })
            .await
            .unwrap();
        assert_eq!(v1.version_number, 1);
        assert_eq!(v2.version_number, 2);
    }

    #[tokio::test]
    async fn scheduler_setting_upsert_updates_in_place() {
        let store = memory_store().await;
        let mut row = SchedulerSettingRow::defaults(Platform::YouTube, 4.0);
        store.upsert_scheduler_setting(&row).await.unwrap();
        row.frequency_hours = 2.5;
        store.upsert_scheduler_setting(&row).await.unwrap();

        let fetched = store.get_scheduler_setting(Platform::YouTube).await.unwrap().unwrap();
        assert_eq!(fetched.frequency_hours, 2.5);
    }

    #[tokio::test]
    async fn job_queue_enqueue_and_drain() {
        let store = memory_store().await;
        store
            .enqueue_job(serde_json::json!({"topic": "x"}), ErrorKind::Database)
            .await
            .unwrap();
        let due = store.due_jobs(Utc::now() + chrono::Duration::seconds(1), 10).await.unwrap();
        assert_eq!(due.len(), 1);
        store.delete_job(due[0].id).await.unwrap();
        let due = store.due_jobs(Utc::now() + chrono::Duration::seconds(1), 10).await.unwrap();
        assert!(due.is_empty());
    }
}
