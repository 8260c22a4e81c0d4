// =============================================================================
// Persisted row types (§3, §6) — mirrors the semantic schema verbatim
// =============================================================================

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ErrorKind;
use crate::etl::raw::ChangeFromPrevious;
use crate::types::{Platform, RunStatus, TrendStatus};

/// `source` row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRow {
    pub platform: Platform,
    pub display_name: String,
    pub enabled: bool,
    pub metadata: serde_json::Value,
}

/// `trend` row (§3 Trend).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendRow {
    pub id: i64,
    pub source: Platform,
    pub topic: String,
    pub normalized_topic: String,
    pub url: Option<String>,
    pub first_discovered_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub status: TrendStatus,
    pub metadata: serde_json::Value,
}

/// `trend_version` row (§3 TrendVersion).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendVersionRow {
    pub id: i64,
    pub trend_id: i64,
    pub version_date: NaiveDate,
    pub version_number: i64,
    pub engagement_score: f64,
    pub sentiment_polarity: f64,
    pub sentiment_label: String,
    pub language: String,
    pub language_confidence: f64,
    pub rank: i64,
    pub change_from_previous: Option<ChangeFromPrevious>,
    pub scraped_at: DateTime<Utc>,
    pub run_version_id: Uuid,
    pub decayed: bool,
}

/// `metric` metric_type enum (§3 Metric).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Posts,
    Views,
    Likes,
    Shares,
    Comments,
    Followers,
    EngagementRate,
    Other,
}

impl MetricType {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricType::Posts => "posts",
            MetricType::Views => "views",
            MetricType::Likes => "likes",
            MetricType::Shares => "shares",
            MetricType::Comments => "comments",
            MetricType::Followers => "followers",
            MetricType::EngagementRate => "engagement_rate",
            MetricType::Other => "other",
        }
    }

    /// Per-type cap enforced on `value` (§3): likes<=1e9, comments<=1e8,
    /// views<=1e10. Types without an explicit cap are left unbounded.
    pub fn cap(self) -> Option<u64> {
        match self {
            MetricType::Likes => Some(1_000_000_000),
            MetricType::Comments => Some(100_000_000),
            MetricType::Views => Some(10_000_000_000),
            _ => None,
        }
    }
}

/// `metric` row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricRow {
    pub trend_version_id: i64,
    pub metric_type: MetricType,
    pub value: u64,
    pub unit: &'static str,
    pub collected_at: DateTime<Utc>,
}

/// `run_log` row (§3 RunLog).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLogRow {
    pub id: i64,
    pub platform: Platform,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub records_scraped: i64,
    pub records_uploaded: i64,
    pub error_message: Option<String>,
    pub error_traceback: Option<String>,
    pub run_version_id: Uuid,
    pub metadata: serde_json::Value,
}

/// `scheduler_settings` row (§3 SchedulerSetting).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettingRow {
    pub platform: Platform,
    pub enabled: bool,
    pub frequency_hours: f64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub run_count: i64,
    pub success_count: i64,
    pub failure_count: i64,
    pub metadata: serde_json::Value,
}

impl SchedulerSettingRow {
    pub fn defaults(platform: Platform, frequency_hours: f64) -> Self {
        Self {
            platform,
            enabled: true,
            frequency_hours: frequency_hours.clamp(0.5, 24.0),
            last_run_at: None,
            next_run_at: None,
            run_count: 0,
            success_count: 0,
            failure_count: 0,
            metadata: serde_json::json!({}),
        }
    }

    /// After any update, `next_run_at = (last_run_at or now) + frequency_hours`
    /// (§3 invariant).
    pub fn recompute_next_run(&mut self) {
        let base = self.last_run_at.unwrap_or_else(Utc::now);
        self.next_run_at = Some(base + chrono::Duration::seconds((self.frequency_hours * 3600.0) as i64));
    }
}

/// `job_queue` row (§3 ProxyEntry is in-memory only; this is §6's durable
/// retry queue backing C13).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobQueueRow {
    pub id: i64,
    pub payload: serde_json::Value,
    pub attempts: i64,
    pub next_attempt_at: DateTime<Utc>,
    pub error_kind: ErrorKind,
    pub created_at: DateTime<Utc>,
}
