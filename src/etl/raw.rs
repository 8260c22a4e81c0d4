// =============================================================================
// Raw payload types — RawTrend / EngagementSample / EnrichedTrend / TrendRecord
// =============================================================================
//
// §9's "sum type for the adapter's raw emission" replaces the original
// system's dynamically-typed dicts: every stage from `discover()` through
// `aggregate()` (§4.6) passes one of these explicit, tagged structs instead
// of a raw map. Platform-specific extras that don't fit the named fields
// live in `metadata`, a typed string->string map with documented keys,
// never an untyped blob.
// =============================================================================

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enrich::language::LanguageAggregate;
use crate::enrich::sentiment::SentimentAggregate;
use crate::scoring::EngagementBreakdown;
use crate::types::Platform;

/// Content type of one sampled post (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Photo,
    Video,
    Reel,
    Carousel,
    Post,
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ContentType::Photo => "photo",
            ContentType::Video => "video",
            ContentType::Reel => "reel",
            ContentType::Carousel => "carousel",
            ContentType::Post => "post",
        };
        write!(f, "{s}")
    }
}

/// Rough engagement numbers as scraped from a discovery page, before any
/// sample item has been individually visited. Fields are optional: a
/// discovery surface rarely exposes everything `enrich()` later fills in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEngagement {
    pub posts: Option<u64>,
    pub views: Option<u64>,
}

/// One candidate trend surfaced by `discover()` (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTrend {
    pub topic: String,
    pub url: Option<String>,
    pub raw_engagement: RawEngagement,
    /// Up to N sample-post URLs/ids `enrich()` will visit.
    pub sample_post_refs: Vec<String>,
}

/// One sample item's extracted metrics, produced by visiting a single
/// sample-post reference during `enrich()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementSample {
    pub likes: u64,
    pub comments: u64,
    pub shares: u64,
    pub views: u64,
    pub followers: Option<u64>,
    pub caption: Option<String>,
    pub content_type: ContentType,
    pub language_hint: Option<String>,
    pub collected_at: DateTime<Utc>,
}

/// The fully enriched per-topic payload after visiting up to N samples
/// (default 3, §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedTrend {
    pub topic: String,
    pub url: Option<String>,
    pub samples: Vec<EngagementSample>,
    pub metadata: HashMap<String, String>,
}

/// Per-topic content-type distribution, counted across all samples.
pub type ContentTypeDistribution = HashMap<ContentType, u32>;

/// One fully aggregated record ready for the ETL pipeline (§4.6 `aggregate`
/// output, §4.9 `Extract` input).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendRecord {
    pub source: Platform,
    pub topic: String,
    pub url: Option<String>,
    pub sample_count: usize,
    pub avg_likes: f64,
    pub avg_comments: f64,
    pub avg_shares: f64,
    pub avg_views: f64,
    pub audience_size: Option<u64>,
    pub content_type_distribution: ContentTypeDistribution,
    pub sentiment: SentimentAggregate,
    pub language: LanguageAggregate,
    pub engagement_score: f64,
    pub engagement_breakdown: EngagementBreakdown,
    pub scraped_at: DateTime<Utc>,
    pub metadata: HashMap<String, String>,
}

/// Direction of change for a [`ChangeFromPrevious`] field (§4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Stable,
}

/// One field's before/after comparison in a [`ChangeFromPrevious`] struct.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FieldChange {
    pub previous: f64,
    pub current: f64,
    pub absolute_change: f64,
    pub percent_change: Option<f64>,
    pub direction: Direction,
}

impl FieldChange {
    /// Safe-divide percent change; direction is "stable" if `|percent| < 1%`
    /// (§4.10 step 3).
    pub fn compute(previous: f64, current: f64) -> Self {
        let absolute_change = current - previous;
        let percent_change = if previous.abs() > f64::EPSILON {
            Some((absolute_change / previous) * 100.0)
        } else {
            None
        };

        let direction = match percent_change {
            Some(p) if p.abs() < 1.0 => Direction::Stable,
            Some(p) if p > 0.0 => Direction::Up,
            Some(p) if p < 0.0 => Direction::Down,
            _ if absolute_change > 0.0 => Direction::Up,
            _ if absolute_change < 0.0 => Direction::Down,
            _ => Direction::Stable,
        };

        Self {
            previous,
            current,
            absolute_change,
            percent_change,
            direction,
        }
    }
}

/// The full delta vs. the immediately-preceding distinct `version_date` for
/// a trend (§3 `TrendVersion.change_from_previous`). `None` if there is no
/// prior snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeFromPrevious {
    pub engagement_score: FieldChange,
    pub likes: FieldChange,
    pub comments: FieldChange,
    pub views: FieldChange,
    pub rank: FieldChange,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_change_marks_small_moves_stable() {
        let c = FieldChange::compute(1000.0, 1005.0);
        assert_eq!(c.direction, Direction::Stable);
    }

    #[test]
    fn field_change_up_and_down() {
        assert_eq!(FieldChange::compute(1000.0, 1500.0).direction, Direction::Up);
        assert_eq!(FieldChange::compute(1500.0, 1000.0).direction, Direction::Down);
    }

    #[test]
    fn field_change_handles_zero_previous() {
        let c = FieldChange::compute(0.0, 100.0);
        assert_eq!(c.percent_change, None);
        assert_eq!(c.direction, Direction::Up);
    }
}
