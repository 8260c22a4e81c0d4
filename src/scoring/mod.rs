// =============================================================================
// Engagement Scorer (C8) — platform-weighted sum -> normalized score (§4.8)
// =============================================================================
//
// Grounded on `signals/weighted_score.rs`'s `WeightedScorer`: a per-key
// weight map, a per-component contribution breakdown, and a deterministic
// weighted sum. Here the regime-keyed weight map becomes a platform-keyed
// one and the "signal contribution" becomes an "engagement component"; the
// scoring arithmetic itself (weight * value, percent-of-total) is the same
// shape.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::etl::raw::EngagementSample;
use crate::types::Platform;

/// Per-platform weights for (likes, comments, shares, views), §4.8 table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PlatformWeights {
    pub likes: f64,
    pub comments: f64,
    pub shares: f64,
    pub views: f64,
}

impl PlatformWeights {
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Instagram => Self {
                likes: 1.0,
                comments: 2.5,
                shares: 3.5,
                views: 0.05,
            },
            Platform::TikTok => Self {
                likes: 1.0,
                comments: 2.0,
                shares: 4.0,
                views: 0.15,
            },
            Platform::X => Self {
                likes: 1.0,
                comments: 3.0,
                shares: 4.0,
                views: 0.02,
            },
            Platform::Facebook => Self {
                likes: 1.0,
                comments: 2.0,
                shares: 3.0,
                views: 0.10,
            },
            Platform::LinkedIn => Self {
                likes: 1.0,
                comments: 3.5,
                shares: 4.0,
                views: 0.05,
            },
            Platform::YouTube => Self {
                likes: 1.0,
                comments: 2.5,
                shares: 3.0,
                views: 0.50,
            },
        }
    }
}

/// One weighted component's contribution to the total score, retained for
/// the version record per §4.8 ("the breakdown … is retained").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EngagementComponent {
    pub name: &'static str,
    pub raw_value: f64,
    pub weight: f64,
    pub weighted_value: f64,
    pub percent_of_total: f64,
}

/// Full breakdown of one score computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementBreakdown {
    pub raw_score: f64,
    pub normalized_score: f64,
    pub components: Vec<EngagementComponent>,
}

/// Clamp bounds for the final engagement score (§3 `TrendVersion.engagement_score`).
pub const SCORE_MIN: f64 = 0.0;
pub const SCORE_MAX: f64 = 1_000_000_000.0;

/// Score one sample: `raw = likes*w_l + comments*w_c + shares*w_s + views*w_v`
/// (§4.8).
fn score_sample(sample: &EngagementSample, weights: PlatformWeights) -> (f64, Vec<(&'static str, f64, f64)>) {
    let parts = [
        ("likes", sample.likes as f64, weights.likes),
        ("comments", sample.comments as f64, weights.comments),
        ("shares", sample.shares as f64, weights.shares),
        ("views", sample.views as f64, weights.views),
    ];
    let raw: f64 = parts.iter().map(|(_, v, w)| v * w).sum();
    (
        raw,
        parts.into_iter().map(|(n, v, w)| (n, v, w)).collect(),
    )
}

/// Score a trend: arithmetic mean of per-sample scores, with an optional
/// audience-size normalization and time-decay factor, clamped to
/// `[SCORE_MIN, SCORE_MAX]` (§4.8).
///
/// `audience_size` divides the mean raw score when present (normalizing by
/// reach). `weeks_inactive` applies `(1 - decay_rate_weekly)^weeks_inactive`,
/// floored at 10% of the pre-decay score.
pub fn score_trend(
    samples: &[EngagementSample],
    platform: Platform,
    audience_size: Option<u64>,
    decay_rate_weekly: f64,
    weeks_inactive: f64,
) -> EngagementBreakdown {
    let weights = PlatformWeights::for_platform(platform);

    if samples.is_empty() {
        return EngagementBreakdown {
            raw_score: 0.0,
            normalized_score: 0.0,
            components: Vec::new(),
        };
    }

    let mut component_sums: HashMapLike = HashMapLike::new();
    let mut raw_total = 0.0;
    for sample in samples {
        let (raw, parts) = score_sample(sample, weights);
        raw_total += raw;
        for (name, value, weight) in parts {
            component_sums.add(name, value, weight);
        }
    }

    let sample_count = samples.len() as f64;
    let mean_raw = raw_total / sample_count;

    let mut normalized = mean_raw;
    if let Some(audience) = audience_size {
        if audience > 0 {
            normalized /= audience as f64;
        }
    }

    let pre_decay = normalized;
    if weeks_inactive > 0.0 && decay_rate_weekly > 0.0 {
        let decayed = pre_decay * (1.0 - decay_rate_weekly).powf(weeks_inactive);
        normalized = decayed.max(0.1 * pre_decay);
    }

    normalized = normalized.clamp(SCORE_MIN, SCORE_MAX);

    let component_total: f64 = component_sums.weighted_totals().iter().map(|(_, _, w)| *w).sum();
    let components = component_sums
        .weighted_totals()
        .into_iter()
        .map(|(name, raw_sum, weighted_sum)| {
            let mean_weighted = weighted_sum / sample_count;
            let percent_of_total = if component_total.abs() > f64::EPSILON {
                weighted_sum / component_total * 100.0
            } else {
                0.0
            };
            EngagementComponent {
                name,
                raw_value: raw_sum / sample_count,
                weight: match name {
                    "likes" => weights.likes,
                    "comments" => weights.comments,
                    "shares" => weights.shares,
                    _ => weights.views,
                },
                weighted_value: mean_weighted,
                percent_of_total,
            }
        })
        .collect();

    EngagementBreakdown {
        raw_score: mean_raw,
        normalized_score: normalized,
        components,
    }
}

/// Tiny fixed-key accumulator avoiding a `HashMap` for the four well-known
/// component names — order is preserved for reproducible breakdown output.
struct HashMapLike {
    entries: Vec<(&'static str, f64, f64)>,
}

impl HashMapLike {
    fn new() -> Self {
        Self {
            entries: vec![("likes", 0.0, 0.0), ("comments", 0.0, 0.0), ("shares", 0.0, 0.0), ("views", 0.0, 0.0)],
        }
    }

    fn add(&mut self, name: &'static str, value: f64, weight: f64) {
        if let Some(entry) = self.entries.iter_mut().find(|(n, _, _)| *n == name) {
            entry.1 += value;
            entry.2 += value * weight;
        }
    }

    fn weighted_totals(&self) -> Vec<(&'static str, f64, f64)> {
        self.entries.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::etl::raw::ContentType;

    fn sample(likes: u64, comments: u64, shares: u64, views: u64) -> EngagementSample {
        EngagementSample {
            likes,
            comments,
            shares,
            views,
            followers: None,
            caption: None,
            content_type: ContentType::Post,
            language_hint: None,
            collected_at: Utc::now(),
        }
    }

    #[test]
    fn instagram_weighted_score_matches_spec_scenario() {
        // spec.md §8 scenario 1: likes=1000, comments=50, shares=10, views=50000
        // => engagement_score = 3660.0, component percentages ~ (27.3, 3.4, 1.0, 68.3)
        let samples = vec![sample(1000, 50, 10, 50000)];
        let breakdown = score_trend(&samples, Platform::Instagram, None, 0.0, 0.0);
        assert!((breakdown.normalized_score - 3660.0).abs() < 1e-6);

        let likes = breakdown.components.iter().find(|c| c.name == "likes").unwrap();
        let views = breakdown.components.iter().find(|c| c.name == "views").unwrap();
        assert!((likes.percent_of_total - 27.3).abs() < 0.2);
        assert!((views.percent_of_total - 68.3).abs() < 0.2);
    }

    #[test]
    fn mean_across_samples_is_arithmetic() {
        let samples = vec![sample(100, 0, 0, 0), sample(300, 0, 0, 0)];
        let breakdown = score_trend(&samples, Platform::TikTok, None, 0.0, 0.0);
        assert!((breakdown.normalized_score - 200.0).abs() < 1e-9);
    }

    #[test]
    fn decay_floors_at_ten_percent_of_pre_decay_score() {
        // spec.md §8 scenario 5: score=10000, 21 days inactive (3 weeks), decay=0.05/week
        // => decayed ~ 10000*0.95^3 = 8573.75
        let samples = vec![sample(10000, 0, 0, 0)];
        let breakdown = score_trend(&samples, Platform::TikTok, None, 0.05, 3.0);
        assert!((breakdown.normalized_score - 8573.75).abs() < 0.5);
    }

    #[test]
    fn score_clamps_to_configured_bounds() {
        let samples = vec![sample(u64::MAX / 2, 0, 0, 0)];
        let breakdown = score_trend(&samples, Platform::TikTok, None, 0.0, 0.0);
        assert_eq!(breakdown.normalized_score, SCORE_MAX);
    }

    #[test]
    fn empty_samples_score_to_zero() {
        let breakdown = score_trend(&[], Platform::TikTok, None, 0.0, 0.0);
        assert_eq!(breakdown.normalized_score, 0.0);
    }
}
