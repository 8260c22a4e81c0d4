// Integration coverage for the Engagement Scorer (C8, §4.8) across the full
// per-platform weight table, not just the Instagram worked example already
// covered inline in `src/scoring/mod.rs`.

use chrono::Utc;

use trend_harvester::etl::raw::{ContentType, EngagementSample};
use trend_harvester::scoring::{score_trend, PlatformWeights, SCORE_MAX};
use trend_harvester::types::Platform;

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
fn every_platform_weight_table_entry_matches_spec_section_4_8() {
    let expect = [
        (Platform::Instagram, 1.0, 2.5, 3.5, 0.05),
        (Platform::TikTok, 1.0, 2.0, 4.0, 0.15),
        (Platform::X, 1.0, 3.0, 4.0, 0.02),
        (Platform::Facebook, 1.0, 2.0, 3.0, 0.10),
        (Platform::LinkedIn, 1.0, 3.5, 4.0, 0.05),
        (Platform::YouTube, 1.0, 2.5, 3.0, 0.50),
    ];

    for (platform, likes, comments, shares, views) in expect {
        let w = PlatformWeights::for_platform(platform);
        assert_eq!(w.likes, likes, "{platform:?} likes weight");
        assert_eq!(w.comments, comments, "{platform:?} comments weight");
        assert_eq!(w.shares, shares, "{platform:?} shares weight");
        assert_eq!(w.views, views, "{platform:?} views weight");
    }
}

#[test]
fn youtube_weighted_score_is_exact_weighted_sum() {
    // raw = 2000*1.0 + 300*2.5 + 40*3.0 + 100000*0.50 = 2000 + 750 + 120 + 50000 = 52870
    let samples = vec![sample(2000, 300, 40, 100_000)];
    let breakdown = score_trend(&samples, Platform::YouTube, None, 0.0, 0.0);
    assert!((breakdown.normalized_score - 52_870.0).abs() < 1e-6);
}

#[test]
fn audience_size_normalizes_the_mean_raw_score() {
    let samples = vec![sample(1000, 0, 0, 0)];
    let breakdown = score_trend(&samples, Platform::TikTok, Some(500), 0.0, 0.0);
    assert!((breakdown.normalized_score - 2.0).abs() < 1e-9);
}

#[test]
fn component_breakdown_sums_to_roughly_one_hundred_percent() {
    let samples = vec![sample(1000, 50, 10, 50000)];
    let breakdown = score_trend(&samples, Platform::Instagram, None, 0.0, 0.0);
    let total: f64 = breakdown.components.iter().map(|c| c.percent_of_total).sum();
    assert!((total - 100.0).abs() < 0.05, "component percentages should sum to ~100%, got {total}");
}

#[test]
fn score_never_exceeds_the_configured_ceiling() {
    let samples = vec![sample(u64::MAX, u64::MAX, u64::MAX, u64::MAX)];
    let breakdown = score_trend(&samples, Platform::LinkedIn, None, 0.0, 0.0);
    assert_eq!(breakdown.normalized_score, SCORE_MAX);
}
