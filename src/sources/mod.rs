// =============================================================================
// Source Adapter Interface (C6) — §4.6
// =============================================================================
//
// `SourceAdapter` is the contract every per-platform implementation
// satisfies (§9 "use an interface for the Source Adapter contract").
// `SelectorAdapter` is the shared generic engine every platform module
// configures with its own discovery URL, selector fallback chains and rate
// delay — "per-platform implementations hold their own DOM selectors and
// parsing helpers as private data; shared helpers ... are free functions on
// a shared utility module" (§9). The six `tiktok`/`instagram`/`linkedin`/
// `facebook`/`youtube`/`x` modules each just supply that configuration.
// =============================================================================

pub mod facebook;
pub mod instagram;
pub mod linkedin;
pub mod tiktok;
pub mod util;
pub mod x;
pub mod youtube;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::browser::BrowserHandle;
use crate::enrich::language::{self, LanguageAggregate};
use crate::enrich::sentiment::{self, SentimentAggregate};
use crate::errors::ClassifiedError;
use crate::etl::raw::{ContentType, ContentTypeDistribution, EnrichedTrend, RawTrend, TrendRecord};
use crate::scoring;
use crate::types::Platform;

/// Default number of sample items `enrich()` visits per trend (§4.6).
pub const DEFAULT_SAMPLE_COUNT: usize = 3;

/// Contract each source implementation satisfies (§4.6).
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// Returns up to `limit` candidate trends from the source's public
    /// discovery surface. The scheduler retries this call with a fresh proxy
    /// up to `max_discovery_retries` if fewer than `min_discovery_items`
    /// come back (§4.6).
    async fn discover(&self, handle: &dyn BrowserHandle, limit: usize) -> Result<Vec<RawTrend>, ClassifiedError>;

    /// Visits up to N sample items to extract per-item engagement (§4.6).
    async fn enrich(&self, handle: &dyn BrowserHandle, raw: &RawTrend) -> Result<EnrichedTrend, ClassifiedError>;

    /// Floor below which a `discover()` result is considered too thin to
    /// trust and worth retrying against a fresh proxy. Zero disables the
    /// check, which is the right default for adapters that don't configure
    /// selectors (§4.6).
    fn min_discovery_items(&self) -> usize {
        0
    }

    /// How many times the scheduler re-acquires a fresh proxy and retries
    /// `discover()` when the result falls below `min_discovery_items`.
    fn max_discovery_retries(&self) -> u32 {
        0
    }

    /// Rolls up one enriched trend's samples into a single record: average
    /// of numeric metrics, content-type distribution, aggregated
    /// sentiment/language summaries (§4.6).
    fn aggregate(&self, enriched: &[EnrichedTrend]) -> Vec<TrendRecord> {
        enriched.iter().map(|e| self.aggregate_one(e)).collect()
    }

    fn aggregate_one(&self, enriched: &EnrichedTrend) -> TrendRecord {
        let sample_count = enriched.samples.len();
        let sum = |f: fn(&crate::etl::raw::EngagementSample) -> u64| -> f64 {
            enriched.samples.iter().map(|s| f(s) as f64).sum::<f64>()
                / sample_count.max(1) as f64
        };

        let avg_likes = sum(|s| s.likes);
        let avg_comments = sum(|s| s.comments);
        let avg_shares = sum(|s| s.shares);
        let avg_views = sum(|s| s.views);

        let mut content_type_distribution: ContentTypeDistribution = HashMap::new();
        for s in &enriched.samples {
            *content_type_distribution.entry(s.content_type).or_insert(0) += 1;
        }

        let sentiment_scores: Vec<_> = enriched
            .samples
            .iter()
            .filter_map(|s| s.caption.as_deref())
            .map(sentiment::score_sentiment)
            .collect();
        let sentiment = SentimentAggregate::from_scores(&sentiment_scores);

        let language_signals: Vec<_> = enriched
            .samples
            .iter()
            .filter_map(|s| s.caption.as_deref().or(s.language_hint.as_deref()))
            .map(|text| language::detect_language(text, language::DEFAULT_MIN_CONFIDENCE))
            .collect();
        let language = LanguageAggregate::from_signals(&language_signals);

        let audience_size = enriched.samples.iter().filter_map(|s| s.followers).max();

        let breakdown = scoring::score_trend(&enriched.samples, self.platform(), audience_size, 0.0, 0.0);

        TrendRecord {
            source: self.platform(),
            topic: enriched.topic.clone(),
            url: enriched.url.clone(),
            sample_count,
            avg_likes,
            avg_comments,
            avg_shares,
            avg_views,
            audience_size,
            content_type_distribution,
            sentiment,
            language,
            engagement_score: breakdown.normalized_score,
            engagement_breakdown: breakdown,
            scraped_at: Utc::now(),
            metadata: enriched.metadata.clone(),
        }
    }
}

/// Per-platform fallback-selector configuration driving [`SelectorAdapter`].
pub struct SelectorConfig {
    pub platform: Platform,
    pub discovery_url: &'static str,
    pub item_selectors: &'static [&'static str],
    pub topic_selectors: &'static [&'static str],
    pub engagement_post_count_selectors: &'static [&'static str],
    pub caption_selectors: &'static [&'static str],
    pub likes_selectors: &'static [&'static str],
    pub comments_selectors: &'static [&'static str],
    pub shares_selectors: &'static [&'static str],
    pub views_selectors: &'static [&'static str],
    pub default_content_type: ContentType,
    pub rate_delay: Duration,
    pub min_discovery_items: usize,
    pub max_discovery_retries: u32,
}

/// Shared generic adapter engine every platform module configures (§9).
pub struct SelectorAdapter {
    pub config: SelectorConfig,
}

impl SelectorAdapter {
    pub fn new(config: SelectorConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SourceAdapter for SelectorAdapter {
    fn platform(&self) -> Platform {
        self.config.platform
    }

    fn min_discovery_items(&self) -> usize {
        self.config.min_discovery_items
    }

    fn max_discovery_retries(&self) -> u32 {
        self.config.max_discovery_retries
    }

    async fn discover(&self, handle: &dyn BrowserHandle, limit: usize) -> Result<Vec<RawTrend>, ClassifiedError> {
        handle.goto(self.config.discovery_url, Duration::from_secs(30)).await?;
        handle.scroll_to_bottom().await?;

        let mut items = Vec::new();
        for selector in self.config.item_selectors {
            match handle.query_all(selector).await {
                Ok(matches) if !matches.is_empty() => {
                    items = matches;
                    break;
                }
                _ => continue,
            }
        }

        if items.is_empty() {
            return Err(ClassifiedError::scrape_element_not_found(format!(
                "no discovery items matched any of {} selectors",
                self.config.item_selectors.len()
            )));
        }

        let mut raw_trends = Vec::with_capacity(limit.min(items.len()));
        for item in items.into_iter().take(limit) {
            let topic = item.text.trim().to_string();
            if topic.is_empty() {
                continue;
            }
            let url = item
                .attrs
                .iter()
                .find(|(k, _)| k == "href")
                .map(|(_, v)| v.clone());

            raw_trends.push(RawTrend {
                topic,
                url,
                raw_engagement: Default::default(),
                sample_post_refs: Vec::new(),
            });
        }

        Ok(raw_trends)
    }

    async fn enrich(&self, handle: &dyn BrowserHandle, raw: &RawTrend) -> Result<EnrichedTrend, ClassifiedError> {
        tokio::time::sleep(self.config.rate_delay).await;

        if let Some(url) = &raw.url {
            let _ = handle.goto(url, Duration::from_secs(20)).await;
        }

        let caption = util::query_optional(handle, "caption", self.config.caption_selectors).await;
        let likes_text = util::query_optional(handle, "likes", self.config.likes_selectors).await;
        let comments_text = util::query_optional(handle, "comments", self.config.comments_selectors).await;
        let shares_text = util::query_optional(handle, "shares", self.config.shares_selectors).await;
        let views_text = util::query_optional(handle, "views", self.config.views_selectors).await;

        let sample = crate::etl::raw::EngagementSample {
            likes: util::parse_engagement_count(&likes_text).unwrap_or(0),
            comments: util::parse_engagement_count(&comments_text).unwrap_or(0),
            shares: util::parse_engagement_count(&shares_text).unwrap_or(0),
            views: util::parse_engagement_count(&views_text).unwrap_or(0),
            followers: None,
            caption: if caption.is_empty() { None } else { Some(caption) },
            content_type: self.config.default_content_type,
            language_hint: None,
            collected_at: Utc::now(),
        };

        Ok(EnrichedTrend {
            topic: raw.topic.clone(),
            url: raw.url.clone(),
            samples: vec![sample],
            metadata: HashMap::new(),
        })
    }
}

/// Build the registered adapter for a platform (§4.6 "implementations").
pub fn build_adapter(platform: Platform) -> Box<dyn SourceAdapter> {
    match platform {
        Platform::TikTok => Box::new(tiktok::TikTokAdapter::new()),
        Platform::Instagram => Box::new(instagram::InstagramAdapter::new()),
        Platform::LinkedIn => Box::new(linkedin::LinkedInAdapter::new()),
        Platform::Facebook => Box::new(facebook::FacebookAdapter::new()),
        Platform::YouTube => Box::new(youtube::YouTubeAdapter::new()),
        Platform::X => Box::new(x::XAdapter::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etl::raw::{ContentType, EngagementSample};

    fn enriched(samples: Vec<EngagementSample>) -> EnrichedTrend {
        EnrichedTrend {
            topic: "#test".to_string(),
            url: None,
            samples,
            metadata: HashMap::new(),
        }
    }

    fn sample(likes: u64, content_type: ContentType, caption: &str) -> EngagementSample {
        EngagementSample {
            likes,
            comments: 0,
            shares: 0,
            views: 0,
            followers: None,
            caption: Some(caption.to_string()),
            content_type,
            language_hint: None,
            collected_at: Utc::now(),
        }
    }

    #[test]
    fn aggregate_one_averages_numeric_metrics_and_counts_content_types() {
        let adapter = tiktok::TikTokAdapter::new();
        let e = enriched(vec![
            sample(100, ContentType::Video, "amazing love it"),
            sample(300, ContentType::Video, "worst hate this"),
        ]);
        let record = adapter.aggregate_one(&e);
        assert_eq!(record.avg_likes, 200.0);
        assert_eq!(record.content_type_distribution.get(&ContentType::Video), Some(&2));
        assert_eq!(record.sample_count, 2);
    }
}
