// =============================================================================
// TikTok adapter — public "Discover" trend surface (§4.6)
// =============================================================================

use std::time::Duration;

use async_trait::async_trait;

use crate::browser::BrowserHandle;
use crate::errors::ClassifiedError;
use crate::etl::raw::{ContentType, EnrichedTrend, RawTrend};
use crate::types::Platform;

use super::{SelectorAdapter, SelectorConfig, SourceAdapter};

const ITEM_SELECTORS: &[&str] = &[
    "[data-e2e='discover-item']",
    "div.discover-card",
    "a[href*='/tag/']",
];
const TOPIC_SELECTORS: &[&str] = &["[data-e2e='discover-item-title']", "h3", "span.title"];
const ENGAGEMENT_POST_COUNT_SELECTORS: &[&str] = &["[data-e2e='video-count']", "strong.video-count"];
const CAPTION_SELECTORS: &[&str] = &["[data-e2e='browse-video-desc']", "h1.video-meta-caption"];
const LIKES_SELECTORS: &[&str] = &["[data-e2e='like-count']", "strong[data-e2e='like-count']"];
const COMMENTS_SELECTORS: &[&str] = &["[data-e2e='comment-count']"];
const SHARES_SELECTORS: &[&str] = &["[data-e2e='share-count']"];
const VIEWS_SELECTORS: &[&str] = &["[data-e2e='video-views']", "strong.video-count"];

pub struct TikTokAdapter {
    inner: SelectorAdapter,
}

impl TikTokAdapter {
    pub fn new() -> Self {
        Self {
            inner: SelectorAdapter::new(SelectorConfig {
                platform: Platform::TikTok,
                discovery_url: "https://www.tiktok.com/discover",
                item_selectors: ITEM_SELECTORS,
                topic_selectors: TOPIC_SELECTORS,
                engagement_post_count_selectors: ENGAGEMENT_POST_COUNT_SELECTORS,
                caption_selectors: CAPTION_SELECTORS,
                likes_selectors: LIKES_SELECTORS,
                comments_selectors: COMMENTS_SELECTORS,
                shares_selectors: SHARES_SELECTORS,
                views_selectors: VIEWS_SELECTORS,
                default_content_type: ContentType::Video,
                rate_delay: Duration::from_millis(1500),
                min_discovery_items: 10,
                max_discovery_retries: 2,
            }),
        }
    }
}

impl Default for TikTokAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for TikTokAdapter {
    fn platform(&self) -> Platform {
        Platform::TikTok
    }

    async fn discover(&self, handle: &dyn BrowserHandle, limit: usize) -> Result<Vec<RawTrend>, ClassifiedError> {
        self.inner.discover(handle, limit).await
    }

    async fn enrich(&self, handle: &dyn BrowserHandle, raw: &RawTrend) -> Result<EnrichedTrend, ClassifiedError> {
        self.inner.enrich(handle, raw).await
    }
}
