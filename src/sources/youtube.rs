// =============================================================================
// YouTube adapter — public "Trending" tab (§4.6)
// =============================================================================

use std::time::Duration;

use async_trait::async_trait;

use crate::browser::BrowserHandle;
use crate::errors::ClassifiedError;
use crate::etl::raw::{ContentType, EnrichedTrend, RawTrend};
use crate::types::Platform;

use super::{SelectorAdapter, SelectorConfig, SourceAdapter};

const ITEM_SELECTORS: &[&str] = &["ytd-video-renderer", "a#video-title"];
const TOPIC_SELECTORS: &[&str] = &["#video-title", "yt-formatted-string#title"];
const ENGAGEMENT_POST_COUNT_SELECTORS: &[&str] = &["span.view-count"];
const CAPTION_SELECTORS: &[&str] = &["#description yt-formatted-string", "div#description"];
const LIKES_SELECTORS: &[&str] = &["#segmented-like-button button span", "yt-formatted-string#text.ytd-toggle-button-renderer"];
const COMMENTS_SELECTORS: &[&str] = &["#count yt-formatted-string", "h2#count span"];
const SHARES_SELECTORS: &[&str] = &["#share-button span"];
const VIEWS_SELECTORS: &[&str] = &["span.view-count", "#info span"];

pub struct YouTubeAdapter {
    inner: SelectorAdapter,
}

impl YouTubeAdapter {
    pub fn new() -> Self {
        Self {
            inner: SelectorAdapter::new(SelectorConfig {
                platform: Platform::YouTube,
                discovery_url: "https://www.youtube.com/feed/trending",
                item_selectors: ITEM_SELECTORS,
                topic_selectors: TOPIC_SELECTORS,
                engagement_post_count_selectors: ENGAGEMENT_POST_COUNT_SELECTORS,
                caption_selectors: CAPTION_SELECTORS,
                likes_selectors: LIKES_SELECTORS,
                comments_selectors: COMMENTS_SELECTORS,
                shares_selectors: SHARES_SELECTORS,
                views_selectors: VIEWS_SELECTORS,
                default_content_type: ContentType::Video,
                rate_delay: Duration::from_millis(1000),
                min_discovery_items: 15,
                max_discovery_retries: 2,
            }),
        }
    }
}

impl Default for YouTubeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for YouTubeAdapter {
    fn platform(&self) -> Platform {
        Platform::YouTube
    }

    async fn discover(&self, handle: &dyn BrowserHandle, limit: usize) -> Result<Vec<RawTrend>, ClassifiedError> {
        self.inner.discover(handle, limit).await
    }

    async fn enrich(&self, handle: &dyn BrowserHandle, raw: &RawTrend) -> Result<EnrichedTrend, ClassifiedError> {
        self.inner.enrich(handle, raw).await
    }
}
