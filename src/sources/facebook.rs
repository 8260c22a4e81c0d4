// =============================================================================
// Facebook adapter — public Pages "What's trending" surface (§4.6)
// =============================================================================

use std::time::Duration;

use async_trait::async_trait;

use crate::browser::BrowserHandle;
use crate::errors::ClassifiedError;
use crate::etl::raw::{ContentType, EnrichedTrend, RawTrend};
use crate::types::Platform;

use super::{SelectorAdapter, SelectorConfig, SourceAdapter};

const ITEM_SELECTORS: &[&str] = &["div[role='article']", "a[href*='/hashtag/']"];
const TOPIC_SELECTORS: &[&str] = &["h3", "span.hashtag-text"];
const ENGAGEMENT_POST_COUNT_SELECTORS: &[&str] = &["span.post-count"];
const CAPTION_SELECTORS: &[&str] = &["div[data-ad-preview='message']", "div.userContent"];
const LIKES_SELECTORS: &[&str] = &["span[aria-label$='reactions']", "span.like-count"];
const COMMENTS_SELECTORS: &[&str] = &["span[aria-label$='comments']"];
const SHARES_SELECTORS: &[&str] = &["span[aria-label$='shares']"];
const VIEWS_SELECTORS: &[&str] = &["span.video-view-count"];

pub struct FacebookAdapter {
    inner: SelectorAdapter,
}

impl FacebookAdapter {
    pub fn new() -> Self {
        Self {
            inner: SelectorAdapter::new(SelectorConfig {
                platform: Platform::Facebook,
                discovery_url: "https://www.facebook.com/watch/",
                item_selectors: ITEM_SELECTORS,
                topic_selectors: TOPIC_SELECTORS,
                engagement_post_count_selectors: ENGAGEMENT_POST_COUNT_SELECTORS,
                caption_selectors: CAPTION_SELECTORS,
                likes_selectors: LIKES_SELECTORS,
                comments_selectors: COMMENTS_SELECTORS,
                shares_selectors: SHARES_SELECTORS,
                views_selectors: VIEWS_SELECTORS,
                default_content_type: ContentType::Post,
                rate_delay: Duration::from_millis(2000),
                min_discovery_items: 10,
                max_discovery_retries: 2,
            }),
        }
    }
}

impl Default for FacebookAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for FacebookAdapter {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    async fn discover(&self, handle: &dyn BrowserHandle, limit: usize) -> Result<Vec<RawTrend>, ClassifiedError> {
        self.inner.discover(handle, limit).await
    }

    async fn enrich(&self, handle: &dyn BrowserHandle, raw: &RawTrend) -> Result<EnrichedTrend, ClassifiedError> {
        self.inner.enrich(handle, raw).await
    }
}
