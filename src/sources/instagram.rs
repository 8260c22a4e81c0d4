// =============================================================================
// Instagram adapter — public Explore/hashtag trend surface (§4.6)
// =============================================================================

use std::time::Duration;

use async_trait::async_trait;

use crate::browser::BrowserHandle;
use crate::errors::ClassifiedError;
use crate::etl::raw::{ContentType, EnrichedTrend, RawTrend};
use crate::types::Platform;

use super::{SelectorAdapter, SelectorConfig, SourceAdapter};

const ITEM_SELECTORS: &[&str] = &["article a[href*='/explore/tags/']", "div._aagw", "a.x1i10hfl"];
const TOPIC_SELECTORS: &[&str] = &["h1", "span._ap3a"];
const ENGAGEMENT_POST_COUNT_SELECTORS: &[&str] = &["span._ac2a", "span.x5n08af"];
const CAPTION_SELECTORS: &[&str] = &["h1._aacl", "span._aacl._aaco"];
const LIKES_SELECTORS: &[&str] = &["section span._ac2a", "a._aacl span"];
const COMMENTS_SELECTORS: &[&str] = &["ul._a9ym li span"];
const SHARES_SELECTORS: &[&str] = &["span[aria-label='Share count']"];
const VIEWS_SELECTORS: &[&str] = &["span._aacl[data-e2e='view-count']"];

pub struct InstagramAdapter {
    inner: SelectorAdapter,
}

impl InstagramAdapter {
    pub fn new() -> Self {
        Self {
            inner: SelectorAdapter::new(SelectorConfig {
                platform: Platform::Instagram,
                discovery_url: "https://www.instagram.com/explore/",
                item_selectors: ITEM_SELECTORS,
                topic_selectors: TOPIC_SELECTORS,
                engagement_post_count_selectors: ENGAGEMENT_POST_COUNT_SELECTORS,
                caption_selectors: CAPTION_SELECTORS,
                likes_selectors: LIKES_SELECTORS,
                comments_selectors: COMMENTS_SELECTORS,
                shares_selectors: SHARES_SELECTORS,
                views_selectors: VIEWS_SELECTORS,
                default_content_type: ContentType::Photo,
                rate_delay: Duration::from_millis(2000),
                min_discovery_items: 10,
                max_discovery_retries: 2,
            }),
        }
    }
}

impl Default for InstagramAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for InstagramAdapter {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    async fn discover(&self, handle: &dyn BrowserHandle, limit: usize) -> Result<Vec<RawTrend>, ClassifiedError> {
        self.inner.discover(handle, limit).await
    }

    async fn enrich(&self, handle: &dyn BrowserHandle, raw: &RawTrend) -> Result<EnrichedTrend, ClassifiedError> {
        self.inner.enrich(handle, raw).await
    }
}
