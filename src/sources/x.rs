// =============================================================================
// X (Twitter) adapter — public "Explore / Trending" surface (§4.6)
// =============================================================================

use std::time::Duration;

use async_trait::async_trait;

use crate::browser::BrowserHandle;
use crate::errors::ClassifiedError;
use crate::etl::raw::{ContentType, EnrichedTrend, RawTrend};
use crate::types::Platform;

use super::{SelectorAdapter, SelectorConfig, SourceAdapter};

const ITEM_SELECTORS: &[&str] = &["div[data-testid='trend']", "div[aria-label='Timeline: Explore']"];
const TOPIC_SELECTORS: &[&str] = &["span", "div[dir='ltr'] span"];
const ENGAGEMENT_POST_COUNT_SELECTORS: &[&str] = &["div[data-testid='trend'] div:nth-child(3)"];
const CAPTION_SELECTORS: &[&str] = &["div[data-testid='tweetText']"];
const LIKES_SELECTORS: &[&str] = &["div[data-testid='like'] span[data-testid='app-text-transition-container']"];
const COMMENTS_SELECTORS: &[&str] = &["div[data-testid='reply'] span[data-testid='app-text-transition-container']"];
const SHARES_SELECTORS: &[&str] = &["div[data-testid='retweet'] span[data-testid='app-text-transition-container']"];
const VIEWS_SELECTORS: &[&str] = &["a[href$='/analytics'] span"];

pub struct XAdapter {
    inner: SelectorAdapter,
}

impl XAdapter {
    pub fn new() -> Self {
        Self {
            inner: SelectorAdapter::new(SelectorConfig {
                platform: Platform::X,
                discovery_url: "https://twitter.com/explore/tabs/trending",
                item_selectors: ITEM_SELECTORS,
                topic_selectors: TOPIC_SELECTORS,
                engagement_post_count_selectors: ENGAGEMENT_POST_COUNT_SELECTORS,
                caption_selectors: CAPTION_SELECTORS,
                likes_selectors: LIKES_SELECTORS,
                comments_selectors: COMMENTS_SELECTORS,
                shares_selectors: SHARES_SELECTORS,
                views_selectors: VIEWS_SELECTORS,
                default_content_type: ContentType::Post,
                rate_delay: Duration::from_millis(1200),
                min_discovery_items: 10,
                max_discovery_retries: 2,
            }),
        }
    }
}

impl Default for XAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for XAdapter {
    fn platform(&self) -> Platform {
        Platform::X
    }

    async fn discover(&self, handle: &dyn BrowserHandle, limit: usize) -> Result<Vec<RawTrend>, ClassifiedError> {
        self.inner.discover(handle, limit).await
    }

    async fn enrich(&self, handle: &dyn BrowserHandle, raw: &RawTrend) -> Result<EnrichedTrend, ClassifiedError> {
        self.inner.enrich(handle, raw).await
    }
}
