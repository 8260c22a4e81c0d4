// =============================================================================
// LinkedIn adapter — public "Trending now" news/hashtag module (§4.6)
// =============================================================================

use std::time::Duration;

use async_trait::async_trait;

use crate::browser::BrowserHandle;
use crate::errors::ClassifiedError;
use crate::etl::raw::{ContentType, EnrichedTrend, RawTrend};
use crate::types::Platform;

use super::{SelectorAdapter, SelectorConfig, SourceAdapter};

const ITEM_SELECTORS: &[&str] = &["li.trending-news__item", "a[href*='/feed/hashtag/']"];
const TOPIC_SELECTORS: &[&str] = &["h3.trending-news__title", "span.hashtag-name"];
const ENGAGEMENT_POST_COUNT_SELECTORS: &[&str] = &["span.trending-news__followers-count"];
const CAPTION_SELECTORS: &[&str] = &["span.break-words", "div.feed-shared-update-v2__description"];
const LIKES_SELECTORS: &[&str] = &["span.social-details-social-counts__reactions-count"];
const COMMENTS_SELECTORS: &[&str] = &["li.social-details-social-counts__comments button span"];
const SHARES_SELECTORS: &[&str] = &["li.social-details-social-counts__item--with-social-proof button span"];
const VIEWS_SELECTORS: &[&str] = &["span.ca-entry-point__num-views"];

pub struct LinkedInAdapter {
    inner: SelectorAdapter,
}

impl LinkedInAdapter {
    pub fn new() -> Self {
        Self {
            inner: SelectorAdapter::new(SelectorConfig {
                platform: Platform::LinkedIn,
                discovery_url: "https://www.linkedin.com/feed/news/",
                item_selectors: ITEM_SELECTORS,
                topic_selectors: TOPIC_SELECTORS,
                engagement_post_count_selectors: ENGAGEMENT_POST_COUNT_SELECTORS,
                caption_selectors: CAPTION_SELECTORS,
                likes_selectors: LIKES_SELECTORS,
                comments_selectors: COMMENTS_SELECTORS,
                shares_selectors: SHARES_SELECTORS,
                views_selectors: VIEWS_SELECTORS,
                default_content_type: ContentType::Post,
                rate_delay: Duration::from_millis(2500),
                min_discovery_items: 5,
                max_discovery_retries: 2,
            }),
        }
    }
}

impl Default for LinkedInAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for LinkedInAdapter {
    fn platform(&self) -> Platform {
        Platform::LinkedIn
    }

    async fn discover(&self, handle: &dyn BrowserHandle, limit: usize) -> Result<Vec<RawTrend>, ClassifiedError> {
        self.inner.discover(handle, limit).await
    }

    async fn enrich(&self, handle: &dyn BrowserHandle, raw: &RawTrend) -> Result<EnrichedTrend, ClassifiedError> {
        self.inner.enrich(handle, raw).await
    }
}
