// =============================================================================
// Central Application State — Trend Harvester
// =============================================================================
//
// The hub every long-running task and every admin HTTP handler borrows from:
// storage, the proxy pool, the browser factory binding, and the resolved
// config snapshot this process started with.
//
// Configuration is read-only after resolution (§5) — there is no
// `RwLock<ResolvedConfig>` here; a reload produces a fresh `ResolvedConfig`
// the scheduler holds its own copy of, not a mutation of this one.
// =============================================================================

use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;

use crate::browser::BrowserContextFactory;
use crate::config::ResolvedConfig;
use crate::proxy::ProxyPool;
use crate::store::Store;

/// Shared handles every admin HTTP endpoint and every scheduled job task
/// borrows from. Constructed once at startup in `main.rs` and wrapped in an
/// `Arc`.
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub proxy_pool: Arc<ProxyPool>,
    pub browser_factory: Arc<dyn BrowserContextFactory>,
    pub config: ResolvedConfig,
    pub metrics_handle: PrometheusHandle,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        proxy_pool: Arc<ProxyPool>,
        browser_factory: Arc<dyn BrowserContextFactory>,
        config: ResolvedConfig,
        metrics_handle: PrometheusHandle,
    ) -> Self {
        Self {
            store,
            proxy_pool,
            browser_factory,
            config,
            metrics_handle,
            started_at: Utc::now(),
        }
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
