// =============================================================================
// Scheduler & Worker (C11) — §4.11
// =============================================================================
//
// One long-running task drives every platform's job on its own cadence: a
// single `tick_interval` wakes the reconciliation pass, `scheduler_settings`
// rows are reloaded from storage every
// `reload_interval` rather than on every tick, and each due platform's run is
// spawned as its own task so a slow TikTok run never blocks YouTube's tick.
// Overlap prevention (P5) is a `parking_lot::Mutex<HashSet<Platform>>` guarded
// by an RAII handle, the same scoped-resource idiom `BrowserContext` and
// `AcquiredProxy` already use elsewhere in this crate.
// =============================================================================

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::browser::{BrowserContext, BrowserContextFactory, ContextOptions};
use crate::config::ResolvedConfig;
use crate::errors::{ClassifiedError, ErrorKind};
use crate::etl::{DedupeStrategy, EtlPipeline};
use crate::queue::OfflineQueueWorker;
use crate::run_log::RunLogger;
use crate::snapshot::{LifecycleThresholds, SnapshotStage};
use crate::sources::{self, SourceAdapter};
use crate::store::Store;
use crate::telemetry::{metrics, TraceContext};
use crate::types::{Platform, RunStatus};

/// How often the scheduler wakes up to check for due platforms (§4.11 "tick
/// interval default 60s").
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(60);

/// How often `scheduler_settings` is reloaded from storage (§4.11 "reload
/// interval default 300s").
pub const DEFAULT_RELOAD_INTERVAL: Duration = Duration::from_secs(300);

/// How many sample items are enriched concurrently per run, sharing one
/// browser instance across distinct contexts (§5).
const ENRICH_FANOUT: usize = 6;

/// Default number of trends a `run --once`/scheduled tick pulls from
/// discovery when the caller doesn't pass `--limit`.
const DEFAULT_DISCOVERY_LIMIT: usize = 50;

/// Retries applied around a single adapter call for NETWORK/TIMEOUT/RATE_LIMIT
/// kinds (§7 "retry with backoff, partial results OK").
const ADAPTER_RETRY_ATTEMPTS: u32 = 2;

/// Everything one scheduled tick needs: storage, the proxy pool, a browser
/// driver binding, and the resolved config snapshot used for this run (§5
/// "config snapshots are read-only, atomically swapped").
pub struct Scheduler {
    store: Arc<dyn Store>,
    proxy_pool: Arc<crate::proxy::ProxyPool>,
    browser_factory: Arc<dyn BrowserContextFactory>,
    config: ResolvedConfig,
    run_logger: RunLogger,
    running: Arc<Mutex<HashSet<Platform>>>,
    tick_interval: Duration,
    reload_interval: Duration,
}

/// Outcome of a single platform run, reported back to the caller of
/// [`Scheduler::run_once`] (used directly by `cli run --source=... --once`).
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub records_scraped: i64,
    pub records_uploaded: i64,
    pub records_invalid: i64,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn Store>,
        proxy_pool: Arc<crate::proxy::ProxyPool>,
        browser_factory: Arc<dyn BrowserContextFactory>,
        config: ResolvedConfig,
    ) -> Self {
        Self {
            run_logger: RunLogger::new(store.clone()),
            store,
            proxy_pool,
            browser_factory,
            config,
            running: Arc::new(Mutex::new(HashSet::new())),
            tick_interval: DEFAULT_TICK_INTERVAL,
            reload_interval: DEFAULT_RELOAD_INTERVAL,
        }
    }

    pub fn with_tick_interval(mut self, d: Duration) -> Self {
        self.tick_interval = d;
        self
    }

    /// Main scheduler loop (§4.11). Reconciles `scheduler_settings` against
    /// wall-clock on every tick, reloading the settings rows themselves only
    /// every `reload_interval`. Runs until `cancel` fires, then lets any
    /// already-spawned job tasks finish on their own (cooperative shutdown —
    /// the loop itself never aborts an in-flight job).
    pub async fn run_forever(&self, mut cancel: tokio::sync::watch::Receiver<bool>) {
        self.ensure_registered().await;

        let mut ticker = tokio::time::interval(self.tick_interval);
        let mut last_reload = tokio::time::Instant::now() - self.reload_interval;

        loop {
            tokio::select! {
                _ = cancel.changed() => {
                    if *cancel.borrow() {
                        info!("scheduler shutting down, in-flight runs will finish on their own");
                        return;
                    }
                }
                _ = ticker.tick() => {
                    if last_reload.elapsed() >= self.reload_interval {
                        self.ensure_registered().await;
                        last_reload = tokio::time::Instant::now();
                    }
                    if let Err(err) = self.reconcile_tick().await {
                        error!(error = %err, "scheduler tick failed");
                    }
                }
            }
        }
    }

    /// Register a default `scheduler_settings` row for any platform that
    /// doesn't have one yet, so a freshly-provisioned database starts every
    /// platform enabled at the process-wide `frequency_hours` default.
    async fn ensure_registered(&self) {
        for platform in Platform::ALL {
            match self.store.get_scheduler_setting(platform).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    let row = crate::store::models::SchedulerSettingRow::defaults(platform, self.config.frequency_hours);
                    if let Err(err) = self.store.upsert_scheduler_setting(&row).await {
                        warn!(platform = platform.as_str(), error = %err, "failed to register default scheduler setting");
                    }
                }
                Err(err) => warn!(platform = platform.as_str(), error = %err, "failed to load scheduler setting"),
            }
        }
    }

    /// One tick: for every enabled, due, not-already-running platform, spawn
    /// its run as an independent task (§4.11 "start one").
    async fn reconcile_tick(&self) -> Result<(), ClassifiedError> {
        let settings = self.store.list_scheduler_settings().await?;
        let now = Utc::now();

        for setting in settings {
            if !setting.enabled {
                continue;
            }
            let due = setting.next_run_at.map(|t| t <= now).unwrap_or(true);
            if !due {
                continue;
            }

            let mut running = self.running.lock();
            if running.contains(&setting.platform) {
                continue; // overlap prevention (P5): previous run still in flight
            }
            running.insert(setting.platform);
            drop(running);

            let store = self.store.clone();
            let advance_store = self.store.clone();
            let proxy_pool = self.proxy_pool.clone();
            let browser_factory = self.browser_factory.clone();
            // §4.1 precedence, third layer: this platform's persisted
            // `frequency_hours` overrides the process-wide compiled/env/
            // runtime-override snapshot for this run only.
            let config = self.config.clone().with_frequency_hours(setting.frequency_hours);
            let run_logger_store = self.store.clone();
            let running_set = self.running.clone();
            let platform = setting.platform;
            let frequency_hours = setting.frequency_hours;

            tokio::spawn(async move {
                let _guard = RunningGuard::new(running_set, platform);
                let run_logger = RunLogger::new(run_logger_store);
                let outcome = run_platform_job(
                    &store,
                    &proxy_pool,
                    browser_factory.as_ref(),
                    &config,
                    &run_logger,
                    platform,
                    DEFAULT_DISCOVERY_LIMIT,
                )
                .await;

                let succeeded = match &outcome {
                    Ok(o) => !matches!(o.status, RunStatus::Failed | RunStatus::Cancelled),
                    Err(_) => false,
                };

                if let Err(err) = &outcome {
                    error!(platform = platform.as_str(), error = %err, "scheduled run failed");
                }

                if let Err(err) = advance_next_run(advance_store, platform, frequency_hours, succeeded).await {
                    warn!(platform = platform.as_str(), error = %err, "failed to recompute next_run_at");
                }
            });
        }

        Ok(())
    }

    /// One-shot run used by `cli run --source=<platform> --once` and by the
    /// `worker` subcommand's direct-invocation mode. Does not touch
    /// `scheduler_settings` — the caller owns scheduling when running ad hoc.
    pub async fn run_once(&self, platform: Platform, limit: usize) -> Result<RunOutcome, ClassifiedError> {
        run_platform_job(
            &self.store,
            &self.proxy_pool,
            self.browser_factory.as_ref(),
            &self.config,
            &self.run_logger,
            platform,
            limit,
        )
        .await
    }
}

/// RAII overlap-prevention guard: removes `platform` from the running set on
/// drop, regardless of how the owning task exits (success, error, panic).
struct RunningGuard {
    running: Arc<Mutex<HashSet<Platform>>>,
    platform: Platform,
}

impl RunningGuard {
    fn new(running: Arc<Mutex<HashSet<Platform>>>, platform: Platform) -> Self {
        Self { running, platform }
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.running.lock().remove(&self.platform);
    }
}

/// Recompute and persist `next_run_at` after a run finishes, per §4.11 "on
/// completion: recompute `next_run_at = now + frequency_hours`... update
/// per-platform counters" and §3's `run_count`/`success_count`/`failure_count`.
async fn advance_next_run(
    store: Arc<dyn Store>,
    platform: Platform,
    frequency_hours: f64,
    succeeded: bool,
) -> Result<(), ClassifiedError> {
    let mut row = match store.get_scheduler_setting(platform).await? {
        Some(row) => row,
        None => crate::store::models::SchedulerSettingRow::defaults(platform, frequency_hours),
    };
    row.last_run_at = Some(Utc::now());
    row.recompute_next_run();
    row.run_count += 1;
    if succeeded {
        row.success_count += 1;
    } else {
        row.failure_count += 1;
    }
    store.upsert_scheduler_setting(&row).await
}

/// The full per-run pipeline (§3.1 control flow): acquire a browser context
/// (with a proxy if any are configured), discover candidate trends, enrich a
/// fan-out of samples, aggregate/score, load through the ETL stage, then
/// re-rank and decay the day's snapshot. Always finalizes the `RunLog`
/// exactly once, success or failure.
async fn run_platform_job(
    store: &Arc<dyn Store>,
    proxy_pool: &Arc<crate::proxy::ProxyPool>,
    browser_factory: &dyn BrowserContextFactory,
    config: &ResolvedConfig,
    run_logger: &RunLogger,
    platform: Platform,
    limit: usize,
) -> Result<RunOutcome, ClassifiedError> {
    let handle = run_logger
        .start(
            platform,
            serde_json::json!({ "headless": config.headless, "proxy_required": config.require_proxies }),
        )
        .await?;

    let trace = TraceContext::start_trace(platform.as_str());
    let adapter = sources::build_adapter(platform);
    let options = ContextOptions::from_config(config);
    let proxy_used = !proxy_pool.is_empty();

    let acquire_span = trace.start_span("acquire_context");
    let ctx_result = acquire_context(proxy_pool, browser_factory, &options).await;
    let mut ctx = match ctx_result {
        Ok(ctx) => {
            acquire_span.end(true, None);
            ctx
        }
        Err(err) => {
            acquire_span.end(false, Some(err.kind.tag()));
            run_logger
                .finish(&handle, RunStatus::Failed, 0, 0, Some(&err))
                .await?;
            metrics::record_error(platform.as_str(), err.kind.tag(), err.kind.severity().as_str());
            return Err(err);
        }
    };

    let discover_span = trace.start_span("discover");
    let discover_result =
        discover_with_fresh_proxy_retry(adapter.as_ref(), &mut ctx, proxy_pool, browser_factory, &options, limit, proxy_used)
            .await;
    let raw_trends = match discover_result {
        Ok(trends) => {
            discover_span.end(true, None);
            trends
        }
        Err(err) => {
            discover_span.end(false, Some(err.kind.tag()));
            if let Err(close_err) = ctx.close().await {
                warn!(platform = platform.as_str(), error = %close_err, "failed to close browser context");
            }
            run_logger
                .finish(&handle, RunStatus::Failed, 0, 0, Some(&err))
                .await?;
            metrics::record_error(platform.as_str(), err.kind.tag(), err.kind.severity().as_str());
            return Err(err);
        }
    };

    let job_span = trace.start_span("run_job_body");
    let run_body = run_job_body(
        store,
        adapter.as_ref(),
        ctx.handle(),
        config,
        handle.run_version_id,
        raw_trends,
        proxy_used,
    )
    .await;
    if let Err(err) = ctx.close().await {
        warn!(platform = platform.as_str(), error = %err, "failed to close browser context");
    }

    match run_body {
        Ok((scraped, uploaded, invalid)) => {
            job_span.end(true, None);
            let status = if invalid > 0 && uploaded == 0 {
                RunStatus::Failed
            } else if invalid > 0 {
                RunStatus::CompletedWithWarnings
            } else {
                RunStatus::Completed
            };
            run_logger.finish(&handle, status, scraped, uploaded, None).await?;
            Ok(RunOutcome {
                status,
                records_scraped: scraped,
                records_uploaded: uploaded,
                records_invalid: invalid,
            })
        }
        Err(err) => {
            job_span.end(false, Some(err.kind.tag()));
            metrics::record_error(platform.as_str(), err.kind.tag(), err.kind.severity().as_str());
            run_logger
                .finish(&handle, RunStatus::Failed, 0, 0, Some(&err))
                .await?;
            Err(err)
        }
    }
}

/// Acquire a scoped browser context, routing through the proxy pool's
/// retrying acquisition when proxies are configured, or spawning directly
/// against no proxy when the deployment runs without one (§9 Open Question:
/// `require_proxies=false` with an empty pool is a deliberate direct-connect
/// mode, not an error — `ProxyPool::from_config` already enforces that an
/// empty pool with `require_proxies=true` fails at startup, before the
/// scheduler ever runs).
async fn acquire_context(
    proxy_pool: &Arc<crate::proxy::ProxyPool>,
    browser_factory: &dyn BrowserContextFactory,
    options: &ContextOptions,
) -> Result<BrowserContext, ClassifiedError> {
    if proxy_pool.is_empty() {
        let raw = browser_factory.spawn(options, None).await?;
        return Ok(BrowserContext::new(raw));
    }

    let raw = proxy_pool
        .execute_with_retry(ADAPTER_RETRY_ATTEMPTS, |proxy| browser_factory.spawn(options, Some(proxy)))
        .await?;
    Ok(BrowserContext::new(raw))
}

/// Discover, enrich, score, and persist one platform's batch. Returns
/// `(records_scraped, records_uploaded, records_invalid)`.
async fn run_job_body(
    store: &Arc<dyn Store>,
    adapter: &dyn SourceAdapter,
    handle: &dyn crate::browser::BrowserHandle,
    config: &ResolvedConfig,
    run_version_id: Uuid,
    raw_trends: Vec<crate::etl::raw::RawTrend>,
    proxy_used: bool,
) -> Result<(i64, i64, i64), ClassifiedError> {
    // §5 allows up to `ENRICH_FANOUT` concurrent sample visits sharing one
    // browser instance across distinct contexts. This build's `BrowserHandle`
    // is a single shared handle rather than per-sample contexts (the
    // concrete driver binding that would hand back N independent contexts is
    // out of scope, §1), so fan-out here is expressed as sequential,
    // chunk-bounded processing rather than true concurrency — the chunking
    // still caps how much state accumulates in flight per batch.
    let mut enriched = Vec::with_capacity(raw_trends.len());
    for batch in raw_trends.chunks(ENRICH_FANOUT) {
        for raw in batch {
            match enrich_with_retry(adapter, handle, raw, proxy_used).await {
                Ok(e) => enriched.push(e),
                Err(err) if err.kind == ErrorKind::Auth || err.kind == ErrorKind::Proxy => return Err(err),
                Err(err) => warn!(error = %err, "enrich attempt failed, skipping item"),
            }
        }
    }

    let scraped = enriched.len() as i64;
    metrics::record_records_scraped(adapter.platform().as_str(), scraped.max(0) as u64);

    let records = adapter.aggregate(&enriched);

    let etl = EtlPipeline::new(store.clone(), DedupeStrategy::default(), crate::etl::DEFAULT_CHUNK_SIZE);
    let (uploaded, invalid) = etl.load_batch(records, run_version_id).await;
    metrics::record_records_invalid(adapter.platform().as_str(), invalid.max(0) as u64);

    let snapshot = SnapshotStage::new(store.clone());
    let today = Utc::now().date_naive();
    snapshot.rank_and_diff(adapter.platform(), today).await?;
    snapshot
        .decay_and_archive(adapter.platform(), Utc::now(), LifecycleThresholds::from(config), run_version_id)
        .await?;

    Ok((scraped, uploaded, invalid))
}

/// Discover, then retry against a freshly re-acquired proxy (a new
/// `BrowserContext`, hence a new circuit/proxy) whenever the result comes in
/// below `SourceAdapter::min_discovery_items`, up to `max_discovery_retries`
/// (§4.6). Adapters that don't set a floor (both default to 0) skip this
/// loop entirely and behave exactly as before.
async fn discover_with_fresh_proxy_retry(
    adapter: &dyn SourceAdapter,
    ctx: &mut BrowserContext,
    proxy_pool: &Arc<crate::proxy::ProxyPool>,
    browser_factory: &dyn BrowserContextFactory,
    options: &ContextOptions,
    limit: usize,
    proxy_used: bool,
) -> Result<Vec<crate::etl::raw::RawTrend>, ClassifiedError> {
    let min_items = adapter.min_discovery_items();
    let max_retries = adapter.max_discovery_retries();

    let mut attempt = 0;
    loop {
        let trends = discover_with_retry(adapter, ctx.handle(), limit, proxy_used).await?;
        if trends.len() >= min_items || attempt >= max_retries {
            if trends.len() < min_items {
                warn!(
                    platform = adapter.platform().as_str(),
                    found = trends.len(),
                    min_items,
                    "discovery stayed below floor after exhausting fresh-proxy retries, proceeding with what came back"
                );
            }
            return Ok(trends);
        }

        warn!(
            platform = adapter.platform().as_str(),
            found = trends.len(),
            min_items,
            attempt,
            "discovery below floor, reacquiring a fresh proxy and retrying"
        );
        attempt += 1;
        if let Err(err) = ctx.close().await {
            warn!(error = %err, "failed to close browser context before a discovery retry");
        }
        *ctx = acquire_context(proxy_pool, browser_factory, options).await?;
    }
}

/// Retry `discover` for NETWORK/TIMEOUT/RATE_LIMIT kinds with linear backoff;
/// anything else (e.g. SCRAPE once selector fallback is exhausted) raises
/// immediately (§7).
async fn discover_with_retry(
    adapter: &dyn SourceAdapter,
    handle: &dyn crate::browser::BrowserHandle,
    limit: usize,
    proxy_used: bool,
) -> Result<Vec<crate::etl::raw::RawTrend>, ClassifiedError> {
    let mut last_err = None;
    for attempt in 0..=ADAPTER_RETRY_ATTEMPTS {
        let started = std::time::Instant::now();
        let result = adapter.discover(handle, limit).await;
        metrics::record_scrape_duration(adapter.platform().as_str(), proxy_used, started.elapsed().as_secs_f64() * 1000.0);
        match result {
            Ok(trends) => return Ok(trends),
            Err(e) if is_retryable(e.kind) => {
                warn!(attempt, error = %e, "discover failed, retrying");
                last_err = Some(e);
                tokio::time::sleep(Duration::from_secs(2 * (attempt as u64 + 1))).await;
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| ClassifiedError::new(ErrorKind::Unknown, "exhausted", "discovery retries exhausted")))
}

async fn enrich_with_retry(
    adapter: &dyn SourceAdapter,
    handle: &dyn crate::browser::BrowserHandle,
    raw: &crate::etl::raw::RawTrend,
    proxy_used: bool,
) -> Result<crate::etl::raw::EnrichedTrend, ClassifiedError> {
    let mut last_err = None;
    for attempt in 0..=ADAPTER_RETRY_ATTEMPTS {
        let started = std::time::Instant::now();
        let result = adapter.enrich(handle, raw).await;
        metrics::record_scrape_duration(adapter.platform().as_str(), proxy_used, started.elapsed().as_secs_f64() * 1000.0);
        match result {
            Ok(e) => return Ok(e),
            Err(e) if is_retryable(e.kind) => {
                last_err = Some(e);
                tokio::time::sleep(Duration::from_secs(attempt as u64 + 1)).await;
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| ClassifiedError::new(ErrorKind::Unknown, "exhausted", "enrich retries exhausted")))
}

fn is_retryable(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::Network | ErrorKind::Timeout | ErrorKind::RateLimit)
}
