// Integration coverage for the Scheduler (C11, §4.11) against a real
// sqlite-backed `Store`, exercising the public `run_once`/`run_forever`
// surface rather than any one internal helper.

use std::sync::Arc;
use std::time::Duration;

use trend_harvester::browser::UnconfiguredBrowserFactory;
use trend_harvester::config::ResolvedConfig;
use trend_harvester::errors::ErrorKind;
use trend_harvester::proxy::ProxyPool;
use trend_harvester::scheduler::Scheduler;
use trend_harvester::store::{SqliteStore, Store};
use trend_harvester::types::Platform;

async fn memory_store() -> Arc<dyn Store> {
    let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
    store.init_schema().await.unwrap();
    Arc::new(store)
}

fn scheduler(store: Arc<dyn Store>) -> Scheduler {
    let proxy_pool = Arc::new(ProxyPool::from_config(&ResolvedConfig::default()).unwrap());
    let browser_factory = Arc::new(UnconfiguredBrowserFactory);
    Scheduler::new(store, proxy_pool, browser_factory, ResolvedConfig::default())
}

#[tokio::test]
async fn run_once_without_a_configured_browser_backend_fails_with_config_error() {
    let store = memory_store().await;
    let sched = scheduler(store);

    let err = sched.run_once(Platform::TikTok, 10).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Config);
}

#[tokio::test]
async fn run_once_never_writes_a_scheduler_settings_row() {
    // Per its own doc comment, `run_once` is the ad hoc path used by
    // `cli run --once` and the worker subcommand — scheduling bookkeeping is
    // the long-running scheduler's job, not this call's.
    let store = memory_store().await;
    let sched = scheduler(store.clone());

    let _ = sched.run_once(Platform::TikTok, 10).await;

    assert!(store.get_scheduler_setting(Platform::TikTok).await.unwrap().is_none());
}

#[tokio::test]
async fn run_forever_seeds_default_scheduler_settings_for_every_platform() {
    let store = memory_store().await;
    let sched = scheduler(store.clone()).with_tick_interval(Duration::from_secs(3600));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(async move {
        sched.run_forever(shutdown_rx).await;
    });

    // `ensure_registered` runs synchronously before the first tick; give it a
    // moment to land, then ask the loop to stop.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let _ = shutdown_tx.send(true);
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("run_forever should stop promptly after the shutdown signal")
        .unwrap();

    for platform in Platform::ALL {
        let setting = store.get_scheduler_setting(platform).await.unwrap();
        assert!(setting.is_some(), "{platform:?} should have a default scheduler_settings row");
        assert_eq!(setting.unwrap().run_count, 0, "no tick fired, so run_count should still be zero");
    }
}
