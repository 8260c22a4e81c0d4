// =============================================================================
// ProxyPool — rotating pool with health scoring and circuit breaking (C4)
// =============================================================================

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use tracing::{info, warn};

use crate::config::{ProxyRotationStrategy, ResolvedConfig};
use crate::errors::{ClassifiedError, ErrorKind};
use crate::proxy::entry::{CircuitState, ProxyEntry, ProxyEntrySnapshot};
use crate::telemetry::metrics;

/// Minimum health score an entry must have to be eligible for acquisition.
const MIN_HEALTH: f64 = 0.1;

/// A handle to an acquired proxy entry. Dropping it without calling
/// `release()` would leak an in-flight slot, so `ProxyPool::execute_with_retry`
/// always releases explicitly in a `finally`-style block.
pub struct AcquiredProxy<'a> {
    pub entry: &'a ProxyEntry,
}

/// Thread-safe rotating proxy pool with health scoring and circuit breaking
/// (§4.4). All mutation goes through `acquire`/`release`/`record_*` — callers
/// never touch a `ProxyEntry`'s internals directly.
pub struct ProxyPool {
    entries: Vec<ProxyEntry>,
    strategy: ProxyRotationStrategy,
    circuit_breaker_threshold: u32,
    circuit_breaker_timeout: Duration,
    require_proxies: bool,
    round_robin_cursor: AtomicUsize,
}

impl ProxyPool {
    pub fn from_config(cfg: &ResolvedConfig) -> Result<Self, ClassifiedError> {
        let entries: Vec<ProxyEntry> = cfg
            .proxy_list
            .iter()
            .cloned()
            .map(|spec| ProxyEntry::from_spec(spec, None, Vec::new()))
            .collect();

        if cfg.require_proxies && entries.is_empty() {
            return Err(ClassifiedError::config_missing(
                "require_proxies is set but proxy pool is empty",
            ));
        }

        info!(count = entries.len(), strategy = ?cfg.proxy_rotation_strategy, "proxy pool initialised");

        Ok(Self {
            entries,
            strategy: cfg.proxy_rotation_strategy,
            circuit_breaker_threshold: cfg.circuit_breaker_threshold,
            circuit_breaker_timeout: Duration::from_secs(cfg.circuit_breaker_timeout_seconds),
            require_proxies: cfg.require_proxies,
            round_robin_cursor: AtomicUsize::new(0),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn eligible(&self, exclude: &[String]) -> Vec<&ProxyEntry> {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|e| !exclude.iter().any(|x| x == e.key()))
            .filter(|e| e.is_eligible(MIN_HEALTH, self.circuit_breaker_timeout, now))
            .collect()
    }

    /// Select the best eligible entry per the configured rotation strategy.
    /// Returns `None` if the pool is empty or no entry is currently eligible
    /// — if `require_proxies` is set this is the caller's cue to fail the
    /// operation with `PROXY/unavailable` (never silently skip proxying).
    pub fn acquire(&self, exclude: &[String]) -> Option<AcquiredProxy<'_>> {
        let candidates = self.eligible(exclude);
        if candidates.is_empty() {
            return None;
        }

        let chosen = match self.strategy {
            ProxyRotationStrategy::HealthBased => {
                let now = Instant::now();
                candidates
                    .into_iter()
                    .max_by(|a, b| {
                        a.derived_health_score(now)
                            .partial_cmp(&b.derived_health_score(now))
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .unwrap()
            }
            ProxyRotationStrategy::RoundRobin => {
                let idx = self.round_robin_cursor.fetch_add(1, Ordering::Relaxed) % candidates.len();
                candidates[idx]
            }
            ProxyRotationStrategy::Random => {
                let mut rng = rand::thread_rng();
                *candidates.choose(&mut rng).unwrap()
            }
        };

        chosen.mark_acquired();
        metrics::record_proxy_selection(chosen.key());
        Some(AcquiredProxy { entry: chosen })
    }

    pub fn release(&self, acquired: AcquiredProxy<'_>) {
        acquired.entry.release();
    }

    pub fn record_success(&self, acquired: &AcquiredProxy<'_>, latency: Duration) {
        acquired.entry.record_success(latency.as_secs_f64() * 1000.0);
    }

    pub fn record_failure(&self, acquired: &AcquiredProxy<'_>, kind: ErrorKind) -> CircuitState {
        acquired
            .entry
            .record_failure(kind, self.circuit_breaker_threshold)
    }

    pub fn snapshots(&self) -> Vec<ProxyEntrySnapshot> {
        self.entries.iter().map(|e| e.snapshot()).collect()
    }

    /// Run `op` against an acquired proxy, retrying with exponential backoff
    /// (1s, 2s, 4s, ... cap 60s) up to `max_retries` times. Classifies any
    /// error `op` returns, records it on the pool, and excludes the failing
    /// entry from the next attempt so a single bad proxy doesn't get retried
    /// in a tight loop.
    pub async fn execute_with_retry<F, Fut, T>(
        &self,
        max_retries: u32,
        mut op: F,
    ) -> Result<T, ClassifiedError>
    where
        F: FnMut(&ProxyEntry) -> Fut,
        Fut: Future<Output = Result<T, ClassifiedError>>,
    {
        let mut excluded: Vec<String> = Vec::new();
        let mut last_err: Option<ClassifiedError> = None;

        for attempt in 0..=max_retries {
            let acquired = match self.acquire(&excluded) {
                Some(a) => a,
                None => {
                    if self.require_proxies {
                        return Err(ClassifiedError::proxy_unavailable(
                            "no eligible proxy entries remain",
                        ));
                    }
                    return Err(last_err.unwrap_or_else(|| {
                        ClassifiedError::proxy_unavailable("no proxies configured")
                    }));
                }
            };

            let started = Instant::now();
            let result = op(acquired.entry).await;
            let elapsed = started.elapsed();

            match result {
                Ok(v) => {
                    self.record_success(&acquired, elapsed);
                    self.release(acquired);
                    return Ok(v);
                }
                Err(e) => {
                    let state = self.record_failure(&acquired, e.kind);
                    warn!(
                        proxy = acquired.entry.key(),
                        attempt,
                        kind = %e.kind,
                        circuit_state = %state,
                        "execute_with_retry attempt failed"
                    );
                    excluded.push(acquired.entry.key().to_string());
                    self.release(acquired);
                    last_err = Some(e);

                    if attempt < max_retries {
                        let backoff = Duration::from_secs(1u64 << attempt.min(6)).min(Duration::from_secs(60));
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| ClassifiedError::new(ErrorKind::Proxy, "exhausted", "retries exhausted")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxySpec;

    fn pool_with(servers: &[&str]) -> ProxyPool {
        let cfg = ResolvedConfig {
            proxy_list: servers
                .iter()
                .map(|s| ProxySpec {
                    server: s.to_string(),
                    username: None,
                    password: None,
                })
                .collect(),
            circuit_breaker_threshold: 5,
            circuit_breaker_timeout_seconds: 300,
            ..ResolvedConfig::default()
        };
        ProxyPool::from_config(&cfg).unwrap()
    }

    #[test]
    fn health_based_selects_best_scoring_entry() {
        let pool = pool_with(&["a:1", "b:1"]);
        pool.entries[0].record_failure(ErrorKind::Network, 100);
        let acquired = pool.acquire(&[]).unwrap();
        assert_eq!(acquired.entry.key(), "b:1");
    }

    #[test]
    fn acquire_excludes_open_circuits() {
        let pool = pool_with(&["a:1", "b:1"]);
        for _ in 0..5 {
            pool.entries[0].record_failure(ErrorKind::Network, 5);
        }
        for _ in 0..10 {
            let acquired = pool.acquire(&[]).unwrap();
            assert_eq!(acquired.entry.key(), "b:1");
            pool.release(acquired);
        }
    }

    #[test]
    fn empty_pool_returns_none() {
        let pool = pool_with(&[]);
        assert!(pool.acquire(&[]).is_none());
    }

    #[tokio::test]
    async fn execute_with_retry_succeeds_after_transient_failure() {
        let pool = pool_with(&["a:1"]);
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result = pool
            .execute_with_retry(2, |_entry| {
                let n = attempts.fetch_add(1, Ordering::Relaxed);
                async move {
                    if n == 0 {
                        Err(ClassifiedError::new(ErrorKind::Network, "refused", "boom"))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn execute_with_retry_fails_after_exhaustion() {
        let pool = pool_with(&["a:1"]);
        let result: Result<(), _> = pool
            .execute_with_retry(1, |_entry| async {
                Err(ClassifiedError::new(ErrorKind::Network, "refused", "boom"))
            })
            .await;
        assert!(result.is_err());
    }
}
