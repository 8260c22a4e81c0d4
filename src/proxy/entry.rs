// =============================================================================
// ProxyEntry — one configured proxy endpoint plus its runtime health state
// =============================================================================
//
// Grounded on `risk.rs`'s circuit-breaker shape: an `Inner` struct behind a
// `parking_lot::RwLock`, capped/floored counters, state transitions logged
// at `info!`/`warn!`. Here the four breakers become one breaker per proxy
// entry, and "trade result" becomes "request result".
// =============================================================================

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ProxySpec;
use crate::errors::ErrorKind;
use crate::telemetry::metrics;

/// Circuit breaker state for a single proxy entry (§4.4, P4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Serialisable snapshot of one proxy entry's health, for the admin surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyEntrySnapshot {
    pub key: String,
    pub region: Option<String>,
    pub health_score: f64,
    pub consecutive_failures: u32,
    pub circuit_state: CircuitState,
    pub in_flight: u32,
    pub success_count: u64,
    pub failure_count: u64,
}

struct Inner {
    health_score: f64,
    consecutive_failures: u32,
    circuit_state: CircuitState,
    state_since: Instant,
    success_count: u64,
    failure_count: u64,
    latency_sum_ms: f64,
    latency_count: u64,
    last_used: Option<Instant>,
    backoff_until: Option<Instant>,
    backoff_exponent: u32,
}

/// One pool member: a proxy endpoint plus its runtime health state.
///
/// Lifecycle: created from config at startup, mutated only via
/// `record_success`/`record_failure`, destroyed at shutdown — never mutated
/// directly by callers (§3 ownership rule).
pub struct ProxyEntry {
    pub server: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub region: Option<String>,
    pub tags: Vec<String>,
    pub max_concurrent: u32,
    in_flight: AtomicU32,
    round_robin_hint: AtomicU64,
    inner: RwLock<Inner>,
}

impl ProxyEntry {
    pub fn from_spec(spec: ProxySpec, region: Option<String>, tags: Vec<String>) -> Self {
        Self {
            server: spec.server,
            username: spec.username,
            password: spec.password,
            region,
            tags,
            max_concurrent: 4,
            in_flight: AtomicU32::new(0),
            round_robin_hint: AtomicU64::new(0),
            inner: RwLock::new(Inner {
                health_score: 1.0,
                consecutive_failures: 0,
                circuit_state: CircuitState::Closed,
                state_since: Instant::now(),
                success_count: 0,
                failure_count: 0,
                latency_sum_ms: 0.0,
                latency_count: 0,
                last_used: None,
                backoff_until: None,
                backoff_exponent: 0,
            }),
        }
    }

    /// Stable identity key, e.g. `"host:port"`, used for metric labels and
    /// round-robin bookkeeping — never includes credentials.
    pub fn key(&self) -> &str {
        &self.server
    }

    pub fn in_flight(&self) -> u32 {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Whether this entry is currently eligible for selection: circuit not
    /// open (unless the breaker timeout has elapsed, in which case it moves
    /// to half-open), not over its concurrency cap, not in backoff, and
    /// above `min_health`.
    pub fn is_eligible(&self, min_health: f64, circuit_timeout: Duration, now: Instant) -> bool {
        if self.in_flight() >= self.max_concurrent {
            return false;
        }

        let mut inner = self.inner.write();
        if let Some(until) = inner.backoff_until {
            if now < until {
                return false;
            }
        }

        match inner.circuit_state {
            CircuitState::Open => {
                if now.duration_since(inner.state_since) >= circuit_timeout {
                    inner.circuit_state = CircuitState::HalfOpen;
                    inner.state_since = now;
                    info!(proxy = self.key(), "circuit breaker half-open");
                } else {
                    return false;
                }
            }
            CircuitState::Closed | CircuitState::HalfOpen => {}
        }

        inner.health_score >= min_health
    }

    /// Derived health score per §4.4:
    /// `0.6*success_rate + 0.2*recency_factor + 0.2*latency_factor - penalty_if_open`.
    pub fn derived_health_score(&self, now: Instant) -> f64 {
        let inner = self.inner.read();
        let total = inner.success_count + inner.failure_count;
        let success_rate = if total == 0 {
            1.0
        } else {
            inner.success_count as f64 / total as f64
        };

        let recency_factor = match inner.last_used {
            Some(t) => {
                let age = now.duration_since(t).as_secs_f64();
                (1.0 - age / 3600.0).clamp(0.0, 1.0)
            }
            None => 1.0,
        };

        let avg_latency_ms = if inner.latency_count == 0 {
            0.0
        } else {
            inner.latency_sum_ms / inner.latency_count as f64
        };
        let latency_factor = (1.0 - avg_latency_ms / 5000.0).clamp(0.0, 1.0);

        let penalty = if inner.circuit_state == CircuitState::Open {
            0.5
        } else {
            0.0
        };

        (0.6 * success_rate + 0.2 * recency_factor + 0.2 * latency_factor - penalty)
            .clamp(0.0, 1.0)
    }

    pub fn mark_acquired(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_used = Some(Instant::now());
    }

    pub fn release(&self) {
        let _ = self
            .in_flight
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(1))
            });
    }

    /// +2 to score (capped 100 on a 0-100 internal scale, exposed 0.0-1.0),
    /// resets consecutive_failures, closes circuit.
    pub fn record_success(&self, latency_ms: f64) {
        let mut inner = self.inner.write();
        inner.success_count += 1;
        inner.latency_sum_ms += latency_ms;
        inner.latency_count += 1;
        inner.consecutive_failures = 0;
        inner.health_score = (inner.health_score + 0.02).min(1.0);
        inner.backoff_until = None;
        inner.backoff_exponent = 0;

        let was_half_open = inner.circuit_state == CircuitState::HalfOpen;
        let was_open = inner.circuit_state == CircuitState::Open;
        if was_half_open || was_open {
            inner.circuit_state = CircuitState::Closed;
            inner.state_since = Instant::now();
            info!(proxy = self.key(), "circuit breaker closed after success");
        }
        drop(inner);

        metrics::record_proxy_success();
    }

    /// Subtracts per-kind penalty, floored at 0; increments
    /// `consecutive_failures`; trips the breaker open if it crosses
    /// threshold. Returns the new circuit state for the caller to log/meter.
    pub fn record_failure(&self, kind: ErrorKind, threshold: u32) -> CircuitState {
        let penalty = match kind {
            ErrorKind::Timeout => 0.03,
            ErrorKind::Auth => 0.10,
            _ => 0.05,
        };

        let mut inner = self.inner.write();
        inner.failure_count += 1;
        inner.consecutive_failures += 1;
        inner.health_score = (inner.health_score - penalty).max(0.0);

        let now = Instant::now();
        let base = Duration::from_secs(1);
        let max = Duration::from_secs(60);
        let backoff = base.saturating_mul(1u32 << inner.backoff_exponent.min(6));
        inner.backoff_until = Some(now + backoff.min(max));
        inner.backoff_exponent = (inner.backoff_exponent + 1).min(6);

        if inner.circuit_state == CircuitState::HalfOpen {
            inner.circuit_state = CircuitState::Open;
            inner.state_since = now;
            warn!(proxy = self.key(), "circuit breaker re-opened after half-open failure");
        } else if inner.consecutive_failures >= threshold && inner.circuit_state == CircuitState::Closed
        {
            inner.circuit_state = CircuitState::Open;
            inner.state_since = now;
            warn!(
                proxy = self.key(),
                consecutive_failures = inner.consecutive_failures,
                threshold,
                "circuit breaker opened"
            );
            metrics::record_circuit_breaker_open();
        }

        let state = inner.circuit_state;
        drop(inner);

        metrics::record_proxy_failure(kind.tag());
        state
    }

    pub fn next_round_robin_hint(&self) -> u64 {
        self.round_robin_hint.fetch_add(1, Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> ProxyEntrySnapshot {
        let inner = self.inner.read();
        ProxyEntrySnapshot {
            key: self.key().to_string(),
            region: self.region.clone(),
            health_score: inner.health_score,
            consecutive_failures: inner.consecutive_failures,
            circuit_state: inner.circuit_state,
            in_flight: self.in_flight(),
            success_count: inner.success_count,
            failure_count: inner.failure_count,
        }
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.inner.read().circuit_state
    }

    pub fn health_score(&self) -> f64 {
        self.inner.read().health_score
    }
}

impl std::fmt::Debug for ProxyEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyEntry")
            .field("server", &self.server)
            .field("username", &self.username.as_ref().map(|_| "<redacted>"))
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("circuit_state", &self.circuit_state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(server: &str) -> ProxySpec {
        ProxySpec {
            server: server.to_string(),
            username: None,
            password: None,
        }
    }

    #[test]
    fn circuit_opens_after_threshold_consecutive_failures() {
        let entry = ProxyEntry::from_spec(spec("p1:8080"), None, vec![]);
        for _ in 0..4 {
            entry.record_failure(ErrorKind::Network, 5);
        }
        assert_eq!(entry.circuit_state(), CircuitState::Closed);
        entry.record_failure(ErrorKind::Network, 5);
        assert_eq!(entry.circuit_state(), CircuitState::Open);
    }

    #[test]
    fn success_resets_consecutive_failures() {
        let entry = ProxyEntry::from_spec(spec("p1:8080"), None, vec![]);
        entry.record_failure(ErrorKind::Network, 5);
        entry.record_failure(ErrorKind::Network, 5);
        entry.record_success(50.0);
        assert_eq!(entry.inner.read().consecutive_failures, 0);
    }

    #[test]
    fn half_open_failure_reopens_circuit() {
        let entry = ProxyEntry::from_spec(spec("p1:8080"), None, vec![]);
        for _ in 0..5 {
            entry.record_failure(ErrorKind::Network, 5);
        }
        assert_eq!(entry.circuit_state(), CircuitState::Open);
        entry.inner.write().circuit_state = CircuitState::HalfOpen;
        entry.record_failure(ErrorKind::Network, 5);
        assert_eq!(entry.circuit_state(), CircuitState::Open);
    }

    #[test]
    fn half_open_success_closes_circuit() {
        let entry = ProxyEntry::from_spec(spec("p1:8080"), None, vec![]);
        entry.inner.write().circuit_state = CircuitState::HalfOpen;
        entry.record_success(20.0);
        assert_eq!(entry.circuit_state(), CircuitState::Closed);
    }

    #[test]
    fn health_score_floors_at_zero() {
        let entry = ProxyEntry::from_spec(spec("p1:8080"), None, vec![]);
        for _ in 0..50 {
            entry.record_failure(ErrorKind::Auth, 1000);
        }
        assert_eq!(entry.health_score(), 0.0);
    }
}
