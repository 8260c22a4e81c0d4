// =============================================================================
// Metrics Registry — Prometheus-style counters/gauges/histograms (§4.2)
// =============================================================================
//
// Thin wrapper around the `metrics` facade + a Prometheus exporter. Required
// series are emitted as named constants here so call sites never typo a
// metric name. The registry itself is process-wide global state, installed
// once at startup (§5) — the same "one registry, init at bootstrap" shape
// the teacher uses for its `RateLimitTracker`/`RiskEngine` atomics, just
// promoted to a real metrics backend since this spec requires Prometheus
// compatibility.
// =============================================================================

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub const SCRAPER_RUNS_TOTAL: &str = "scraper_runs_total";
pub const SCRAPER_ERRORS_TOTAL: &str = "scraper_errors_total";
pub const SCRAPE_ATTEMPT_DURATION_MS: &str = "scrape_attempt_duration_ms";
pub const PROXY_SELECTIONS_TOTAL: &str = "proxy_selections_total";
pub const PROXY_SUCCESSES_TOTAL: &str = "proxy_successes_total";
pub const PROXY_FAILURES_TOTAL: &str = "proxy_failures_total";
pub const PROXY_CIRCUIT_BREAKER_OPENS_TOTAL: &str = "proxy_circuit_breaker_opens_total";
pub const DB_UPLOAD_DURATION_MS: &str = "db_upload_duration_ms";
pub const RECORDS_SCRAPED: &str = "records_scraped";
pub const RECORDS_UPLOADED: &str = "records_uploaded";
pub const RECORDS_INVALID_TOTAL: &str = "records_invalid_total";
pub const QUEUE_JOBS_RETRIED_TOTAL: &str = "queue_jobs_retried_total";
pub const QUEUE_JOBS_SUCCEEDED_TOTAL: &str = "queue_jobs_succeeded_total";
pub const QUEUE_JOBS_PERMANENTLY_FAILED_TOTAL: &str = "queue_jobs_permanently_failed_total";

/// Install the global Prometheus recorder and return a handle whose
/// `render()` method produces the scrape-able text exposition format (wired
/// up behind `GET /stats` or a dedicated `/metrics` route).
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus metrics recorder")
}

/// Record a terminal run outcome.
pub fn record_run(platform: &str, outcome: &str) {
    metrics::counter!(SCRAPER_RUNS_TOTAL, "platform" => platform.to_string(), "outcome" => outcome.to_string())
        .increment(1);
}

/// Record a classified error.
pub fn record_error(platform: &str, kind: &str, severity: &str) {
    metrics::counter!(SCRAPER_ERRORS_TOTAL, "platform" => platform.to_string(), "kind" => kind.to_string(), "severity" => severity.to_string())
        .increment(1);
}

/// Record one scrape attempt's wall-clock duration.
pub fn record_scrape_duration(platform: &str, proxy_used: bool, millis: f64) {
    metrics::histogram!(SCRAPE_ATTEMPT_DURATION_MS, "platform" => platform.to_string(), "proxy_used" => proxy_used.to_string())
        .record(millis);
}

/// Record a proxy selection by its pool key (e.g. `host:port`).
pub fn record_proxy_selection(proxy_key: &str) {
    metrics::counter!(PROXY_SELECTIONS_TOTAL, "proxy_key" => proxy_key.to_string()).increment(1);
}

pub fn record_proxy_success() {
    metrics::counter!(PROXY_SUCCESSES_TOTAL).increment(1);
}

pub fn record_proxy_failure(kind: &str) {
    metrics::counter!(PROXY_FAILURES_TOTAL, "kind" => kind.to_string()).increment(1);
}

pub fn record_circuit_breaker_open() {
    metrics::counter!(PROXY_CIRCUIT_BREAKER_OPENS_TOTAL).increment(1);
}

pub fn record_db_upload_duration(millis: f64) {
    metrics::histogram!(DB_UPLOAD_DURATION_MS).record(millis);
}

pub fn record_records_scraped(platform: &str, count: u64) {
    metrics::counter!(RECORDS_SCRAPED, "platform" => platform.to_string()).increment(count);
}

pub fn record_records_uploaded(platform: &str, count: u64) {
    metrics::counter!(RECORDS_UPLOADED, "platform" => platform.to_string()).increment(count);
}

pub fn record_records_invalid(platform: &str, count: u64) {
    metrics::counter!(RECORDS_INVALID_TOTAL, "platform" => platform.to_string()).increment(count);
}

pub fn record_queue_retry(kind: &str) {
    metrics::counter!(QUEUE_JOBS_RETRIED_TOTAL, "kind" => kind.to_string()).increment(1);
}

pub fn record_queue_success() {
    metrics::counter!(QUEUE_JOBS_SUCCEEDED_TOTAL).increment(1);
}

pub fn record_queue_permanent_failure(kind: &str) {
    metrics::counter!(QUEUE_JOBS_PERMANENTLY_FAILED_TOTAL, "kind" => kind.to_string()).increment(1);
}
