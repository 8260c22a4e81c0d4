// =============================================================================
// Multi-Platform Social-Trend Harvester — library crate
// =============================================================================
//
// `main.rs` is a thin binary shell around this crate: every pipeline stage
// (C1-C13) lives here as a `pub mod` so both the binary and the `tests/`
// integration suite exercise the exact same code, rather than the tests
// relying on inline `#[cfg(test)]` modules alone.
// =============================================================================

pub mod api;
pub mod app_state;
pub mod browser;
pub mod cli;
pub mod config;
pub mod enrich;
pub mod errors;
pub mod etl;
pub mod proxy;
pub mod queue;
pub mod run_log;
pub mod scheduler;
pub mod scoring;
pub mod snapshot;
pub mod sources;
pub mod store;
pub mod telemetry;
pub mod types;
