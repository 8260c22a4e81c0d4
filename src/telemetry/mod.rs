// =============================================================================
// Observability — structured logging, metrics, trace propagation (C2)
// =============================================================================

pub mod logging;
pub mod metrics;
pub mod trace;

pub use logging::init_logging;
pub use metrics::init_metrics;
pub use trace::{TraceContext, TraceGuard};
