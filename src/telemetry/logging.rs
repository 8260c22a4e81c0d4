// =============================================================================
// Structured Logger — JSON lines to stdout + rotating file (§4.2)
// =============================================================================
//
// Every record is a JSON object with timestamp/level/module/line plus
// whatever `fields` the call site attaches via `tracing`'s structured
// key=value syntax — the teacher's `main.rs` already logs this way
// (`info!(symbols = ?config.symbols, ...)`), this just adds the JSON
// formatter and a second (file) sink on top of the teacher's single
// `fmt()` layer.
// =============================================================================

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Guard that must be kept alive for the lifetime of the process — dropping
/// it flushes and closes the non-blocking file writer.
pub struct LoggingGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Initialize the global `tracing` subscriber.
///
/// * `json` — emit JSON-lines instead of the human-readable formatter
///   (the teacher always used the human formatter; `scheduler`/`worker`
///   invocations default to JSON per spec.md §6, while `run --once` keeps
///   the human formatter for interactive use).
/// * `log_level` — default level when `RUST_LOG` is unset.
/// * `log_dir` — if set, logs are double-written to a daily-rotating file
///   under this directory in addition to stdout.
pub fn init_logging(json: bool, log_level: &str, log_dir: Option<&str>) -> LoggingGuard {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let (file_layer, file_guard) = if let Some(dir) = log_dir {
        let file_appender = tracing_appender::rolling::daily(dir, "harvester.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let layer = fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_target(true);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    let stdout_layer = if json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    LoggingGuard {
        _file_guard: file_guard,
    }
}
