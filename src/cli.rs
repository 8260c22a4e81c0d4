// =============================================================================
// CLI Contract (§6) — argument parsing is the minimal glue `main.rs` performs
// =============================================================================
//
// CLI argument parsing is an external collaborator per spec.md §1 — this
// struct is the contract `main.rs` binds to `clap::Parser`. Exit codes match
// §6 exactly: 0 success, 1 runtime error, 2 config error, 3
// proxy-required-but-unavailable.
// =============================================================================

use clap::{Parser, Subcommand, ValueEnum};

use crate::types::Platform;

#[derive(Debug, Parser)]
#[command(name = "harvester", version, about = "Multi-platform social-trend harvester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// One-shot or scheduled run of a single source.
    Run {
        /// Platform to run: tiktok, instagram, linkedin, facebook, youtube, x.
        #[arg(long = "source")]
        source: String,

        /// Run exactly once and exit, instead of looping on `--interval`.
        #[arg(long)]
        once: bool,

        /// Cap on discovered trends per run.
        #[arg(long, default_value_t = 50)]
        limit: usize,

        /// Force headless browser mode for this invocation.
        #[arg(long)]
        headless: bool,

        /// Interval in hours between runs when not `--once`.
        #[arg(long)]
        interval: Option<f64>,
    },
    /// Start the persistent scheduler loop driving every enabled source.
    Scheduler,
    /// Interchangeable worker shim; the core only speaks "run one job".
    Worker {
        #[arg(long = "type", value_enum, default_value_t = WorkerType::Cron)]
        worker_type: WorkerType,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WorkerType {
    Apscheduler,
    Rq,
    Celery,
    Cron,
}

/// Process exit codes per spec.md §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    RuntimeError = 1,
    ConfigError = 2,
    ProxyRequiredUnavailable = 3,
}

pub fn parse_platform_arg(raw: &str) -> Result<Platform, String> {
    Platform::parse(raw).ok_or_else(|| {
        format!(
            "unknown --source '{raw}'; expected one of: tiktok, instagram, linkedin, facebook, youtube, x"
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_platform_arg_accepts_known_sources() {
        assert_eq!(parse_platform_arg("tiktok"), Ok(Platform::TikTok));
        assert_eq!(parse_platform_arg("x"), Ok(Platform::X));
    }

    #[test]
    fn parse_platform_arg_rejects_unknown() {
        assert!(parse_platform_arg("myspace").is_err());
    }
}
