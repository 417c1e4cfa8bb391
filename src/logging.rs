// src/logging.rs

//! Logging setup for `trialwatch` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `--log-level` CLI flag (applies to trialwatch itself)
//! 2. `TRIALWATCH_LOG` environment variable, in `EnvFilter` syntax
//!    (e.g. "debug" or "trialwatch=trace,chromiumoxide=debug")
//! 3. default to `info`
//!
//! Logs go to STDERR; STDOUT is reserved for prompts (OTP codes) and the
//! dry-run plan.

use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use crate::cli::LogLevel;

pub const LOG_ENV: &str = "TRIALWATCH_LOG";

/// CDP and HTTP internals are noisy at debug level; keep them quiet unless asked.
const QUIET_DEPS: &str = "chromiumoxide=warn,tungstenite=warn,hyper=warn,reqwest=warn";

/// Initialise the global logging subscriber. Call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = build_filter(cli_level, std::env::var(LOG_ENV).ok().as_deref())?;

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("initialising logging: {e}"))
}

fn build_filter(cli_level: Option<LogLevel>, env: Option<&str>) -> Result<EnvFilter> {
    let directives = match (cli_level, env) {
        (Some(level), _) => format!("{},{QUIET_DEPS}", level_name(level)),
        (None, Some(env)) if !env.trim().is_empty() => env.trim().to_string(),
        _ => format!("info,{QUIET_DEPS}"),
    };
    EnvFilter::try_new(&directives).map_err(|e| anyhow!("invalid log filter {directives:?}: {e}"))
}

fn level_name(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}
