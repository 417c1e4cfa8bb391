// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `trialwatch`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "trialwatch",
    version,
    about = "Keep Jira Data Center evaluation licenses from expiring.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Trialwatch.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Trialwatch.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TRIALWATCH_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate the config and print the instances, but don't open a
    /// browser.
    #[arg(long)]
    pub dry_run: bool,

    /// Process only the instance with this base URL.
    #[arg(long, value_name = "URL")]
    pub instance: Option<String>,

    /// Renew even if the trial has more than `threshold_days` left.
    #[arg(long)]
    pub force: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = CliArgs::try_parse_from(["trialwatch"]).unwrap();
        assert_eq!(args.config, "Trialwatch.toml");
        assert!(!args.dry_run);
        assert!(!args.force);
        assert!(args.instance.is_none());
    }

    #[test]
    fn test_instance_and_force() {
        let args = CliArgs::try_parse_from([
            "trialwatch",
            "--instance",
            "https://jira.example.com",
            "--force",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(args.instance.as_deref(), Some("https://jira.example.com"));
        assert!(args.force);
        assert!(matches!(args.log_level, Some(LogLevel::Debug)));
    }
}
