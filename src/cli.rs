// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `jobtree`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "jobtree",
    version,
    about = "Evaluate a live tree of checks and reload edited job documents in place.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the root job document (TOML).
    ///
    /// Default: `jobtree.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "jobtree.toml")]
    pub job: String,

    /// Do not reload when job documents change.
    #[arg(long)]
    pub no_watch: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `JOBTREE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Load and validate, print the tree, but don't run any checks.
    #[arg(long)]
    pub dry_run: bool,
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
