// src/cli.rs

use clap::{Parser, ValueEnum};

/// Command-line arguments for `rundag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "rundag",
    version,
    about = "Reconcile pipeline runs against a control-plane object store.",
    long_about = None
)]
pub struct CliArgs {
    /// Reconciler config (TOML). A missing file means defaults.
    #[arg(long, value_name = "PATH", default_value = "Rundag.toml")]
    pub config: String,

    /// Object state to seed the store with (JSON, or TOML by extension).
    #[arg(long, value_name = "PATH")]
    pub state: String,

    /// Reconcile until there is nothing left to do, then exit.
    #[arg(long)]
    pub once: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `RUNDAG_LOG` or `info` is used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Resolve every run's graph and print it; mutate nothing.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

pub fn parse() -> CliArgs {
    CliArgs::parse()
}
