//! CLI argument parsing for walkmon

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Encoding of the per-tick diagnostics and the run summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// One JSON object per line
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "monitor")]
#[command(version)]
#[command(
    about = "Watch a workload's page-walk counters and decide whether to enable translation mitigation",
    long_about = None
)]
pub struct Cli {
    /// TOML file overriding the sampling, window and threshold settings
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Diagnostic output format
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Enable debug logging to stderr
    #[arg(long)]
    pub debug: bool,

    /// Program to launch and monitor, followed by its arguments
    #[arg(
        value_name = "PROGRAM",
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<String>,
}
