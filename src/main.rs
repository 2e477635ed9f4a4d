use anyhow::{Context, Result};
use clap::Parser;
use walkmon::{action::AnnounceHook, cli::Cli, config::MonitorConfig, monitor, report::Reporter};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber; warnings always, everything with --debug
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.debug);

    let config = match &args.config {
        Some(path) => MonitorConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => MonitorConfig::default(),
    };

    let mut reporter = Reporter::stdout(args.format);
    let summary = monitor::run_command(
        &args.command,
        &config,
        &mut reporter,
        Box::new(AnnounceHook::stdout()),
    )
    .context("Monitoring failed")?;

    reporter
        .summary(&summary)
        .context("Failed to write run summary")?;

    std::process::exit(summary.exit.exit_code());
}
