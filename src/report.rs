//! Per-tick diagnostic output and the end-of-run summary
//!
//! Text output is meant for operators; `--format json` emits one object per
//! line instead.

use crate::cli::OutputFormat;
use crate::counter::Metric;
use crate::decision::Evaluation;
use crate::monitor::RunSummary;
use crate::rotation::ActiveGroup;
use serde::Serialize;
use std::io::{self, Write};

const BYTES_PER_GB: f64 = (1u64 << 30) as f64;

/// One channel's raw and smoothed value at a tick
#[derive(Debug, Clone, Serialize)]
pub struct ChannelReading {
    pub metric: Metric,
    pub name: &'static str,
    /// `None` when the channel's group was not counting this tick
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<u64>,
    pub average: f64,
}

/// Everything observed on one sampling tick
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub elapsed_ms: u64,
    pub group: ActiveGroup,
    pub channels: Vec<ChannelReading>,
    pub rss_bytes: u64,
    pub ipc: f64,
    pub avg_walk_duration: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<Evaluation>,
    pub action_fired: bool,
}

/// End-of-run summary, JSON shape
#[derive(Debug, Clone, Serialize)]
struct JsonSummary {
    ticks: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    action_tick: Option<u64>,
    action_count: u64,
    exit: String,
    exit_code: i32,
    trustworthy: bool,
    handles_released: usize,
}

impl From<&RunSummary> for JsonSummary {
    fn from(summary: &RunSummary) -> Self {
        Self {
            ticks: summary.ticks,
            action_tick: summary.action_tick,
            action_count: summary.action_count,
            exit: summary.exit.to_string(),
            exit_code: summary.exit.exit_code(),
            trustworthy: summary.trustworthy,
            handles_released: summary.handles_released,
        }
    }
}

/// Writes tick reports and the summary in the selected format
pub struct Reporter {
    format: OutputFormat,
    out: Box<dyn Write>,
}

impl Reporter {
    pub fn new(format: OutputFormat, out: Box<dyn Write>) -> Self {
        Self { format, out }
    }

    pub fn stdout(format: OutputFormat) -> Self {
        Self::new(format, Box::new(io::stdout()))
    }

    pub fn tick(&mut self, report: &TickReport) -> io::Result<()> {
        match self.format {
            OutputFormat::Text => write_tick_text(&mut self.out, report)?,
            OutputFormat::Json => {
                serde_json::to_writer(&mut self.out, report)?;
                writeln!(self.out)?;
            }
        }
        self.out.flush()
    }

    pub fn summary(&mut self, summary: &RunSummary) -> io::Result<()> {
        match self.format {
            OutputFormat::Text => write_summary_text(&mut self.out, summary)?,
            OutputFormat::Json => {
                serde_json::to_writer(&mut self.out, &JsonSummary::from(summary))?;
                writeln!(self.out)?;
            }
        }
        self.out.flush()
    }
}

fn write_tick_text(out: &mut dyn Write, report: &TickReport) -> io::Result<()> {
    writeln!(
        out,
        "[tick {} +{}.{:03}s group {}] rss={:.2} GB",
        report.tick,
        report.elapsed_ms / 1000,
        report.elapsed_ms % 1000,
        report.group.label(),
        report.rss_bytes as f64 / BYTES_PER_GB
    )?;
    for channel in &report.channels {
        match channel.delta {
            Some(delta) => writeln!(
                out,
                "  {:<34} delta={:<14} avg={:.2}",
                channel.name, delta, channel.average
            )?,
            None => writeln!(
                out,
                "  {:<34} delta={:<14} avg={:.2}",
                channel.name, "-", channel.average
            )?,
        }
    }
    write!(
        out,
        "  ipc={:.3} walk_duration/walk={:.2}",
        report.ipc, report.avg_walk_duration
    )?;
    match &report.evaluation {
        Some(eval) => writeln!(
            out,
            " completions={:.2} overhead/walk={:.2} -> enable={}",
            eval.completions, eval.avg_overhead_cost, eval.enable
        )?,
        None => writeln!(out, " -> not evaluated")?,
    }
    Ok(())
}

fn write_summary_text(out: &mut dyn Write, summary: &RunSummary) -> io::Result<()> {
    writeln!(out, "=== walkmon summary ===")?;
    writeln!(out, "ticks sampled: {}", summary.ticks)?;
    match summary.action_tick {
        Some(tick) => writeln!(
            out,
            "action: fired at tick {} ({} time(s))",
            tick, summary.action_count
        )?,
        None => writeln!(out, "action: not fired")?,
    }
    writeln!(out, "target: {}", summary.exit)?;
    writeln!(
        out,
        "metrics trustworthy: {}",
        if summary.trustworthy { "yes" } else { "no" }
    )?;
    writeln!(out, "counter handles released: {}", summary.handles_released)?;
    Ok(())
}
