//! The mitigation hook and its firing policy
//!
//! The real mitigation (a privileged toggle in the hypervisor or kernel) is
//! wired in by implementing [`ActionHook`]. [`AnnounceHook`] only prints the
//! decision.

use crate::decision::Evaluation;
use anyhow::Result;
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use std::io::Write;
use tracing::{info, warn};

/// Whether the hook may fire more than once per run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionMode {
    /// Fire at most once, then stop evaluating
    #[default]
    OneShot,
    /// Fire on every qualifying tick; the hook must be idempotent
    Repeatable,
}

/// What the hook is told when it fires
#[derive(Debug, Clone, Copy)]
pub struct ActionContext {
    pub pid: Pid,
    pub tick: u64,
    pub evaluation: Evaluation,
}

/// Side-effecting mitigation control path
pub trait ActionHook {
    fn activate(&mut self, ctx: &ActionContext) -> Result<()>;
}

/// Default hook: announces the decision on stdout
pub struct AnnounceHook<W: Write> {
    out: W,
}

impl AnnounceHook<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self {
            out: std::io::stdout(),
        }
    }
}

impl<W: Write> AnnounceHook<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ActionHook for AnnounceHook<W> {
    fn activate(&mut self, ctx: &ActionContext) -> Result<()> {
        writeln!(
            self.out,
            "=== [ACTION] enable translation mitigation (pid {}, tick {}, {:.2} cycles/walk) ===",
            ctx.pid, ctx.tick, ctx.evaluation.avg_overhead_cost
        )?;
        self.out.flush()?;
        Ok(())
    }
}

/// Applies the firing policy around a hook
pub struct ActionSink {
    hook: Box<dyn ActionHook>,
    mode: ActionMode,
    fire_count: u64,
    first_fired_at: Option<u64>,
}

impl ActionSink {
    pub fn new(hook: Box<dyn ActionHook>, mode: ActionMode) -> Self {
        Self {
            hook,
            mode,
            fire_count: 0,
            first_fired_at: None,
        }
    }

    /// One-shot sink that already fired; further evaluation is pointless
    pub fn is_latched(&self) -> bool {
        self.mode == ActionMode::OneShot && self.fire_count > 0
    }

    pub fn fire_count(&self) -> u64 {
        self.fire_count
    }

    pub fn first_fired_at(&self) -> Option<u64> {
        self.first_fired_at
    }

    /// Invoke the hook if `decision` holds and the policy allows it
    ///
    /// Returns true when the hook ran successfully on this call. A failing
    /// hook is logged and does not latch, so the next qualifying tick
    /// retries.
    pub fn maybe_act(&mut self, decision: bool, ctx: &ActionContext) -> bool {
        if !decision || self.is_latched() {
            return false;
        }

        match self.hook.activate(ctx) {
            Ok(()) => {
                self.fire_count += 1;
                self.first_fired_at.get_or_insert(ctx.tick);
                info!(
                    pid = ctx.pid.as_raw(),
                    tick = ctx.tick,
                    cost = ctx.evaluation.avg_overhead_cost,
                    "action fired"
                );
                true
            }
            Err(e) => {
                warn!(tick = ctx.tick, error = %e, "action hook failed");
                false
            }
        }
    }
}
