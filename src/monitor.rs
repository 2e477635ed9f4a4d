//! The sampling loop
//!
//! ```text
//! WAITING_READY ──arm──▶ ARMED ──▶ { SAMPLING ⇄ IDLE } ──target exit──▶ TORN_DOWN
//! ```
//!
//! A single control thread owns every counter handle and window. Each loop
//! iteration does a non-blocking liveness check, samples once the sampling
//! interval has elapsed on the monotonic clock, then sleeps one poll step.
//! When the target exits the counters are disabled and released exactly
//! once; a non-zero or signaled exit marks the run untrustworthy but never
//! undoes an action that already fired.

use crate::action::{ActionContext, ActionHook, ActionSink};
use crate::config::MonitorConfig;
use crate::counter::{CounterBackend, Metric};
use crate::decision::{DecisionEngine, WalkMetrics};
use crate::error::{MonitorError, Result};
use crate::perf::PerfBackend;
use crate::report::{ChannelReading, Reporter, TickReport};
use crate::rotation::CounterSchedule;
use crate::target::{ExitOutcome, SuspendedChild, Target};
use crate::window::WindowSet;
use nix::unistd::Pid;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    WaitingReady,
    Armed,
    Sampling,
    Idle,
    TornDown,
}

/// Outcome of a monitored run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub ticks: u64,
    /// First tick on which the action fired
    pub action_tick: Option<u64>,
    pub action_count: u64,
    pub exit: ExitOutcome,
    /// False when the target exited abnormally
    pub trustworthy: bool,
    pub handles_released: usize,
}

struct ArmedCounters {
    pid: Pid,
    schedule: CounterSchedule,
    armed_at: Instant,
    last_sample: Instant,
}

/// All per-run state, owned by the control loop
pub struct MonitorContext {
    windows: WindowSet,
    engine: DecisionEngine,
    sink: ActionSink,
    multiplex: bool,
    rotation_ticks: u32,
    sample_interval: Duration,
    poll_interval: Duration,
    armed: Option<ArmedCounters>,
    state: MonitorState,
    ticks: u64,
    handles_released: usize,
}

impl MonitorContext {
    pub fn new(config: &MonitorConfig, hook: Box<dyn ActionHook>) -> Result<Self> {
        config.validate()?;
        let windows = WindowSet::new(Metric::COUNT, config.window_size, config.weight_vector()?)?;

        Ok(Self {
            windows,
            engine: DecisionEngine::new(config.thresholds),
            sink: ActionSink::new(hook, config.action_mode),
            multiplex: config.multiplex,
            rotation_ticks: config.rotation_ticks,
            sample_interval: config.sample_interval(),
            poll_interval: config.poll_interval(),
            armed: None,
            state: MonitorState::WaitingReady,
            ticks: 0,
            handles_released: 0,
        })
    }

    /// Open and enable every counter against a target that is ready but not
    /// yet running
    pub fn arm(&mut self, pid: Pid, backend: &mut dyn CounterBackend) -> Result<()> {
        if let Some(armed) = &self.armed {
            return Err(MonitorError::AlreadyArmed(armed.pid.as_raw()));
        }

        let mut schedule = if self.multiplex {
            CounterSchedule::multiplexed(self.rotation_ticks, pid, backend)?
        } else {
            CounterSchedule::single(pid, backend)?
        };
        schedule.arm()?;

        let now = Instant::now();
        self.armed = Some(ArmedCounters {
            pid,
            schedule,
            armed_at: now,
            last_sample: now,
        });
        self.state = MonitorState::Armed;
        info!(pid = pid.as_raw(), multiplex = self.multiplex, "counters armed");
        Ok(())
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn windows(&self) -> &WindowSet {
        &self.windows
    }

    pub fn schedule(&self) -> Option<&CounterSchedule> {
        self.armed.as_ref().map(|a| &a.schedule)
    }

    /// One SAMPLING transition: read, smooth, decide, maybe act, report
    pub fn sample_tick(&mut self, target: &dyn Target, reporter: &mut Reporter) -> Result<TickReport> {
        let armed = self.armed.as_mut().ok_or(MonitorError::NotArmed)?;
        self.state = MonitorState::Sampling;
        let tick = self.ticks;

        let deltas = armed.schedule.sample()?;
        let rss_bytes = target.resident_bytes().unwrap_or_else(|e| {
            warn!(pid = armed.pid.as_raw(), error = %e, "failed to read resident set");
            0
        });

        let mut sampled = [None; Metric::COUNT];
        for (metric, delta) in deltas {
            self.windows.push(metric.index(), delta);
            sampled[metric.index()] = Some(delta);
        }
        let averages = self.windows.averages();
        let metrics = WalkMetrics::from_averages(&averages);

        let evaluation = if self.sink.is_latched() || !armed.schedule.all_channels_seen() {
            None
        } else {
            Some(self.engine.evaluate(&metrics, rss_bytes))
        };
        let action_fired = match evaluation {
            Some(evaluation) => {
                let ctx = ActionContext {
                    pid: armed.pid,
                    tick,
                    evaluation,
                };
                self.sink.maybe_act(evaluation.enable, &ctx)
            }
            None => false,
        };

        let group = armed.schedule.active();
        armed.schedule.finish_tick();
        self.ticks += 1;

        let report = TickReport {
            tick,
            elapsed_ms: armed.armed_at.elapsed().as_millis() as u64,
            group,
            channels: Metric::ALL
                .iter()
                .map(|&metric| ChannelReading {
                    metric,
                    name: metric.name(),
                    delta: sampled[metric.index()],
                    average: averages[metric.index()],
                })
                .collect(),
            rss_bytes,
            ipc: metrics.ipc(),
            avg_walk_duration: metrics.avg_walk_duration(),
            evaluation,
            action_fired,
        };
        if let Err(e) = reporter.tick(&report) {
            warn!(error = %e, "failed to write tick diagnostics");
        }
        Ok(report)
    }

    /// Poll and sample until the target exits, then tear down
    pub fn run(mut self, target: &mut dyn Target, reporter: &mut Reporter) -> Result<RunSummary> {
        let exit = self.drive(target, reporter);
        let handles_released = self.teardown();
        let exit = exit?;

        let trustworthy = exit.is_success();
        if !trustworthy {
            warn!(pid = target.pid().as_raw(), %exit, "target exited abnormally, metrics untrustworthy");
        }

        Ok(RunSummary {
            ticks: self.ticks,
            action_tick: self.sink.first_fired_at(),
            action_count: self.sink.fire_count(),
            exit,
            trustworthy,
            handles_released,
        })
    }

    fn drive(&mut self, target: &mut dyn Target, reporter: &mut Reporter) -> Result<ExitOutcome> {
        loop {
            if let Some(exit) = target.poll_exit()? {
                debug!(pid = target.pid().as_raw(), %exit, "target exited");
                return Ok(exit);
            }

            let armed = self.armed.as_mut().ok_or(MonitorError::NotArmed)?;
            let now = Instant::now();
            if now.duration_since(armed.last_sample) >= self.sample_interval {
                armed.last_sample = now;
                self.sample_tick(&*target, reporter)?;
            }

            self.state = MonitorState::Idle;
            thread::sleep(self.poll_interval);
        }
    }

    /// Disable and release every counter; later calls release nothing
    pub fn teardown(&mut self) -> usize {
        if let Some(armed) = self.armed.as_mut() {
            self.handles_released += armed.schedule.release_all();
        }
        self.state = MonitorState::TornDown;
        self.handles_released
    }
}

/// Launch `command` suspended, arm perf counters on it, release it and
/// monitor it to completion
pub fn run_command(
    command: &[String],
    config: &MonitorConfig,
    reporter: &mut Reporter,
    hook: Box<dyn ActionHook>,
) -> Result<RunSummary> {
    let mut context = MonitorContext::new(config, hook)?;

    let suspended = SuspendedChild::spawn(command)?;
    eprintln!(
        "[walkmon: {} suspended as pid {}]",
        suspended.program(),
        suspended.pid()
    );

    context.arm(suspended.pid(), &mut PerfBackend)?;
    let mut child = suspended.release()?;
    eprintln!("[walkmon: monitoring pid {}]", child.pid());

    context.run(&mut child, reporter)
}
