// Scripted stand-ins for the kernel counter backend, the target process and
// the action hook, so engine runs are deterministic.
#![allow(dead_code)]

use nix::unistd::Pid;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::io;
use std::rc::Rc;
use walkmon::action::{ActionContext, ActionHook};
use walkmon::counter::{CounterBackend, CounterDevice, CounterSpec, Metric};
use walkmon::error::Result;
use walkmon::target::{ExitOutcome, Target};

pub const GIB: u64 = 1 << 30;

/// Per-counter delta scripts; unscripted counters stay at zero
#[derive(Default)]
pub struct ScriptedBackend {
    deltas: HashMap<&'static str, Vec<u64>>,
    failing_reads: HashMap<&'static str, HashSet<usize>>,
    refuse: Option<&'static str>,
    refuse_enable: Option<&'static str>,
    pub opened: Rc<Cell<usize>>,
    pub released: Rc<Cell<usize>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, metric: Metric, deltas: Vec<u64>) -> Self {
        self.deltas.insert(metric.name(), deltas);
        self
    }

    /// Make the `read`-th read (0-based) of `metric` fail
    pub fn fail_read(mut self, metric: Metric, read: usize) -> Self {
        self.failing_reads.entry(metric.name()).or_default().insert(read);
        self
    }

    /// Refuse to open `metric`
    pub fn refuse(mut self, metric: Metric) -> Self {
        self.refuse = Some(metric.name());
        self
    }

    /// Open `metric` normally but fail every attempt to enable it
    pub fn refuse_enable(mut self, metric: Metric) -> Self {
        self.refuse_enable = Some(metric.name());
        self
    }
}

impl CounterBackend for ScriptedBackend {
    fn open(&mut self, spec: &CounterSpec, _pid: Pid) -> io::Result<Box<dyn CounterDevice>> {
        if self.refuse == Some(spec.name) {
            return Err(io::Error::from_raw_os_error(libc::EACCES));
        }

        let mut total = 0u64;
        let cumulative = self
            .deltas
            .get(spec.name)
            .map(|deltas| {
                deltas
                    .iter()
                    .map(|d| {
                        total += d;
                        total
                    })
                    .collect()
            })
            .unwrap_or_default();

        self.opened.set(self.opened.get() + 1);
        Ok(Box::new(ScriptedDevice {
            cumulative,
            failing: self.failing_reads.get(spec.name).cloned().unwrap_or_default(),
            reads: 0,
            position: 0,
            enable_fails: self.refuse_enable == Some(spec.name),
            released: Rc::clone(&self.released),
        }))
    }
}

struct ScriptedDevice {
    cumulative: Vec<u64>,
    failing: HashSet<usize>,
    reads: usize,
    position: usize,
    enable_fails: bool,
    released: Rc<Cell<usize>>,
}

impl CounterDevice for ScriptedDevice {
    fn enable(&mut self) -> io::Result<()> {
        if self.enable_fails {
            return Err(io::Error::from_raw_os_error(libc::EBUSY));
        }
        Ok(())
    }

    fn disable(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn read_value(&mut self) -> io::Result<u64> {
        let read = self.reads;
        self.reads += 1;
        if self.failing.contains(&read) {
            // The script still advances; the value is simply not observed.
            self.position += 1;
            return Err(io::Error::from_raw_os_error(libc::EIO));
        }
        let value = self
            .cumulative
            .get(self.position)
            .or(self.cumulative.last())
            .copied()
            .unwrap_or(0);
        self.position += 1;
        Ok(value)
    }
}

impl Drop for ScriptedDevice {
    fn drop(&mut self) {
        self.released.set(self.released.get() + 1);
    }
}

/// A target that lives for a fixed number of liveness polls
pub struct ScriptedTarget {
    pub rss: u64,
    pub polls_left: u32,
    pub exit: ExitOutcome,
}

impl ScriptedTarget {
    pub fn new(rss: u64, polls: u32, exit: ExitOutcome) -> Self {
        Self {
            rss,
            polls_left: polls,
            exit,
        }
    }
}

impl Target for ScriptedTarget {
    fn pid(&self) -> Pid {
        Pid::from_raw(31337)
    }

    fn resident_bytes(&self) -> io::Result<u64> {
        Ok(self.rss)
    }

    fn poll_exit(&mut self) -> Result<Option<ExitOutcome>> {
        if self.polls_left == 0 {
            return Ok(Some(self.exit));
        }
        self.polls_left -= 1;
        Ok(None)
    }
}

/// Records the tick of every activation
#[derive(Clone, Default)]
pub struct RecordingHook {
    pub fired: Rc<RefCell<Vec<u64>>>,
}

impl ActionHook for RecordingHook {
    fn activate(&mut self, ctx: &ActionContext) -> anyhow::Result<()> {
        self.fired.borrow_mut().push(ctx.tick);
        Ok(())
    }
}
