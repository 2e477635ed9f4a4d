//! Time-multiplexing of counter groups
//!
//! When the PMU cannot hold every channel at once the seven metrics are
//! split over two groups. [`GroupRotation`] is the explicit
//! `{GroupA active ⇄ GroupB active}` state machine; [`CounterSchedule`]
//! owns the opened groups and maps each group's handles onto the global
//! channel index used by the sliding windows.

use crate::counter::{CounterBackend, Metric};
use crate::error::Result;
use crate::group::CounterGroup;
use nix::unistd::Pid;
use serde::Serialize;
use tracing::{debug, warn};

/// Cycles, instructions and walk durations
pub const GROUP_A: [Metric; 4] = [
    Metric::Cycles,
    Metric::Instructions,
    Metric::LoadWalkDuration,
    Metric::StoreWalkDuration,
];

/// Walk completions and overhead cycles
pub const GROUP_B: [Metric; 3] = [
    Metric::LoadWalkCompleted,
    Metric::StoreWalkCompleted,
    Metric::OverheadCycles,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActiveGroup {
    A,
    B,
}

impl ActiveGroup {
    pub fn other(self) -> Self {
        match self {
            ActiveGroup::A => ActiveGroup::B,
            ActiveGroup::B => ActiveGroup::A,
        }
    }

    fn slot(self) -> usize {
        match self {
            ActiveGroup::A => 0,
            ActiveGroup::B => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ActiveGroup::A => "A",
            ActiveGroup::B => "B",
        }
    }
}

/// Which group is counting and which groups have finished a full round
#[derive(Debug, Clone)]
pub struct GroupRotation {
    active: ActiveGroup,
    alternating: bool,
    quota: u32,
    ticks_in_active: u32,
    completed: [bool; 2],
}

impl GroupRotation {
    /// One group, never rotates
    pub fn single() -> Self {
        Self {
            active: ActiveGroup::A,
            alternating: false,
            quota: 1,
            ticks_in_active: 0,
            completed: [false, true],
        }
    }

    /// Two groups swapping after `quota` samples each
    pub fn alternating(quota: u32) -> Self {
        Self {
            active: ActiveGroup::A,
            alternating: true,
            quota: quota.max(1),
            ticks_in_active: 0,
            completed: [false, false],
        }
    }

    pub fn active(&self) -> ActiveGroup {
        self.active
    }

    /// Every group has delivered at least one full round of samples
    pub fn all_completed(&self) -> bool {
        self.completed.iter().all(|&c| c)
    }

    /// Count one sample on the active group; true when a rotation is due
    pub fn record_sample(&mut self) -> bool {
        self.ticks_in_active = self.ticks_in_active.saturating_add(1);
        if self.ticks_in_active < self.quota {
            return false;
        }
        self.completed[self.active.slot()] = true;
        self.alternating
    }

    /// Hand the counting slot to the other group
    pub fn rotate(&mut self) -> ActiveGroup {
        if self.alternating {
            self.active = self.active.other();
            self.ticks_in_active = 0;
        }
        self.active
    }
}

struct ScheduledGroup {
    group: CounterGroup,
    metrics: Vec<Metric>,
}

/// The opened counter groups plus their rotation state
pub struct CounterSchedule {
    groups: Vec<ScheduledGroup>,
    rotation: GroupRotation,
    rotation_due: bool,
}

impl CounterSchedule {
    /// Open all seven channels as one group
    pub fn single(pid: Pid, backend: &mut dyn CounterBackend) -> Result<Self> {
        Self::open(&[&Metric::ALL[..]], GroupRotation::single(), pid, backend)
    }

    /// Open [`GROUP_A`] and [`GROUP_B`], rotating every `quota` samples
    pub fn multiplexed(quota: u32, pid: Pid, backend: &mut dyn CounterBackend) -> Result<Self> {
        Self::open(
            &[&GROUP_A[..], &GROUP_B[..]],
            GroupRotation::alternating(quota),
            pid,
            backend,
        )
    }

    /// Open every layout; any failure drops the groups opened so far
    pub fn open(
        layouts: &[&[Metric]],
        rotation: GroupRotation,
        pid: Pid,
        backend: &mut dyn CounterBackend,
    ) -> Result<Self> {
        let mut groups = Vec::with_capacity(layouts.len());
        for metrics in layouts {
            let specs: Vec<_> = metrics.iter().map(|m| m.spec()).collect();
            let group = CounterGroup::open(&specs, pid, backend)?;
            groups.push(ScheduledGroup {
                group,
                metrics: metrics.to_vec(),
            });
        }
        Ok(Self {
            groups,
            rotation,
            rotation_due: false,
        })
    }

    /// Enable the active group
    pub fn arm(&mut self) -> Result<()> {
        let slot = self.rotation.active().slot();
        self.groups[slot].group.enable()
    }

    /// Read the active group, returning `(metric, delta)` pairs
    pub fn sample(&mut self) -> Result<Vec<(Metric, u64)>> {
        let slot = self.rotation.active().slot();
        let scheduled = &mut self.groups[slot];
        let deltas = scheduled.group.read_all()?;
        self.rotation_due = self.rotation.record_sample();
        Ok(scheduled.metrics.iter().copied().zip(deltas).collect())
    }

    /// Rotate to the other group if the active one met its quota
    ///
    /// If the other group cannot be enabled the active group keeps counting
    /// and the rotation is retried once its quota is met again.
    pub fn finish_tick(&mut self) {
        if !std::mem::take(&mut self.rotation_due) {
            return;
        }
        let from = self.rotation.active();
        let to = self.rotation.rotate();
        if from == to {
            return;
        }

        self.groups[from.slot()].group.disable();
        match self.groups[to.slot()].group.enable() {
            Ok(()) => debug!(from = from.label(), to = to.label(), "rotated counter group"),
            Err(e) => {
                warn!(group = to.label(), error = %e, "rotation failed, staying on current group");
                self.rotation.rotate();
                if let Err(e) = self.groups[from.slot()].group.enable() {
                    warn!(group = from.label(), error = %e, "failed to re-enable counter group");
                }
            }
        }
    }

    /// Every channel has delivered at least one sample round
    pub fn all_channels_seen(&self) -> bool {
        self.rotation.all_completed()
    }

    pub fn active(&self) -> ActiveGroup {
        self.rotation.active()
    }

    /// Release every group, returning the number of handles closed
    pub fn release_all(&mut self) -> usize {
        self.groups.iter_mut().map(|g| g.group.release()).sum()
    }
}
