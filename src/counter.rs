//! Hardware counter descriptions and the device seam
//!
//! A [`CounterSpec`] names one counter (domain + selector). The fixed
//! [`Metric`] catalog lists the seven channels the walk-cost heuristic
//! consumes. Opening a spec against a process goes through a
//! [`CounterBackend`], which hands back a boxed [`CounterDevice`]; the
//! production backend is [`crate::perf::PerfBackend`].

use nix::unistd::Pid;
use serde::Serialize;
use std::io;

/// Classification of a hardware counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterDomain {
    /// Generalized hardware event (cycles, instructions)
    Hardware,
    /// Raw microarchitectural event selector
    Raw,
}

/// One hardware counter: domain, selector and display name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CounterSpec {
    pub domain: CounterDomain,
    pub selector: u64,
    pub name: &'static str,
}

impl CounterSpec {
    pub const fn new(domain: CounterDomain, selector: u64, name: &'static str) -> Self {
        Self {
            domain,
            selector,
            name,
        }
    }

    pub const fn hardware(selector: u64, name: &'static str) -> Self {
        Self::new(CounterDomain::Hardware, selector, name)
    }

    pub const fn raw(selector: u64, name: &'static str) -> Self {
        Self::new(CounterDomain::Raw, selector, name)
    }
}

/// The channels consumed by the decision heuristic, in window order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Cycles,
    Instructions,
    LoadWalkDuration,
    StoreWalkDuration,
    LoadWalkCompleted,
    StoreWalkCompleted,
    OverheadCycles,
}

impl Metric {
    pub const ALL: [Metric; 7] = [
        Metric::Cycles,
        Metric::Instructions,
        Metric::LoadWalkDuration,
        Metric::StoreWalkDuration,
        Metric::LoadWalkCompleted,
        Metric::StoreWalkCompleted,
        Metric::OverheadCycles,
    ];

    pub const COUNT: usize = Self::ALL.len();

    /// Position of this metric in a channel vector
    pub fn index(self) -> usize {
        self as usize
    }

    /// Counter programmed for this metric
    ///
    /// Raw selectors are `umask << 8 | event` for Intel cores; the overhead
    /// channel counts EPT walk cycles so it also covers the
    /// virtualization-layer walk.
    pub fn spec(self) -> CounterSpec {
        match self {
            Metric::Cycles => CounterSpec::hardware(PERF_COUNT_HW_CPU_CYCLES, "cycles"),
            Metric::Instructions => {
                CounterSpec::hardware(PERF_COUNT_HW_INSTRUCTIONS, "instructions")
            }
            Metric::LoadWalkDuration => {
                CounterSpec::raw(0x1008, "dtlb_load_misses.walk_duration")
            }
            Metric::StoreWalkDuration => {
                CounterSpec::raw(0x1049, "dtlb_store_misses.walk_duration")
            }
            Metric::LoadWalkCompleted => {
                CounterSpec::raw(0x0e08, "dtlb_load_misses.walk_completed")
            }
            Metric::StoreWalkCompleted => {
                CounterSpec::raw(0x0e49, "dtlb_store_misses.walk_completed")
            }
            Metric::OverheadCycles => CounterSpec::raw(0x104f, "ept.walk_cycles"),
        }
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }
}

pub(crate) const PERF_COUNT_HW_CPU_CYCLES: u64 = 0;
pub(crate) const PERF_COUNT_HW_INSTRUCTIONS: u64 = 1;

/// An opened counter bound to a process
///
/// Dropping the device releases the OS handle.
pub trait CounterDevice {
    fn enable(&mut self) -> io::Result<()>;
    fn disable(&mut self) -> io::Result<()>;
    /// Current cumulative count
    fn read_value(&mut self) -> io::Result<u64>;
}

/// Opens counters against a target process
pub trait CounterBackend {
    fn open(&mut self, spec: &CounterSpec, pid: Pid) -> io::Result<Box<dyn CounterDevice>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_indices_follow_catalog_order() {
        for (i, metric) in Metric::ALL.iter().enumerate() {
            assert_eq!(metric.index(), i);
        }
        assert_eq!(Metric::COUNT, 7);
    }

    #[test]
    fn test_raw_selectors() {
        assert_eq!(Metric::LoadWalkCompleted.spec().selector, 0x0e08);
        assert_eq!(Metric::OverheadCycles.spec().selector, 0x104f);
        assert_eq!(Metric::OverheadCycles.spec().domain, CounterDomain::Raw);
        assert_eq!(Metric::Cycles.spec().domain, CounterDomain::Hardware);
    }

    #[test]
    fn test_names_are_unique() {
        let mut names: Vec<_> = Metric::ALL.iter().map(|m| m.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Metric::COUNT);
    }
}
