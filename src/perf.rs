//! Linux `perf_event_open(2)` counter backend
//!
//! Each counter is opened on its own (no group leader) against the target
//! pid on any CPU, counting user-mode activity only, inherited by threads the
//! target spawns, and created disabled so the whole set can be enabled
//! together once armed.

use crate::counter::{
    CounterBackend, CounterDevice, CounterDomain, CounterSpec, PERF_COUNT_HW_CPU_CYCLES,
    PERF_COUNT_HW_INSTRUCTIONS,
};
use nix::unistd::Pid;
use perf_event_open::config::{Cpu, Inherit, Opts, Proc};
use perf_event_open::count::Counter;
use perf_event_open::event::hw::Hardware;
use perf_event_open::event::raw::Raw;
use std::io;

/// Counting options shared by every channel
///
/// `Opts::default()` creates the counter disabled; it is started by
/// [`CounterDevice::enable`].
fn counting_opts() -> Opts {
    let mut opts = Opts::default();
    opts.exclude.kernel = true;
    opts.exclude.hv = true;
    opts.exclude.idle = true;
    opts.inherit = Some(Inherit::NewChild);
    opts
}

/// Kernel-generalized hardware event for a `Hardware` domain selector
fn hardware_event(selector: u64) -> io::Result<Hardware> {
    match selector {
        PERF_COUNT_HW_CPU_CYCLES => Ok(Hardware::CpuCycle),
        PERF_COUNT_HW_INSTRUCTIONS => Ok(Hardware::Instr),
        other => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unsupported hardware selector {:#x}", other),
        )),
    }
}

/// Production backend opening a perf counter for every spec
#[derive(Debug, Default, Clone, Copy)]
pub struct PerfBackend;

impl CounterBackend for PerfBackend {
    fn open(&mut self, spec: &CounterSpec, pid: Pid) -> io::Result<Box<dyn CounterDevice>> {
        let counter = PerfCounter::open(spec, pid)?;
        Ok(Box::new(counter))
    }
}

/// One open perf event; dropping it closes the counter
pub struct PerfCounter {
    counter: Counter,
}

impl PerfCounter {
    pub fn open(spec: &CounterSpec, pid: Pid) -> io::Result<Self> {
        let target = (Proc(pid.as_raw() as u32), Cpu::ALL);
        let counter = match spec.domain {
            CounterDomain::Hardware => {
                Counter::new(hardware_event(spec.selector)?, target, counting_opts())?
            }
            CounterDomain::Raw => Counter::new(
                Raw {
                    config: spec.selector,
                    config1: 0,
                    config2: 0,
                    config3: 0,
                },
                target,
                counting_opts(),
            )?,
        };
        Ok(Self { counter })
    }
}

impl CounterDevice for PerfCounter {
    fn enable(&mut self) -> io::Result<()> {
        self.counter.enable()
    }

    fn disable(&mut self) -> io::Result<()> {
        self.counter.disable()
    }

    fn read_value(&mut self) -> io::Result<u64> {
        Ok(self.counter.stat()?.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::Metric;

    #[test]
    fn test_hardware_selectors_map_to_events() {
        assert!(matches!(
            hardware_event(Metric::Cycles.spec().selector),
            Ok(Hardware::CpuCycle)
        ));
        assert!(matches!(
            hardware_event(Metric::Instructions.spec().selector),
            Ok(Hardware::Instr)
        ));
    }

    #[test]
    fn test_unknown_hardware_selector_rejected() {
        let err = hardware_event(0x42).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(err.to_string().contains("0x42"));
    }

    #[test]
    fn test_open_against_missing_pid_fails() {
        // pid_max never exceeds 2^22, so this pid cannot exist
        let result = PerfCounter::open(&Metric::Cycles.spec(), Pid::from_raw(i32::MAX));
        assert!(result.is_err());
    }
}
