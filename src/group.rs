//! Counter groups: a fixed, ordered set of counters sampled together
//!
//! A group is armed only when every counter opened successfully; handles
//! are enabled and disabled together and released exactly once, either by
//! [`CounterGroup::release`] or when the group is dropped.

use crate::counter::{CounterBackend, CounterDevice, CounterSpec};
use crate::error::{MonitorError, Result};
use nix::unistd::Pid;
use tracing::{debug, warn};

/// An opened counter plus its delta bookkeeping
pub struct CounterHandle {
    spec: CounterSpec,
    device: Option<Box<dyn CounterDevice>>,
    previous: u64,
}

impl CounterHandle {
    fn new(spec: CounterSpec, device: Box<dyn CounterDevice>) -> Self {
        Self {
            spec,
            device: Some(device),
            previous: 0,
        }
    }

    /// Cumulative value seen at the last successful read
    pub fn previous(&self) -> u64 {
        self.previous
    }

    pub fn is_released(&self) -> bool {
        self.device.is_none()
    }

    /// Read the cumulative value and convert it into a delta
    ///
    /// A failed read or a value below the previous one yields 0 for this tick.
    fn sample(&mut self) -> u64 {
        let Some(device) = self.device.as_mut() else {
            return 0;
        };

        match device.read_value() {
            Ok(current) => {
                let delta = match current.checked_sub(self.previous) {
                    Some(delta) => delta,
                    None => {
                        warn!(
                            counter = self.spec.name,
                            previous = self.previous,
                            current,
                            "counter went backwards, treating delta as 0"
                        );
                        0
                    }
                };
                self.previous = current;
                delta
            }
            Err(e) => {
                warn!(counter = self.spec.name, error = %e, "counter read failed, treating delta as 0");
                0
            }
        }
    }
}

/// Ordered collection of counters bound to one target process
pub struct CounterGroup {
    handles: Vec<CounterHandle>,
    pid: Pid,
    enabled: bool,
    released: bool,
}

impl CounterGroup {
    /// Open every spec against `pid`
    ///
    /// Any single failure is fatal: counters opened so far are closed and
    /// the error names the counter that could not be opened.
    pub fn open(specs: &[CounterSpec], pid: Pid, backend: &mut dyn CounterBackend) -> Result<Self> {
        let mut handles = Vec::with_capacity(specs.len());

        for spec in specs {
            match backend.open(spec, pid) {
                Ok(device) => handles.push(CounterHandle::new(*spec, device)),
                Err(source) => {
                    debug!(
                        opened = handles.len(),
                        "releasing counters opened before failure"
                    );
                    drop(handles);
                    return Err(MonitorError::CounterOpen {
                        name: spec.name,
                        source,
                    });
                }
            }
        }

        debug!(pid = pid.as_raw(), counters = handles.len(), "counter group opened");
        Ok(Self {
            handles,
            pid,
            enabled: false,
            released: false,
        })
    }

    /// Enable every handle; on failure the handles enabled so far are disabled again
    pub fn enable(&mut self) -> Result<()> {
        if self.released {
            return Err(MonitorError::GroupReleased);
        }
        if self.enabled {
            return Ok(());
        }

        for i in 0..self.handles.len() {
            let result = match self.handles[i].device.as_mut() {
                Some(device) => device.enable(),
                None => Ok(()),
            };
            if let Err(source) = result {
                for handle in &mut self.handles[..i] {
                    if let Some(device) = handle.device.as_mut() {
                        let _ = device.disable();
                    }
                }
                return Err(MonitorError::CounterEnable {
                    name: self.handles[i].spec.name,
                    source,
                });
            }
        }

        self.enabled = true;
        Ok(())
    }

    /// Disable every handle. Idempotent.
    pub fn disable(&mut self) {
        if !self.enabled {
            return;
        }
        for handle in &mut self.handles {
            if let Some(device) = handle.device.as_mut() {
                if let Err(e) = device.disable() {
                    warn!(counter = handle.spec.name, error = %e, "failed to disable counter");
                }
            }
        }
        self.enabled = false;
    }

    /// Read every counter and return the deltas in spec order
    pub fn read_all(&mut self) -> Result<Vec<u64>> {
        if self.released {
            return Err(MonitorError::GroupReleased);
        }
        Ok(self.handles.iter_mut().map(CounterHandle::sample).collect())
    }

    /// Disable and close every handle
    ///
    /// Returns how many handles were released by this call; later calls
    /// return 0.
    pub fn release(&mut self) -> usize {
        if self.released {
            return 0;
        }
        self.disable();

        let mut released = 0;
        for handle in &mut self.handles {
            if handle.device.take().is_some() {
                released += 1;
            }
        }
        self.released = true;
        debug!(pid = self.pid.as_raw(), released, "counter group released");
        released
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn handles(&self) -> &[CounterHandle] {
        &self.handles
    }
}

impl Drop for CounterGroup {
    fn drop(&mut self) {
        self.release();
    }
}
