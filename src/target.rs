//! The monitored workload
//!
//! [`SuspendedChild::spawn`] forks the target and parks it on a readiness
//! pipe before `exec`, so counters can be armed against its pid before it
//! runs a single instruction of the program. [`SuspendedChild::release`]
//! sends the go byte and learns through a close-on-exec status pipe whether
//! `exec` succeeded. A suspended child that is never released is killed and
//! reaped on drop.

use crate::error::{MonitorError, Result};
use crate::procfs;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{FromRawFd, OwnedFd};
use std::os::unix::process::CommandExt;
use std::process::Command;
use tracing::{debug, warn};

const READY_BYTE: u8 = b'G';

/// Exit status used by a child whose monitor vanished before releasing it
const HANDSHAKE_FAILED_EXIT: i32 = 126;
const EXEC_FAILED_EXIT: i32 = 127;

/// How the target terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Exited(i32),
    Signaled(Signal),
}

impl ExitOutcome {
    /// Normal exit with status 0
    pub fn is_success(&self) -> bool {
        matches!(self, ExitOutcome::Exited(0))
    }

    /// Shell-style exit code (`128 + signo` for signals)
    pub fn exit_code(&self) -> i32 {
        match self {
            ExitOutcome::Exited(code) => *code,
            ExitOutcome::Signaled(sig) => 128 + *sig as i32,
        }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitOutcome::Exited(code) => write!(f, "exited with status {}", code),
            ExitOutcome::Signaled(sig) => write!(f, "killed by {}", sig.as_str()),
        }
    }
}

/// A running process the monitor samples
pub trait Target {
    fn pid(&self) -> Pid;

    /// Current resident set in bytes
    fn resident_bytes(&self) -> io::Result<u64>;

    /// Non-blocking liveness check; `Some` once the target has exited
    fn poll_exit(&mut self) -> Result<Option<ExitOutcome>>;
}

/// A forked child blocked before `exec`
pub struct SuspendedChild {
    pid: Pid,
    program: String,
    go: Option<File>,
    exec_status: Option<File>,
    handed_off: bool,
}

impl SuspendedChild {
    /// Fork the target and park it until [`SuspendedChild::release`]
    pub fn spawn(command: &[String]) -> Result<Self> {
        let (program, args) = command.split_first().ok_or(MonitorError::EmptyCommand)?;
        let launch_err = |source: io::Error| MonitorError::Launch {
            program: program.clone(),
            source,
        };

        let (ready_rx, ready_tx) = cloexec_pipe().map_err(launch_err)?;
        let (status_rx, status_tx) = cloexec_pipe().map_err(launch_err)?;

        // SAFETY: the monitor runs a single control thread; the child only
        // blocks on the pipe and then execs.
        match unsafe { fork() }.map_err(|e| launch_err(e.into()))? {
            ForkResult::Parent { child } => {
                drop(ready_rx);
                drop(status_tx);
                debug!(pid = child.as_raw(), program = %program, "target forked and suspended");
                Ok(Self {
                    pid: child,
                    program: program.clone(),
                    go: Some(File::from(ready_tx)),
                    exec_status: Some(File::from(status_rx)),
                    handed_off: false,
                })
            }
            ForkResult::Child => {
                drop(ready_tx);
                drop(status_rx);
                exec_when_released(ready_rx, status_tx, program, args)
            }
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Let the target exec, confirming that `exec` itself succeeded
    pub fn release(mut self) -> Result<ChildProcess> {
        let (Some(mut go), Some(mut exec_status)) = (self.go.take(), self.exec_status.take())
        else {
            return Err(MonitorError::Handshake(io::Error::new(
                io::ErrorKind::Other,
                "target already released",
            )));
        };

        if let Err(e) = go.write_all(&[READY_BYTE]) {
            self.abort();
            return Err(MonitorError::Handshake(e));
        }
        drop(go);

        let mut errno = Vec::with_capacity(4);
        if let Err(e) = exec_status.read_to_end(&mut errno) {
            self.abort();
            return Err(MonitorError::Handshake(e));
        }

        if let Ok(bytes) = <[u8; 4]>::try_from(errno.as_slice()) {
            let _ = waitpid(self.pid, None);
            self.handed_off = true;
            return Err(MonitorError::Launch {
                program: self.program.clone(),
                source: io::Error::from_raw_os_error(i32::from_ne_bytes(bytes)),
            });
        }

        self.handed_off = true;
        debug!(pid = self.pid.as_raw(), "target released");
        Ok(ChildProcess::new(self.pid))
    }

    fn abort(&mut self) {
        let _ = kill(self.pid, Signal::SIGKILL);
        let _ = waitpid(self.pid, None);
        self.handed_off = true;
    }
}

impl Drop for SuspendedChild {
    fn drop(&mut self) {
        if !self.handed_off {
            debug!(pid = self.pid.as_raw(), "killing target that was never released");
            self.abort();
        }
    }
}

/// Runs in the forked child: wait for the go byte, then exec
fn exec_when_released(ready: OwnedFd, status: OwnedFd, program: &str, args: &[String]) -> ! {
    let mut ready = File::from(ready);
    let mut go = [0u8; 1];
    if ready.read_exact(&mut go).is_err() {
        // SAFETY: terminating the forked child without running atexit handlers.
        unsafe { libc::_exit(HANDSHAKE_FAILED_EXIT) }
    }
    drop(ready);

    let mut status = File::from(status);
    let err = Command::new(program).args(args).exec();
    let errno = err.raw_os_error().unwrap_or(libc::ENOEXEC);
    let _ = status.write_all(&errno.to_ne_bytes());

    // SAFETY: as above.
    unsafe { libc::_exit(EXEC_FAILED_EXIT) }
}

fn cloexec_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0 as libc::c_int; 2];
    // SAFETY: fds is a two-element out array.
    if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: pipe2 returned two fresh descriptors we now own.
    Ok(unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) })
}

/// A released, running target
#[derive(Debug)]
pub struct ChildProcess {
    pid: Pid,
    outcome: Option<ExitOutcome>,
}

impl ChildProcess {
    fn new(pid: Pid) -> Self {
        Self { pid, outcome: None }
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        if self.outcome.is_some() {
            return;
        }
        // Only signal a pid that is still our unreaped child.
        if let Ok(WaitStatus::StillAlive | WaitStatus::Stopped(..) | WaitStatus::Continued(_)) =
            waitpid(self.pid, Some(WaitPidFlag::WNOHANG))
        {
            warn!(pid = self.pid.as_raw(), "monitoring ended before target exit, killing it");
            let _ = kill(self.pid, Signal::SIGKILL);
            let _ = waitpid(self.pid, None);
        }
    }
}

impl Target for ChildProcess {
    fn pid(&self) -> Pid {
        self.pid
    }

    fn resident_bytes(&self) -> io::Result<u64> {
        procfs::resident_bytes(self.pid)
    }

    fn poll_exit(&mut self) -> Result<Option<ExitOutcome>> {
        if self.outcome.is_some() {
            return Ok(self.outcome);
        }

        let outcome = match waitpid(self.pid, Some(WaitPidFlag::WNOHANG))? {
            WaitStatus::Exited(_, code) => ExitOutcome::Exited(code),
            WaitStatus::Signaled(_, sig, _) => ExitOutcome::Signaled(sig),
            _ => return Ok(None),
        };
        self.outcome = Some(outcome);
        Ok(Some(outcome))
    }
}
