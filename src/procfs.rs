//! Resident-set queries against `/proc/<pid>`
//!
//! `statm` reports pages and is preferred; `status` reports `VmRSS` in kB
//! and is the fallback.

use nix::unistd::Pid;
use std::fs;
use std::io;

/// Resident set of `pid` in bytes
pub fn resident_bytes(pid: Pid) -> io::Result<u64> {
    let statm = fs::read_to_string(format!("/proc/{}/statm", pid))?;
    if let Some(bytes) = parse_statm(&statm, page_size()) {
        return Ok(bytes);
    }

    let status = fs::read_to_string(format!("/proc/{}/status", pid))?;
    parse_status_vmrss(&status).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("no resident set reported for pid {}", pid),
        )
    })
}

/// Second field of `statm` (resident pages) times the page size
pub fn parse_statm(contents: &str, page_size: u64) -> Option<u64> {
    let pages: u64 = contents.split_whitespace().nth(1)?.parse().ok()?;
    pages.checked_mul(page_size)
}

/// `VmRSS:` line of `status`, converted from kB to bytes
pub fn parse_status_vmrss(contents: &str) -> Option<u64> {
    let line = contents.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kb: u64 = line["VmRSS:".len()..].split_whitespace().next()?.parse().ok()?;
    kb.checked_mul(1024)
}

fn page_size() -> u64 {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as u64
    } else {
        4096
    }
}
