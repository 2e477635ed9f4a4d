//! Error types for the monitor engine

use std::io;
use thiserror::Error;

/// Errors raised while arming, sampling or tearing down a monitored run
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Failed to open counter {name}: {source}")]
    CounterOpen {
        name: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Failed to enable counter {name}: {source}")]
    CounterEnable {
        name: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Counter group already released")]
    GroupReleased,

    #[error("Counters are not armed")]
    NotArmed,

    #[error("Counters already armed against pid {0}")]
    AlreadyArmed(i32),

    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Readiness handshake with target failed: {0}")]
    Handshake(#[source] io::Error),

    #[error("Failed to poll target status: {0}")]
    Wait(#[from] nix::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Command array is empty")]
    EmptyCommand,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for monitor operations
pub type Result<T> = std::result::Result<T, MonitorError>;
