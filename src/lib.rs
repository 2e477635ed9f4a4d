//! walkmon - online page-walk cost monitor
//!
//! Launches a workload suspended, arms hardware performance counters on it,
//! and samples them at a fixed cadence. Deltas are smoothed through
//! weighted sliding windows and fed, together with the workload's resident
//! set, into a predicate that decides whether a translation-overhead
//! mitigation should be enabled for the rest of the run.

pub mod action;
pub mod cli;
pub mod config;
pub mod counter;
pub mod decision;
pub mod error;
pub mod group;
pub mod monitor;
pub mod perf;
pub mod procfs;
pub mod report;
pub mod rotation;
pub mod target;
pub mod window;
