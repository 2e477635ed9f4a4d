//! Monitor configuration
//!
//! Every engine constant lives here: sampling cadence, window shape,
//! decision thresholds and the action policy. Values come from
//! [`MonitorConfig::default`] or a TOML file:
//!
//! ```toml
//! sample_interval_ms = 1000
//! poll_interval_ms = 10
//! window_size = 5
//! weights = [1.0, 2.0, 3.0, 4.0, 5.0]
//! action_mode = "one-shot"
//! multiplex = false
//! rotation_ticks = 1
//!
//! [thresholds]
//! min_rss_gb = 1.0
//! walk_cycles = 40.0
//! tolerance = 0.0
//! ```

use crate::action::ActionMode;
use crate::decision::DecisionThresholds;
use crate::error::{MonitorError, Result};
use crate::window::WeightVector;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    /// Time between samples, measured on the monotonic clock
    pub sample_interval_ms: u64,
    /// Idle sleep step between liveness checks
    pub poll_interval_ms: u64,
    /// Samples retained per counter
    pub window_size: usize,
    /// Oldest-to-newest weights, one per window slot
    pub weights: Vec<f64>,
    pub thresholds: DecisionThresholds,
    pub action_mode: ActionMode,
    /// Split the counters over two time-multiplexed groups
    pub multiplex: bool,
    /// Samples taken on a group before rotating to the other one
    pub rotation_ticks: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 1000,
            poll_interval_ms: 10,
            window_size: 5,
            weights: vec![1.0, 2.0, 3.0, 4.0, 5.0],
            thresholds: DecisionThresholds::default(),
            action_mode: ActionMode::OneShot,
            multiplex: false,
            rotation_ticks: 1,
        }
    }
}

impl MonitorConfig {
    /// Load and validate a TOML configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML content
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| MonitorError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(MonitorError::InvalidConfig(
                "window_size must be > 0".to_string(),
            ));
        }
        if self.weights.len() != self.window_size {
            return Err(MonitorError::InvalidConfig(format!(
                "weights must have window_size ({}) entries, got {}",
                self.window_size,
                self.weights.len()
            )));
        }
        WeightVector::new(self.weights.clone())?;
        self.thresholds
            .validate()
            .map_err(MonitorError::InvalidConfig)?;
        if self.rotation_ticks == 0 {
            return Err(MonitorError::InvalidConfig(
                "rotation_ticks must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn weight_vector(&self) -> Result<WeightVector> {
        WeightVector::new(self.weights.clone())
    }
}
