//! Walk-cost heuristic
//!
//! ```text
//! completions       = avg(load_completions) + avg(store_completions)
//! avg_overhead_cost = avg(overhead_cycles) / max(completions, 1)
//! enable            = resident_gb >= min_rss_gb
//!                     AND avg_overhead_cost > walk_cycles * (1 - tolerance)
//! ```
//!
//! The predicate is pure: it only sees the current window averages and the
//! instantaneous RSS. Latching lives in [`crate::action::ActionSink`].

use crate::counter::Metric;
use serde::{Deserialize, Serialize};

const BYTES_PER_GB: f64 = (1u64 << 30) as f64;

/// Calibration constants for one run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionThresholds {
    /// Minimum resident set, in GiB
    pub min_rss_gb: f64,
    /// Average overhead cycles per completed walk that must be exceeded
    pub walk_cycles: f64,
    /// Fraction the walk-cycle bound is relaxed by, in `[0, 1)`
    pub tolerance: f64,
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            min_rss_gb: 1.0,
            walk_cycles: 40.0,
            tolerance: 0.0,
        }
    }
}

impl DecisionThresholds {
    /// Walk-cost bound after applying the tolerance margin
    pub fn walk_cost_bound(&self) -> f64 {
        self.walk_cycles * (1.0 - self.tolerance)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.min_rss_gb.is_finite() || self.min_rss_gb < 0.0 {
            return Err(format!(
                "min_rss_gb must be finite and >= 0, got {}",
                self.min_rss_gb
            ));
        }
        if !self.walk_cycles.is_finite() || self.walk_cycles < 0.0 {
            return Err(format!(
                "walk_cycles must be finite and >= 0, got {}",
                self.walk_cycles
            ));
        }
        if !(0.0..1.0).contains(&self.tolerance) {
            return Err(format!(
                "tolerance must be in [0, 1), got {}",
                self.tolerance
            ));
        }
        Ok(())
    }
}

/// Smoothed per-tick counter averages, one field per channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct WalkMetrics {
    pub cycles: f64,
    pub instructions: f64,
    pub load_walk_duration: f64,
    pub store_walk_duration: f64,
    pub load_completions: f64,
    pub store_completions: f64,
    pub overhead_cycles: f64,
}

impl WalkMetrics {
    /// Build from a channel vector indexed by [`Metric::index`]
    ///
    /// Missing trailing channels read as 0.
    pub fn from_averages(averages: &[f64]) -> Self {
        let at = |m: Metric| averages.get(m.index()).copied().unwrap_or(0.0);
        Self {
            cycles: at(Metric::Cycles),
            instructions: at(Metric::Instructions),
            load_walk_duration: at(Metric::LoadWalkDuration),
            store_walk_duration: at(Metric::StoreWalkDuration),
            load_completions: at(Metric::LoadWalkCompleted),
            store_completions: at(Metric::StoreWalkCompleted),
            overhead_cycles: at(Metric::OverheadCycles),
        }
    }

    pub fn completions(&self) -> f64 {
        self.load_completions + self.store_completions
    }

    pub fn avg_overhead_cost(&self) -> f64 {
        self.overhead_cycles / self.completions().max(1.0)
    }

    /// Average walk duration per completed walk
    pub fn avg_walk_duration(&self) -> f64 {
        (self.load_walk_duration + self.store_walk_duration) / self.completions().max(1.0)
    }

    /// Instructions per cycle, 0 without cycles
    pub fn ipc(&self) -> f64 {
        if self.cycles > 0.0 {
            self.instructions / self.cycles
        } else {
            0.0
        }
    }
}

/// Outcome of one predicate evaluation
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Evaluation {
    pub completions: f64,
    pub avg_overhead_cost: f64,
    pub resident_gb: f64,
    pub enable: bool,
}

/// Evaluates the walk-cost predicate against fixed thresholds
#[derive(Debug, Clone, Copy, Default)]
pub struct DecisionEngine {
    thresholds: DecisionThresholds,
}

impl DecisionEngine {
    pub fn new(thresholds: DecisionThresholds) -> Self {
        Self { thresholds }
    }

    pub fn evaluate(&self, metrics: &WalkMetrics, rss_bytes: u64) -> Evaluation {
        let resident_gb = rss_bytes as f64 / BYTES_PER_GB;
        self.evaluate_gb(metrics, resident_gb)
    }

    pub fn evaluate_gb(&self, metrics: &WalkMetrics, resident_gb: f64) -> Evaluation {
        let avg_overhead_cost = metrics.avg_overhead_cost();
        let enable = resident_gb >= self.thresholds.min_rss_gb
            && avg_overhead_cost > self.thresholds.walk_cost_bound();

        Evaluation {
            completions: metrics.completions(),
            avg_overhead_cost,
            resident_gb,
            enable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics_with_cost(cost: f64) -> WalkMetrics {
        WalkMetrics {
            load_completions: 60.0,
            store_completions: 40.0,
            overhead_cycles: cost * 100.0,
            ..WalkMetrics::default()
        }
    }

    #[test]
    fn test_boundary_rss_equal_threshold_enables() {
        let engine = DecisionEngine::new(DecisionThresholds::default());
        let eval = engine.evaluate_gb(&metrics_with_cost(40.0001), 1.0);
        assert!(eval.enable);
    }

    #[test]
    fn test_rss_below_threshold_never_enables() {
        let engine = DecisionEngine::new(DecisionThresholds::default());
        for cost in [40.0001, 100.0, 1e9] {
            let eval = engine.evaluate_gb(&metrics_with_cost(cost), 0.999999);
            assert!(!eval.enable, "cost {} must not enable below RSS bound", cost);
        }
    }

    #[test]
    fn test_cost_equal_threshold_does_not_enable() {
        let engine = DecisionEngine::new(DecisionThresholds::default());
        let eval = engine.evaluate_gb(&metrics_with_cost(40.0), 4.0);
        assert!(!eval.enable);
    }

    #[test]
    fn test_zero_completions_divides_by_one() {
        let metrics = WalkMetrics {
            overhead_cycles: 50.0,
            ..WalkMetrics::default()
        };
        assert_eq!(metrics.avg_overhead_cost(), 50.0);

        let engine = DecisionEngine::new(DecisionThresholds::default());
        assert!(engine.evaluate_gb(&metrics, 2.0).enable);
    }

    #[test]
    fn test_tolerance_relaxes_bound() {
        let thresholds = DecisionThresholds {
            min_rss_gb: 1.0,
            walk_cycles: 25.0,
            tolerance: 0.05,
        };
        assert!((thresholds.walk_cost_bound() - 23.75).abs() < 1e-9);

        let engine = DecisionEngine::new(thresholds);
        assert!(engine.evaluate_gb(&metrics_with_cost(24.0), 1.5).enable);
        assert!(!engine.evaluate_gb(&metrics_with_cost(23.0), 1.5).enable);
    }

    #[test]
    fn test_evaluate_converts_bytes() {
        let engine = DecisionEngine::new(DecisionThresholds::default());
        let eval = engine.evaluate(&metrics_with_cost(80.0), 3 << 29);
        assert!((eval.resident_gb - 1.5).abs() < 1e-12);
        assert!(eval.enable);
        assert!((eval.completions - 100.0).abs() < 1e-12);
    }

    #[test]
    fn test_from_averages_maps_channels() {
        let metrics = WalkMetrics::from_averages(&[2.0, 1.0, 30.0, 10.0, 3.0, 1.0, 200.0]);
        assert_eq!(metrics.ipc(), 0.5);
        assert_eq!(metrics.completions(), 4.0);
        assert_eq!(metrics.avg_walk_duration(), 10.0);
        assert_eq!(metrics.avg_overhead_cost(), 50.0);
    }

    #[test]
    fn test_threshold_validation() {
        assert!(DecisionThresholds::default().validate().is_ok());
        let bad = DecisionThresholds {
            tolerance: 1.0,
            ..DecisionThresholds::default()
        };
        assert!(bad.validate().is_err());
        let bad = DecisionThresholds {
            walk_cycles: f64::NAN,
            ..DecisionThresholds::default()
        };
        assert!(bad.validate().is_err());
    }
}
