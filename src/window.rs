//! Sliding-window smoothing of per-tick counter deltas
//!
//! Each channel keeps a fixed-capacity circular buffer of its most recent
//! deltas. Averages only ever cover the filled slots. The weighted average
//! applies the first `filled` weights oldest-to-newest and normalizes by the
//! sum of the weights actually applied, so an ascending weight vector favors
//! recent samples.

use crate::error::{MonitorError, Result};

/// Positive weights applied oldest-to-newest
#[derive(Debug, Clone, PartialEq)]
pub struct WeightVector(Vec<f64>);

impl WeightVector {
    /// Validate and wrap a weight vector
    pub fn new(weights: Vec<f64>) -> Result<Self> {
        if weights.is_empty() {
            return Err(MonitorError::InvalidConfig(
                "weight vector must not be empty".to_string(),
            ));
        }
        if let Some(bad) = weights.iter().find(|w| !w.is_finite() || **w <= 0.0) {
            return Err(MonitorError::InvalidConfig(format!(
                "weights must be positive and finite, got {}",
                bad
            )));
        }
        Ok(Self(weights))
    }

    /// `[1, 2, ..., n]`
    pub fn ascending(n: usize) -> Self {
        Self((1..=n.max(1)).map(|w| w as f64).collect())
    }

    /// `n` equal weights; the weighted average degenerates to the mean
    pub fn uniform(n: usize) -> Self {
        Self(vec![1.0; n.max(1)])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

/// Circular buffer of the most recent deltas for one channel
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    buf: Vec<u64>,
    cursor: usize,
    filled: usize,
}

impl SlidingWindow {
    /// # Panics
    ///
    /// Panics if capacity is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Sliding window capacity must be > 0");
        Self {
            buf: vec![0; capacity],
            cursor: 0,
            filled: 0,
        }
    }

    /// Number of slots holding real samples
    pub fn filled(&self) -> usize {
        self.filled
    }

    /// Overwrite the slot at the cursor and advance it
    pub fn push(&mut self, delta: u64) {
        let capacity = self.buf.len();
        self.buf[self.cursor] = delta;
        self.cursor = (self.cursor + 1) % capacity;
        if self.filled < capacity {
            self.filled += 1;
        }
    }

    /// Retained samples, oldest first
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        let capacity = self.buf.len();
        let start = (self.cursor + capacity - self.filled) % capacity;
        (0..self.filled).map(move |j| self.buf[(start + j) % capacity])
    }

    /// Plain mean over the filled slots, 0 when empty
    pub fn average(&self) -> f64 {
        if self.filled == 0 {
            return 0.0;
        }
        let sum: f64 = self.iter().map(|d| d as f64).sum();
        sum / self.filled as f64
    }

    /// Weighted mean over the filled slots, 0 when empty
    ///
    /// Sample `j` (oldest = 0) gets `weights[j]`; only the first `filled`
    /// weights take part in the normalization.
    pub fn weighted_average(&self, weights: &WeightVector) -> f64 {
        let (sum, weight_sum) = self
            .iter()
            .zip(weights.as_slice())
            .fold((0.0, 0.0), |(sum, wsum), (d, &w)| (sum + d as f64 * w, wsum + w));

        if weight_sum > 0.0 {
            sum / weight_sum
        } else {
            0.0
        }
    }
}

/// One window per channel sharing a weight vector
#[derive(Debug, Clone)]
pub struct WindowSet {
    windows: Vec<SlidingWindow>,
    weights: WeightVector,
}

impl WindowSet {
    /// # Errors
    ///
    /// Fails when there are fewer weights than window slots.
    pub fn new(channels: usize, capacity: usize, weights: WeightVector) -> Result<Self> {
        if capacity == 0 {
            return Err(MonitorError::InvalidConfig(
                "window capacity must be > 0".to_string(),
            ));
        }
        if weights.len() < capacity {
            return Err(MonitorError::InvalidConfig(format!(
                "need {} weights for a window of {}, got {}",
                capacity,
                capacity,
                weights.len()
            )));
        }
        Ok(Self {
            windows: (0..channels).map(|_| SlidingWindow::new(capacity)).collect(),
            weights,
        })
    }

    pub fn push(&mut self, channel: usize, delta: u64) {
        self.windows[channel].push(delta);
    }

    pub fn window(&self, channel: usize) -> &SlidingWindow {
        &self.windows[channel]
    }

    /// Weighted averages for every channel in index order
    pub fn averages(&self) -> Vec<f64> {
        self.windows
            .iter()
            .map(|w| w.weighted_average(&self.weights))
            .collect()
    }
}
