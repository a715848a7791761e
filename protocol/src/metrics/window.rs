//! Fixed-capacity rolling window of throughput samples.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::stats;

/// Recent instantaneous throughput, one sample per period at most.
///
/// Events are counted between samples. When an event arrives at least one
/// period after the previous sample, the window records
/// `events / elapsed_seconds` and starts counting again. The oldest sample
/// is evicted once `capacity` is reached.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    samples: VecDeque<f64>,
    capacity: usize,
    period: Duration,
    last_mark: Instant,
    events_since_mark: u64,
}

impl RollingWindow {
    /// Creates an empty window whose first period starts now.
    pub fn new(capacity: usize, period: Duration) -> Self {
        Self::starting_at(capacity, period, Instant::now())
    }

    /// Creates an empty window whose first period starts at `start`.
    pub fn starting_at(capacity: usize, period: Duration, start: Instant) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            period,
            last_mark: start,
            events_since_mark: 0,
        }
    }

    /// Counts one event at `now`, taking a sample if a period has elapsed.
    /// Returns the new sample, if one was taken.
    pub fn record_event(&mut self, now: Instant) -> Option<f64> {
        self.events_since_mark += 1;

        let elapsed = now.saturating_duration_since(self.last_mark);
        if elapsed < self.period {
            return None;
        }

        let rate = self.events_since_mark as f64 / elapsed.as_secs_f64();
        if self.capacity > 0 {
            if self.samples.len() == self.capacity {
                self.samples.pop_front();
            }
            self.samples.push_back(rate);
        }
        self.last_mark = now;
        self.events_since_mark = 0;
        Some(rate)
    }

    /// Current samples, oldest first.
    pub fn samples(&self) -> Vec<f64> {
        self.samples.iter().copied().collect()
    }

    /// Number of samples held.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` if no sample has been taken yet.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Mean of the held samples, zero when empty.
    pub fn mean(&self) -> f64 {
        stats::mean(self.samples.iter().copied())
    }

    /// Population standard deviation of the held samples, zero when empty.
    pub fn std_dev(&self) -> f64 {
        stats::std_dev(self.samples.iter().copied())
    }
}
