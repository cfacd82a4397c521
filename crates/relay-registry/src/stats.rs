//! Per-provider latency and outcome accounting.

use parking_lot::Mutex;
use relay_core::outcome::{FailureKind, Outcome};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;

const DEFAULT_SAMPLE_CAPACITY: usize = 64;

struct StatsInner {
    samples: VecDeque<Duration>,
    successes: u64,
    failures: u64,
    timeouts: u64,
}

/// Rolling window of recent successful-attempt latencies plus lifetime
/// outcome counters.
///
/// Only successful attempts enter the latency ring; timed-out attempts
/// report the budget, not the service time, and would poison the mean.
pub struct LatencyWindow {
    inner: Mutex<StatsInner>,
    capacity: usize,
}

impl Default for LatencyWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyWindow {
    /// Create a window with the default sample capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SAMPLE_CAPACITY)
    }

    /// Create a window keeping the last `capacity` latencies.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(StatsInner {
                samples: VecDeque::with_capacity(capacity),
                successes: 0,
                failures: 0,
                timeouts: 0,
            }),
            capacity,
        }
    }

    /// Fold one finished attempt into the window.
    pub fn record(&self, outcome: &Outcome) {
        let mut inner = self.inner.lock();
        match outcome.result {
            Ok(()) => {
                inner.successes += 1;
                if inner.samples.len() == self.capacity {
                    inner.samples.pop_front();
                }
                inner.samples.push_back(outcome.latency);
            }
            Err(FailureKind::Timeout | FailureKind::DeadlineExceeded) => inner.timeouts += 1,
            Err(_) => inner.failures += 1,
        }
    }

    /// Mean of the sampled latencies, `None` while cold.
    pub fn mean_latency(&self) -> Option<Duration> {
        let inner = self.inner.lock();
        if inner.samples.is_empty() {
            return None;
        }
        let total: Duration = inner.samples.iter().sum();
        Some(total / inner.samples.len() as u32)
    }

    /// Drop every sample and counter.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.samples.clear();
        inner.successes = 0;
        inner.failures = 0;
        inner.timeouts = 0;
    }

    /// Point-in-time summary for status views.
    pub fn summary(&self) -> StatsSummary {
        let inner = self.inner.lock();
        let total = inner.successes + inner.failures + inner.timeouts;
        let mean_latency_ms = if inner.samples.is_empty() {
            None
        } else {
            let total_latency: Duration = inner.samples.iter().sum();
            Some((total_latency / inner.samples.len() as u32).as_millis() as u64)
        };
        StatsSummary {
            successes: inner.successes,
            failures: inner.failures,
            timeouts: inner.timeouts,
            success_rate: if total == 0 {
                None
            } else {
                Some(inner.successes as f64 / total as f64)
            },
            mean_latency_ms,
            sampled: inner.samples.len(),
        }
    }
}

/// Aggregated performance counters for one provider.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSummary {
    /// Successful attempts in this snapshot generation.
    pub successes: u64,
    /// Failed attempts, excluding timeouts.
    pub failures: u64,
    /// Timed-out attempts.
    pub timeouts: u64,
    /// Successes over all attempts, absent before any attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_rate: Option<f64>,
    /// Mean sampled latency in milliseconds, absent while cold.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_latency_ms: Option<u64>,
    /// Number of latencies currently sampled.
    pub sampled: usize,
}
