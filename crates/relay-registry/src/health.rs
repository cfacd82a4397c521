//! Per-provider circuit breaker.
//!
//! Trips after a streak of consecutive failures, recovers through
//! serialized half-open probes, and doubles its cooldown on every
//! failed probe up to a configured ceiling. The `Open -> HalfOpen`
//! transition is evaluated lazily, whenever selection or status
//! observes the provider after the cooldown elapsed.

use parking_lot::Mutex;
use relay_config::HealthConfig;
use relay_core::types::{HealthState, ProviderId};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Verdict of the dispatch gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Dispatch normally.
    Pass,
    /// Dispatch as the one half-open probe.
    Probe,
    /// The circuit is open.
    Open,
    /// Another request holds the probe slot.
    Busy,
}

/// One observed state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Previous state.
    pub from: HealthState,
    /// New state.
    pub to: HealthState,
}

#[derive(Debug)]
struct Inner {
    state: HealthState,
    consecutive_failures: u32,
    probe_successes: u32,
    probe_in_flight: bool,
    opened_at: Option<Instant>,
    cooldown: Duration,
}

/// Circuit breaker for a single provider.
pub struct CircuitBreaker {
    provider_id: ProviderId,
    config: HealthConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    #[must_use]
    pub fn new(provider_id: ProviderId, config: HealthConfig) -> Self {
        Self {
            provider_id,
            inner: Mutex::new(Inner {
                state: HealthState::Closed,
                consecutive_failures: 0,
                probe_successes: 0,
                probe_in_flight: false,
                opened_at: None,
                cooldown: config.cooldown,
            }),
            config,
        }
    }

    /// The stored state, without lazy evaluation.
    #[must_use]
    pub fn state(&self) -> HealthState {
        self.inner.lock().state
    }

    /// Whether a dispatch could be gated through right now.
    ///
    /// Performs the lazy half-open transition but claims nothing.
    pub fn admits(&self) -> bool {
        let mut inner = self.inner.lock();
        self.mature(&mut inner);
        match inner.state {
            HealthState::Closed => true,
            HealthState::HalfOpen => !inner.probe_in_flight,
            HealthState::Open => false,
        }
    }

    /// Gate one dispatch.
    ///
    /// In the half-open state the first caller claims the single probe
    /// slot; concurrent callers get [`Gate::Busy`] until the probe
    /// outcome is recorded.
    pub fn gate(&self) -> Gate {
        let mut inner = self.inner.lock();
        self.mature(&mut inner);
        match inner.state {
            HealthState::Closed => Gate::Pass,
            HealthState::Open => Gate::Open,
            HealthState::HalfOpen => {
                if inner.probe_in_flight {
                    Gate::Busy
                } else {
                    inner.probe_in_flight = true;
                    Gate::Probe
                }
            }
        }
    }

    /// Return an unused probe slot.
    ///
    /// For a probe that was gated through but never dispatched, e.g.
    /// because no credential had budget.
    pub fn release_probe_slot(&self) {
        self.inner.lock().probe_in_flight = false;
    }

    /// Apply one finished dispatch to the circuit.
    ///
    /// Returns the transition this outcome caused, if any.
    pub fn record(&self, success: bool, probe: bool) -> Option<Transition> {
        let mut inner = self.inner.lock();

        if probe {
            inner.probe_in_flight = false;
            if inner.state != HealthState::HalfOpen {
                // A reset or manual trip moved the circuit while the
                // probe ran; its verdict no longer applies.
                debug!(
                    provider = %self.provider_id,
                    state = %inner.state,
                    "probe outcome after state change, ignoring"
                );
                return None;
            }
            if success {
                inner.probe_successes += 1;
                debug!(
                    provider = %self.provider_id,
                    successes = inner.probe_successes,
                    threshold = self.config.probe_successes,
                    "half-open probe succeeded"
                );
                if inner.probe_successes >= self.config.probe_successes {
                    return Some(self.close(&mut inner));
                }
                return None;
            }
            return Some(self.reopen(&mut inner));
        }

        match inner.state {
            HealthState::Closed => {
                if success {
                    inner.consecutive_failures = 0;
                    None
                } else {
                    inner.consecutive_failures += 1;
                    if inner.consecutive_failures >= self.config.failure_threshold {
                        Some(self.trip(&mut inner))
                    } else {
                        None
                    }
                }
            }
            // Late completions from before a trip; only probe outcomes
            // move a non-closed circuit.
            HealthState::Open | HealthState::HalfOpen => None,
        }
    }

    /// Reset to closed, clearing all counters.
    pub fn reset(&self) -> Option<Transition> {
        let mut inner = self.inner.lock();
        if inner.state == HealthState::Closed {
            inner.consecutive_failures = 0;
            return None;
        }
        Some(self.close(&mut inner))
    }

    /// Manually trip the circuit.
    pub fn force_open(&self) -> Option<Transition> {
        let mut inner = self.inner.lock();
        if inner.state == HealthState::Open {
            return None;
        }
        Some(self.trip(&mut inner))
    }

    /// Point-in-time view for status reporting.
    pub fn snapshot(&self) -> CircuitSnapshot {
        let mut inner = self.inner.lock();
        self.mature(&mut inner);
        CircuitSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            probe_successes: inner.probe_successes,
            probe_in_flight: inner.probe_in_flight,
            cooldown: inner.cooldown,
            cooldown_remaining: match inner.state {
                HealthState::Open => inner
                    .opened_at
                    .map(|at| inner.cooldown.saturating_sub(at.elapsed())),
                _ => None,
            },
        }
    }

    fn mature(&self, inner: &mut Inner) {
        if inner.state != HealthState::Open {
            return;
        }
        if let Some(opened_at) = inner.opened_at {
            if opened_at.elapsed() >= inner.cooldown {
                inner.state = HealthState::HalfOpen;
                inner.probe_successes = 0;
                inner.probe_in_flight = false;
                info!(provider = %self.provider_id, "cooldown elapsed, circuit half-open");
            }
        }
    }

    fn trip(&self, inner: &mut Inner) -> Transition {
        let from = inner.state;
        inner.state = HealthState::Open;
        inner.opened_at = Some(Instant::now());
        inner.cooldown = self.config.cooldown;
        inner.probe_successes = 0;
        inner.probe_in_flight = false;
        warn!(
            provider = %self.provider_id,
            failures = inner.consecutive_failures,
            cooldown = ?inner.cooldown,
            "circuit opened"
        );
        Transition {
            from,
            to: HealthState::Open,
        }
    }

    fn reopen(&self, inner: &mut Inner) -> Transition {
        let from = inner.state;
        inner.state = HealthState::Open;
        inner.opened_at = Some(Instant::now());
        inner.cooldown = (inner.cooldown * 2).min(self.config.cooldown_cap);
        inner.probe_successes = 0;
        inner.probe_in_flight = false;
        warn!(
            provider = %self.provider_id,
            cooldown = ?inner.cooldown,
            "probe failed, circuit reopened"
        );
        Transition {
            from,
            to: HealthState::Open,
        }
    }

    fn close(&self, inner: &mut Inner) -> Transition {
        let from = inner.state;
        inner.state = HealthState::Closed;
        inner.consecutive_failures = 0;
        inner.probe_successes = 0;
        inner.probe_in_flight = false;
        inner.opened_at = None;
        inner.cooldown = self.config.cooldown;
        info!(provider = %self.provider_id, "circuit closed");
        Transition {
            from,
            to: HealthState::Closed,
        }
    }
}

/// Point-in-time circuit state for status views.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    /// Effective state.
    pub state: HealthState,
    /// Current failure streak.
    pub consecutive_failures: u32,
    /// Probe successes accumulated in the current half-open phase.
    pub probe_successes: u32,
    /// Whether a probe is in flight.
    pub probe_in_flight: bool,
    /// Cooldown currently in force.
    #[serde(with = "humantime_serde")]
    pub cooldown: Duration,
    /// Time until the next half-open transition, when open.
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub cooldown_remaining: Option<Duration>,
}
