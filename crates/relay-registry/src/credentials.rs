//! Per-provider credential rotation and rate accounting.
//!
//! A [`KeyRing`] holds every credential of one provider behind a single
//! lock. A grant is reserve-then-validate: the window counter moves
//! before the caller ever sees the key, so concurrent acquirers cannot
//! overshoot the quota.

use parking_lot::Mutex;
use relay_config::{CredentialConfig, RateLimitConfig};
use relay_core::types::CredentialId;
use secrecy::SecretString;
use serde::Serialize;
use std::time::{Duration, Instant};

struct Slot {
    id: CredentialId,
    key: SecretString,
    quota: u32,
    window: Duration,
    used: u32,
    window_started: Instant,
    consecutive_failures: u32,
    last_used: Option<Instant>,
}

impl Slot {
    fn roll_if_elapsed(&mut self, now: Instant) {
        // Counter and timestamp move together under the ring lock, so a
        // reader can never observe a half-reset window.
        if now.duration_since(self.window_started) >= self.window {
            self.used = 0;
            self.window_started = now;
        }
    }

    fn has_budget(&self) -> bool {
        self.used < self.quota
    }
}

struct RingInner {
    slots: Vec<Slot>,
    cursor: usize,
}

/// One granted credential.
#[derive(Clone)]
pub struct Grant {
    /// Credential label.
    pub id: CredentialId,
    /// Key material to present to the bridge.
    pub key: SecretString,
}

/// Rotating credential ring with windowed rate accounting.
pub struct KeyRing {
    inner: Mutex<RingInner>,
}

impl KeyRing {
    /// Build a ring from configuration.
    ///
    /// `default_limit` applies to every credential without its own
    /// override.
    #[must_use]
    pub fn new(credentials: &[CredentialConfig], default_limit: RateLimitConfig) -> Self {
        let now = Instant::now();
        let slots = credentials
            .iter()
            .map(|credential| {
                let limit = credential.rate_limit.unwrap_or(default_limit);
                Slot {
                    id: credential.id.clone(),
                    key: credential.api_key.clone(),
                    quota: limit.max_requests,
                    window: limit.window,
                    used: 0,
                    window_started: now,
                    consecutive_failures: 0,
                    last_used: None,
                }
            })
            .collect();

        Self {
            inner: Mutex::new(RingInner { slots, cursor: 0 }),
        }
    }

    /// Reserve one request against the next credential with budget.
    ///
    /// Scans forward from the rotation cursor, rolling expired windows
    /// on the way, and advances the cursor past the winner so load
    /// spreads across keys. Returns `None` when every credential is at
    /// quota.
    pub fn acquire(&self) -> Option<Grant> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let len = inner.slots.len();
        if len == 0 {
            return None;
        }

        for offset in 0..len {
            let index = (inner.cursor + offset) % len;
            let slot = &mut inner.slots[index];
            slot.roll_if_elapsed(now);
            if slot.has_budget() {
                slot.used += 1;
                slot.last_used = Some(now);
                let grant = Grant {
                    id: slot.id.clone(),
                    key: slot.key.clone(),
                };
                inner.cursor = (index + 1) % len;
                return Some(grant);
            }
        }
        None
    }

    /// Track one finished attempt against the credential it was charged
    /// to. Window usage is never handed back; failures still count
    /// against the quota.
    pub fn record_outcome(&self, id: &CredentialId, success: bool) {
        let mut inner = self.inner.lock();
        if let Some(slot) = inner.slots.iter_mut().find(|slot| &slot.id == id) {
            if success {
                slot.consecutive_failures = 0;
            } else {
                slot.consecutive_failures += 1;
            }
        }
    }

    /// Whether any credential currently has window budget left.
    pub fn has_budget(&self) -> bool {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.slots.iter_mut().any(|slot| {
            slot.roll_if_elapsed(now);
            slot.has_budget()
        })
    }

    /// Whether the ring holds any credential at all.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().slots.is_empty()
    }

    /// Clear failure streaks, keeping window accounting intact.
    pub fn reset_failures(&self) {
        let mut inner = self.inner.lock();
        for slot in &mut inner.slots {
            slot.consecutive_failures = 0;
        }
    }

    /// Point-in-time view of every credential.
    pub fn status(&self) -> Vec<CredentialStatus> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner
            .slots
            .iter_mut()
            .map(|slot| {
                slot.roll_if_elapsed(now);
                CredentialStatus {
                    id: slot.id.clone(),
                    used: slot.used,
                    quota: slot.quota,
                    window_resets_in: slot
                        .window
                        .saturating_sub(now.duration_since(slot.window_started)),
                    consecutive_failures: slot.consecutive_failures,
                    idle: slot.last_used.map(|at| now.duration_since(at)),
                }
            })
            .collect()
    }
}

/// Point-in-time view of one credential for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialStatus {
    /// Credential label.
    pub id: CredentialId,
    /// Requests charged in the current window.
    pub used: u32,
    /// Window budget.
    pub quota: u32,
    /// Time until the window rolls.
    #[serde(with = "humantime_serde")]
    pub window_resets_in: Duration,
    /// Failure streak of this credential.
    pub consecutive_failures: u32,
    /// Time since the credential last served a request.
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub idle: Option<Duration>,
}
