//! Structured lifecycle events.
//!
//! The core emits; callers own transport and storage. A sink receives
//! every event on the routing hot path, so implementations must be
//! cheap and non-blocking.

use crate::outcome::FailureKind;
use crate::types::{CredentialId, HealthState, ProviderId, RequestId};
use serde::Serialize;

/// Why a candidate was passed over without a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Every credential is at quota for the current window.
    QuotaExhausted,
    /// Another request holds the provider's probe slot.
    ProbeInFlight,
    /// The circuit tripped between selection and acquisition.
    CircuitOpen,
}

/// One structured notification from the routing core.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RelayEvent {
    /// A dispatch attempt finished.
    AttemptCompleted {
        /// Request the attempt served.
        request: RequestId,
        /// Provider dispatched to.
        provider: ProviderId,
        /// Credential charged.
        credential: CredentialId,
        /// Whether this was a half-open probe.
        probe: bool,
        /// Failure cause, absent on success.
        #[serde(skip_serializing_if = "Option::is_none")]
        failure: Option<FailureKind>,
        /// Attempt latency in milliseconds.
        latency_ms: u64,
    },
    /// A candidate was skipped without consuming an attempt.
    ProviderSkipped {
        /// Request being routed.
        request: RequestId,
        /// Skipped provider.
        provider: ProviderId,
        /// Why it was skipped.
        reason: SkipReason,
    },
    /// A provider's circuit changed state.
    CircuitTransition {
        /// Affected provider.
        provider: ProviderId,
        /// Previous state.
        from: HealthState,
        /// New state.
        to: HealthState,
    },
    /// Every credential of a provider is at quota for the current window.
    CredentialsExhausted {
        /// Affected provider.
        provider: ProviderId,
    },
    /// An upstream rejected a credential.
    AuthFailure {
        /// Affected provider.
        provider: ProviderId,
        /// Rejected credential.
        credential: CredentialId,
    },
    /// A new configuration snapshot went live.
    SnapshotSwapped {
        /// Monotonic snapshot generation.
        generation: u64,
        /// Providers in the new snapshot.
        providers: usize,
    },
    /// An operator reset a provider's health and counters.
    ProviderReset {
        /// Affected provider.
        provider: ProviderId,
    },
}

/// Receives relay events.
pub trait EventSink: Send + Sync {
    /// Deliver one event.
    fn emit(&self, event: RelayEvent);
}

/// Sink that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: RelayEvent) {}
}

/// Sink that mirrors events onto the `tracing` pipeline at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: RelayEvent) {
        tracing::debug!(target: "relay::event", ?event, "relay event");
    }
}
