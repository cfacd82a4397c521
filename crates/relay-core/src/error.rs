//! Terminal error taxonomy of the routing core.

use crate::outcome::FailureKind;
use crate::types::{CapabilitySet, CredentialId, ProviderId};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Result alias for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

/// Cause of one failed dispatch attempt, kept in routing order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptFailure {
    /// Provider the attempt ran against.
    pub provider: ProviderId,
    /// Credential the attempt was charged to.
    pub credential: CredentialId,
    /// Classified cause.
    pub kind: FailureKind,
    /// Detail as reported by the bridge or the router's timer.
    pub message: String,
}

/// What stopped the failover loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustReason {
    /// Every candidate was consumed or skipped.
    CandidatesExhausted,
    /// The attempt ceiling was reached.
    AttemptLimit,
    /// The request's overall deadline ran out.
    DeadlineExceeded,
}

impl fmt::Display for ExhaustReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CandidatesExhausted => "candidates exhausted",
            Self::AttemptLimit => "attempt limit reached",
            Self::DeadlineExceeded => "deadline exceeded",
        };
        f.write_str(name)
    }
}

/// Terminal routing failures.
#[derive(Debug, Clone, Error)]
pub enum RelayError {
    /// No registered provider covers the request right now.
    ///
    /// Health and quota state count: a capability-matching provider with
    /// an open circuit is not eligible.
    #[error("no eligible provider covers [{required}]")]
    NoEligibleProvider {
        /// Capabilities the request asked for.
        required: CapabilitySet,
    },

    /// Every candidate was skipped for exhausted credentials or a busy
    /// probe slot; nothing was dispatched.
    #[error("no credential available across {} candidate(s)", providers.len())]
    NoCredentialAvailable {
        /// Candidates that were skipped.
        providers: Vec<ProviderId>,
    },

    /// Dispatches ran and all of them failed.
    #[error("routing exhausted ({reason}) after {} attempt(s)", attempts.len())]
    Exhausted {
        /// Per-attempt causes, in dispatch order.
        attempts: Vec<AttemptFailure>,
        /// What stopped the loop.
        reason: ExhaustReason,
    },

    /// An operation referenced a provider the active snapshot does not
    /// hold.
    #[error("unknown provider {provider}")]
    UnknownProvider {
        /// The missing id.
        provider: ProviderId,
    },
}

impl RelayError {
    /// Whether retrying the whole request later can plausibly succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NoEligibleProvider { .. } | Self::UnknownProvider { .. } => false,
            Self::NoCredentialAvailable { .. } => true,
            Self::Exhausted { attempts, reason } => {
                matches!(reason, ExhaustReason::DeadlineExceeded)
                    || attempts.iter().any(|attempt| attempt.kind.is_transient())
            }
        }
    }
}
