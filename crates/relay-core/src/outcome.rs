//! Attempt outcomes and the terminal response type.
//!
//! [`Outcome`] is the only channel through which dispatch results feed
//! back into health, credential, and performance state.

use crate::types::{CredentialId, ProviderId, RequestId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Classified cause of a failed dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The attempt outran its per-attempt budget.
    Timeout,
    /// The upstream throttled the credential.
    RateLimited,
    /// The upstream rejected the credential.
    Auth,
    /// The transport failed before an upstream verdict.
    Transport,
    /// The upstream accepted the request but failed serving it.
    Provider,
    /// The request's overall deadline ran out.
    DeadlineExceeded,
}

impl FailureKind {
    /// Whether retrying elsewhere or later can plausibly succeed.
    ///
    /// Only credential rejection is permanent; everything else is worth
    /// a failover.
    #[must_use]
    pub fn is_transient(self) -> bool {
        !matches!(self, Self::Auth)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::Auth => "auth",
            Self::Transport => "transport",
            Self::Provider => "provider",
            Self::DeadlineExceeded => "deadline_exceeded",
        };
        f.write_str(name)
    }
}

/// Error a bridge reports for one failed dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct DispatchError {
    /// Classified cause.
    pub kind: FailureKind,
    /// Operator-facing detail, never interpreted by the core.
    pub message: String,
}

impl DispatchError {
    /// Create an error with an explicit kind.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The attempt ran out of time.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message)
    }

    /// The upstream throttled the credential.
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(FailureKind::RateLimited, message)
    }

    /// The upstream rejected the credential.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Auth, message)
    }

    /// The transport failed before an upstream verdict.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Transport, message)
    }

    /// The upstream accepted the request but failed serving it.
    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Provider, message)
    }
}

/// How one finished attempt looked from the router's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// Wall time from dispatch to completion.
    pub latency: Duration,
    /// Success, or the classified failure.
    pub result: Result<(), FailureKind>,
}

impl Outcome {
    /// A successful attempt.
    #[must_use]
    pub fn success(latency: Duration) -> Self {
        Self {
            latency,
            result: Ok(()),
        }
    }

    /// A failed attempt.
    #[must_use]
    pub fn failure(kind: FailureKind, latency: Duration) -> Self {
        Self {
            latency,
            result: Err(kind),
        }
    }

    /// Whether the attempt succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// The failure kind, when the attempt failed.
    #[must_use]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.result.err()
    }
}

/// Successful result of routing one request.
#[derive(Debug, Clone, Serialize)]
pub struct RouteResponse {
    /// Id of the routed request.
    pub request: RequestId,
    /// Provider that served it.
    pub provider: ProviderId,
    /// Credential the winning attempt was charged to.
    pub credential: CredentialId,
    /// Payload the bridge returned.
    pub payload: serde_json::Value,
    /// Latency of the winning attempt.
    #[serde(with = "humantime_serde")]
    pub latency: Duration,
    /// Dispatch attempts consumed, including the winning one.
    pub attempts: u32,
}
