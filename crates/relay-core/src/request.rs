//! The routed request envelope.
//!
//! The payload is opaque to the routing core; only bridges interpret it.

use crate::types::{Capability, CapabilitySet, RequestId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A request to route one payload to some eligible provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRequest {
    /// Unique request identifier.
    #[serde(default = "RequestId::generate")]
    pub id: RequestId,

    /// Capabilities the serving provider must cover.
    ///
    /// An empty set means any provider qualifies.
    #[serde(default)]
    pub required: CapabilitySet,

    /// Overall routing deadline, spanning all failover attempts.
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub max_latency: Option<Duration>,

    /// Opaque payload forwarded verbatim to the chosen bridge.
    pub payload: serde_json::Value,

    /// Caller-supplied retry-safety marker, forwarded to bridges with
    /// the rest of the envelope and never interpreted by the core.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl RouteRequest {
    /// Create a new builder for `RouteRequest`.
    #[must_use]
    pub fn builder() -> RouteRequestBuilder {
        RouteRequestBuilder::default()
    }

    /// Convenience constructor for a payload-only request.
    #[must_use]
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            id: RequestId::generate(),
            required: CapabilitySet::new(),
            max_latency: None,
            payload,
            idempotency_key: None,
        }
    }
}

/// Builder for [`RouteRequest`].
#[derive(Debug, Default)]
pub struct RouteRequestBuilder {
    id: Option<RequestId>,
    required: CapabilitySet,
    max_latency: Option<Duration>,
    payload: Option<serde_json::Value>,
    idempotency_key: Option<String>,
}

impl RouteRequestBuilder {
    /// Set the request id.
    #[must_use]
    pub fn id(mut self, id: RequestId) -> Self {
        self.id = Some(id);
        self
    }

    /// Require one capability.
    #[must_use]
    pub fn require(mut self, capability: Capability) -> Self {
        self.required.insert(capability);
        self
    }

    /// Replace the full required capability set.
    #[must_use]
    pub fn required(mut self, required: CapabilitySet) -> Self {
        self.required = required;
        self
    }

    /// Set the overall routing deadline.
    #[must_use]
    pub fn max_latency(mut self, max_latency: Duration) -> Self {
        self.max_latency = Some(max_latency);
        self
    }

    /// Set the payload.
    #[must_use]
    pub fn payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Set the idempotency key.
    #[must_use]
    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Build the request. An absent payload defaults to JSON `null`.
    #[must_use]
    pub fn build(self) -> RouteRequest {
        RouteRequest {
            id: self.id.unwrap_or_else(RequestId::generate),
            required: self.required,
            max_latency: self.max_latency,
            payload: self.payload.unwrap_or(serde_json::Value::Null),
            idempotency_key: self.idempotency_key,
        }
    }
}
