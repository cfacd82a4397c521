//! The provider adapter contract.
//!
//! A [`Bridge`] fronts one upstream provider. Implementations own the
//! wire protocol; the routing core only ever sees opaque payloads and
//! classified failures.

use crate::outcome::DispatchError;
use crate::request::RouteRequest;
use crate::types::{CapabilitySet, CostClass, SpeedClass};
use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Static identity a bridge reports about the provider it fronts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeDescriptor {
    /// Capabilities the provider can serve.
    pub capabilities: CapabilitySet,
    /// Coarse cost tier.
    #[serde(default)]
    pub cost: CostClass,
    /// Coarse latency tier.
    #[serde(default)]
    pub speed: SpeedClass,
}

impl BridgeDescriptor {
    /// Create a descriptor.
    #[must_use]
    pub fn new(capabilities: CapabilitySet, cost: CostClass, speed: SpeedClass) -> Self {
        Self {
            capabilities,
            cost,
            speed,
        }
    }
}

/// One provider adapter.
///
/// Bridges are trusted to classify their failures but not to enforce
/// timing; the router owns timeouts and aborts attempts that outlive
/// their budget, so `send` must be cancel-safe.
#[async_trait]
pub trait Bridge: Send + Sync {
    /// Dispatch one request with the given credential.
    async fn send(
        &self,
        key: &SecretString,
        request: &RouteRequest,
    ) -> Result<serde_json::Value, DispatchError>;

    /// Cheap liveness check, used by health probing.
    async fn health_probe(&self) -> bool;

    /// The static descriptor for this adapter.
    fn describe(&self) -> BridgeDescriptor;
}
