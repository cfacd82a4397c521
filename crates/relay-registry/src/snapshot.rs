//! Immutable registry snapshots and serializable status views.
//!
//! A snapshot's provider set and identities are frozen at build time.
//! Only the fine-grained per-provider state (circuit, key ring, latency
//! window) mutates, each behind its own lock, so one provider's update
//! never blocks another's.

use crate::credentials::{CredentialStatus, KeyRing};
use crate::health::{CircuitBreaker, CircuitSnapshot};
use crate::stats::{LatencyWindow, StatsSummary};
use relay_core::bridge::Bridge;
use relay_core::types::{CapabilitySet, CostClass, ProviderId, SpeedClass};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Frozen identity of one provider, copied out of the configuration.
#[derive(Debug, Clone)]
pub struct ProviderDescriptor {
    /// Stable id.
    pub id: ProviderId,
    /// Log-facing name.
    pub display_name: String,
    /// Capabilities served.
    pub capabilities: CapabilitySet,
    /// Cost tier.
    pub cost: CostClass,
    /// Latency tier.
    pub speed: SpeedClass,
    /// Static priority weight.
    pub weight: u32,
}

/// One provider inside a snapshot.
pub struct ProviderEntry {
    /// Frozen identity.
    pub descriptor: ProviderDescriptor,
    /// The adapter fronting the upstream.
    pub bridge: Arc<dyn Bridge>,
    /// Credential rotation and rate accounting.
    pub keys: KeyRing,
    /// Circuit breaker.
    pub circuit: CircuitBreaker,
    /// Latency accounting.
    pub stats: LatencyWindow,
}

/// The immutable provider set served to readers.
pub struct RegistrySnapshot {
    /// Monotonic generation, bumped by every reload.
    pub generation: u64,
    entries: Vec<Arc<ProviderEntry>>,
    index: HashMap<ProviderId, usize>,
}

impl RegistrySnapshot {
    pub(crate) fn new(generation: u64, entries: Vec<Arc<ProviderEntry>>) -> Self {
        let index = entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (entry.descriptor.id.clone(), position))
            .collect();
        Self {
            generation,
            entries,
            index,
        }
    }

    /// Look up a provider by id.
    #[must_use]
    pub fn get(&self, id: &ProviderId) -> Option<&Arc<ProviderEntry>> {
        self.index.get(id).map(|&position| &self.entries[position])
    }

    /// Iterate entries in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ProviderEntry>> {
        self.entries.iter()
    }

    /// Number of providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the snapshot holds no providers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Serializable view of the whole registry.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStatus {
    /// Active snapshot generation.
    pub generation: u64,
    /// Per-provider status, in configuration order.
    pub providers: Vec<ProviderStatus>,
}

/// Serializable view of one provider.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    /// Provider id.
    pub id: ProviderId,
    /// Log-facing name.
    pub display_name: String,
    /// Capabilities served.
    pub capabilities: CapabilitySet,
    /// Static priority weight.
    pub weight: u32,
    /// Circuit state and counters.
    pub circuit: CircuitSnapshot,
    /// Per-credential usage.
    pub credentials: Vec<CredentialStatus>,
    /// Latency and outcome counters.
    pub stats: StatsSummary,
}
