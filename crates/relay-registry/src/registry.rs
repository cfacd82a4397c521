//! The provider registry.
//!
//! Owns the atomically swappable snapshot and every per-provider state
//! mutation: eligibility, credential acquisition, outcome release,
//! reload, status, and the admin operations.

use crate::health::Gate;
use crate::snapshot::{
    ProviderDescriptor, ProviderEntry, ProviderStatus, RegistrySnapshot, RegistryStatus,
};
use crate::{CircuitBreaker, KeyRing, LatencyWindow};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use relay_config::{ConfigError, RelayConfig};
use relay_core::bridge::Bridge;
use relay_core::error::{RelayError, RelayResult};
use relay_core::event::{EventSink, RelayEvent};
use relay_core::outcome::{FailureKind, Outcome};
use relay_core::types::{CapabilitySet, CostClass, CredentialId, ProviderId, SpeedClass};
use secrecy::SecretString;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Map from provider id to the adapter fronting it.
pub type BridgeMap = HashMap<ProviderId, Arc<dyn Bridge>>;

/// Plain selection data for one eligible provider.
///
/// Strategies rank candidates without touching registry state, so
/// everything they need is copied out here.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Provider id.
    pub id: ProviderId,
    /// Static priority weight; higher wins ties.
    pub weight: u32,
    /// Cost tier.
    pub cost: CostClass,
    /// Declared latency tier.
    pub speed: SpeedClass,
    /// Mean recent latency, absent while cold.
    pub mean_latency: Option<Duration>,
}

/// Why `acquire` yielded no lease.
///
/// Every variant except `UnknownProvider` means "try the next
/// candidate", not a terminal error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcquireError {
    /// The id is not in the active snapshot.
    #[error("unknown provider {0}")]
    UnknownProvider(ProviderId),
    /// The circuit is open.
    #[error("circuit open for {0}")]
    CircuitOpen(ProviderId),
    /// Another request holds the probe slot.
    #[error("probe in flight for {0}")]
    ProbeInFlight(ProviderId),
    /// Every credential is at quota.
    #[error("no credential under quota for {0}")]
    NoCredential(ProviderId),
}

/// A granted dispatch: provider, credential, and the adapter to call.
///
/// The lease pins the snapshot generation it was issued from; releasing
/// it against a newer generation is ignored.
pub struct Lease {
    /// Provider to dispatch to.
    pub provider: ProviderId,
    /// Credential the attempt is charged to.
    pub credential: CredentialId,
    /// Key material for the bridge call.
    pub api_key: SecretString,
    /// Whether this dispatch is the half-open probe.
    pub probe: bool,
    /// Snapshot generation the lease came from.
    pub generation: u64,
    /// Adapter fronting the provider.
    pub bridge: Arc<dyn Bridge>,
}

/// Outcome of an on-demand health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeReport {
    /// The bridge reported healthy.
    Healthy,
    /// The bridge reported unhealthy.
    Unhealthy,
    /// The circuit refused the probe.
    Skipped,
}

/// Routing-facing provider registry with hot-swappable configuration.
pub struct ProviderRegistry {
    snapshot: ArcSwap<RegistrySnapshot>,
    generation: AtomicU64,
    reload_lock: Mutex<()>,
    events: Arc<dyn EventSink>,
}

impl ProviderRegistry {
    /// Build a registry from validated configuration and bridges.
    ///
    /// Every enabled provider must have a bridge in `bridges`; disabled
    /// providers are left out of the snapshot entirely.
    pub fn new(
        config: &RelayConfig,
        bridges: &BridgeMap,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, ConfigError> {
        let snapshot = build_snapshot(1, config, bridges)?;
        Ok(Self {
            snapshot: ArcSwap::from_pointee(snapshot),
            generation: AtomicU64::new(1),
            reload_lock: Mutex::new(()),
            events,
        })
    }

    /// Providers able to serve `required` right now.
    ///
    /// A provider qualifies when its capability set covers `required`,
    /// its circuit admits a dispatch, and at least one credential has
    /// window budget. Ordered by weight descending, then id, so
    /// strategies receive a deterministic list.
    #[must_use]
    pub fn eligible_providers(&self, required: &CapabilitySet) -> Vec<Candidate> {
        let snapshot = self.snapshot.load();
        let mut candidates: Vec<Candidate> = snapshot
            .iter()
            .filter(|entry| entry.descriptor.capabilities.is_superset(required))
            .filter(|entry| entry.circuit.admits())
            .filter(|entry| entry.keys.has_budget())
            .map(|entry| Candidate {
                id: entry.descriptor.id.clone(),
                weight: entry.descriptor.weight,
                cost: entry.descriptor.cost,
                speed: entry.descriptor.speed,
                mean_latency: entry.stats.mean_latency(),
            })
            .collect();

        candidates.sort_by(|a, b| b.weight.cmp(&a.weight).then_with(|| a.id.cmp(&b.id)));
        candidates
    }

    /// Providers that pass the capability and health filters but are at
    /// quota on every credential.
    ///
    /// Lets callers tell "come back later" apart from "nothing can ever
    /// serve this" when the eligible list is empty. Zero-credential
    /// providers are permanently ineligible and never listed.
    #[must_use]
    pub fn starved_providers(&self, required: &CapabilitySet) -> Vec<ProviderId> {
        let snapshot = self.snapshot.load();
        snapshot
            .iter()
            .filter(|entry| entry.descriptor.capabilities.is_superset(required))
            .filter(|entry| entry.circuit.admits())
            .filter(|entry| !entry.keys.is_empty() && !entry.keys.has_budget())
            .map(|entry| entry.descriptor.id.clone())
            .collect()
    }

    /// Reserve a credential and gate the circuit for one dispatch.
    pub fn acquire(&self, provider: &ProviderId) -> Result<Lease, AcquireError> {
        let snapshot = self.snapshot.load();
        let entry = snapshot
            .get(provider)
            .ok_or_else(|| AcquireError::UnknownProvider(provider.clone()))?;

        let probe = match entry.circuit.gate() {
            Gate::Pass => false,
            Gate::Probe => true,
            Gate::Open => return Err(AcquireError::CircuitOpen(provider.clone())),
            Gate::Busy => return Err(AcquireError::ProbeInFlight(provider.clone())),
        };

        let Some(grant) = entry.keys.acquire() else {
            if probe {
                entry.circuit.release_probe_slot();
            }
            debug!(provider = %provider, "all credentials at quota");
            self.events.emit(RelayEvent::CredentialsExhausted {
                provider: provider.clone(),
            });
            return Err(AcquireError::NoCredential(provider.clone()));
        };

        debug!(provider = %provider, credential = %grant.id, probe, "credential acquired");
        Ok(Lease {
            provider: provider.clone(),
            credential: grant.id,
            api_key: grant.key,
            probe,
            generation: snapshot.generation,
            bridge: Arc::clone(&entry.bridge),
        })
    }

    /// Apply a finished dispatch to provider state.
    ///
    /// Never fails. A lease from a previous snapshot generation is
    /// ignored: the state it would update was retired by a reload.
    pub fn release(&self, lease: &Lease, outcome: &Outcome) {
        let snapshot = self.snapshot.load();
        if lease.generation != snapshot.generation {
            debug!(
                provider = %lease.provider,
                lease_generation = lease.generation,
                active_generation = snapshot.generation,
                "stale lease release ignored"
            );
            return;
        }
        let Some(entry) = snapshot.get(&lease.provider) else {
            debug!(provider = %lease.provider, "release for unknown provider ignored");
            return;
        };

        let success = outcome.is_success();
        if let Some(transition) = entry.circuit.record(success, lease.probe) {
            self.events.emit(RelayEvent::CircuitTransition {
                provider: lease.provider.clone(),
                from: transition.from,
                to: transition.to,
            });
        }
        entry.keys.record_outcome(&lease.credential, success);
        if !lease.probe {
            // Probe traffic is not representative; keep it out of the
            // latency window.
            entry.stats.record(outcome);
        }

        if outcome.failure_kind() == Some(FailureKind::Auth) {
            warn!(
                provider = %lease.provider,
                credential = %lease.credential,
                "credential rejected by upstream"
            );
            self.events.emit(RelayEvent::AuthFailure {
                provider: lease.provider.clone(),
                credential: lease.credential.clone(),
            });
        }
    }

    /// Build and atomically publish a new snapshot.
    ///
    /// In-flight readers keep the old snapshot until they finish.
    /// Per-provider state starts fresh in the new generation. On error
    /// the active snapshot stays in place.
    pub fn reload(&self, config: &RelayConfig, bridges: &BridgeMap) -> Result<(), ConfigError> {
        let _guard = self.reload_lock.lock();
        let generation = self.generation.load(Ordering::Acquire) + 1;
        let snapshot = build_snapshot(generation, config, bridges)?;
        let providers = snapshot.len();
        self.snapshot.store(Arc::new(snapshot));
        self.generation.store(generation, Ordering::Release);
        info!(generation, providers, "configuration snapshot swapped");
        self.events.emit(RelayEvent::SnapshotSwapped {
            generation,
            providers,
        });
        Ok(())
    }

    /// Read-only serializable view of every provider.
    #[must_use]
    pub fn status(&self) -> RegistryStatus {
        let snapshot = self.snapshot.load();
        RegistryStatus {
            generation: snapshot.generation,
            providers: snapshot
                .iter()
                .map(|entry| ProviderStatus {
                    id: entry.descriptor.id.clone(),
                    display_name: entry.descriptor.display_name.clone(),
                    capabilities: entry.descriptor.capabilities.clone(),
                    weight: entry.descriptor.weight,
                    circuit: entry.circuit.snapshot(),
                    credentials: entry.keys.status(),
                    stats: entry.stats.summary(),
                })
                .collect(),
        }
    }

    /// Reset a provider's circuit, failure streaks, and latency window.
    pub fn reset_provider(&self, provider: &ProviderId) -> RelayResult<()> {
        let snapshot = self.snapshot.load();
        let entry = snapshot.get(provider).ok_or_else(|| RelayError::UnknownProvider {
            provider: provider.clone(),
        })?;

        if let Some(transition) = entry.circuit.reset() {
            self.events.emit(RelayEvent::CircuitTransition {
                provider: provider.clone(),
                from: transition.from,
                to: transition.to,
            });
        }
        entry.keys.reset_failures();
        entry.stats.reset();
        info!(provider = %provider, "provider state reset");
        self.events.emit(RelayEvent::ProviderReset {
            provider: provider.clone(),
        });
        Ok(())
    }

    /// Manually trip a provider's circuit, taking it out of rotation
    /// until its cooldown elapses or an operator resets it.
    pub fn quarantine_provider(&self, provider: &ProviderId) -> RelayResult<()> {
        let snapshot = self.snapshot.load();
        let entry = snapshot.get(provider).ok_or_else(|| RelayError::UnknownProvider {
            provider: provider.clone(),
        })?;

        if let Some(transition) = entry.circuit.force_open() {
            warn!(provider = %provider, "provider quarantined");
            self.events.emit(RelayEvent::CircuitTransition {
                provider: provider.clone(),
                from: transition.from,
                to: transition.to,
            });
        }
        Ok(())
    }

    /// Probe a provider through its bridge, honoring the circuit gate.
    ///
    /// Probe verdicts feed the circuit but consume no credential and
    /// never enter the latency window.
    pub async fn probe(&self, provider: &ProviderId) -> RelayResult<ProbeReport> {
        let snapshot = self.snapshot.load();
        let entry = snapshot.get(provider).ok_or_else(|| RelayError::UnknownProvider {
            provider: provider.clone(),
        })?;
        let entry = Arc::clone(entry);
        // Do not hold the snapshot guard across the await.
        drop(snapshot);

        let probe = match entry.circuit.gate() {
            Gate::Pass => false,
            Gate::Probe => true,
            Gate::Open | Gate::Busy => return Ok(ProbeReport::Skipped),
        };

        let healthy = entry.bridge.health_probe().await;
        if let Some(transition) = entry.circuit.record(healthy, probe) {
            self.events.emit(RelayEvent::CircuitTransition {
                provider: provider.clone(),
                from: transition.from,
                to: transition.to,
            });
        }

        Ok(if healthy {
            ProbeReport::Healthy
        } else {
            ProbeReport::Unhealthy
        })
    }

    /// Generation of the active snapshot.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

fn build_snapshot(
    generation: u64,
    config: &RelayConfig,
    bridges: &BridgeMap,
) -> Result<RegistrySnapshot, ConfigError> {
    config.validate()?;

    let mut entries = Vec::new();
    for provider in &config.providers {
        if !provider.enabled {
            debug!(provider = %provider.id, "provider disabled, not registered");
            continue;
        }
        let bridge = bridges
            .get(&provider.id)
            .cloned()
            .ok_or_else(|| ConfigError::MissingBridge {
                provider: provider.id.clone(),
            })?;

        let declared = bridge.describe();
        if !declared.capabilities.is_superset(&provider.capabilities) {
            // Configuration wins; the mismatch is the operator's call.
            warn!(
                provider = %provider.id,
                configured = %provider.capabilities,
                declared = %declared.capabilities,
                "bridge does not declare every configured capability"
            );
        }
        if provider.credentials.is_empty() {
            warn!(
                provider = %provider.id,
                "provider has no credentials and will never be eligible"
            );
        }

        entries.push(Arc::new(ProviderEntry {
            descriptor: ProviderDescriptor {
                id: provider.id.clone(),
                display_name: provider.display_name().to_owned(),
                capabilities: provider.capabilities.clone(),
                cost: provider.cost,
                speed: provider.speed,
                weight: provider.weight,
            },
            bridge,
            keys: KeyRing::new(&provider.credentials, provider.rate_limit),
            circuit: CircuitBreaker::new(provider.id.clone(), config.health),
            stats: LatencyWindow::new(),
        }));
    }

    if entries.is_empty() {
        warn!(generation, "no enabled providers in configuration");
    }

    Ok(RegistrySnapshot::new(generation, entries))
}
