//! # Relay Registry
//!
//! Stateful provider registry for the relay: credential rotation with
//! per-key rate windows, circuit-breaker health tracking, latency
//! statistics, and an atomically swappable configuration snapshot.
//!
//! The registry hands out [`Lease`]s. Routing acquires a lease, calls
//! the bridge, and releases the lease with the [`Outcome`]; every state
//! transition (quota, circuit, stats) happens inside those two calls.
//!
//! [`Outcome`]: relay_core::outcome::Outcome

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod credentials;
pub mod health;
pub mod registry;
pub mod snapshot;
pub mod stats;

pub use credentials::{CredentialStatus, Grant, KeyRing};
pub use health::{CircuitBreaker, CircuitSnapshot, Gate, Transition};
pub use registry::{AcquireError, BridgeMap, Candidate, Lease, ProbeReport, ProviderRegistry};
pub use snapshot::{
    ProviderDescriptor, ProviderEntry, ProviderStatus, RegistrySnapshot, RegistryStatus,
};
pub use stats::{LatencyWindow, StatsSummary};
