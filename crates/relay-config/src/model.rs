//! The deployment-facing configuration model.

use relay_core::types::{CapabilitySet, CostClass, CredentialId, ProviderId, SpeedClass};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration of the relay.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Providers the relay can route to.
    pub providers: Vec<ProviderConfig>,

    /// Router behavior.
    #[serde(default)]
    pub router: RouterConfig,

    /// Circuit-breaker and probing parameters, shared by all providers.
    #[serde(default)]
    pub health: HealthConfig,
}

/// One upstream provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Stable identifier, referenced by bridges and admin operations.
    pub id: ProviderId,

    /// Human-readable name for logs and status views.
    #[serde(default)]
    pub display_name: Option<String>,

    /// Capabilities this provider serves.
    pub capabilities: CapabilitySet,

    /// Coarse cost tier.
    #[serde(default)]
    pub cost: CostClass,

    /// Coarse latency tier.
    #[serde(default)]
    pub speed: SpeedClass,

    /// Static priority weight; higher wins ties.
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// Whether the provider participates in routing.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Credentials to rotate across.
    ///
    /// May be empty; such a provider is valid but never eligible.
    #[serde(default)]
    pub credentials: Vec<CredentialConfig>,

    /// Default rate limit applied to each credential.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl ProviderConfig {
    /// The name to show in logs and status views.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(self.id.as_str())
    }
}

/// One API credential.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialConfig {
    /// Label, unique within the provider.
    pub id: CredentialId,

    /// The secret key material. Redacted from `Debug` output.
    pub api_key: SecretString,

    /// Override of the provider-level rate limit.
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
}

/// Request budget per credential per rolling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per window.
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Window length.
    #[serde(default = "default_window", with = "humantime_serde")]
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window: default_window(),
        }
    }
}

/// Circuit-breaker and probing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Consecutive failures that trip a circuit.
    pub failure_threshold: u32,

    /// Consecutive probe successes that close a half-open circuit.
    pub probe_successes: u32,

    /// Base cooldown after a trip. Doubles on each failed probe.
    #[serde(with = "humantime_serde")]
    pub cooldown: Duration,

    /// Ceiling for the doubling cooldown.
    #[serde(with = "humantime_serde")]
    pub cooldown_cap: Duration,

    /// Per-attempt dispatch budget.
    #[serde(with = "humantime_serde")]
    pub attempt_timeout: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            probe_successes: 3,
            cooldown: Duration::from_secs(30),
            cooldown_cap: Duration::from_secs(300),
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

/// Candidate-ordering policy of the load balancer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouteStrategy {
    /// Strongest capability coverage first (weight, then id).
    #[default]
    Capability,
    /// Cheapest cost class first.
    Cost,
    /// Lowest mean recent latency first.
    Performance,
    /// Strict rotation across the candidate list.
    RoundRobin,
}

/// Router behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Strategy used to order candidates.
    pub strategy: RouteStrategy,

    /// Ceiling on dispatch attempts per request.
    ///
    /// When absent, the router uses the candidate count capped at five.
    pub max_attempts: Option<u32>,
}

fn default_weight() -> u32 {
    100
}

fn default_true() -> bool {
    true
}

fn default_max_requests() -> u32 {
    60
}

fn default_window() -> Duration {
    Duration::from_secs(60)
}
