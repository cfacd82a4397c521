//! Shared fixtures for the relay integration tests

use once_cell::sync::Lazy;
use relay_config::{
    ConfigError, CredentialConfig, HealthConfig, ProviderConfig, RateLimitConfig, RelayConfig,
    RouteStrategy, RouterConfig,
};
use relay_core::bridge::Bridge;
use relay_core::request::RouteRequest;
use relay_core::testing::{descriptor, CaptureSink, StubBridge};
use relay_core::types::{Capability, CostClass, CredentialId, ProviderId, SpeedClass};
use relay_registry::{BridgeMap, ProviderRegistry};
use relay_routing::Router;
use secrecy::SecretString;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Initialize tracing for tests (only once)
static TRACING: Lazy<()> = Lazy::new(|| {
    if std::env::var("TEST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
});

/// Initialize tracing for tests
pub fn init_tracing() {
    Lazy::force(&TRACING);
}

/// Generate a random API key for testing
pub fn random_api_key() -> String {
    format!("sk-test-{}", uuid::Uuid::new_v4())
}

/// Health parameters tightened so circuit scenarios finish in milliseconds
pub fn fast_health() -> HealthConfig {
    HealthConfig {
        failure_threshold: 3,
        probe_successes: 1,
        cooldown: Duration::from_millis(50),
        cooldown_cap: Duration::from_millis(400),
        attempt_timeout: Duration::from_millis(200),
    }
}

/// Provider with two generated credentials and the default rate limit
pub fn provider(id: &str, weight: u32, capabilities: &[Capability]) -> ProviderConfig {
    ProviderConfig {
        id: ProviderId::from(id),
        display_name: None,
        capabilities: capabilities.iter().copied().collect(),
        cost: CostClass::Medium,
        speed: SpeedClass::Medium,
        weight,
        enabled: true,
        credentials: vec![
            CredentialConfig {
                id: CredentialId::from("primary"),
                api_key: SecretString::new(random_api_key()),
                rate_limit: None,
            },
            CredentialConfig {
                id: CredentialId::from("secondary"),
                api_key: SecretString::new(random_api_key()),
                rate_limit: None,
            },
        ],
        rate_limit: RateLimitConfig::default(),
    }
}

/// Provider with a single credential capped at `max_requests` per minute
pub fn capped_provider(
    id: &str,
    weight: u32,
    capabilities: &[Capability],
    max_requests: u32,
) -> ProviderConfig {
    let mut config = provider(id, weight, capabilities);
    config.credentials.truncate(1);
    config.rate_limit = RateLimitConfig {
        max_requests,
        window: Duration::from_secs(60),
    };
    config
}

/// Wrap a stub so its advertised descriptor mirrors the provider config
pub fn matching_bridge(config: &ProviderConfig, bridge: StubBridge) -> Arc<StubBridge> {
    let profile = descriptor(
        &config.capabilities.iter().collect::<Vec<_>>(),
        config.cost,
        config.speed,
    );
    Arc::new(bridge.with_descriptor(profile))
}

/// Request with no capability requirement
pub fn any_request() -> RouteRequest {
    RouteRequest::new(json!({"prompt": "hello"}))
}

/// Request requiring the given capabilities
pub fn request_requiring(capabilities: &[Capability]) -> RouteRequest {
    RouteRequest::builder()
        .required(capabilities.iter().copied().collect())
        .payload(json!({"prompt": "hello"}))
        .build()
}

/// A wired-up registry, router, and capturing event sink
pub struct Fleet {
    /// The live provider registry
    pub registry: Arc<ProviderRegistry>,
    /// Router dispatching over the registry
    pub router: Router,
    /// Sink capturing every emitted event
    pub sink: Arc<CaptureSink>,
    config: RelayConfig,
}

impl Fleet {
    /// Swap the provider set while keeping the fleet's router and
    /// health parameters.
    pub fn reload_with(
        &self,
        providers: Vec<(ProviderConfig, Arc<dyn Bridge>)>,
    ) -> Result<(), ConfigError> {
        let mut bridges = BridgeMap::new();
        let mut configs = Vec::with_capacity(providers.len());
        for (config, bridge) in providers {
            bridges.insert(config.id.clone(), bridge);
            configs.push(config);
        }
        let config = RelayConfig {
            providers: configs,
            router: self.config.router,
            health: self.config.health,
        };
        self.registry.reload(&config, &bridges)
    }
}

/// Builder assembling providers, bridges, and router knobs into a [`Fleet`]
pub struct FleetBuilder {
    providers: Vec<(ProviderConfig, Arc<dyn Bridge>)>,
    router: RouterConfig,
    health: HealthConfig,
}

impl FleetBuilder {
    /// Start an empty fleet with [`fast_health`] timings
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            router: RouterConfig::default(),
            health: fast_health(),
        }
    }

    /// Add a provider served by the given bridge
    pub fn provider(mut self, config: ProviderConfig, bridge: Arc<dyn Bridge>) -> Self {
        self.providers.push((config, bridge));
        self
    }

    /// Select the candidate-ordering strategy
    pub fn strategy(mut self, strategy: RouteStrategy) -> Self {
        self.router.strategy = strategy;
        self
    }

    /// Cap dispatch attempts per request
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.router.max_attempts = Some(max_attempts);
        self
    }

    /// Replace the health parameters
    pub fn health(mut self, health: HealthConfig) -> Self {
        self.health = health;
        self
    }

    /// Wire everything up. Panics on invalid configuration, which is a
    /// bug in the test itself.
    pub fn build(self) -> Fleet {
        init_tracing();

        let mut bridges = BridgeMap::new();
        let mut providers = Vec::with_capacity(self.providers.len());
        for (config, bridge) in self.providers {
            bridges.insert(config.id.clone(), bridge);
            providers.push(config);
        }
        let config = RelayConfig {
            providers,
            router: self.router,
            health: self.health,
        };

        let sink = Arc::new(CaptureSink::new());
        let registry = Arc::new(
            ProviderRegistry::new(&config, &bridges, sink.clone()).expect("fleet config is valid"),
        );
        let router = Router::new(registry.clone(), &config, sink.clone());

        Fleet {
            registry,
            router,
            sink,
            config,
        }
    }
}

impl Default for FleetBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_api_key() {
        let key1 = random_api_key();
        let key2 = random_api_key();
        assert!(key1.starts_with("sk-test-"));
        assert!(key2.starts_with("sk-test-"));
        assert_ne!(key1, key2);
    }

    #[test]
    fn test_capped_provider_overrides_limit() {
        let config = capped_provider("metered", 100, &[Capability::Text], 3);
        assert_eq!(config.credentials.len(), 1);
        assert_eq!(config.rate_limit.max_requests, 3);
    }

    #[tokio::test]
    async fn test_fleet_smoke() {
        let fleet = FleetBuilder::new()
            .provider(
                provider("solo", 100, &[Capability::Text]),
                Arc::new(StubBridge::healthy()),
            )
            .build();

        let response = fleet.router.route(any_request()).await.expect("routed");
        assert_eq!(response.provider, ProviderId::from("solo"));
        assert_eq!(response.attempts, 1);
    }
}
