//! # Relay Config
//!
//! Configuration model and validation for the LLM relay.
//!
//! The routing core consumes these structs ready-made; loading them from
//! disk, environment, or a control plane belongs to the embedding
//! application.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod model;
pub mod validate;

// Re-export commonly used types
pub use model::{
    CredentialConfig, HealthConfig, ProviderConfig, RateLimitConfig, RelayConfig, RouteStrategy,
    RouterConfig,
};
pub use validate::ConfigError;
