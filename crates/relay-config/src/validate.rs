//! Cross-field configuration validation.
//!
//! Rules here are relational (uniqueness, cap/base coupling), so they
//! live in code rather than field attributes.

use crate::model::{RateLimitConfig, RelayConfig};
use relay_core::types::{CredentialId, ProviderId};
use std::collections::HashSet;
use thiserror::Error;

/// Rejected configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The provider list is empty.
    #[error("configuration has no providers")]
    EmptyProviders,

    /// Two providers share an id.
    #[error("duplicate provider id {id}")]
    DuplicateProvider {
        /// The repeated id.
        id: ProviderId,
    },

    /// Two credentials of one provider share an id.
    #[error("duplicate credential id {credential} for provider {provider}")]
    DuplicateCredential {
        /// Owning provider.
        provider: ProviderId,
        /// The repeated label.
        credential: CredentialId,
    },

    /// A provider field failed validation.
    #[error("provider {id}: {reason}")]
    InvalidProvider {
        /// Offending provider.
        id: ProviderId,
        /// What was wrong.
        reason: String,
    },

    /// A top-level field failed validation.
    #[error("invalid {field}: {reason}")]
    InvalidValue {
        /// Offending field.
        field: &'static str,
        /// What was wrong.
        reason: String,
    },

    /// An enabled provider has no registered bridge.
    #[error("no bridge registered for enabled provider {provider}")]
    MissingBridge {
        /// The uncovered provider.
        provider: ProviderId,
    },
}

impl RelayConfig {
    /// Check the whole configuration, returning the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.providers.is_empty() {
            return Err(ConfigError::EmptyProviders);
        }

        let mut seen = HashSet::new();
        for provider in &self.providers {
            if provider.id.as_str().trim().is_empty() {
                return Err(ConfigError::InvalidProvider {
                    id: provider.id.clone(),
                    reason: "provider id must not be empty".to_owned(),
                });
            }
            if !seen.insert(provider.id.clone()) {
                return Err(ConfigError::DuplicateProvider {
                    id: provider.id.clone(),
                });
            }

            check_rate_limit(&provider.id, &provider.rate_limit)?;

            let mut labels = HashSet::new();
            for credential in &provider.credentials {
                if credential.id.as_str().trim().is_empty() {
                    return Err(ConfigError::InvalidProvider {
                        id: provider.id.clone(),
                        reason: "credential id must not be empty".to_owned(),
                    });
                }
                if !labels.insert(credential.id.clone()) {
                    return Err(ConfigError::DuplicateCredential {
                        provider: provider.id.clone(),
                        credential: credential.id.clone(),
                    });
                }
                if let Some(limit) = &credential.rate_limit {
                    check_rate_limit(&provider.id, limit)?;
                }
            }
        }

        if self.health.failure_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                field: "health.failure_threshold",
                reason: "must be at least 1".to_owned(),
            });
        }
        if self.health.probe_successes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "health.probe_successes",
                reason: "must be at least 1".to_owned(),
            });
        }
        if self.health.cooldown.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "health.cooldown",
                reason: "must be non-zero".to_owned(),
            });
        }
        if self.health.cooldown_cap < self.health.cooldown {
            return Err(ConfigError::InvalidValue {
                field: "health.cooldown_cap",
                reason: "must be at least the base cooldown".to_owned(),
            });
        }
        if self.health.attempt_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "health.attempt_timeout",
                reason: "must be non-zero".to_owned(),
            });
        }
        if self.router.max_attempts == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "router.max_attempts",
                reason: "must be at least 1 when set".to_owned(),
            });
        }

        Ok(())
    }
}

fn check_rate_limit(provider: &ProviderId, limit: &RateLimitConfig) -> Result<(), ConfigError> {
    if limit.max_requests == 0 {
        return Err(ConfigError::InvalidProvider {
            id: provider.clone(),
            reason: "rate_limit.max_requests must be at least 1".to_owned(),
        });
    }
    if limit.window.is_zero() {
        return Err(ConfigError::InvalidProvider {
            id: provider.clone(),
            reason: "rate_limit.window must be non-zero".to_owned(),
        });
    }
    Ok(())
}
