//! Integration tests for the relay routing core
//!
//! This crate exercises the public API end to end, covering:
//! - Failover ordering and attempt accounting
//! - Credential rotation and per-window quotas
//! - Circuit-breaker lifecycles and probing
//! - Configuration loading, validation, and live reload
//!
//! Scenarios drive the registry and router exactly the way an
//! embedding application would, with scripted bridges standing in
//! for upstream providers.

pub mod harness;

// Re-export commonly used items
pub use harness::*;

#[cfg(test)]
mod health_tests;
#[cfg(test)]
mod rate_limit_tests;
