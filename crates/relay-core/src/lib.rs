//! # Relay Core
//!
//! Foundational types for the LLM relay routing core.
//!
//! This crate provides the pieces every other relay crate builds on:
//! - Identifier newtypes and the capability model
//! - The routed request envelope and attempt outcomes
//! - The [`Bridge`] provider-adapter contract
//! - The terminal error taxonomy
//! - Structured lifecycle events and the [`EventSink`] seam

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bridge;
pub mod error;
pub mod event;
pub mod outcome;
pub mod request;
pub mod testing;
pub mod types;

// Re-export commonly used types
pub use bridge::{Bridge, BridgeDescriptor};
pub use error::{AttemptFailure, ExhaustReason, RelayError, RelayResult};
pub use event::{EventSink, LogSink, NullSink, RelayEvent, SkipReason};
pub use outcome::{DispatchError, FailureKind, Outcome, RouteResponse};
pub use request::{RouteRequest, RouteRequestBuilder};
pub use types::{
    Capability, CapabilitySet, CostClass, CredentialId, HealthState, ProviderId, RequestId,
    SpeedClass,
};
