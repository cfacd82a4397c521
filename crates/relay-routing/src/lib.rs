//! # Relay Routing
//!
//! Strategy-driven selection and the failover loop on top of
//! [`relay_registry`]. The router owns no provider state; it reads
//! candidates, leases credentials, dispatches through bridges, and
//! feeds every outcome back into the registry.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod router;
pub mod strategy;

pub use router::Router;
pub use strategy::{LoadBalancer, RouteStrategy};
