//! In-process test doubles.
//!
//! Scripted bridges and a capturing event sink shared by unit and
//! integration tests across the workspace.

use crate::bridge::{Bridge, BridgeDescriptor};
use crate::event::{EventSink, RelayEvent};
use crate::outcome::DispatchError;
use crate::request::RouteRequest;
use crate::types::{Capability, CostClass, SpeedClass};
use async_trait::async_trait;
use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

/// Build a descriptor from a capability list.
#[must_use]
pub fn descriptor(
    capabilities: &[Capability],
    cost: CostClass,
    speed: SpeedClass,
) -> BridgeDescriptor {
    BridgeDescriptor::new(capabilities.iter().copied().collect(), cost, speed)
}

/// Scripted bridge: plays a queue of canned results, then a fallback.
pub struct StubBridge {
    descriptor: BridgeDescriptor,
    script: Mutex<VecDeque<Result<serde_json::Value, DispatchError>>>,
    fallback: Result<serde_json::Value, DispatchError>,
    delay: Option<Duration>,
    probe_healthy: AtomicBool,
    calls: AtomicU32,
    probes: AtomicU32,
    keys_seen: Mutex<Vec<String>>,
}

impl StubBridge {
    fn with_fallback(fallback: Result<serde_json::Value, DispatchError>) -> Self {
        Self {
            descriptor: descriptor(&[Capability::Text], CostClass::Medium, SpeedClass::Medium),
            script: Mutex::new(VecDeque::new()),
            fallback,
            delay: None,
            probe_healthy: AtomicBool::new(true),
            calls: AtomicU32::new(0),
            probes: AtomicU32::new(0),
            keys_seen: Mutex::new(Vec::new()),
        }
    }

    /// Bridge that answers every send with `{"ok": true}`.
    #[must_use]
    pub fn healthy() -> Self {
        Self::with_fallback(Ok(serde_json::json!({"ok": true})))
    }

    /// Bridge that fails every send with the given error.
    #[must_use]
    pub fn failing(error: DispatchError) -> Self {
        let bridge = Self::with_fallback(Err(error));
        bridge.probe_healthy.store(false, Ordering::SeqCst);
        bridge
    }

    /// Bridge that plays `script` in order, then succeeds.
    #[must_use]
    pub fn scripted(script: Vec<Result<serde_json::Value, DispatchError>>) -> Self {
        let bridge = Self::healthy();
        *bridge.script.lock() = script.into();
        bridge
    }

    /// Add a fixed latency before every reply.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Override the advertised descriptor.
    #[must_use]
    pub fn with_descriptor(mut self, descriptor: BridgeDescriptor) -> Self {
        self.descriptor = descriptor;
        self
    }

    /// Flip the probe verdict.
    pub fn set_probe_healthy(&self, healthy: bool) {
        self.probe_healthy.store(healthy, Ordering::SeqCst);
    }

    /// Number of sends served so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of probes served so far.
    pub fn probes(&self) -> u32 {
        self.probes.load(Ordering::SeqCst)
    }

    /// Keys presented to the bridge, in call order.
    pub fn keys_seen(&self) -> Vec<String> {
        self.keys_seen.lock().clone()
    }
}

#[async_trait]
impl Bridge for StubBridge {
    async fn send(
        &self,
        key: &SecretString,
        _request: &RouteRequest,
    ) -> Result<serde_json::Value, DispatchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.keys_seen.lock().push(key.expose_secret().clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.script.lock().pop_front();
        scripted.unwrap_or_else(|| self.fallback.clone())
    }

    async fn health_probe(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.probe_healthy.load(Ordering::SeqCst)
    }

    fn describe(&self) -> BridgeDescriptor {
        self.descriptor.clone()
    }
}

/// Bridge whose `send` panics, for crash-isolation tests.
pub struct PanickingBridge;

#[async_trait]
impl Bridge for PanickingBridge {
    #[allow(clippy::panic)]
    async fn send(
        &self,
        _key: &SecretString,
        _request: &RouteRequest,
    ) -> Result<serde_json::Value, DispatchError> {
        panic!("scripted bridge panic");
    }

    async fn health_probe(&self) -> bool {
        false
    }

    fn describe(&self) -> BridgeDescriptor {
        descriptor(&[Capability::Text], CostClass::Medium, SpeedClass::Medium)
    }
}

/// Sink that records every event for later assertions.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<RelayEvent>>,
}

impl CaptureSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All events captured so far.
    pub fn events(&self) -> Vec<RelayEvent> {
        self.events.lock().clone()
    }

    /// Count of captured events matching `predicate`.
    pub fn count_where(&self, predicate: impl Fn(&RelayEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, event: RelayEvent) {
        self.events.lock().push(event);
    }
}
