//! The failover router.
//!
//! `route` drives one request through eligibility, strategy selection,
//! and dispatch, failing over across providers until a bridge succeeds
//! or the loop runs out of candidates, attempts, or time. Retry memory
//! is request-scoped; only the registry's circuits persist across
//! requests.

use crate::strategy::LoadBalancer;
use relay_config::RelayConfig;
use relay_core::error::{AttemptFailure, ExhaustReason, RelayError, RelayResult};
use relay_core::event::{EventSink, RelayEvent, SkipReason};
use relay_core::outcome::{FailureKind, Outcome, RouteResponse};
use relay_core::request::RouteRequest;
use relay_core::types::ProviderId;
use relay_registry::{AcquireError, Candidate, Lease, ProviderRegistry};
use std::cmp;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Attempt ceiling applied when the configuration does not set one.
const DEFAULT_ATTEMPT_CAP: u32 = 5;

/// Routes requests across registered providers with failover.
pub struct Router {
    registry: Arc<ProviderRegistry>,
    balancer: LoadBalancer,
    max_attempts: Option<u32>,
    attempt_timeout: Duration,
    events: Arc<dyn EventSink>,
}

impl Router {
    /// Build a router over `registry` with the configured strategy,
    /// attempt ceiling, and per-attempt timeout.
    #[must_use]
    pub fn new(
        registry: Arc<ProviderRegistry>,
        config: &RelayConfig,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            registry,
            balancer: LoadBalancer::new(config.router.strategy),
            max_attempts: config.router.max_attempts,
            attempt_timeout: config.health.attempt_timeout,
            events,
        }
    }

    /// Route one request, failing over until a bridge succeeds.
    ///
    /// The first success wins and is returned immediately. Skips for
    /// quota or a busy probe slot never consume an attempt; every
    /// dispatched failure removes the provider from this request's
    /// candidate list, auth and transient causes alike.
    pub async fn route(&self, request: RouteRequest) -> RelayResult<RouteResponse> {
        let started = Instant::now();
        let deadline = request.max_latency.map(|budget| started + budget);

        let mut remaining = self.registry.eligible_providers(&request.required);
        if remaining.is_empty() {
            // An all-rate-limited fleet is a transient condition, not a
            // capability mismatch; report it as such.
            let starved = self.registry.starved_providers(&request.required);
            if !starved.is_empty() {
                debug!(request = %request.id, "every matching provider is at quota");
                return Err(RelayError::NoCredentialAvailable { providers: starved });
            }
            debug!(request = %request.id, required = %request.required, "no eligible provider");
            return Err(RelayError::NoEligibleProvider {
                required: request.required.clone(),
            });
        }

        let cap = self
            .max_attempts
            .unwrap_or_else(|| cmp::min(remaining.len() as u32, DEFAULT_ATTEMPT_CAP));

        let mut attempts: Vec<AttemptFailure> = Vec::new();
        let mut starved: Vec<ProviderId> = Vec::new();
        let mut only_starvation_skips = true;
        let mut deadline_hit = false;

        while !remaining.is_empty() && (attempts.len() as u32) < cap {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    deadline_hit = true;
                    break;
                }
            }

            let Some(choice) = self.balancer.select(&remaining) else {
                break;
            };
            let provider = choice.id.clone();

            let lease = match self.registry.acquire(&provider) {
                Ok(lease) => lease,
                Err(AcquireError::NoCredential(_)) => {
                    self.skip(&request, &provider, SkipReason::QuotaExhausted);
                    starved.push(provider.clone());
                    remove(&mut remaining, &provider);
                    continue;
                }
                Err(AcquireError::ProbeInFlight(_)) => {
                    self.skip(&request, &provider, SkipReason::ProbeInFlight);
                    starved.push(provider.clone());
                    remove(&mut remaining, &provider);
                    continue;
                }
                Err(AcquireError::CircuitOpen(_)) => {
                    self.skip(&request, &provider, SkipReason::CircuitOpen);
                    only_starvation_skips = false;
                    remove(&mut remaining, &provider);
                    continue;
                }
                Err(AcquireError::UnknownProvider(_)) => {
                    // A reload retired the provider between selection
                    // and acquisition.
                    debug!(request = %request.id, provider = %provider, "candidate left the snapshot");
                    only_starvation_skips = false;
                    remove(&mut remaining, &provider);
                    continue;
                }
            };

            let attempt_budget = deadline.map_or(self.attempt_timeout, |deadline| {
                cmp::min(
                    self.attempt_timeout,
                    deadline.saturating_duration_since(Instant::now()),
                )
            });
            let deadline_bound = attempt_budget < self.attempt_timeout;

            let verdict = dispatch(&lease, &request, attempt_budget, deadline_bound).await;
            let elapsed = verdict.latency;
            self.registry.release(&lease, &verdict.outcome());

            match verdict.result {
                Ok(payload) => {
                    self.events.emit(RelayEvent::AttemptCompleted {
                        request: request.id.clone(),
                        provider: lease.provider.clone(),
                        credential: lease.credential.clone(),
                        probe: lease.probe,
                        failure: None,
                        latency_ms: elapsed.as_millis() as u64,
                    });
                    debug!(
                        request = %request.id,
                        provider = %lease.provider,
                        attempt = attempts.len() + 1,
                        latency_ms = elapsed.as_millis() as u64,
                        "request routed"
                    );
                    return Ok(RouteResponse {
                        request: request.id.clone(),
                        provider: lease.provider,
                        credential: lease.credential,
                        payload,
                        latency: elapsed,
                        attempts: attempts.len() as u32 + 1,
                    });
                }
                Err((kind, message)) => {
                    self.events.emit(RelayEvent::AttemptCompleted {
                        request: request.id.clone(),
                        provider: lease.provider.clone(),
                        credential: lease.credential.clone(),
                        probe: lease.probe,
                        failure: Some(kind),
                        latency_ms: elapsed.as_millis() as u64,
                    });
                    warn!(
                        request = %request.id,
                        provider = %lease.provider,
                        %kind,
                        error = %message,
                        "attempt failed"
                    );
                    attempts.push(AttemptFailure {
                        provider: lease.provider.clone(),
                        credential: lease.credential.clone(),
                        kind,
                        message,
                    });
                    remove(&mut remaining, &provider);
                }
            }
        }

        // The loop can also drain its candidates on the attempt that
        // spent the last of the budget; both exits are out-of-time.
        let out_of_time =
            deadline_hit || deadline.is_some_and(|deadline| Instant::now() >= deadline);
        if out_of_time {
            debug!(
                request = %request.id,
                attempts = attempts.len(),
                "deadline spent before a success"
            );
            return Err(RelayError::Exhausted {
                attempts,
                reason: ExhaustReason::DeadlineExceeded,
            });
        }
        if attempts.is_empty() && !starved.is_empty() && only_starvation_skips {
            return Err(RelayError::NoCredentialAvailable { providers: starved });
        }

        let reason = if remaining.is_empty() {
            ExhaustReason::CandidatesExhausted
        } else {
            ExhaustReason::AttemptLimit
        };
        warn!(
            request = %request.id,
            attempts = attempts.len(),
            %reason,
            "routing exhausted"
        );
        Err(RelayError::Exhausted { attempts, reason })
    }

    fn skip(&self, request: &RouteRequest, provider: &ProviderId, reason: SkipReason) {
        debug!(request = %request.id, provider = %provider, ?reason, "candidate skipped");
        self.events.emit(RelayEvent::ProviderSkipped {
            request: request.id.clone(),
            provider: provider.clone(),
            reason,
        });
    }
}

/// One finished dispatch, before it is folded into registry state.
struct Verdict {
    latency: Duration,
    result: Result<serde_json::Value, (FailureKind, String)>,
}

impl Verdict {
    fn outcome(&self) -> Outcome {
        match &self.result {
            Ok(_) => Outcome::success(self.latency),
            Err((kind, _)) => Outcome::failure(*kind, self.latency),
        }
    }
}

/// Run the bridge call on its own task so a panicking bridge cannot
/// take the routing loop down with it.
async fn dispatch(
    lease: &Lease,
    request: &RouteRequest,
    budget: Duration,
    deadline_bound: bool,
) -> Verdict {
    let bridge = Arc::clone(&lease.bridge);
    let api_key = lease.api_key.clone();
    let request = request.clone();

    let attempt_started = Instant::now();
    let mut task = tokio::spawn(async move { bridge.send(&api_key, &request).await });

    let result = match tokio::time::timeout(budget, &mut task).await {
        Ok(Ok(Ok(payload))) => Ok(payload),
        Ok(Ok(Err(error))) => Err((error.kind, error.message)),
        Ok(Err(join_error)) => Err((
            FailureKind::Transport,
            format!("bridge task failed: {join_error}"),
        )),
        Err(_) => {
            task.abort();
            let kind = if deadline_bound {
                FailureKind::DeadlineExceeded
            } else {
                FailureKind::Timeout
            };
            Err((kind, format!("no response within {budget:?}")))
        }
    };

    Verdict {
        latency: attempt_started.elapsed(),
        result,
    }
}

fn remove(candidates: &mut Vec<Candidate>, provider: &ProviderId) {
    candidates.retain(|candidate| candidate.id != *provider);
}
