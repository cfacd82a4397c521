//! Candidate ranking strategies.
//!
//! A strategy is a pure ordering over the candidate list the registry
//! produced; selection never touches registry state. Every ordering is
//! total, so two routers configured alike rank alike.

use relay_registry::Candidate;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub use relay_config::RouteStrategy;

/// Picks the next candidate to try under the configured strategy.
///
/// Stateless apart from the round-robin cursor, so one balancer can be
/// shared across concurrent route calls.
#[derive(Debug)]
pub struct LoadBalancer {
    strategy: RouteStrategy,
    cursor: AtomicUsize,
}

impl LoadBalancer {
    /// Create a balancer for `strategy`.
    #[must_use]
    pub fn new(strategy: RouteStrategy) -> Self {
        Self {
            strategy,
            cursor: AtomicUsize::new(0),
        }
    }

    /// The configured strategy.
    #[must_use]
    pub fn strategy(&self) -> RouteStrategy {
        self.strategy
    }

    /// Select from `candidates`, or `None` when the list is empty.
    ///
    /// The list arrives ordered by weight descending then id ascending,
    /// as produced by `eligible_providers`.
    pub fn select<'a>(&self, candidates: &'a [Candidate]) -> Option<&'a Candidate> {
        if candidates.is_empty() {
            return None;
        }
        match self.strategy {
            RouteStrategy::Capability => candidates.first(),
            RouteStrategy::Cost => candidates.iter().min_by(|a, b| {
                a.cost
                    .cmp(&b.cost)
                    .then_with(|| b.weight.cmp(&a.weight))
                    .then_with(|| a.id.cmp(&b.id))
            }),
            RouteStrategy::Performance => Self::fastest(candidates),
            RouteStrategy::RoundRobin => self.next_in_rotation(candidates),
        }
    }

    /// Lowest mean recent latency wins.
    ///
    /// Candidates without samples rank at the median of the sampled
    /// ones: a cold provider neither jumps the queue ahead of proven
    /// fast providers nor starves behind proven slow ones. On equal
    /// latency a sampled candidate beats a cold one.
    fn fastest(candidates: &[Candidate]) -> Option<&Candidate> {
        let fallback = median_latency(candidates);
        candidates.iter().min_by(|a, b| {
            let latency_a = a.mean_latency.or(fallback);
            let latency_b = b.mean_latency.or(fallback);
            latency_a
                .cmp(&latency_b)
                .then_with(|| b.mean_latency.is_some().cmp(&a.mean_latency.is_some()))
                .then_with(|| a.speed.cmp(&b.speed))
                .then_with(|| b.weight.cmp(&a.weight))
                .then_with(|| a.id.cmp(&b.id))
        })
    }

    /// Rotate over the id-ordered candidate list.
    ///
    /// The cursor advances on every call, including calls against a
    /// shrunk list, so fairness survives candidates dropping in and out
    /// of eligibility.
    fn next_in_rotation<'a>(&self, candidates: &'a [Candidate]) -> Option<&'a Candidate> {
        let mut ordered: Vec<&Candidate> = candidates.iter().collect();
        ordered.sort_by(|a, b| a.id.cmp(&b.id));
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % ordered.len();
        ordered.get(index).copied()
    }
}

fn median_latency(candidates: &[Candidate]) -> Option<Duration> {
    let mut sampled: Vec<Duration> = candidates
        .iter()
        .filter_map(|candidate| candidate.mean_latency)
        .collect();
    if sampled.is_empty() {
        return None;
    }
    sampled.sort_unstable();
    Some(sampled[sampled.len() / 2])
}
