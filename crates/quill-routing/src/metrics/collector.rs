//! Metrics collection for provider attempts and resolutions.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use quill_core::{IgnoreLock as _, ProviderErrorKind};
use serde::{Deserialize, Serialize};

use super::reporter::MetricsReport;

/// Counters for a single provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderStats {
    /// Invocations started
    pub attempts: u64,
    /// Invocations that returned a response
    pub successes: u64,
    /// Failed invocations by error kind
    pub failures: HashMap<ProviderErrorKind, u64>,
    /// Summed latency of successful invocations
    pub total_latency_ms: u64,
}

impl ProviderStats {
    /// Total failures across every kind.
    #[must_use]
    pub fn failure_count(&self) -> u64 {
        self.failures.values().sum()
    }

    /// Average latency of successful invocations.
    #[must_use]
    pub fn avg_latency_ms(&self) -> u64 {
        self.total_latency_ms.checked_div(self.successes).unwrap_or(0)
    }
}

#[derive(Debug, Default)]
struct MetricsState {
    providers: BTreeMap<String, ProviderStats>,
    cache_hits: u64,
    cache_misses: u64,
    resolutions: u64,
    degraded: u64,
    cancelled: u64,
}

/// Collects router metrics; shared by all concurrent resolutions.
#[derive(Debug, Default)]
pub struct RouterMetrics {
    state: Mutex<MetricsState>,
}

impl RouterMetrics {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the start of a provider invocation.
    pub fn record_attempt(&self, provider: &str) {
        self.with_provider(provider, |stats| stats.attempts += 1);
    }

    /// Records a successful invocation.
    pub fn record_success(&self, provider: &str, latency_ms: u64) {
        self.with_provider(provider, |stats| {
            stats.successes += 1;
            stats.total_latency_ms = stats.total_latency_ms.saturating_add(latency_ms);
        });
    }

    /// Records a failed invocation.
    pub fn record_failure(&self, provider: &str, kind: ProviderErrorKind) {
        self.with_provider(provider, |stats| {
            *stats.failures.entry(kind).or_insert(0) += 1;
        });
    }

    /// Records a cache lookup.
    pub fn record_cache_lookup(&self, hit: bool) {
        self.state.with_lock(|state| {
            if hit {
                state.cache_hits += 1;
            } else {
                state.cache_misses += 1;
            }
        });
    }

    /// Records a finished resolution.
    pub fn record_resolution(&self, degraded: bool) {
        self.state.with_lock(|state| {
            state.resolutions += 1;
            if degraded {
                state.degraded += 1;
            }
        });
    }

    /// Records a resolution abandoned by cancellation.
    pub fn record_cancelled(&self) {
        self.state.with_lock(|state| state.cancelled += 1);
    }

    /// Counters for one provider.
    #[must_use]
    pub fn provider(&self, provider: &str) -> ProviderStats {
        self.state
            .with_lock(|state| state.providers.get(provider).cloned().unwrap_or_default())
    }

    /// Point-in-time report.
    #[must_use]
    pub fn report(&self) -> MetricsReport {
        self.state.with_lock(|state| MetricsReport {
            providers: state.providers.clone(),
            cache_hits: state.cache_hits,
            cache_misses: state.cache_misses,
            resolutions: state.resolutions,
            degraded_resolutions: state.degraded,
            cancelled_resolutions: state.cancelled,
        })
    }

    /// Clears all metrics.
    pub fn clear(&self) {
        self.state.with_lock(|state| *state = MetricsState::default());
    }

    fn with_provider<F: FnOnce(&mut ProviderStats)>(&self, provider: &str, update: F) {
        self.state.with_lock(|state| {
            update(state.providers.entry(provider.to_owned()).or_default());
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_counters() {
        let metrics = RouterMetrics::new();
        metrics.record_attempt("groq");
        metrics.record_failure("groq", ProviderErrorKind::Timeout);
        metrics.record_attempt("groq");
        metrics.record_success("groq", 300);
        metrics.record_attempt("groq");
        metrics.record_success("groq", 100);

        let stats = metrics.provider("groq");
        assert_eq!(stats.attempts, 3);
        assert_eq!(stats.successes, 2);
        assert_eq!(stats.failure_count(), 1);
        assert_eq!(stats.failures.get(&ProviderErrorKind::Timeout), Some(&1));
        assert_eq!(stats.avg_latency_ms(), 200);
    }

    #[test]
    fn test_unknown_provider_is_empty() {
        let metrics = RouterMetrics::new();
        let stats = metrics.provider("anthropic");
        assert_eq!(stats, ProviderStats::default());
        assert_eq!(stats.avg_latency_ms(), 0);
    }

    #[test]
    fn test_report_and_clear() {
        let metrics = RouterMetrics::new();
        metrics.record_cache_lookup(true);
        metrics.record_cache_lookup(false);
        metrics.record_resolution(true);
        metrics.record_resolution(false);
        metrics.record_cancelled();

        let report = metrics.report();
        assert_eq!(report.cache_hits, 1);
        assert_eq!(report.cache_misses, 1);
        assert_eq!(report.resolutions, 2);
        assert_eq!(report.degraded_resolutions, 1);
        assert_eq!(report.cancelled_resolutions, 1);

        metrics.clear();
        assert_eq!(metrics.report().resolutions, 0);
    }
}
