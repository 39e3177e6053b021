//! Fallback router: cache, ordered candidates, failure policy, degraded fallback.
//!
//! [`FallbackRouter::resolve`] is total. Every request ends with a response,
//! either from the cache, from the first real provider that succeeds, or from
//! the degraded generator once every candidate is exhausted. Provider errors
//! are absorbed here and only surface as [`AttemptRecord`]s.

use std::sync::Arc;
use std::time::Instant;

use quill_core::{
    FailureDisposition, ProviderError, ProviderErrorKind, QuillConfig, Response, RouterConfig,
    SynthesisRequest,
};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::cache::{CacheKey, ResponseCache};
use crate::health::ProviderHealth;
use crate::metrics::RouterMetrics;
use crate::registry::{Candidate, CapabilityRegistry};

/// How a single provider attempt ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The provider returned a response.
    Succeeded,
    /// The provider failed.
    Failed {
        /// Classified failure
        kind: ProviderErrorKind,
        /// Failure description
        detail: String,
    },
}

/// One provider invocation made while resolving a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Provider identifier
    pub provider: String,
    /// How the attempt ended
    pub outcome: AttemptOutcome,
    /// Wall-clock duration of the attempt
    pub latency_ms: u64,
}

/// Terminal outcome of a resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// The response handed back to the caller
    pub response: Response,
    /// Provider that produced the response (`mock` when degraded)
    pub served_by: String,
    /// Whether the response came from the cache
    pub from_cache: bool,
    /// Provider attempts in the order they were made
    pub attempts: Vec<AttemptRecord>,
}

impl Resolution {
    /// Whether the response came from the degraded generator.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        self.response.degraded
    }
}

/// Milestones reported while a request is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteStep {
    /// A cached response was found.
    CacheHit {
        /// Provider that originally served it
        served_by: String,
    },
    /// The cache had nothing usable; candidates were selected.
    CandidatesSelected {
        /// Number of real providers to try
        count: usize,
    },
    /// A provider invocation is starting.
    AttemptStarted {
        /// Provider identifier
        provider: String,
        /// Zero-based position in the candidate list
        index: usize,
        /// Number of real candidates
        total: usize,
    },
    /// A provider invocation failed.
    AttemptFailed {
        /// Provider identifier
        provider: String,
        /// Classified failure
        kind: ProviderErrorKind,
    },
    /// Every real provider failed; the degraded generator is answering.
    FallbackEngaged,
    /// The resolution finished.
    Completed {
        /// Provider that produced the response
        served_by: String,
        /// Whether the response is a placeholder
        degraded: bool,
    },
}

/// Receives [`RouteStep`]s as a resolution progresses.
pub trait RouteObserver: Send + Sync {
    /// Called synchronously from the resolving task.
    fn on_step(&self, step: &RouteStep);
}

/// Observer that ignores every step.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl RouteObserver for NoopObserver {
    fn on_step(&self, _step: &RouteStep) {}
}

/// Cancellation and observation hooks for one resolution.
#[derive(Clone)]
pub struct ResolveControl {
    /// Checked before and after every attempt
    pub cancel: CancellationToken,
    /// Receives progress steps
    pub observer: Arc<dyn RouteObserver>,
}

impl ResolveControl {
    /// Control bound to `cancel`, with no observer.
    #[must_use]
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            observer: Arc::new(NoopObserver),
        }
    }

    /// Attaches an observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn RouteObserver>) -> Self {
        self.observer = observer;
        self
    }

    fn emit(&self, step: &RouteStep) {
        self.observer.on_step(step);
    }
}

impl Default for ResolveControl {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

/// Result of trying one candidate, retries included.
enum CandidateOutcome {
    Served(Response),
    Exhausted,
    Cancelled,
}

/// Routes requests across providers with caching and graceful degradation.
pub struct FallbackRouter {
    registry: Arc<CapabilityRegistry>,
    cache: Arc<ResponseCache>,
    metrics: Arc<RouterMetrics>,
    config: RouterConfig,
}

impl FallbackRouter {
    /// Creates a router over an existing registry and cache.
    #[must_use]
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        cache: Arc<ResponseCache>,
        config: RouterConfig,
    ) -> Self {
        Self {
            registry,
            cache,
            metrics: Arc::new(RouterMetrics::new()),
            config,
        }
    }

    /// Builds the registry, cache and router from configuration.
    #[must_use]
    pub fn from_config(config: &QuillConfig) -> Self {
        Self::new(
            Arc::new(CapabilityRegistry::from_config(config)),
            Arc::new(ResponseCache::new(config.cache.clone())),
            config.router.clone(),
        )
    }

    /// Registered providers and routing table.
    #[must_use]
    pub const fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// Shared response cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Router metrics.
    #[must_use]
    pub const fn metrics(&self) -> &Arc<RouterMetrics> {
        &self.metrics
    }

    /// Provider health flags.
    #[must_use]
    pub fn health(&self) -> &Arc<ProviderHealth> {
        self.registry.health()
    }

    /// Resolves a request. Never fails; see the module docs.
    pub async fn resolve(&self, request: &SynthesisRequest) -> Resolution {
        self.resolve_with(request, &ResolveControl::default())
            .await
            .unwrap_or_else(|| self.degraded(request, Vec::new()))
    }

    /// Resolves a request, honouring cancellation and reporting progress.
    ///
    /// Returns `None` when `control.cancel` fires before a response is
    /// handed back. An attempt already in flight is allowed to finish; a
    /// successful real response is still cached but not returned.
    pub async fn resolve_with(
        &self,
        request: &SynthesisRequest,
        control: &ResolveControl,
    ) -> Option<Resolution> {
        if control.cancel.is_cancelled() {
            self.metrics.record_cancelled();
            return None;
        }

        let key = CacheKey::for_request(request);
        if let Some(entry) = self.cache.get(&key) {
            tracing::debug!("Cache hit for {} request ({})", request.kind, entry.served_by);
            self.metrics.record_cache_lookup(true);
            self.metrics.record_resolution(false);
            control.emit(&RouteStep::CacheHit {
                served_by: entry.served_by.clone(),
            });
            control.emit(&RouteStep::Completed {
                served_by: entry.served_by.clone(),
                degraded: false,
            });
            return Some(Resolution {
                response: entry.response,
                served_by: entry.served_by,
                from_cache: true,
                attempts: Vec::new(),
            });
        }
        self.metrics.record_cache_lookup(false);

        let candidates: Vec<Candidate> = self
            .registry
            .candidates_for(request.kind)
            .into_iter()
            .filter(|candidate| !candidate.provider.is_degraded())
            .collect();
        let total = candidates.len();
        control.emit(&RouteStep::CandidatesSelected { count: total });

        let mut attempts = Vec::new();
        for (index, candidate) in candidates.iter().enumerate() {
            if control.cancel.is_cancelled() {
                self.metrics.record_cancelled();
                return None;
            }
            control.emit(&RouteStep::AttemptStarted {
                provider: candidate.id().to_owned(),
                index,
                total,
            });

            match self
                .try_candidate(request, &key, candidate, control, &mut attempts)
                .await
            {
                CandidateOutcome::Served(response) => {
                    let served_by = response.provider.clone();
                    tracing::info!(
                        "Resolved {} request via {served_by} after {} attempt(s)",
                        request.kind,
                        attempts.len()
                    );
                    self.metrics.record_resolution(response.degraded);
                    control.emit(&RouteStep::Completed {
                        served_by: served_by.clone(),
                        degraded: response.degraded,
                    });
                    return Some(Resolution {
                        response,
                        served_by,
                        from_cache: false,
                        attempts,
                    });
                }
                CandidateOutcome::Exhausted => {}
                CandidateOutcome::Cancelled => {
                    self.metrics.record_cancelled();
                    return None;
                }
            }
        }

        if control.cancel.is_cancelled() {
            self.metrics.record_cancelled();
            return None;
        }
        tracing::warn!(
            "All providers failed for {} request; serving degraded result",
            request.kind
        );
        control.emit(&RouteStep::FallbackEngaged);
        let resolution = self.degraded(request, attempts);
        self.metrics.record_resolution(true);
        control.emit(&RouteStep::Completed {
            served_by: resolution.served_by.clone(),
            degraded: true,
        });
        Some(resolution)
    }

    /// Invokes one candidate, retrying transient failures as configured.
    async fn try_candidate(
        &self,
        request: &SynthesisRequest,
        key: &CacheKey,
        candidate: &Candidate,
        control: &ResolveControl,
        attempts: &mut Vec<AttemptRecord>,
    ) -> CandidateOutcome {
        let provider_id = candidate.id();
        let mut retries_left = self.config.same_provider_retries;

        loop {
            self.metrics.record_attempt(provider_id);
            let started = Instant::now();
            let result = match timeout(
                candidate.timeout,
                candidate.provider.invoke(request, candidate.timeout),
            )
            .await
            {
                Ok(result) => result,
                Err(_elapsed) => Err(ProviderError::Timeout(candidate.timeout)),
            };
            let latency_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(response) => {
                    tracing::debug!("{provider_id} succeeded in {latency_ms}ms");
                    self.health().record_success(provider_id);
                    self.metrics.record_success(provider_id, latency_ms);
                    self.cache.insert_response(key.clone(), request.kind, &response);
                    attempts.push(AttemptRecord {
                        provider: provider_id.to_owned(),
                        outcome: AttemptOutcome::Succeeded,
                        latency_ms,
                    });
                    if control.cancel.is_cancelled() {
                        return CandidateOutcome::Cancelled;
                    }
                    return CandidateOutcome::Served(response);
                }
                Err(error) => {
                    tracing::warn!("{provider_id} failed after {latency_ms}ms: {error}");
                    self.metrics.record_failure(provider_id, error.kind());
                    attempts.push(AttemptRecord {
                        provider: provider_id.to_owned(),
                        outcome: AttemptOutcome::Failed {
                            kind: error.kind(),
                            detail: error.to_string(),
                        },
                        latency_ms,
                    });
                    control.emit(&RouteStep::AttemptFailed {
                        provider: provider_id.to_owned(),
                        kind: error.kind(),
                    });

                    if control.cancel.is_cancelled() {
                        self.apply_failure(provider_id, &error);
                        return CandidateOutcome::Cancelled;
                    }
                    if error.is_retryable() && retries_left > 0 {
                        retries_left -= 1;
                        tracing::debug!("Retrying {provider_id} ({retries_left} retries left)");
                        continue;
                    }
                    self.apply_failure(provider_id, &error);
                    return CandidateOutcome::Exhausted;
                }
            }
        }
    }

    /// Updates health flags according to the failure's disposition.
    fn apply_failure(&self, provider_id: &str, error: &ProviderError) {
        let health = self.health();
        match error.disposition() {
            FailureDisposition::RetrySameThenSkip => health.mark_degraded(provider_id, error),
            FailureDisposition::BackoffAndSkip => {
                let backoff = match error {
                    ProviderError::RateLimited {
                        retry_after: Some(delay),
                    } => *delay,
                    _ => self.config.rate_limit_backoff(),
                };
                tracing::info!("Backing off {provider_id} for {}ms", backoff.as_millis());
                health.start_backoff(provider_id, backoff, error);
            }
            FailureDisposition::DisableForProcess => {
                tracing::error!("Disabling {provider_id} for this process: {error}");
                health.disable(provider_id, error);
            }
        }
    }

    /// Placeholder resolution from the degraded generator.
    fn degraded(&self, request: &SynthesisRequest, mut attempts: Vec<AttemptRecord>) -> Resolution {
        let fallback = self.registry.fallback();
        let response = fallback.placeholder(request);
        self.metrics.record_attempt(&response.provider);
        self.metrics.record_success(&response.provider, 0);
        attempts.push(AttemptRecord {
            provider: response.provider.clone(),
            outcome: AttemptOutcome::Succeeded,
            latency_ms: 0,
        });
        Resolution {
            served_by: response.provider.clone(),
            response,
            from_cache: false,
            attempts,
        }
    }
}
