//! Provider selection, response caching and fallback routing.
//!
//! A [`FallbackRouter`] turns a [`quill_core::SynthesisRequest`] into a
//! [`Resolution`]: cache first, then the ordered candidates from the
//! [`CapabilityRegistry`], then the degraded generator.

/// Response cache and request fingerprints
pub mod cache;
/// Provider health flags
pub mod health;
/// Router metrics
pub mod metrics;
/// Capability registry and routing table
pub mod registry;
/// Fallback router
pub mod router;

pub use cache::{CacheEntry, CacheKey, CacheStats, ResponseCache};
pub use health::{HealthSnapshot, MAX_BACKOFF, ProviderHealth};
pub use metrics::{MetricsReport, ProviderStats, RouterMetrics};
pub use registry::{Candidate, CapabilityRegistry, RoutingTable};
pub use router::{
    AttemptOutcome, AttemptRecord, FallbackRouter, NoopObserver, ResolveControl, Resolution,
    RouteObserver, RouteStep,
};
