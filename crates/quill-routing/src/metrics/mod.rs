//! Router metrics: per-provider attempt outcomes and cache effectiveness.

/// Metrics collection
pub mod collector;
/// Report generation
pub mod reporter;

pub use collector::{ProviderStats, RouterMetrics};
pub use reporter::MetricsReport;
