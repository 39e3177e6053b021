//! Report generation for router metrics.

use std::collections::BTreeMap;
use std::fmt::{Error as FmtError, Write as _};

use serde::{Deserialize, Serialize};

use super::collector::ProviderStats;

/// Snapshot of router metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsReport {
    /// Per-provider counters, keyed by provider id
    pub providers: BTreeMap<String, ProviderStats>,
    /// Resolutions answered from the cache
    pub cache_hits: u64,
    /// Resolutions that missed the cache
    pub cache_misses: u64,
    /// Completed resolutions
    pub resolutions: u64,
    /// Completed resolutions served by the degraded generator
    pub degraded_resolutions: u64,
    /// Resolutions abandoned by cancellation
    pub cancelled_resolutions: u64,
}

impl MetricsReport {
    /// Fraction of cache lookups that hit, in `[0, 1]`.
    #[must_use]
    pub fn cache_hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 {
            return 0.0;
        }
        self.cache_hits as f64 / lookups as f64
    }

    /// Renders a human-readable summary.
    ///
    /// # Errors
    /// Returns an error if writing to the buffer fails.
    pub fn render(&self) -> Result<String, FmtError> {
        let mut output = String::new();
        writeln!(
            output,
            "Resolutions: {} ({} degraded, {} cancelled)",
            self.resolutions, self.degraded_resolutions, self.cancelled_resolutions
        )?;
        writeln!(
            output,
            "Cache: {} hits, {} misses ({:.1}% hit rate)",
            self.cache_hits,
            self.cache_misses,
            self.cache_hit_rate() * 100.0
        )?;
        for (provider, stats) in &self.providers {
            writeln!(
                output,
                "  {provider}: {} attempts, {} ok, {} failed, avg {}ms",
                stats.attempts,
                stats.successes,
                stats.failure_count(),
                stats.avg_latency_ms()
            )?;
        }
        Ok(output)
    }
}
