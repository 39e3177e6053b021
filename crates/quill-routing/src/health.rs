//! Shared provider health flags.
//!
//! Owned by the capability registry and mutated only by the fallback router.
//! Degradation is optimistic: a degraded provider stays in the candidate list
//! and is cleared by its next success. Only configuration-class failures
//! disable a provider for the rest of the process.

use core::time::Duration;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use quill_core::{IgnoreLock as _, ProviderError, ProviderErrorKind};

/// Longest backoff window a single rate limit can start.
pub const MAX_BACKOFF: Duration = Duration::from_secs(3600);

/// Mutable health state for one provider.
#[derive(Debug, Clone, Default)]
struct HealthState {
    /// Last attempt failed with a transient error.
    degraded: bool,
    /// Deprioritized until this instant after a rate limit.
    backoff_until: Option<Instant>,
    /// Set after a configuration-class failure; never cleared.
    disabled: Option<ProviderErrorKind>,
    /// Failures since the last success.
    consecutive_failures: u32,
    /// Display text of the most recent failure.
    last_error: Option<String>,
}

/// Point-in-time view of one provider's health.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthSnapshot {
    /// Provider identifier
    pub provider: String,
    /// Whether the last attempt failed transiently
    pub degraded: bool,
    /// Whether the provider is inside a rate-limit backoff window
    pub in_backoff: bool,
    /// Whether the provider is disabled for the process lifetime
    pub disabled: bool,
    /// Failures since the last success
    pub consecutive_failures: u32,
    /// Most recent failure, if any
    pub last_error: Option<String>,
}

/// Health registry shared by all concurrent resolutions.
#[derive(Debug, Default)]
pub struct ProviderHealth {
    states: Mutex<HashMap<String, HealthState>>,
}

impl ProviderHealth {
    /// Creates an empty registry; unknown providers are healthy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the degraded flag and failure streak after a success.
    pub fn record_success(&self, provider: &str) {
        self.states.with_lock(|states| {
            let state = states.entry(provider.to_owned()).or_default();
            state.degraded = false;
            state.consecutive_failures = 0;
        });
    }

    /// Marks a provider degraded after a timeout or outage.
    pub fn mark_degraded(&self, provider: &str, error: &ProviderError) {
        self.update_failed(provider, error, |_| {});
    }

    /// Marks a provider degraded and deprioritizes it for `duration`.
    ///
    /// The window is capped at [`MAX_BACKOFF`].
    pub fn start_backoff(&self, provider: &str, duration: Duration, error: &ProviderError) {
        let until = Instant::now().checked_add(duration.min(MAX_BACKOFF));
        if until.is_none() {
            tracing::warn!("Backoff for {provider} overflows the clock; marking degraded only");
        }
        self.update_failed(provider, error, |state| {
            if let Some(until) = until {
                state.backoff_until =
                    Some(state.backoff_until.map_or(until, |current| current.max(until)));
            }
        });
    }

    /// Disables a provider for the rest of the process.
    pub fn disable(&self, provider: &str, error: &ProviderError) {
        let kind = error.kind();
        self.update_failed(provider, error, |state| state.disabled = Some(kind));
    }

    /// Whether the provider's last attempt failed.
    pub fn is_degraded(&self, provider: &str) -> bool {
        self.states
            .with_lock(|states| states.get(provider).is_some_and(|state| state.degraded))
    }

    /// Whether the provider is disabled for the process lifetime.
    pub fn is_disabled(&self, provider: &str) -> bool {
        self.states
            .with_lock(|states| states.get(provider).is_some_and(|state| state.disabled.is_some()))
    }

    /// Whether the provider is inside a rate-limit backoff window.
    pub fn in_backoff(&self, provider: &str) -> bool {
        let now = Instant::now();
        self.states.with_lock(|states| {
            states
                .get(provider)
                .and_then(|state| state.backoff_until)
                .is_some_and(|until| until > now)
        })
    }

    /// Snapshot of one provider.
    pub fn snapshot(&self, provider: &str) -> HealthSnapshot {
        let now = Instant::now();
        self.states.with_lock(|states| {
            let state = states.get(provider).cloned().unwrap_or_default();
            to_snapshot(provider, &state, now)
        })
    }

    /// Snapshots of every provider that has reported at least once, sorted by id.
    pub fn snapshots(&self) -> Vec<HealthSnapshot> {
        let now = Instant::now();
        let mut snapshots = self.states.with_lock(|states| {
            states
                .iter()
                .map(|(provider, state)| to_snapshot(provider, state, now))
                .collect::<Vec<_>>()
        });
        snapshots.sort_by(|left, right| left.provider.cmp(&right.provider));
        snapshots
    }

    fn update_failed<F: FnOnce(&mut HealthState)>(
        &self,
        provider: &str,
        error: &ProviderError,
        extra: F,
    ) {
        self.states.with_lock(|states| {
            let state = states.entry(provider.to_owned()).or_default();
            state.degraded = true;
            state.consecutive_failures = state.consecutive_failures.saturating_add(1);
            state.last_error = Some(error.to_string());
            extra(state);
        });
    }
}

fn to_snapshot(provider: &str, state: &HealthState, now: Instant) -> HealthSnapshot {
    HealthSnapshot {
        provider: provider.to_owned(),
        degraded: state.degraded,
        in_backoff: state.backoff_until.is_some_and(|until| until > now),
        disabled: state.disabled.is_some(),
        consecutive_failures: state.consecutive_failures,
        last_error: state.last_error.clone(),
    }
}
