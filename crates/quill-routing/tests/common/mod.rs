//! Common test utilities and helpers for quill-routing tests
#![cfg_attr(
    test,
    allow(
        dead_code,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::missing_panics_doc,
        clippy::tests_outside_test_module,
        reason = "Test allows"
    )
)]

use core::time::Duration;
use std::collections::VecDeque;
use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use quill_core::{
    IgnoreLock as _, Provider, ProviderError, ProviderResult, Response, RouterConfig,
    SynthesisRequest, TaskKind, TokenUsage,
};
use quill_routing::{CapabilityRegistry, FallbackRouter, ResponseCache, RouteObserver, RouteStep};
use tokio::time::sleep;
use tracing_subscriber::{EnvFilter, fmt};

/// Timeout given to scripted providers.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(2);

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests (idempotent).
/// Honors `RUST_LOG` if set, otherwise defaults to "debug".
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let filter = env::var("RUST_LOG").unwrap_or_else(|_| "debug".to_owned());
        if fmt()
            .with_env_filter(EnvFilter::new(filter))
            .with_test_writer()
            .try_init()
            .is_err()
        {
            // tracing already initialized in this process
        }
    });
}

/// Provider that plays back a script of outcomes, then repeats the last one.
pub struct ScriptedProvider {
    id: &'static str,
    kinds: Vec<TaskKind>,
    script: Mutex<VecDeque<ProviderResult<()>>>,
    fallback: ProviderResult<()>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    /// Provider that always returns `outcome`.
    pub fn always(id: &'static str, outcome: ProviderResult<()>) -> Self {
        Self {
            id,
            kinds: TaskKind::all().to_vec(),
            script: Mutex::new(VecDeque::new()),
            fallback: outcome,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Provider that always succeeds.
    pub fn ok(id: &'static str) -> Self {
        Self::always(id, Ok(()))
    }

    /// Provider that always fails with `error`.
    pub fn failing(id: &'static str, error: ProviderError) -> Self {
        Self::always(id, Err(error))
    }

    /// Plays `outcomes` first, then the fixed outcome.
    #[must_use]
    pub fn with_script(self, outcomes: Vec<ProviderResult<()>>) -> Self {
        self.script.with_lock(|script| script.extend(outcomes));
        self
    }

    /// Sleeps before every answer.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Restricts the served task kinds.
    #[must_use]
    pub fn with_kinds(mut self, kinds: &[TaskKind]) -> Self {
        self.kinds = kinds.to_vec();
        self
    }

    /// Number of invocations so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Wraps the provider for registration.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn id(&self) -> &str {
        self.id
    }

    fn capabilities(&self) -> &[TaskKind] {
        &self.kinds
    }

    async fn invoke(
        &self,
        request: &SynthesisRequest,
        _timeout: Duration,
    ) -> ProviderResult<Response> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        let outcome = self
            .script
            .with_lock(VecDeque::pop_front)
            .unwrap_or_else(|| self.fallback.clone());
        outcome.map(|()| Response {
            text: format!("{} answer: {}", self.id, request.payload.text),
            provider: self.id.to_owned(),
            degraded: false,
            tokens_used: TokenUsage {
                input: 10,
                output: 20,
            },
            latency_ms: 5,
        })
    }
}

/// Router over `providers`, registered in order, with a default cache.
pub fn router_with(providers: &[Arc<ScriptedProvider>], config: RouterConfig) -> FallbackRouter {
    let mut registry = CapabilityRegistry::default();
    for provider in providers {
        registry.register(Arc::<ScriptedProvider>::clone(provider), TEST_TIMEOUT);
    }
    FallbackRouter::new(
        Arc::new(registry),
        Arc::new(ResponseCache::default()),
        config,
    )
}

/// Observer that records every step.
#[derive(Default)]
pub struct RecordingObserver {
    steps: Mutex<Vec<RouteStep>>,
}

impl RecordingObserver {
    /// Steps seen so far.
    pub fn steps(&self) -> Vec<RouteStep> {
        self.steps.with_lock(|steps| steps.clone())
    }
}

impl RouteObserver for RecordingObserver {
    fn on_step(&self, step: &RouteStep) {
        self.steps.with_lock(|steps| steps.push(step.clone()));
    }
}
