//! Common test utilities and helpers for quill-jobs tests
#![cfg_attr(
    test,
    allow(
        dead_code,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::tests_outside_test_module,
        reason = "Test allows"
    )
)]

use core::time::Duration;
use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use quill_core::{
    IgnoreLock as _, JobsConfig, Provider, ProviderError, ProviderResult, Response, RouterConfig,
    SynthesisRequest, TaskKind, TokenUsage,
};
use quill_jobs::{EngineError, InMemoryResultStore, JobEngine, JobId, JobResult, ResultStore};
use quill_routing::{CapabilityRegistry, FallbackRouter, ResponseCache};
use tokio::time::sleep;
use tracing_subscriber::{EnvFilter, fmt};

/// Timeout given to test providers.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

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

/// What a [`TestProvider`] does when invoked.
#[derive(Clone)]
pub enum Behavior {
    /// Answer successfully.
    Succeed,
    /// Fail with the given error.
    Fail(ProviderError),
    /// Panic inside the worker task.
    Panic,
}

/// Provider with a fixed behaviour, an optional delay and a call log.
pub struct TestProvider {
    id: &'static str,
    behavior: Behavior,
    delay: Duration,
    calls: AtomicUsize,
    last_request: Mutex<Option<SynthesisRequest>>,
}

impl TestProvider {
    /// Provider with the given behaviour and no delay.
    pub fn new(id: &'static str, behavior: Behavior) -> Self {
        Self {
            id,
            behavior,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Sleeps before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of invocations so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most recent request received.
    pub fn last_request(&self) -> Option<SynthesisRequest> {
        self.last_request.with_lock(|last| last.clone())
    }
}

#[async_trait]
impl Provider for TestProvider {
    fn id(&self) -> &str {
        self.id
    }

    fn capabilities(&self) -> &[TaskKind] {
        const KINDS: &[TaskKind] = &TaskKind::all();
        KINDS
    }

    async fn invoke(
        &self,
        request: &SynthesisRequest,
        _timeout: Duration,
    ) -> ProviderResult<Response> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_request
            .with_lock(|last| *last = Some(request.clone()));
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        match &self.behavior {
            Behavior::Succeed => Ok(Response {
                text: format!("{} on {}", self.id, request.payload.text),
                provider: self.id.to_owned(),
                degraded: false,
                tokens_used: TokenUsage {
                    input: 12,
                    output: 48,
                },
                latency_ms: 7,
            }),
            Behavior::Fail(error) => Err(error.clone()),
            Behavior::Panic => panic!("provider {} exploded", self.id),
        }
    }
}

/// Router over `providers` in registration order.
pub fn router_with(providers: &[Arc<TestProvider>]) -> Arc<FallbackRouter> {
    let mut registry = CapabilityRegistry::default();
    for provider in providers {
        registry.register(Arc::<TestProvider>::clone(provider), TEST_TIMEOUT);
    }
    Arc::new(FallbackRouter::new(
        Arc::new(registry),
        Arc::new(ResponseCache::default()),
        RouterConfig::default(),
    ))
}

/// Engine over `providers` with an in-memory store.
pub fn engine_with(
    providers: &[Arc<TestProvider>],
    config: JobsConfig,
) -> (JobEngine, Arc<InMemoryResultStore>) {
    let store = Arc::new(InMemoryResultStore::new());
    let engine = JobEngine::new(
        router_with(providers),
        Arc::<InMemoryResultStore>::clone(&store),
        config,
    );
    (engine, store)
}

/// Store that rejects every result.
#[derive(Default)]
pub struct RejectingStore;

#[async_trait]
impl ResultStore for RejectingStore {
    async fn save_result(&self, _job_id: JobId, _result: &JobResult) -> quill_jobs::Result<()> {
        Err(EngineError::Store("database unavailable".to_owned()))
    }
}
