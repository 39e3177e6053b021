//! Capability registry: which providers may serve a task kind, and in what order.
//!
//! Providers are instantiated once from configuration and shared by every
//! resolution. The registry owns the [`ProviderHealth`] flags the router
//! mutates, so ordering reflects the latest failures without global state.

use core::time::Duration;
use std::sync::Arc;

use quill_core::{Provider, ProviderSettings, QuillConfig, Result, RoutingOverrides, TaskKind};
use quill_providers::{AnthropicProvider, GroqProvider, MockProvider, OpenRouterProvider};

use crate::health::ProviderHealth;

/// Timeout given to the degraded generator; it never waits on I/O.
const FALLBACK_TIMEOUT: Duration = Duration::from_secs(1);

/// Static provider priority per task kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTable {
    overrides: RoutingOverrides,
}

impl RoutingTable {
    /// Built-in order: quality first for long-form work, speed first for simple QA.
    #[must_use]
    pub fn default_order(kind: TaskKind) -> &'static [&'static str] {
        match kind {
            TaskKind::Synthesis | TaskKind::ComplexQa | TaskKind::DocumentExtraction => &[
                AnthropicProvider::ID,
                OpenRouterProvider::ID,
                GroqProvider::ID,
            ],
            TaskKind::SimpleQa => &[
                GroqProvider::ID,
                OpenRouterProvider::ID,
                AnthropicProvider::ID,
            ],
        }
    }

    /// Table with per-kind overrides from configuration.
    #[must_use]
    pub const fn with_overrides(overrides: RoutingOverrides) -> Self {
        Self { overrides }
    }

    /// Provider ids in priority order for `kind`.
    #[must_use]
    pub fn order(&self, kind: TaskKind) -> Vec<&str> {
        self.overrides.for_kind(kind).map_or_else(
            || Self::default_order(kind).to_vec(),
            |ids| ids.iter().map(String::as_str).collect(),
        )
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::with_overrides(RoutingOverrides::default())
    }
}

/// A provider handle with the timeout to apply to each attempt.
#[derive(Clone)]
pub struct Candidate {
    /// Provider to invoke
    pub provider: Arc<dyn Provider>,
    /// Per-attempt timeout
    pub timeout: Duration,
}

impl Candidate {
    /// Provider identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        self.provider.id()
    }
}

/// Registry of real providers plus the degraded fallback.
pub struct CapabilityRegistry {
    slots: Vec<Candidate>,
    table: RoutingTable,
    fallback: Arc<MockProvider>,
    health: Arc<ProviderHealth>,
}

impl CapabilityRegistry {
    /// Empty registry using the given routing table.
    #[must_use]
    pub fn new(table: RoutingTable) -> Self {
        Self::with_health(table, Arc::new(ProviderHealth::new()))
    }

    /// Empty registry sharing an existing health registry.
    #[must_use]
    pub fn with_health(table: RoutingTable, health: Arc<ProviderHealth>) -> Self {
        Self {
            slots: Vec::new(),
            table,
            fallback: Arc::new(MockProvider),
            health,
        }
    }

    /// Builds every enabled provider that has an API key.
    ///
    /// Providers without a key are skipped with a warning; the registry is
    /// still usable and falls through to the degraded generator.
    #[must_use]
    pub fn from_config(config: &QuillConfig) -> Self {
        let mut registry = Self::new(RoutingTable::with_overrides(config.router.routing.clone()));
        let providers = &config.providers;

        registry.register_configured(
            AnthropicProvider::ID,
            &providers.anthropic,
            providers.api_key(AnthropicProvider::ID),
            |api_key, model| {
                let mut provider = AnthropicProvider::new(api_key)?;
                if let Some(model) = model {
                    provider = provider.with_model(model);
                }
                Ok(provider)
            },
        );
        registry.register_configured(
            OpenRouterProvider::ID,
            &providers.openrouter,
            providers.api_key(OpenRouterProvider::ID),
            |api_key, model| {
                let mut provider = OpenRouterProvider::new(api_key)?;
                if let Some(model) = model {
                    provider = provider.with_model(model);
                }
                Ok(provider)
            },
        );
        registry.register_configured(
            GroqProvider::ID,
            &providers.groq,
            providers.api_key(GroqProvider::ID),
            |api_key, model| {
                let mut provider = GroqProvider::new(api_key)?;
                if let Some(model) = model {
                    provider = provider.with_model(model);
                }
                Ok(provider)
            },
        );

        tracing::info!("Registered providers: {:?}", registry.provider_ids());
        registry
    }

    /// Builds and registers one configured provider, logging why it was skipped.
    fn register_configured<P, B>(
        &mut self,
        id: &str,
        settings: &ProviderSettings,
        api_key: Option<String>,
        build: B,
    ) where
        P: Provider + 'static,
        B: FnOnce(String, Option<String>) -> Result<P>,
    {
        if !settings.enabled {
            tracing::debug!("{id} disabled in configuration");
            return;
        }
        let Some(api_key) = api_key else {
            tracing::warn!("Skipping {id}: no API key in config or environment");
            return;
        };
        match build(api_key, settings.model.clone()) {
            Ok(provider) => self.register(Arc::new(provider), settings.timeout()),
            Err(error) => tracing::warn!("Skipping {id}: {error}"),
        }
    }

    /// Registers a provider, replacing any existing one with the same id.
    pub fn register(&mut self, provider: Arc<dyn Provider>, timeout: Duration) {
        if provider.is_degraded() {
            tracing::debug!("Ignoring degraded provider {}; fallback is built in", provider.id());
            return;
        }
        self.slots.retain(|slot| slot.id() != provider.id());
        self.slots.push(Candidate { provider, timeout });
    }

    /// Builder form of [`Self::register`].
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn Provider>, timeout: Duration) -> Self {
        self.register(provider, timeout);
        self
    }

    /// Shared health flags.
    #[must_use]
    pub const fn health(&self) -> &Arc<ProviderHealth> {
        &self.health
    }

    /// The degraded generator.
    #[must_use]
    pub fn fallback(&self) -> &MockProvider {
        &self.fallback
    }

    /// Ids of the registered real providers, in registration order.
    #[must_use]
    pub fn provider_ids(&self) -> Vec<String> {
        self.slots.iter().map(|slot| slot.id().to_owned()).collect()
    }

    /// Ordered candidates for `kind`, always ending with the degraded generator.
    ///
    /// Table order comes first, then any other capable provider in
    /// registration order. Disabled providers are left out and providers in a
    /// backoff window move behind the healthy ones.
    #[must_use]
    pub fn candidates_for(&self, kind: TaskKind) -> Vec<Candidate> {
        let order = self.table.order(kind);
        let mut ordered: Vec<&Candidate> = order
            .iter()
            .filter_map(|id| self.slots.iter().find(|slot| slot.id() == *id))
            .collect();
        for slot in &self.slots {
            if !order.contains(&slot.id()) {
                ordered.push(slot);
            }
        }

        let (healthy, backing_off): (Vec<&Candidate>, Vec<&Candidate>) = ordered
            .into_iter()
            .filter(|slot| slot.provider.supports(kind))
            .filter(|slot| !self.health.is_disabled(slot.id()))
            .partition(|slot| !self.health.in_backoff(slot.id()));

        let fallback: Arc<dyn Provider> = Arc::<MockProvider>::clone(&self.fallback);
        healthy
            .into_iter()
            .chain(backing_off)
            .cloned()
            .chain([Candidate {
                provider: fallback,
                timeout: FALLBACK_TIMEOUT,
            }])
            .collect()
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new(RoutingTable::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use quill_core::{ProviderError, ProviderResult, Response, SynthesisRequest};

    struct NamedProvider {
        id: &'static str,
        kinds: &'static [TaskKind],
    }

    #[async_trait]
    impl Provider for NamedProvider {
        fn id(&self) -> &str {
            self.id
        }

        fn capabilities(&self) -> &[TaskKind] {
            self.kinds
        }

        async fn invoke(
            &self,
            _request: &SynthesisRequest,
            _timeout: Duration,
        ) -> ProviderResult<Response> {
            Err(ProviderError::Unavailable("test provider".to_owned()))
        }
    }

    const QA_AND_SYNTHESIS: &[TaskKind] =
        &[TaskKind::Synthesis, TaskKind::SimpleQa, TaskKind::ComplexQa];
    const EVERY_KIND: &[TaskKind] = &TaskKind::all();

    fn registry() -> CapabilityRegistry {
        let mut registry = CapabilityRegistry::default();
        for id in ["groq", "anthropic", "openrouter"] {
            let kinds = if id == "anthropic" {
                EVERY_KIND
            } else {
                QA_AND_SYNTHESIS
            };
            registry.register(Arc::new(NamedProvider { id, kinds }), Duration::from_secs(5));
        }
        registry
    }

    fn ids(candidates: &[Candidate]) -> Vec<&str> {
        candidates.iter().map(Candidate::id).collect()
    }

    #[test]
    fn test_default_order_per_kind() {
        let registry = registry();
        assert_eq!(
            ids(&registry.candidates_for(TaskKind::Synthesis)),
            ["anthropic", "openrouter", "groq", "mock"]
        );
        assert_eq!(
            ids(&registry.candidates_for(TaskKind::SimpleQa)),
            ["groq", "openrouter", "anthropic", "mock"]
        );
    }

    #[test]
    fn test_capabilities_filter_candidates() {
        let registry = registry();
        assert_eq!(
            ids(&registry.candidates_for(TaskKind::DocumentExtraction)),
            ["anthropic", "mock"]
        );
    }

    #[test]
    fn test_disabled_provider_is_excluded() {
        let registry = registry();
        registry
            .health()
            .disable("anthropic", &ProviderError::AuthInvalid("401".to_owned()));
        assert_eq!(
            ids(&registry.candidates_for(TaskKind::Synthesis)),
            ["openrouter", "groq", "mock"]
        );
    }

    #[test]
    fn test_backoff_moves_provider_behind_healthy() {
        let registry = registry();
        let error = ProviderError::RateLimited { retry_after: None };
        registry
            .health()
            .start_backoff("anthropic", Duration::from_secs(60), &error);
        assert_eq!(
            ids(&registry.candidates_for(TaskKind::Synthesis)),
            ["openrouter", "groq", "anthropic", "mock"]
        );
    }

    #[test]
    fn test_degraded_provider_keeps_its_place() {
        let registry = registry();
        registry
            .health()
            .mark_degraded("anthropic", &ProviderError::Timeout(Duration::from_secs(5)));
        assert_eq!(
            ids(&registry.candidates_for(TaskKind::Synthesis))[0],
            "anthropic"
        );
    }

    #[test]
    fn test_overrides_and_unlisted_providers() {
        let overrides = RoutingOverrides {
            synthesis: Some(vec!["groq".to_owned(), "unknown".to_owned()]),
            ..RoutingOverrides::default()
        };
        let mut registry = CapabilityRegistry::new(RoutingTable::with_overrides(overrides));
        for id in ["anthropic", "groq"] {
            registry.register(
                Arc::new(NamedProvider { id, kinds: QA_AND_SYNTHESIS }),
                Duration::from_secs(5),
            );
        }
        assert_eq!(
            ids(&registry.candidates_for(TaskKind::Synthesis)),
            ["groq", "anthropic", "mock"]
        );
    }

    #[test]
    fn test_empty_registry_yields_fallback_only() {
        let registry = CapabilityRegistry::default();
        let candidates = registry.candidates_for(TaskKind::ComplexQa);
        assert_eq!(ids(&candidates), ["mock"]);
        assert!(candidates[0].provider.is_degraded());
    }

    #[test]
    fn test_register_replaces_and_ignores_mock() {
        let groq = || {
            Arc::new(NamedProvider {
                id: "groq",
                kinds: QA_AND_SYNTHESIS,
            })
        };
        let registry = CapabilityRegistry::default()
            .with_provider(groq(), Duration::from_secs(1))
            .with_provider(groq(), Duration::from_secs(9))
            .with_provider(Arc::new(MockProvider), Duration::from_secs(1));
        assert_eq!(registry.provider_ids(), ["groq"]);
        let candidates = registry.candidates_for(TaskKind::SimpleQa);
        assert_eq!(candidates[0].timeout, Duration::from_secs(9));
    }

    #[test]
    fn test_from_config_without_keys_registers_nothing() {
        let mut config = QuillConfig::default();
        config.providers.anthropic.enabled = false;
        config.providers.openrouter.enabled = false;
        config.providers.groq.enabled = false;
        let registry = CapabilityRegistry::from_config(&config);
        assert!(registry.provider_ids().is_empty());
    }

    #[test]
    fn test_from_config_with_keys() {
        let mut config = QuillConfig::default();
        config.providers.anthropic.api_key = Some("sk-ant-test".to_owned());
        config.providers.groq.api_key = Some("gsk-test".to_owned());
        config.providers.groq.model = Some("llama-3.1-8b-instant".to_owned());
        config.providers.openrouter.enabled = false;
        let registry = CapabilityRegistry::from_config(&config);
        assert_eq!(registry.provider_ids(), ["anthropic", "groq"]);
        let candidates = registry.candidates_for(TaskKind::SimpleQa);
        assert_eq!(candidates[0].timeout, Duration::from_secs(30));
    }
}
