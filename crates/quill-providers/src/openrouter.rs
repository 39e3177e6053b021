//! `OpenRouter` provider.
//!
//! One API key reaches many upstream models; the default is a strong,
//! inexpensive general model used as the second choice for synthesis.

use core::time::Duration;

use async_trait::async_trait;
use quill_core::{
    Error, Provider, ProviderResult, Response, Result, SynthesisRequest, TaskKind,
};
use reqwest::Client;

use crate::chat::{ChatEndpoint, complete};

/// `OpenRouter` API endpoint URL.
const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
/// Default upstream model.
const DEFAULT_MODEL: &str = "deepseek/deepseek-chat";
/// Attribution headers `OpenRouter` asks clients to send.
const ATTRIBUTION_HEADERS: &[(&str, &str)] = &[("X-Title", "Quill Synthesis Engine")];
/// Served task kinds.
const CAPABILITIES: &[TaskKind] = &[TaskKind::Synthesis, TaskKind::SimpleQa, TaskKind::ComplexQa];

/// `OpenRouter` API provider.
pub struct OpenRouterProvider {
    /// HTTP client for API requests.
    client: Client,
    /// `OpenRouter` API key.
    api_key: String,
    /// Upstream model route.
    model: String,
}

impl OpenRouterProvider {
    /// Registry identifier.
    pub const ID: &'static str = "openrouter";

    /// Creates a provider with the given API key.
    ///
    /// # Errors
    /// Returns an error if the API key is empty.
    pub fn new(api_key: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::MissingApiKey("OPENROUTER_API_KEY".to_owned()));
        }

        Ok(Self {
            client: Client::default(),
            api_key,
            model: DEFAULT_MODEL.to_owned(),
        })
    }

    /// Sets the upstream model route.
    #[must_use]
    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    /// Upstream model route.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Provider for OpenRouterProvider {
    fn id(&self) -> &str {
        Self::ID
    }

    fn capabilities(&self) -> &[TaskKind] {
        CAPABILITIES
    }

    async fn invoke(
        &self,
        request: &SynthesisRequest,
        timeout: Duration,
    ) -> ProviderResult<Response> {
        tracing::debug!("OpenRouter request: kind={} model={}", request.kind, self.model);
        let endpoint = ChatEndpoint {
            provider_id: Self::ID,
            url: OPENROUTER_API_URL,
            api_key: &self.api_key,
            model: &self.model,
            extra_headers: ATTRIBUTION_HEADERS,
        };
        complete(&self.client, &endpoint, request, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tests that creating a provider with an empty API key returns an error.
    #[test]
    fn test_new_with_empty_api_key() {
        let result = OpenRouterProvider::new(String::new());
        assert!(
            matches!(result, Err(Error::MissingApiKey(_))),
            "Empty API key should return MissingApiKey"
        );
    }

    #[test]
    fn test_capabilities_exclude_document_extraction() {
        let provider = OpenRouterProvider::new("sk-or-test".to_owned());
        assert!(provider.is_ok());
        if let Ok(provider) = provider {
            assert_eq!(provider.id(), "openrouter");
            assert!(provider.supports(TaskKind::Synthesis));
            assert!(!provider.supports(TaskKind::DocumentExtraction));
        }
    }
}
