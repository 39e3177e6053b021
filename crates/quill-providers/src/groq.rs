use core::time::Duration;

use async_trait::async_trait;
use quill_core::{
    Error, Provider, ProviderResult, Response, Result, SynthesisRequest, TaskKind,
};
use reqwest::Client;

use crate::chat::{ChatEndpoint, complete};

/// Groq API endpoint URL.
const GROQ_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
/// Default model for Groq.
const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
/// Env var key for Groq API key.
const ENV_GROQ_API_KEY: &str = "GROQ_API_KEY";
/// Fast and cheap; not trusted with document extraction.
const CAPABILITIES: &[TaskKind] = &[TaskKind::SimpleQa, TaskKind::ComplexQa, TaskKind::Synthesis];

/// Groq API provider (free tier with rate limits).
pub struct GroqProvider {
    /// HTTP client for API requests.
    client: Client,
    /// Groq API key.
    api_key: String,
    /// Model name to use.
    model: String,
    /// Completions URL.
    url: String,
}

impl GroqProvider {
    /// Registry identifier.
    pub const ID: &'static str = "groq";

    /// Creates a new `GroqProvider` with the given API key.
    ///
    /// # Errors
    ///
    /// Returns an error if the provided API key is empty.
    pub fn new(api_key: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::MissingApiKey(ENV_GROQ_API_KEY.to_owned()));
        }

        Ok(Self {
            client: Client::default(),
            api_key,
            model: DEFAULT_MODEL.to_owned(),
            url: GROQ_API_URL.to_owned(),
        })
    }

    /// Sets the model to use for generation.
    #[must_use]
    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    /// Points the adapter at a different completions URL (proxies, gateways).
    #[must_use]
    pub fn with_url(mut self, url: String) -> Self {
        self.url = url;
        self
    }

    /// Model this adapter sends requests to.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Provider for GroqProvider {
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
        tracing::debug!("Groq request: kind={} model={}", request.kind, self.model);
        let endpoint = ChatEndpoint {
            provider_id: Self::ID,
            url: &self.url,
            api_key: &self.api_key,
            model: &self.model,
            extra_headers: &[],
        };
        complete(&self.client, &endpoint, request, timeout).await
    }
}
