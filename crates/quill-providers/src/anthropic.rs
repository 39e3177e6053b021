use core::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use quill_core::prompts::{max_output_tokens, system_prompt, user_message};
use quill_core::{
    Error, Provider, ProviderError, ProviderResult, Response, Result, SynthesisRequest, TaskKind,
    TokenUsage,
};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::http::{check_status, classify_transport, decode};

/// Anthropic Messages API endpoint.
const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
/// Default model.
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
/// API version header value.
const API_VERSION: &str = "2023-06-01";
/// Output budget when the request sets no target length.
const DEFAULT_MAX_TOKENS: u32 = 8192;
/// Highest-quality provider; the only one trusted with document extraction.
const CAPABILITIES: &[TaskKind] = &[
    TaskKind::Synthesis,
    TaskKind::SimpleQa,
    TaskKind::ComplexQa,
    TaskKind::DocumentExtraction,
];

/// Anthropic Claude provider.
pub struct AnthropicProvider {
    /// HTTP client for API requests.
    client: Client,
    /// Anthropic API key.
    api_key: String,
    /// Model identifier.
    model: String,
}

impl AnthropicProvider {
    /// Registry identifier.
    pub const ID: &'static str = "anthropic";

    /// Creates a provider with the given API key.
    ///
    /// # Errors
    /// Returns an error if the API key is empty.
    pub fn new(api_key: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::MissingApiKey("ANTHROPIC_API_KEY".to_owned()));
        }

        Ok(Self {
            client: Client::default(),
            api_key,
            model: DEFAULT_MODEL.to_owned(),
        })
    }

    /// Sets the model identifier.
    #[must_use]
    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
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
        let start = Instant::now();
        tracing::debug!("Anthropic request: kind={} model={}", request.kind, self.model);

        let request_body = json!({
            "model": self.model,
            "max_tokens": max_output_tokens(&request.options, DEFAULT_MAX_TOKENS),
            "system": system_prompt(request.kind),
            "messages": [
                {
                    "role": "user",
                    "content": user_message(request)
                }
            ]
        });

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .timeout(timeout)
            .json(&request_body)
            .send()
            .await
            .map_err(|error| classify_transport(&error, timeout))?;
        let response = check_status(response, timeout).await?;
        let api_response: AnthropicResponse = decode(response, timeout).await?;

        let text = api_response
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        if text.trim().is_empty() {
            return Err(ProviderError::MalformedResponse(
                "No text content in response".to_owned(),
            ));
        }

        Ok(Response {
            text,
            provider: Self::ID.to_owned(),
            degraded: false,
            tokens_used: TokenUsage {
                input: api_response.usage.input_tokens,
                output: api_response.usage.output_tokens,
            },
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Messages API response body.
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    /// Content blocks in output order.
    content: Vec<ContentBlock>,
    /// Token accounting.
    usage: Usage,
}

/// A content block; only text blocks carry output.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    /// Generated text.
    Text {
        /// Block text.
        text: String,
    },
    /// Any block type this adapter does not consume.
    #[serde(other)]
    Other,
}

/// Token usage for a message.
#[derive(Debug, Deserialize)]
struct Usage {
    /// Prompt tokens.
    input_tokens: u64,
    /// Completion tokens.
    output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::from_str;

    #[test]
    fn test_new_with_empty_api_key() {
        assert!(matches!(
            AnthropicProvider::new(String::new()),
            Err(Error::MissingApiKey(_))
        ));
    }

    #[test]
    fn test_serves_every_kind() {
        let provider = AnthropicProvider::new("sk-ant-test".to_owned());
        assert!(provider.is_ok());
        if let Ok(provider) = provider {
            for kind in TaskKind::all() {
                assert!(provider.supports(kind), "anthropic should serve {kind}");
            }
        }
    }

    #[test]
    fn test_parse_mixed_content_blocks() {
        let json = r#"{
            "content": [
                { "type": "thinking", "thinking": "..." },
                { "type": "text", "text": "Final answer" }
            ],
            "usage": { "input_tokens": 20, "output_tokens": 5 }
        }"#;
        let parsed = from_str::<AnthropicResponse>(json);
        assert!(parsed.is_ok(), "should parse: {parsed:?}");
        if let Ok(parsed) = parsed {
            assert_eq!(parsed.content.len(), 2);
            assert!(matches!(parsed.content[0], ContentBlock::Other));
            assert_eq!(parsed.usage.output_tokens, 5);
        }
    }
}
