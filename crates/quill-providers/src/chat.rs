use core::time::Duration;
use std::time::Instant;

use quill_core::prompts::{max_output_tokens, system_prompt, user_message};
use quill_core::{ProviderError, ProviderResult, Response, SynthesisRequest, TokenUsage};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::http::{check_status, classify_transport, decode};

/// Output budget when the request sets no target length.
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Where and how to send an OpenAI-compatible chat completion.
pub(crate) struct ChatEndpoint<'endpoint> {
    /// Provider identifier reported as `served_by`.
    pub provider_id: &'endpoint str,
    /// Full completions URL.
    pub url: &'endpoint str,
    /// Bearer token.
    pub api_key: &'endpoint str,
    /// Model identifier.
    pub model: &'endpoint str,
    /// Extra headers some services expect.
    pub extra_headers: &'endpoint [(&'static str, &'static str)],
}

/// Request payload for OpenAI-compatible chat completion APIs.
#[derive(Debug, Serialize)]
struct ChatRequest<'body> {
    /// Model identifier.
    model: &'body str,
    /// System and user messages.
    messages: Vec<ChatMessage>,
    /// Sampling temperature.
    temperature: f32,
    /// Maximum completion tokens.
    max_tokens: u32,
}

/// One chat message.
#[derive(Debug, Serialize)]
struct ChatMessage {
    /// `system` or `user`.
    role: &'static str,
    /// Message text.
    content: String,
}

/// Response payload returned by the completion API.
#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    /// Candidate completions.
    choices: Vec<ChatChoice>,
    /// Token accounting, absent on some routes.
    #[serde(default)]
    usage: Option<ChatUsage>,
}

/// A single completion choice.
#[derive(Debug, Deserialize)]
struct ChatChoice {
    /// Generated message.
    message: ChatResponseMessage,
}

/// Generated message body.
#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    /// Generated text; null when the model refused or produced tool calls.
    #[serde(default)]
    content: Option<String>,
}

/// Token usage for a completion.
#[derive(Debug, Deserialize)]
struct ChatUsage {
    /// Prompt tokens.
    prompt_tokens: u64,
    /// Completion tokens.
    completion_tokens: u64,
}

impl ChatResponse {
    /// Extracts the first non-empty completion.
    ///
    /// # Errors
    /// Returns `MalformedResponse` when no choice carries text.
    pub(crate) fn into_text_and_usage(self) -> ProviderResult<(String, TokenUsage)> {
        let text = self
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| ProviderError::MalformedResponse("No completion text".to_owned()))?;

        let usage = self.usage.map_or_else(TokenUsage::default, |usage| TokenUsage {
            input: usage.prompt_tokens,
            output: usage.completion_tokens,
        });

        Ok((text, usage))
    }
}

/// Sends one chat completion and normalizes the result.
///
/// # Errors
/// Returns a classified [`ProviderError`] for transport, status, or body failures.
pub(crate) async fn complete(
    client: &Client,
    endpoint: &ChatEndpoint<'_>,
    request: &SynthesisRequest,
    timeout: Duration,
) -> ProviderResult<Response> {
    let start = Instant::now();

    let body = ChatRequest {
        model: endpoint.model,
        messages: vec![
            ChatMessage {
                role: "system",
                content: system_prompt(request.kind),
            },
            ChatMessage {
                role: "user",
                content: user_message(request),
            },
        ],
        temperature: 0.4,
        max_tokens: max_output_tokens(&request.options, DEFAULT_MAX_TOKENS),
    };

    let mut builder = client
        .post(endpoint.url)
        .bearer_auth(endpoint.api_key)
        .timeout(timeout)
        .json(&body);
    for (name, value) in endpoint.extra_headers {
        builder = builder.header(*name, *value);
    }

    let response = builder
        .send()
        .await
        .map_err(|error| classify_transport(&error, timeout))?;
    let response = check_status(response, timeout).await?;
    let parsed: ChatResponse = decode(response, timeout).await?;
    let (text, tokens_used) = parsed.into_text_and_usage()?;

    Ok(Response {
        text,
        provider: endpoint.provider_id.to_owned(),
        degraded: false,
        tokens_used,
        latency_ms: start.elapsed().as_millis() as u64,
    })
}
