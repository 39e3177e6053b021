//! Provider adapters for external AI services.

/// Anthropic Messages API provider.
pub mod anthropic;
/// Shared client for OpenAI-compatible chat completion APIs.
mod chat;
/// Groq provider implementation.
pub mod groq;
/// HTTP failure classification shared by the adapters.
mod http;
/// Degraded-mode placeholder generator.
pub mod mock;
/// `OpenRouter` multi-model provider.
pub mod openrouter;

pub use anthropic::AnthropicProvider;
pub use groq::GroqProvider;
pub use mock::{DEGRADED_BANNER, MockProvider};
pub use openrouter::OpenRouterProvider;
