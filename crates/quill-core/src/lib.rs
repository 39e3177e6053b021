//! Core types and traits for the quill synthesis engine.
//!
//! This crate provides the request/response model, provider error
//! classification, configuration, and the [`Provider`] trait implemented by
//! every AI backend adapter.

/// Configuration loading and defaults.
pub mod config;
/// Error types and result definitions.
pub mod error;
/// Prompt templates shared by provider adapters.
pub mod prompts;
/// Synchronization helpers for poisoned locks.
pub mod sync;
/// Trait definitions for AI providers.
pub mod traits;
/// Core data types for requests and responses.
pub mod types;

pub use config::{
    CacheConfig, CacheTtlConfig, JobsConfig, MAX_CACHE_TTL_SECONDS, MAX_RATE_LIMIT_BACKOFF_MS,
    MAX_RETENTION_MINUTES, ProviderSettings, ProvidersConfig, QuillConfig, RouterConfig,
    RoutingOverrides,
};
pub use error::{Error, FailureDisposition, ProviderError, ProviderErrorKind, ProviderResult, Result};
pub use sync::IgnoreLock;
pub use traits::Provider;
pub use types::{
    EvidenceLevel, Payload, Response, SynthesisOptions, SynthesisRequest, TaskKind, TokenUsage,
};
