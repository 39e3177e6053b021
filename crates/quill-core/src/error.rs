use core::result::Result as CoreResult;
use core::time::Duration;
use std::io::Error as IoError;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use toml::de::Error as TomlError;
use toml::ser::Error as TomlSerError;

/// Result type for core operations.
pub type Result<T> = CoreResult<T, Error>;

/// Result type returned by provider adapters.
pub type ProviderResult<T> = CoreResult<T, ProviderError>;

/// Errors that can occur in the core library.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// TOML deserialization failed.
    #[error("TOML deserialization error: {0}")]
    Toml(#[from] TomlError),

    /// TOML serialization failed.
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] TomlSerError),

    /// Configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Required API key was not found.
    #[error("API key not found: {0}")]
    MissingApiKey(String),
}

/// Failure of a single provider invocation.
///
/// Adapters never retry; they classify the failure so the router can decide
/// what to do next (see [`ProviderError::disposition`]).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The call did not complete within the provider's timeout.
    #[error("Provider timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The provider refused the call because of quota or rate limits.
    #[error("Provider rate limited the request")]
    RateLimited {
        /// Delay requested by the provider, when it sent one.
        retry_after: Option<Duration>,
    },

    /// Credentials were rejected.
    #[error("Provider rejected credentials: {0}")]
    AuthInvalid(String),

    /// Connection failure or server-side error.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// The provider answered with something that could not be used.
    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),
}

/// Fieldless discriminant of [`ProviderError`], used for metrics and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// See [`ProviderError::Timeout`].
    Timeout,
    /// See [`ProviderError::RateLimited`].
    RateLimited,
    /// See [`ProviderError::AuthInvalid`].
    AuthInvalid,
    /// See [`ProviderError::Unavailable`].
    Unavailable,
    /// See [`ProviderError::MalformedResponse`].
    MalformedResponse,
}

/// What the router does with a provider after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Transient: may be retried on the same provider, then marked degraded.
    RetrySameThenSkip,
    /// Rate limited: mark degraded, back off, move on.
    BackoffAndSkip,
    /// Configuration-class: never use this provider again in this process.
    DisableForProcess,
}

impl ProviderError {
    /// Classifies a non-success HTTP status returned by a provider API.
    pub fn from_status(status: u16, retry_after: Option<Duration>, body: &str) -> Self {
        let detail = format!("HTTP {status}: {}", truncate(body, 200));
        match status {
            401 | 403 => Self::AuthInvalid(detail),
            408 | 504 => Self::Timeout(Duration::ZERO),
            429 => Self::RateLimited { retry_after },
            500..=599 => Self::Unavailable(detail),
            _ => Self::MalformedResponse(detail),
        }
    }

    /// Returns the fieldless kind of this error.
    pub const fn kind(&self) -> ProviderErrorKind {
        match self {
            Self::Timeout(_) => ProviderErrorKind::Timeout,
            Self::RateLimited { .. } => ProviderErrorKind::RateLimited,
            Self::AuthInvalid(_) => ProviderErrorKind::AuthInvalid,
            Self::Unavailable(_) => ProviderErrorKind::Unavailable,
            Self::MalformedResponse(_) => ProviderErrorKind::MalformedResponse,
        }
    }

    /// Maps this failure onto the router's fallback policy.
    pub const fn disposition(&self) -> FailureDisposition {
        match self {
            Self::Timeout(_) | Self::Unavailable(_) => FailureDisposition::RetrySameThenSkip,
            Self::RateLimited { .. } => FailureDisposition::BackoffAndSkip,
            Self::AuthInvalid(_) | Self::MalformedResponse(_) => {
                FailureDisposition::DisableForProcess
            }
        }
    }

    /// Whether the same provider may be tried again for the same request.
    pub const fn is_retryable(&self) -> bool {
        matches!(self.disposition(), FailureDisposition::RetrySameThenSkip)
    }
}

/// Cuts `text` to at most `max_chars` characters on a char boundary.
fn truncate(text: &str, max_chars: usize) -> &str {
    text.char_indices()
        .nth(max_chars)
        .map_or(text, |(index, _)| &text[..index])
}
