//! Configuration for providers, cache, router and job engine.
//!
//! Loaded once at startup from `~/.quill/config.toml`. Every section has
//! defaults, so a partial file is valid.

use core::time::Duration;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result, TaskKind};

/// Longest cache lifetime accepted for any task kind (30 days).
pub const MAX_CACHE_TTL_SECONDS: u64 = 30 * 24 * 3600;
/// Longest finished-job retention accepted (30 days).
pub const MAX_RETENTION_MINUTES: u64 = 30 * 24 * 60;
/// Longest default rate-limit backoff accepted (one hour).
pub const MAX_RATE_LIMIT_BACKOFF_MS: u64 = 3600 * 1000;

/// Complete engine configuration.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuillConfig {
    /// Provider credentials and timeouts
    pub providers: ProvidersConfig,
    /// Response cache configuration
    pub cache: CacheConfig,
    /// Fallback router configuration
    pub router: RouterConfig,
    /// Job engine configuration
    pub jobs: JobsConfig,
}

/// Settings for every known provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Anthropic Messages API
    pub anthropic: ProviderSettings,
    /// `OpenRouter` chat completions
    pub openrouter: ProviderSettings,
    /// Groq chat completions
    pub groq: ProviderSettings,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            anthropic: ProviderSettings::with_timeout(120),
            openrouter: ProviderSettings::with_timeout(90),
            groq: ProviderSettings::with_timeout(30),
        }
    }
}

impl ProvidersConfig {
    /// Get API key for a provider, checking config first, then environment variables
    pub fn api_key(&self, provider: &str) -> Option<String> {
        let (settings, env_key) = match provider {
            "anthropic" => (&self.anthropic, "ANTHROPIC_API_KEY"),
            "openrouter" => (&self.openrouter, "OPENROUTER_API_KEY"),
            "groq" => (&self.groq, "GROQ_API_KEY"),
            _ => return None,
        };
        settings
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .or_else(|| env::var(env_key).ok().filter(|key| !key.is_empty()))
    }
}

/// Per-provider settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Whether the provider is registered at all
    pub enabled: bool,
    /// API key; falls back to the provider's environment variable
    pub api_key: Option<String>,
    /// Model override
    pub model: Option<String>,
    /// Per-attempt timeout in seconds
    pub timeout_seconds: u64,
}

impl ProviderSettings {
    /// Enabled settings with the given timeout.
    #[must_use]
    pub const fn with_timeout(timeout_seconds: u64) -> Self {
        Self {
            enabled: true,
            api_key: None,
            model: None,
            timeout_seconds,
        }
    }

    /// Per-attempt timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self::with_timeout(60)
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether caching is enabled
    pub enabled: bool,
    /// Maximum number of entries
    pub capacity: usize,
    /// Time-to-live per task kind
    pub ttl: CacheTtlConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 512,
            ttl: CacheTtlConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Time-to-live for entries of `kind`, capped at [`MAX_CACHE_TTL_SECONDS`].
    #[must_use]
    pub const fn ttl_for(&self, kind: TaskKind) -> Duration {
        let seconds = self.ttl.seconds_for(kind);
        if seconds > MAX_CACHE_TTL_SECONDS {
            Duration::from_secs(MAX_CACHE_TTL_SECONDS)
        } else {
            Duration::from_secs(seconds)
        }
    }
}

/// Cache lifetimes in seconds. Synthesis is the most expensive to recompute
/// and lives longest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheTtlConfig {
    /// Synthesis entries
    pub synthesis_seconds: u64,
    /// Simple QA entries
    pub simple_qa_seconds: u64,
    /// Complex QA entries
    pub complex_qa_seconds: u64,
    /// Document extraction entries
    pub document_extraction_seconds: u64,
}

impl CacheTtlConfig {
    /// Configured lifetime for `kind`, in seconds.
    #[must_use]
    pub const fn seconds_for(&self, kind: TaskKind) -> u64 {
        match kind {
            TaskKind::Synthesis => self.synthesis_seconds,
            TaskKind::SimpleQa => self.simple_qa_seconds,
            TaskKind::ComplexQa => self.complex_qa_seconds,
            TaskKind::DocumentExtraction => self.document_extraction_seconds,
        }
    }
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            synthesis_seconds: 24 * 3600,
            simple_qa_seconds: 10 * 60,
            complex_qa_seconds: 3600,
            document_extraction_seconds: 12 * 3600,
        }
    }
}

/// Fallback router configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Backoff applied to a rate-limited provider without `Retry-After`
    pub rate_limit_backoff_ms: u64,
    /// Extra attempts on the same provider after a timeout or outage
    pub same_provider_retries: u32,
    /// Candidate order overrides per task kind
    pub routing: RoutingOverrides,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            rate_limit_backoff_ms: 30_000,
            same_provider_retries: 0,
            routing: RoutingOverrides::default(),
        }
    }
}

impl RouterConfig {
    /// Default backoff for rate-limited providers.
    #[must_use]
    pub const fn rate_limit_backoff(&self) -> Duration {
        Duration::from_millis(self.rate_limit_backoff_ms)
    }
}

/// Provider order overrides; `None` keeps the built-in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingOverrides {
    /// Order for synthesis
    pub synthesis: Option<Vec<String>>,
    /// Order for simple QA
    pub simple_qa: Option<Vec<String>>,
    /// Order for complex QA
    pub complex_qa: Option<Vec<String>>,
    /// Order for document extraction
    pub document_extraction: Option<Vec<String>>,
}

impl RoutingOverrides {
    /// Override for `kind`, if configured.
    #[must_use]
    pub fn for_kind(&self, kind: TaskKind) -> Option<&[String]> {
        match kind {
            TaskKind::Synthesis => self.synthesis.as_deref(),
            TaskKind::SimpleQa => self.simple_qa.as_deref(),
            TaskKind::ComplexQa => self.complex_qa.as_deref(),
            TaskKind::DocumentExtraction => self.document_extraction.as_deref(),
        }
    }
}

/// Job engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Maximum number of jobs resolving at once; the rest wait as `Pending`
    pub max_concurrent_jobs: usize,
    /// Per-job event channel capacity
    pub event_buffer: usize,
    /// How long finished jobs stay queryable
    pub retention_minutes: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 8,
            event_buffer: 64,
            retention_minutes: 60,
        }
    }
}

impl JobsConfig {
    /// Retention window for finished jobs.
    #[must_use]
    pub const fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_minutes.saturating_mul(60))
    }
}

impl QuillConfig {
    /// Get the default config directory path (`~/.quill`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("Could not determine home directory".to_owned()))?;
        Ok(home.join(".quill"))
    }

    /// Get the default config file path (`~/.quill/config.toml`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load config from the default location, creating it with defaults if missing.
    ///
    /// # Errors
    /// Returns an error if the config cannot be read or created
    pub fn load_or_create() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            let config = Self::default();
            config.save_to_file(&config_path)?;
            Ok(config)
        }
    }

    /// Load config from a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;

        tracing::debug!(
            "Loaded config from {:?}: anthropic={}, openrouter={}, groq={}",
            path,
            key_status(config.providers.api_key("anthropic").is_some()),
            key_status(config.providers.api_key("openrouter").is_some()),
            key_status(config.providers.api_key("groq").is_some()),
        );

        Ok(config)
    }

    /// Save config to a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be written
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        let header = "# Quill Configuration File\n\
                      # This file is automatically generated on first run\n\
                      # Edit this file to customize your settings\n\n";

        fs::write(path, format!("{header}{contents}"))?;
        Ok(())
    }

    /// Rejects values the engine cannot run with.
    ///
    /// # Errors
    /// Returns [`Error::Config`] naming the first invalid field
    pub fn validate(&self) -> Result<()> {
        if self.jobs.max_concurrent_jobs == 0 {
            return Err(Error::Config(
                "jobs.max_concurrent_jobs must be at least 1".to_owned(),
            ));
        }
        if self.jobs.event_buffer == 0 {
            return Err(Error::Config("jobs.event_buffer must be at least 1".to_owned()));
        }
        if self.jobs.retention_minutes > MAX_RETENTION_MINUTES {
            return Err(Error::Config(format!(
                "jobs.retention_minutes must be at most {MAX_RETENTION_MINUTES}"
            )));
        }
        if self.router.rate_limit_backoff_ms > MAX_RATE_LIMIT_BACKOFF_MS {
            return Err(Error::Config(format!(
                "router.rate_limit_backoff_ms must be at most {MAX_RATE_LIMIT_BACKOFF_MS}"
            )));
        }
        for kind in TaskKind::all() {
            if self.cache.ttl.seconds_for(kind) > MAX_CACHE_TTL_SECONDS {
                return Err(Error::Config(format!(
                    "cache.ttl.{kind}_seconds must be at most {MAX_CACHE_TTL_SECONDS}"
                )));
            }
        }
        for (name, settings) in [
            ("anthropic", &self.providers.anthropic),
            ("openrouter", &self.providers.openrouter),
            ("groq", &self.providers.groq),
        ] {
            if settings.enabled && settings.timeout_seconds == 0 {
                return Err(Error::Config(format!(
                    "providers.{name}.timeout_seconds must be positive"
                )));
            }
        }
        Ok(())
    }
}

/// Renders key presence for logs without leaking the key.
const fn key_status(present: bool) -> &'static str {
    if present { "present" } else { "missing" }
}
