//! Command handlers for CLI operations

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use quill_core::{Payload, QuillConfig, SynthesisRequest, TaskKind};
use quill_jobs::{InMemoryResultStore, JobResult, JobState, NoPreferences, SynthesisService};
use quill_routing::AttemptOutcome;

use crate::cli::SynthesizeArgs;

/// Width of the separator framing generated text.
const SEPARATOR_WIDTH: usize = 80;

/// Loads configuration from `path`, or from `~/.quill/config.toml`.
///
/// An unreadable default config falls back to defaults with a warning. An
/// explicitly named file must load.
///
/// # Errors
/// Returns an error if the named file cannot be read, parsed or validated.
pub fn load_config(path: Option<&Path>) -> Result<QuillConfig> {
    if let Some(path) = path {
        return QuillConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()));
    }

    Ok(QuillConfig::load_or_create().unwrap_or_else(|error| {
        tracing::warn!("Failed to load config from ~/.quill/config.toml: {error}");
        tracing::warn!("Using default configuration");
        QuillConfig::default()
    }))
}

/// Answers a question without creating a job.
///
/// # Errors
/// Returns an error if the question is rejected.
pub async fn handle_ask(
    config: &QuillConfig,
    question: String,
    complex: bool,
    show_metrics: bool,
) -> Result<()> {
    let kind = if complex {
        TaskKind::ComplexQa
    } else {
        TaskKind::SimpleQa
    };
    tracing::info!("Asking ({kind}): {question}");

    let service = build_service(config);
    let result = service.ask_question(kind, Payload::new(question)).await?;
    display_result(&result);

    if show_metrics {
        log_metrics(&service)?;
    }
    Ok(())
}

/// Submits a synthesis job and follows its events until it finishes.
///
/// # Errors
/// Returns an error if the context file cannot be read, the request is
/// rejected, or the job fails.
pub async fn handle_synthesize(
    config: &QuillConfig,
    args: SynthesizeArgs,
    show_metrics: bool,
) -> Result<()> {
    let request = build_request(args)?;
    let service = build_service(config);

    let job_id = service.submit_synthesis(request).await?;
    tracing::info!("Job {job_id} submitted");

    let mut events = service.subscribe(job_id)?;
    while let Some(event) = events.next().await {
        tracing::info!(
            "[{progress:>3}%] {state}: {step}",
            progress = event.progress,
            state = event.state,
            step = event.step
        );
    }

    let snapshot = service.job_status(job_id)?;
    if show_metrics {
        log_metrics(&service)?;
    }

    match (snapshot.state, snapshot.result) {
        (JobState::Succeeded, Some(result)) => {
            display_result(&result);
            Ok(())
        }
        (JobState::Cancelled, _) => {
            tracing::warn!("Job {job_id} was cancelled");
            Ok(())
        }
        (state, _) => bail!(
            "Job {job_id} ended {state}: {}",
            snapshot.error.as_deref().unwrap_or("no detail")
        ),
    }
}

/// Shows the effective configuration. API keys are never printed.
///
/// # Errors
/// Returns an error if the configuration cannot be serialized.
pub fn handle_config(config: &QuillConfig, full: bool) -> Result<()> {
    if full {
        let mut redacted = config.clone();
        for settings in [
            &mut redacted.providers.anthropic,
            &mut redacted.providers.openrouter,
            &mut redacted.providers.groq,
        ] {
            if settings.api_key.is_some() {
                settings.api_key = Some("<redacted>".to_owned());
            }
        }
        let toml = toml::to_string_pretty(&redacted)?;
        tracing::info!("{toml}");
        return Ok(());
    }

    tracing::info!("Configuration:");
    for (id, settings) in [
        ("anthropic", &config.providers.anthropic),
        ("openrouter", &config.providers.openrouter),
        ("groq", &config.providers.groq),
    ] {
        let key = if config.providers.api_key(id).is_some() {
            "set"
        } else {
            "not set"
        };
        tracing::info!(
            "  {id}: enabled={enabled} key={key} timeout={timeout}s",
            enabled = settings.enabled,
            timeout = settings.timeout_seconds
        );
    }
    tracing::info!(
        "  Cache: enabled={enabled} capacity={capacity}",
        enabled = config.cache.enabled,
        capacity = config.cache.capacity
    );
    tracing::info!(
        "  Jobs: max_concurrent={max} retention={retention}m",
        max = config.jobs.max_concurrent_jobs,
        retention = config.jobs.retention_minutes
    );
    Ok(())
}

fn build_service(config: &QuillConfig) -> SynthesisService {
    SynthesisService::from_config(
        config,
        Arc::new(InMemoryResultStore::new()),
        Arc::new(NoPreferences),
    )
}

fn build_request(args: SynthesizeArgs) -> Result<SynthesisRequest> {
    let mut request =
        SynthesisRequest::synthesis(args.topic).with_evidence_level(args.evidence.into());
    if let Some(path) = args.context {
        let context = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read context file {}", path.display()))?;
        request = request.with_context(context);
    }
    if let Some(words) = args.length {
        request = request.with_target_length(words);
    }
    if let Some(specialty) = args.specialty {
        request = request.with_specialty(specialty);
    }
    Ok(request)
}

fn display_result(result: &JobResult) {
    let separator = "=".repeat(SEPARATOR_WIDTH);
    tracing::info!("\n{separator}\n");
    tracing::info!("{text}", text = result.text);
    tracing::info!("{separator}");

    if result.degraded {
        tracing::warn!("No AI provider was available; the text above is a placeholder");
    }
    tracing::info!("\nMetrics:");
    tracing::info!("  Served by: {served_by}", served_by = result.served_by);
    tracing::info!("  From cache: {from_cache}", from_cache = result.from_cache);
    tracing::info!("  Latency: {latency}ms", latency = result.latency_ms);
    tracing::info!(
        "  Tokens: {input} in, {output} out, {total} total",
        input = result.tokens_used.input,
        output = result.tokens_used.output,
        total = result.tokens_used.total()
    );
    for attempt in &result.attempts {
        match &attempt.outcome {
            AttemptOutcome::Succeeded => tracing::info!(
                "  Attempt {provider}: ok ({latency}ms)",
                provider = attempt.provider,
                latency = attempt.latency_ms
            ),
            AttemptOutcome::Failed { detail, .. } => tracing::info!(
                "  Attempt {provider}: {detail} ({latency}ms)",
                provider = attempt.provider,
                latency = attempt.latency_ms
            ),
        }
    }
}

fn log_metrics(service: &SynthesisService) -> Result<()> {
    let router = service.engine().router();
    let report = router.metrics().report().render()?;
    tracing::info!("\nRouter metrics:\n{report}");
    for health in router.health().snapshots() {
        if health.degraded || health.disabled {
            tracing::warn!(
                "  {provider}: degraded={degraded} disabled={disabled} last_error={error}",
                provider = health.provider,
                degraded = health.degraded,
                disabled = health.disabled,
                error = health.last_error.as_deref().unwrap_or("-")
            );
        }
    }
    Ok(())
}
