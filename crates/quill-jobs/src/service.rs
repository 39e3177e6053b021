//! Boundary facade called by transports (HTTP handlers, WebSocket push, CLI).

use std::sync::Arc;

use quill_core::{Payload, QuillConfig, SynthesisOptions, SynthesisRequest, TaskKind};
use tokio::sync::broadcast::Receiver;

use crate::engine::JobEngine;
use crate::error::{EngineError, Result};
use crate::job::{CancelOutcome, JobEvent, JobId, JobResult, JobSnapshot};
use crate::notifier::JobEventStream;
use crate::store::{PreferenceSource, ResultStore};

/// Entry point for submitting work and observing jobs.
#[derive(Clone)]
pub struct SynthesisService {
    engine: JobEngine,
    preferences: Arc<dyn PreferenceSource>,
}

impl SynthesisService {
    /// Wraps an engine with a preference source.
    #[must_use]
    pub fn new(engine: JobEngine, preferences: Arc<dyn PreferenceSource>) -> Self {
        Self {
            engine,
            preferences,
        }
    }

    /// Builds the full stack from configuration.
    #[must_use]
    pub fn from_config(
        config: &QuillConfig,
        store: Arc<dyn ResultStore>,
        preferences: Arc<dyn PreferenceSource>,
    ) -> Self {
        Self::new(JobEngine::from_config(config, store), preferences)
    }

    /// Underlying job engine.
    #[must_use]
    pub const fn engine(&self) -> &JobEngine {
        &self.engine
    }

    /// Shapes the request with stored preferences and submits it as a job.
    ///
    /// # Errors
    /// Returns [`EngineError::InvalidRequest`] if the payload is empty.
    pub async fn submit_synthesis(&self, mut request: SynthesisRequest) -> Result<JobId> {
        validate_payload(&request.payload)?;
        self.shape_options(&mut request.options).await;
        Ok(self.engine.submit(request))
    }

    /// Current snapshot of a job.
    ///
    /// # Errors
    /// Returns [`EngineError::JobNotFound`] for unknown or pruned ids.
    pub fn job_status(&self, job_id: JobId) -> Result<JobSnapshot> {
        self.engine.status(job_id)
    }

    /// Cancels a job.
    pub fn cancel_job(&self, job_id: JobId) -> CancelOutcome {
        self.engine.cancel(job_id)
    }

    /// Answers a question synchronously, without creating a job.
    ///
    /// # Errors
    /// Returns [`EngineError::InvalidRequest`] for non-question kinds or an
    /// empty payload.
    pub async fn ask_question(&self, kind: TaskKind, payload: Payload) -> Result<JobResult> {
        if !kind.is_question() {
            return Err(EngineError::InvalidRequest(format!(
                "{kind} is not a question kind; submit it as a job"
            )));
        }
        validate_payload(&payload)?;

        let mut request = SynthesisRequest {
            kind,
            payload,
            options: SynthesisOptions::default(),
        };
        self.shape_options(&mut request.options).await;
        let resolution = self.engine.router().resolve(&request).await;
        Ok(JobResult::from(resolution))
    }

    /// Event stream for one job.
    ///
    /// # Errors
    /// Returns [`EngineError::JobNotFound`] for unknown or pruned ids.
    pub fn subscribe(&self, job_id: JobId) -> Result<JobEventStream> {
        self.engine.subscribe(job_id)
    }

    /// Push channel carrying every job's events.
    pub fn subscribe_all(&self) -> Receiver<JobEvent> {
        self.engine.subscribe_all()
    }

    /// Fills unset options from the preference source. A failing source is
    /// logged and ignored.
    async fn shape_options(&self, options: &mut SynthesisOptions) {
        match self.preferences.load_preferences().await {
            Ok(preferences) => preferences.apply(options),
            Err(error) => tracing::warn!("Ignoring user preferences: {error}"),
        }
    }
}

fn validate_payload(payload: &Payload) -> Result<()> {
    if payload.text.trim().is_empty() {
        return Err(EngineError::InvalidRequest("payload text is empty".to_owned()));
    }
    Ok(())
}
