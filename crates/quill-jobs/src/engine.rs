//! Background job execution.
//!
//! Every submitted request becomes a [`Job`] driven by its own tokio task.
//! The job table is the single source of truth: every state or progress
//! change happens under its lock and is published to the notifier before
//! the lock is released, so a job's subscribers see changes in order and
//! nothing is published after a terminal state.

use core::time::Duration;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{TimeDelta, Utc};
use quill_core::{IgnoreLock as _, JobsConfig, QuillConfig, SynthesisRequest};
use quill_routing::{FallbackRouter, ResolveControl, RouteObserver, RouteStep};
use tokio::select;
use tokio::sync::Semaphore;
use tokio::sync::broadcast::Receiver;
use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, Result};
use crate::job::{
    CancelOutcome, Job, JobEvent, JobId, JobResult, JobSnapshot, JobState,
    PROGRESS_ATTEMPTS_END, PROGRESS_ATTEMPTS_START, PROGRESS_PERSISTING, PROGRESS_ROUTED,
};
use crate::notifier::{EventNotifier, JobEventStream};
use crate::store::ResultStore;

/// Runs synthesis requests as observable background jobs.
///
/// Cheap to clone; clones share the same job table.
#[derive(Clone)]
pub struct JobEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    jobs: Mutex<HashMap<JobId, Job>>,
    router: Arc<FallbackRouter>,
    store: Arc<dyn ResultStore>,
    notifier: EventNotifier,
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
    config: JobsConfig,
}

impl JobEngine {
    /// Creates an engine over an existing router and result store.
    #[must_use]
    pub fn new(router: Arc<FallbackRouter>, store: Arc<dyn ResultStore>, config: JobsConfig) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                jobs: Mutex::new(HashMap::new()),
                router,
                store,
                notifier: EventNotifier::new(config.event_buffer),
                permits: Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1))),
                shutdown: CancellationToken::new(),
                config,
            }),
        }
    }

    /// Builds the router from configuration and wraps it in an engine.
    #[must_use]
    pub fn from_config(config: &QuillConfig, store: Arc<dyn ResultStore>) -> Self {
        Self::new(
            Arc::new(FallbackRouter::from_config(config)),
            store,
            config.jobs.clone(),
        )
    }

    /// The router jobs resolve through.
    #[must_use]
    pub fn router(&self) -> &Arc<FallbackRouter> {
        &self.inner.router
    }

    /// Queues a request and returns immediately.
    ///
    /// Finished jobs older than the retention window are pruned first, so the
    /// job table stays bounded by the submission rate. Must be called from
    /// within a Tokio runtime.
    pub fn submit(&self, request: SynthesisRequest) -> JobId {
        self.prune_expired();
        let job = Job::new(request.clone(), self.inner.shutdown.child_token());
        let job_id = job.id;
        let cancel = job.cancel.clone();
        self.inner.jobs.with_lock(|jobs| {
            self.inner.notifier.register(job_id);
            self.inner.notifier.publish(job.event());
            jobs.insert(job_id, job);
        });
        tracing::info!("Submitted job {job_id} ({})", request.kind);

        tokio::spawn(supervise(Arc::clone(&self.inner), job_id, request, cancel));
        job_id
    }

    /// Snapshot of a job.
    ///
    /// # Errors
    /// Returns [`EngineError::JobNotFound`] for unknown or pruned ids.
    pub fn status(&self, job_id: JobId) -> Result<JobSnapshot> {
        self.inner
            .jobs
            .with_lock(|jobs| jobs.get(&job_id).map(Job::snapshot))
            .ok_or(EngineError::JobNotFound(job_id))
    }

    /// Cancels a pending or running job.
    ///
    /// The job becomes `Cancelled` at once. A provider call already in
    /// flight is not interrupted; its result is discarded.
    pub fn cancel(&self, job_id: JobId) -> CancelOutcome {
        let outcome = self.inner.jobs.with_lock(|jobs| {
            let Some(job) = jobs.get_mut(&job_id) else {
                return CancelOutcome::NotFound;
            };
            if job.state.is_terminal() {
                return CancelOutcome::AlreadyTerminal;
            }
            if let Some(event) = job.transition(JobState::Cancelled, "cancelled".to_owned()) {
                self.inner.notifier.publish(event);
            }
            job.cancel.cancel();
            CancelOutcome::Cancelled
        });
        tracing::info!("Cancel job {job_id}: {outcome:?}");
        outcome
    }

    /// Snapshots of every tracked job, oldest first.
    pub fn list(&self) -> Vec<JobSnapshot> {
        let mut snapshots = self
            .inner
            .jobs
            .with_lock(|jobs| jobs.values().map(Job::snapshot).collect::<Vec<_>>());
        snapshots.sort_by_key(|snapshot| snapshot.created_at);
        snapshots
    }

    /// Event stream for one job; ends after its terminal event.
    ///
    /// Subscribing to a finished job yields its final event once.
    ///
    /// # Errors
    /// Returns [`EngineError::JobNotFound`] for unknown or pruned ids.
    pub fn subscribe(&self, job_id: JobId) -> Result<JobEventStream> {
        self.inner.jobs.with_lock(|jobs| {
            let job = jobs.get(&job_id).ok_or(EngineError::JobNotFound(job_id))?;
            if job.state.is_terminal() {
                return Ok(JobEventStream::finished(job.event()));
            }
            self.inner.notifier.subscribe(job_id).ok_or_else(|| {
                EngineError::Internal(format!("No event channel for live job {job_id}"))
            })
        })
    }

    /// Receiver of every job's events, for push transports.
    pub fn subscribe_all(&self) -> Receiver<JobEvent> {
        self.inner.notifier.subscribe_all()
    }

    /// Waits until the job is terminal and returns its final snapshot.
    ///
    /// # Errors
    /// Returns [`EngineError::JobNotFound`] for unknown or pruned ids.
    pub async fn wait(&self, job_id: JobId) -> Result<JobSnapshot> {
        let mut events = self.subscribe(job_id)?;
        while let Some(event) = events.next().await {
            if event.is_terminal() {
                break;
            }
        }
        self.status(job_id)
    }

    /// Drops terminal jobs last updated more than `older_than` ago.
    ///
    /// Returns the number of jobs removed.
    pub fn prune_finished(&self, older_than: Duration) -> usize {
        let Some(cutoff) = TimeDelta::from_std(older_than)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return 0;
        };
        let removed = self.inner.jobs.with_lock(|jobs| {
            let before = jobs.len();
            jobs.retain(|_, job| !(job.state.is_terminal() && job.updated_at <= cutoff));
            before - jobs.len()
        });
        if removed > 0 {
            tracing::debug!("Pruned {removed} finished job(s)");
        }
        removed
    }

    /// Prunes with the configured retention window.
    pub fn prune_expired(&self) -> usize {
        self.prune_finished(self.inner.config.retention())
    }

    /// Cancels every unfinished job and stops admitting new work.
    pub fn shutdown(&self) {
        tracing::info!("Job engine shutting down");
        self.inner.shutdown.cancel();
        self.inner.permits.close();
    }
}

impl EngineInner {
    /// Applies `update` to a job and publishes its event while the table is locked.
    fn update<F>(&self, job_id: JobId, update: F) -> bool
    where
        F: FnOnce(&mut Job) -> Option<JobEvent>,
    {
        self.jobs.with_lock(|jobs| {
            let Some(event) = jobs.get_mut(&job_id).and_then(update) else {
                return false;
            };
            self.notifier.publish(event);
            true
        })
    }

    fn transition(&self, job_id: JobId, state: JobState, step: &str) -> bool {
        self.update(job_id, |job| job.transition(state, step.to_owned()))
    }

    fn advance(&self, job_id: JobId, progress: u8, step: String) -> bool {
        self.update(job_id, |job| job.advance(progress, step))
    }

    fn complete(&self, job_id: JobId, result: JobResult) -> bool {
        self.update(job_id, |job| {
            let event = job.transition(JobState::Succeeded, "complete".to_owned())?;
            job.result = Some(result);
            Some(event)
        })
    }

    fn fail(&self, job_id: JobId, detail: String) -> bool {
        tracing::error!("Job {job_id} failed: {detail}");
        self.update(job_id, |job| {
            let event = job.transition(JobState::Failed, "failed".to_owned())?;
            job.error = Some(detail);
            Some(event)
        })
    }
}

/// Runs the job on its own task and turns a panic into `Failed`.
async fn supervise(
    inner: Arc<EngineInner>,
    job_id: JobId,
    request: SynthesisRequest,
    cancel: CancellationToken,
) {
    let worker = tokio::spawn(run_job(Arc::clone(&inner), job_id, request, cancel));
    if let Err(error) = worker.await {
        let detail = if error.is_panic() {
            "worker panicked"
        } else {
            "worker aborted"
        };
        inner.fail(job_id, format!("Internal fault: {detail}"));
    }
}

async fn run_job(
    inner: Arc<EngineInner>,
    job_id: JobId,
    request: SynthesisRequest,
    cancel: CancellationToken,
) {
    let permit = select! {
        () = cancel.cancelled() => {
            inner.transition(job_id, JobState::Cancelled, "cancelled: engine shutting down");
            return;
        }
        permit = Arc::clone(&inner.permits).acquire_owned() => permit,
    };
    let Ok(_permit) = permit else {
        inner.fail(job_id, "Internal fault: engine closed".to_owned());
        return;
    };

    if !inner.transition(job_id, JobState::Running, "resolving") {
        return;
    }

    let observer = Arc::new(ProgressObserver {
        inner: Arc::clone(&inner),
        job_id,
    });
    let control = ResolveControl::new(cancel).with_observer(observer);
    let Some(resolution) = inner.router.resolve_with(&request, &control).await else {
        inner.transition(job_id, JobState::Cancelled, "cancelled");
        tracing::info!("Job {job_id} abandoned after cancellation");
        return;
    };

    if !inner.advance(job_id, PROGRESS_PERSISTING, "persisting result".to_owned()) {
        tracing::debug!("Job {job_id} finished after cancellation; result discarded");
        return;
    }
    let result = JobResult::from(resolution);
    match inner.store.save_result(job_id, &result).await {
        Ok(()) => {
            let served_by = result.served_by.clone();
            if inner.complete(job_id, result) {
                tracing::info!("Job {job_id} succeeded via {served_by}");
            }
        }
        Err(error) => {
            inner.fail(job_id, error.to_string());
        }
    }
}

/// Translates router steps into job progress.
struct ProgressObserver {
    inner: Arc<EngineInner>,
    job_id: JobId,
}

impl RouteObserver for ProgressObserver {
    fn on_step(&self, step: &RouteStep) {
        let (progress, label) = match step {
            RouteStep::CacheHit { served_by } => {
                (PROGRESS_ROUTED, format!("cache hit ({served_by})"))
            }
            RouteStep::CandidatesSelected { count } => {
                (PROGRESS_ROUTED, format!("{count} provider(s) available"))
            }
            RouteStep::AttemptStarted {
                provider,
                index,
                total,
            } => (attempt_progress(*index, *total), format!("calling {provider}")),
            RouteStep::AttemptFailed { provider, kind } => {
                (PROGRESS_ROUTED, format!("{provider} failed ({kind:?})"))
            }
            RouteStep::FallbackEngaged => (
                PROGRESS_ATTEMPTS_END,
                "no provider available; serving degraded result".to_owned(),
            ),
            RouteStep::Completed { served_by, .. } => {
                (PROGRESS_ATTEMPTS_END, format!("resolved by {served_by}"))
            }
        };
        self.inner.advance(self.job_id, progress, label);
    }
}

/// Progress at the start of attempt `index` of `total`, within the attempt band.
fn attempt_progress(index: usize, total: usize) -> u8 {
    let band = usize::from(PROGRESS_ATTEMPTS_END - PROGRESS_ATTEMPTS_START);
    let offset = band * index / total.max(1);
    PROGRESS_ATTEMPTS_START + offset.min(band) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_progress_band() {
        assert_eq!(attempt_progress(0, 3), PROGRESS_ATTEMPTS_START);
        assert_eq!(attempt_progress(1, 3), 40);
        assert_eq!(attempt_progress(2, 3), 65);
        assert_eq!(attempt_progress(0, 0), PROGRESS_ATTEMPTS_START);
        assert!(attempt_progress(9, 10) < PROGRESS_ATTEMPTS_END);
    }
}
