//! Job records, their state machine, and the views handed to callers.

use core::fmt::{Display, Formatter, Result as FmtResult};
use core::str::FromStr;

use chrono::{DateTime, Utc};
use quill_core::{SynthesisRequest, TaskKind, TokenUsage};
use quill_routing::{AttemptRecord, Resolution};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::{Error as UuidError, Uuid};

/// Progress once a job is queued.
pub const PROGRESS_QUEUED: u8 = 0;
/// Progress once the router has started.
pub const PROGRESS_STARTED: u8 = 5;
/// Progress once the cache was checked and candidates chosen.
pub const PROGRESS_ROUTED: u8 = 10;
/// Progress when the first provider attempt starts.
pub const PROGRESS_ATTEMPTS_START: u8 = 15;
/// Progress when the last provider attempt has finished.
pub const PROGRESS_ATTEMPTS_END: u8 = 90;
/// Progress while the result is being persisted.
pub const PROGRESS_PERSISTING: u8 = 95;
/// Progress of a finished job.
pub const PROGRESS_COMPLETE: u8 = 100;

/// Unique identifier for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    /// Fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for JobId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FmtResult {
        Display::fmt(&self.0, formatter)
    }
}

impl FromStr for JobId {
    type Err = UuidError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(text).map(Self)
    }
}

/// Lifecycle state of a job.
///
/// `Pending → Running → {Succeeded, Failed, Cancelled}`; a pending job may
/// also be cancelled or failed directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Created, waiting for a worker slot.
    Pending,
    /// The router is resolving the request.
    Running,
    /// The router returned and the result was stored (possibly degraded).
    Succeeded,
    /// An internal fault stopped the job.
    Failed,
    /// The caller cancelled the job before it finished.
    Cancelled,
}

impl JobState {
    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Whether `self → next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running | Self::Cancelled | Self::Failed)
                | (Self::Running, Self::Succeeded | Self::Failed | Self::Cancelled)
        )
    }

    /// Stable snake-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl Display for JobState {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FmtResult {
        formatter.write_str(self.as_str())
    }
}

/// Result of cancelling a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job was pending or running and is now cancelled.
    Cancelled,
    /// No job with this id exists.
    NotFound,
    /// The job had already finished; nothing changed.
    AlreadyTerminal,
}

/// Terminal output of a successful job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    /// Generated (or placeholder) text
    pub text: String,
    /// Provider that produced the text
    pub served_by: String,
    /// Whether the text is a degraded placeholder
    pub degraded: bool,
    /// Whether the text came from the response cache
    pub from_cache: bool,
    /// Token accounting of the winning call
    pub tokens_used: TokenUsage,
    /// Latency of the winning call
    pub latency_ms: u64,
    /// Every provider attempt, in order
    pub attempts: Vec<AttemptRecord>,
}

impl From<Resolution> for JobResult {
    fn from(resolution: Resolution) -> Self {
        Self {
            text: resolution.response.text,
            served_by: resolution.served_by,
            degraded: resolution.response.degraded,
            from_cache: resolution.from_cache,
            tokens_used: resolution.response.tokens_used,
            latency_ms: resolution.response.latency_ms,
            attempts: resolution.attempts,
        }
    }
}

/// Progress notification for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEvent {
    /// Job the event belongs to
    pub job_id: JobId,
    /// State after the change
    pub state: JobState,
    /// Progress after the change, `0..=100`
    pub progress: u8,
    /// Human-readable step label
    pub step: String,
    /// When the change happened
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    /// Whether this is the last event the job will ever publish.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Read-only copy of a job handed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    /// Job identifier
    pub id: JobId,
    /// Originating request
    pub request: SynthesisRequest,
    /// Current state
    pub state: JobState,
    /// Current progress, `0..=100`
    pub progress: u8,
    /// Current step label
    pub step: String,
    /// Present only when `Succeeded`
    pub result: Option<JobResult>,
    /// Present only when `Failed`
    pub error: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Time of the last change
    pub updated_at: DateTime<Utc>,
}

impl JobSnapshot {
    /// Task kind of the originating request.
    #[must_use]
    pub const fn kind(&self) -> TaskKind {
        self.request.kind
    }
}

/// Engine-owned job record. Mutated only under the job table lock.
#[derive(Debug)]
pub(crate) struct Job {
    pub(crate) id: JobId,
    pub(crate) request: SynthesisRequest,
    pub(crate) state: JobState,
    pub(crate) progress: u8,
    pub(crate) step: String,
    pub(crate) result: Option<JobResult>,
    pub(crate) error: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    pub(crate) cancel: CancellationToken,
}

impl Job {
    pub(crate) fn new(request: SynthesisRequest, cancel: CancellationToken) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            request,
            state: JobState::Pending,
            progress: PROGRESS_QUEUED,
            step: "queued".to_owned(),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            cancel,
        }
    }

    pub(crate) fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id,
            request: self.request.clone(),
            state: self.state,
            progress: self.progress,
            step: self.step.clone(),
            result: self.result.clone(),
            error: self.error.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub(crate) fn event(&self) -> JobEvent {
        JobEvent {
            job_id: self.id,
            state: self.state,
            progress: self.progress,
            step: self.step.clone(),
            timestamp: self.updated_at,
        }
    }

    /// Updates progress and step while running. Progress never decreases.
    pub(crate) fn advance(&mut self, progress: u8, step: String) -> Option<JobEvent> {
        if self.state != JobState::Running {
            return None;
        }
        self.progress = self.progress.max(progress.min(PROGRESS_PERSISTING));
        self.step = step;
        self.updated_at = Utc::now();
        Some(self.event())
    }

    /// Moves to `next` if legal; returns the event to publish.
    pub(crate) fn transition(&mut self, next: JobState, step: String) -> Option<JobEvent> {
        if !self.state.can_transition_to(next) {
            tracing::debug!(
                "Job {} ignoring transition {} -> {next}",
                self.id,
                self.state
            );
            return None;
        }
        self.state = next;
        self.step = step;
        self.updated_at = Utc::now();
        match next {
            JobState::Running => self.progress = self.progress.max(PROGRESS_STARTED),
            JobState::Succeeded => self.progress = PROGRESS_COMPLETE,
            JobState::Pending | JobState::Failed | JobState::Cancelled => {}
        }
        Some(self.event())
    }
}
