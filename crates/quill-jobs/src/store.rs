//! Outbound collaborators: where results go and where preferences come from.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use quill_core::{EvidenceLevel, IgnoreLock as _, SynthesisOptions};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::job::{JobId, JobResult};

/// Persists terminal job results.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Saves the result of a finished job.
    ///
    /// # Errors
    /// Returns [`crate::EngineError::Store`] if the result could not be saved;
    /// the job is then marked `Failed`.
    async fn save_result(&self, job_id: JobId, result: &JobResult) -> Result<()>;
}

/// Result store that keeps everything in memory.
#[derive(Debug, Default)]
pub struct InMemoryResultStore {
    results: Mutex<HashMap<JobId, JobResult>>,
}

impl InMemoryResultStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored result for `job_id`.
    pub fn get(&self, job_id: JobId) -> Option<JobResult> {
        self.results
            .with_lock(|results| results.get(&job_id).cloned())
    }

    /// Number of stored results.
    pub fn len(&self) -> usize {
        self.results.with_lock(|results| results.len())
    }

    /// Whether nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn save_result(&self, job_id: JobId, result: &JobResult) -> Result<()> {
        self.results.with_lock(|results| {
            results.insert(job_id, result.clone());
        });
        Ok(())
    }
}

/// Defaults applied to requests that leave options unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPreferences {
    /// Preferred specialty tag
    pub specialty: Option<String>,
    /// Preferred length in words
    pub target_length: Option<u32>,
    /// Preferred evidence standard
    pub evidence_level: Option<EvidenceLevel>,
}

impl UserPreferences {
    /// Fills options the caller left unset. Explicit values always win.
    pub fn apply(&self, options: &mut SynthesisOptions) {
        if options.specialty.is_none() {
            options.specialty.clone_from(&self.specialty);
        }
        if options.target_length.is_none() {
            options.target_length = self.target_length;
        }
        if let (EvidenceLevel::Any, Some(level)) = (options.evidence_level, self.evidence_level) {
            options.evidence_level = level;
        }
    }
}

/// Source of the user's stored preferences.
#[async_trait]
pub trait PreferenceSource: Send + Sync {
    /// Loads the current preferences.
    ///
    /// # Errors
    /// Returns an error if the backing store is unreachable.
    async fn load_preferences(&self) -> Result<UserPreferences>;
}

/// No stored preferences.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPreferences;

#[async_trait]
impl PreferenceSource for NoPreferences {
    async fn load_preferences(&self) -> Result<UserPreferences> {
        Ok(UserPreferences::default())
    }
}

/// Fixed preferences, typically loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticPreferences(pub UserPreferences);

#[async_trait]
impl PreferenceSource for StaticPreferences {
    async fn load_preferences(&self) -> Result<UserPreferences> {
        Ok(self.0.clone())
    }
}
