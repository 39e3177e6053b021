//! Background synthesis jobs over the fallback router.
//!
//! [`SynthesisService`] is the boundary facade: it submits requests as jobs
//! to the [`JobEngine`], answers questions synchronously, and exposes job
//! status, cancellation and event streams.

/// Job engine
pub mod engine;
/// Error types
pub mod error;
/// Job records and states
pub mod job;
/// Job event notifier
pub mod notifier;
/// Boundary facade
pub mod service;
/// Result store and preference collaborators
pub mod store;

pub use engine::JobEngine;
pub use error::{EngineError, Result};
pub use job::{CancelOutcome, JobEvent, JobId, JobResult, JobSnapshot, JobState};
pub use notifier::{EventNotifier, JobEventStream};
pub use service::SynthesisService;
pub use store::{
    InMemoryResultStore, NoPreferences, PreferenceSource, ResultStore, StaticPreferences,
    UserPreferences,
};
