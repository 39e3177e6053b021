//! Job lifecycle, event ordering and facade behaviour.
#![cfg(test)]
#![allow(
    clippy::min_ident_chars,
    clippy::absolute_paths,
    clippy::shadow_unrelated,
    reason = "Test code prioritizes clarity over efficiency"
)]

mod common;

use core::time::Duration;
use std::sync::Arc;

use common::{Behavior, RejectingStore, TestProvider, engine_with, init_tracing, router_with};
use quill_core::{EvidenceLevel, JobsConfig, Payload, ProviderError, SynthesisRequest, TaskKind};
use quill_jobs::{
    CancelOutcome, EngineError, JobEngine, JobEvent, JobId, JobState, NoPreferences,
    StaticPreferences, SynthesisService, UserPreferences,
};
use tokio::time::{sleep, timeout};

const WAIT: Duration = Duration::from_secs(10);

fn ok_provider(id: &'static str) -> Arc<TestProvider> {
    Arc::new(TestProvider::new(id, Behavior::Succeed))
}

fn slow_provider(id: &'static str, delay: Duration) -> Arc<TestProvider> {
    Arc::new(TestProvider::new(id, Behavior::Succeed).with_delay(delay))
}

async fn collect_events(engine: &JobEngine, job_id: JobId) -> Vec<JobEvent> {
    let mut events = Vec::new();
    let Ok(mut stream) = engine.subscribe(job_id) else {
        return events;
    };
    while let Ok(Some(event)) = timeout(WAIT, stream.next()).await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_submit_returns_immediately_and_succeeds() {
    init_tracing();
    let anthropic = slow_provider("anthropic", Duration::from_millis(50));
    let (engine, store) = engine_with(&[Arc::clone(&anthropic)], JobsConfig::default());

    let job_id = engine.submit(SynthesisRequest::synthesis("Heart failure"));
    let snapshot = engine.status(job_id);
    assert!(matches!(
        snapshot.map(|snapshot| snapshot.state),
        Ok(JobState::Pending | JobState::Running)
    ));

    let finished = timeout(WAIT, engine.wait(job_id)).await;
    let Ok(Ok(finished)) = finished else {
        panic!("job did not finish: {finished:?}");
    };
    assert_eq!(finished.state, JobState::Succeeded);
    assert_eq!(finished.progress, 100);
    assert!(finished.error.is_none());
    let result = finished.result.as_ref();
    assert_eq!(result.map(|result| result.served_by.as_str()), Some("anthropic"));
    assert_eq!(store.get(job_id).as_ref(), result);
}

#[tokio::test]
async fn test_degraded_outcome_still_succeeds() {
    let anthropic = Arc::new(TestProvider::new(
        "anthropic",
        Behavior::Fail(ProviderError::Unavailable("503".to_owned())),
    ));
    let (engine, _store) = engine_with(&[anthropic], JobsConfig::default());

    let job_id = engine.submit(SynthesisRequest::synthesis("Sepsis"));
    let finished = timeout(WAIT, engine.wait(job_id)).await;
    let Ok(Ok(finished)) = finished else {
        panic!("job did not finish: {finished:?}");
    };
    assert_eq!(finished.state, JobState::Succeeded);
    let result = finished.result.unwrap_or_else(|| panic!("missing result"));
    assert!(result.degraded);
    assert_eq!(result.served_by, "mock");
    assert_eq!(result.attempts.len(), 2);
}

#[tokio::test]
async fn test_events_are_ordered_and_end_with_status() {
    init_tracing();
    let anthropic = Arc::new(TestProvider::new(
        "anthropic",
        Behavior::Fail(ProviderError::Timeout(Duration::from_secs(1))),
    ));
    let openrouter = slow_provider("openrouter", Duration::from_millis(50));
    let (engine, _store) = engine_with(&[anthropic, openrouter], JobsConfig::default());

    let job_id = engine.submit(SynthesisRequest::synthesis("Pulmonary embolism"));
    let events = collect_events(&engine, job_id).await;

    assert!(!events.is_empty());
    assert!(
        events.windows(2).all(|pair| pair[0].progress <= pair[1].progress),
        "progress must not decrease: {events:?}"
    );
    assert_eq!(events.iter().filter(|event| event.is_terminal()).count(), 1);
    let last = events.last().unwrap_or_else(|| panic!("no events"));
    assert!(last.is_terminal());
    assert_eq!(last.progress, 100);
    let status = engine.status(job_id).map(|snapshot| snapshot.state);
    assert_eq!(status, Ok(last.state));
}

#[tokio::test]
async fn test_cancel_while_running() {
    init_tracing();
    let anthropic = slow_provider("anthropic", Duration::from_millis(300));
    let (engine, store) = engine_with(&[Arc::clone(&anthropic)], JobsConfig::default());
    let mut all = engine.subscribe_all();

    let job_id = engine.submit(SynthesisRequest::synthesis("Stroke"));
    let mut stream = engine
        .subscribe(job_id)
        .unwrap_or_else(|error| panic!("subscribe failed: {error}"));

    while anthropic.calls() == 0 {
        sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(engine.cancel(job_id), CancelOutcome::Cancelled);

    let mut events = Vec::new();
    while let Ok(Some(event)) = timeout(WAIT, stream.next()).await {
        events.push(event);
    }
    let last = events.last().unwrap_or_else(|| panic!("no events"));
    assert_eq!(last.state, JobState::Cancelled);
    assert_eq!(events.iter().filter(|event| event.is_terminal()).count(), 1);

    // Let the in-flight provider call finish so any late publish would land.
    sleep(Duration::from_millis(400)).await;
    let mut published = Vec::new();
    while let Ok(event) = all.try_recv() {
        if event.job_id == job_id {
            published.push(event);
        }
    }
    let cancelled_at = published
        .iter()
        .position(|event| event.state == JobState::Cancelled)
        .unwrap_or_else(|| panic!("cancellation not published: {published:?}"));
    assert_eq!(
        cancelled_at + 1,
        published.len(),
        "events after cancellation: {published:?}"
    );

    let snapshot = engine
        .status(job_id)
        .unwrap_or_else(|error| panic!("status failed: {error}"));
    assert_eq!(snapshot.state, JobState::Cancelled);
    assert!(snapshot.result.is_none());
    assert!(store.get(job_id).is_none());
}

#[tokio::test]
async fn test_cancel_outcomes() {
    let (engine, _store) = engine_with(&[ok_provider("anthropic")], JobsConfig::default());

    assert_eq!(engine.cancel(JobId::new()), CancelOutcome::NotFound);

    let job_id = engine.submit(SynthesisRequest::synthesis("Gout"));
    let finished = timeout(WAIT, engine.wait(job_id)).await;
    assert!(matches!(finished, Ok(Ok(ref snapshot)) if snapshot.state == JobState::Succeeded));
    assert_eq!(engine.cancel(job_id), CancelOutcome::AlreadyTerminal);
    assert_eq!(
        engine.status(job_id).map(|snapshot| snapshot.state),
        Ok(JobState::Succeeded)
    );
}

#[tokio::test]
async fn test_cancel_pending_job() {
    let anthropic = slow_provider("anthropic", Duration::from_millis(200));
    let config = JobsConfig {
        max_concurrent_jobs: 1,
        ..JobsConfig::default()
    };
    let (engine, _store) = engine_with(&[Arc::clone(&anthropic)], config);

    let first = engine.submit(SynthesisRequest::synthesis("First"));
    let second = engine.submit(SynthesisRequest::synthesis("Second"));
    while anthropic.calls() == 0 {
        sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(
        engine.status(second).map(|snapshot| snapshot.state),
        Ok(JobState::Pending)
    );
    assert_eq!(engine.cancel(second), CancelOutcome::Cancelled);

    let finished = timeout(WAIT, engine.wait(first)).await;
    assert!(matches!(finished, Ok(Ok(ref snapshot)) if snapshot.state == JobState::Succeeded));
    sleep(Duration::from_millis(50)).await;
    assert_eq!(anthropic.calls(), 1);
    assert_eq!(
        engine.status(second).map(|snapshot| snapshot.state),
        Ok(JobState::Cancelled)
    );
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let (engine, _store) = engine_with(&[], JobsConfig::default());
    let job_id = JobId::new();
    assert_eq!(
        engine.status(job_id).map(|snapshot| snapshot.state),
        Err(EngineError::JobNotFound(job_id))
    );
    assert!(matches!(
        engine.subscribe(job_id),
        Err(EngineError::JobNotFound(_))
    ));
}

#[tokio::test]
async fn test_store_failure_fails_job() {
    let router = router_with(&[ok_provider("anthropic")]);
    let engine = JobEngine::new(router, Arc::new(RejectingStore), JobsConfig::default());

    let job_id = engine.submit(SynthesisRequest::synthesis("Anemia"));
    let finished = timeout(WAIT, engine.wait(job_id)).await;
    let Ok(Ok(finished)) = finished else {
        panic!("job did not finish: {finished:?}");
    };
    assert_eq!(finished.state, JobState::Failed);
    assert!(finished.result.is_none());
    assert!(
        finished
            .error
            .as_deref()
            .is_some_and(|error| error.contains("database unavailable"))
    );
}

#[tokio::test]
async fn test_worker_panic_fails_job() {
    let anthropic = Arc::new(TestProvider::new("anthropic", Behavior::Panic));
    let (engine, _store) = engine_with(&[anthropic], JobsConfig::default());

    let job_id = engine.submit(SynthesisRequest::synthesis("Crash"));
    let finished = timeout(WAIT, engine.wait(job_id)).await;
    let Ok(Ok(finished)) = finished else {
        panic!("job did not finish: {finished:?}");
    };
    assert_eq!(finished.state, JobState::Failed);
    assert!(finished.error.is_some());
}

#[tokio::test]
async fn test_subscribe_to_finished_job_yields_final_event() {
    let (engine, _store) = engine_with(&[ok_provider("groq")], JobsConfig::default());
    let job_id = engine.submit(SynthesisRequest::new(TaskKind::SimpleQa, "Normal potassium?"));
    let finished = timeout(WAIT, engine.wait(job_id)).await;
    assert!(finished.is_ok());

    let events = collect_events(&engine, job_id).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].state, JobState::Succeeded);
    assert_eq!(events[0].progress, 100);
}

#[tokio::test]
async fn test_subscribe_all_and_prune() {
    let (engine, _store) = engine_with(&[ok_provider("anthropic")], JobsConfig::default());
    let mut all = engine.subscribe_all();

    let first = engine.submit(SynthesisRequest::synthesis("Topic one"));
    let second = engine.submit(SynthesisRequest::synthesis("Topic two"));
    for job_id in [first, second] {
        let finished = timeout(WAIT, engine.wait(job_id)).await;
        assert!(finished.is_ok());
    }

    let mut terminal = Vec::new();
    while let Ok(event) = all.try_recv() {
        if event.is_terminal() {
            terminal.push(event.job_id);
        }
    }
    assert!(terminal.contains(&first));
    assert!(terminal.contains(&second));

    assert_eq!(engine.list().len(), 2);
    assert_eq!(engine.prune_finished(Duration::from_secs(3600)), 0);
    assert_eq!(engine.prune_finished(Duration::ZERO), 2);
    assert!(engine.list().is_empty());
    assert!(matches!(engine.status(first), Err(EngineError::JobNotFound(_))));
}

#[tokio::test]
async fn test_submit_prunes_jobs_past_retention() {
    let config = JobsConfig {
        retention_minutes: 0,
        ..JobsConfig::default()
    };
    let (engine, _store) = engine_with(&[ok_provider("anthropic")], config);

    let first = engine.submit(SynthesisRequest::synthesis("Old topic"));
    let finished = timeout(WAIT, engine.wait(first)).await;
    assert!(matches!(finished, Ok(Ok(ref snapshot)) if snapshot.state == JobState::Succeeded));

    let second = engine.submit(SynthesisRequest::synthesis("New topic"));
    assert!(matches!(engine.status(first), Err(EngineError::JobNotFound(_))));
    assert!(engine.status(second).is_ok());
    assert_eq!(engine.list().len(), 1);
}

#[tokio::test]
async fn test_shutdown_cancels_running_jobs() {
    let anthropic = slow_provider("anthropic", Duration::from_millis(200));
    let (engine, _store) = engine_with(&[Arc::clone(&anthropic)], JobsConfig::default());

    let job_id = engine.submit(SynthesisRequest::synthesis("Shutdown topic"));
    while anthropic.calls() == 0 {
        sleep(Duration::from_millis(5)).await;
    }
    engine.shutdown();

    let finished = timeout(WAIT, engine.wait(job_id)).await;
    assert!(matches!(finished, Ok(Ok(ref snapshot)) if snapshot.state == JobState::Cancelled));
}

#[tokio::test]
async fn test_service_applies_preferences() {
    let anthropic = ok_provider("anthropic");
    let (engine, _store) = engine_with(&[Arc::clone(&anthropic)], JobsConfig::default());
    let preferences = UserPreferences {
        specialty: Some("cardiology".to_owned()),
        target_length: Some(900),
        evidence_level: Some(EvidenceLevel::Strong),
    };
    let service = SynthesisService::new(engine, Arc::new(StaticPreferences(preferences)));

    let request = SynthesisRequest::synthesis("Atrial fibrillation").with_target_length(400);
    let job_id = service.submit_synthesis(request).await;
    let Ok(job_id) = job_id else {
        panic!("submit failed: {job_id:?}");
    };
    let finished = timeout(WAIT, service.engine().wait(job_id)).await;
    assert!(finished.is_ok());

    let seen = anthropic
        .last_request()
        .unwrap_or_else(|| panic!("provider never called"));
    assert_eq!(seen.options.specialty.as_deref(), Some("cardiology"));
    assert_eq!(seen.options.target_length, Some(400));
    assert_eq!(seen.options.evidence_level, EvidenceLevel::Strong);
    let snapshot = service.job_status(job_id);
    assert!(matches!(snapshot, Ok(ref snapshot) if snapshot.state == JobState::Succeeded));
}

#[tokio::test]
async fn test_service_rejects_invalid_requests() {
    let (engine, _store) = engine_with(&[ok_provider("anthropic")], JobsConfig::default());
    let service = SynthesisService::new(engine, Arc::new(NoPreferences));

    let empty = service.submit_synthesis(SynthesisRequest::synthesis("   ")).await;
    assert!(matches!(empty, Err(EngineError::InvalidRequest(_))));

    let wrong_kind = service
        .ask_question(TaskKind::Synthesis, Payload::new("Write a chapter"))
        .await;
    assert!(matches!(wrong_kind, Err(EngineError::InvalidRequest(_))));
    assert_eq!(service.cancel_job(JobId::new()), CancelOutcome::NotFound);
}

#[tokio::test]
async fn test_ask_question_is_synchronous() {
    let groq = ok_provider("groq");
    let (engine, _store) = engine_with(&[Arc::clone(&groq)], JobsConfig::default());
    let service = SynthesisService::new(engine, Arc::new(NoPreferences));

    let answer = service
        .ask_question(TaskKind::SimpleQa, Payload::new("What is a normal sodium level?"))
        .await;
    let Ok(answer) = answer else {
        panic!("question failed: {answer:?}");
    };
    assert_eq!(answer.served_by, "groq");
    assert!(!answer.degraded);
    assert!(service.engine().list().is_empty());

    let again = service
        .ask_question(TaskKind::SimpleQa, Payload::new("What is a normal sodium level?"))
        .await;
    assert!(matches!(again, Ok(ref again) if again.from_cache));
    assert_eq!(groq.calls(), 1);
}
