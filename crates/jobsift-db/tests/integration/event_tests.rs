use chrono::Utc;
use jobsift_core::api_log::{ApiCallStatus, NewApiCallLog};
use jobsift_core::events::{EventStatus, NewEvent};
use jobsift_core::traits::EventSink;
use jobsift_db::{ApiCallLogRepository, AttemptRepository, EventRepository};
use serde_json::json;
use uuid::Uuid;

use crate::integration::common::{new_attempt, setup_test_db, target};

fn event(attempt_id: Uuid, step: &str, status: EventStatus) -> NewEvent {
    NewEvent {
        attempt_id,
        step: step.into(),
        status,
        input: json!({"url": "https://example.com/jobs/1"}),
        output: json!({}),
        duration_ms: 12,
        error: (status == EventStatus::Failed).then(|| "boom".to_string()),
    }
}

#[tokio::test]
async fn events_are_listed_in_recording_order() {
    let (pool, _container) = setup_test_db().await;
    let attempts = AttemptRepository::new(pool.clone());
    let events = EventRepository::new(pool);
    let attempt = new_attempt(&target("https://example.com/jobs/1"));
    attempts.insert(&attempt).await.unwrap();

    for step in ["detect_job_board", "html_fetch", "ai_extraction"] {
        EventSink::record(&events, &event(attempt.id, step, EventStatus::Success))
            .await
            .unwrap();
    }

    let listed = events.list_for_attempt(attempt.id).await.unwrap();
    let steps: Vec<&str> = listed.iter().map(|e| e.step.as_str()).collect();
    assert_eq!(steps, ["detect_job_board", "html_fetch", "ai_extraction"]);
    assert_eq!(listed[0].duration_ms, 12);
}

#[tokio::test]
async fn latest_for_step_returns_most_recent() {
    let (pool, _container) = setup_test_db().await;
    let attempts = AttemptRepository::new(pool.clone());
    let events = EventRepository::new(pool);
    let attempt = new_attempt(&target("https://example.com/jobs/2"));
    attempts.insert(&attempt).await.unwrap();

    events
        .record(&event(attempt.id, "rendered_fallback", EventStatus::Skipped))
        .await
        .unwrap();
    events
        .record(&event(attempt.id, "rendered_fallback", EventStatus::Failed))
        .await
        .unwrap();

    let latest = events
        .latest_for_step(attempt.id, "rendered_fallback")
        .await
        .unwrap()
        .expect("event recorded");
    assert_eq!(latest.status, EventStatus::Failed);
    assert_eq!(latest.error.as_deref(), Some("boom"));

    assert!(events.latest_for_step(attempt.id, "html_fetch").await.unwrap().is_none());
}

#[tokio::test]
async fn api_calls_are_logged_and_summarized() {
    let (pool, _container) = setup_test_db().await;
    let attempts = AttemptRepository::new(pool.clone());
    let logs = ApiCallLogRepository::new(pool);
    let attempt = new_attempt(&target("https://example.com/jobs/3"));
    attempts.insert(&attempt).await.unwrap();

    let started = Utc::now() - chrono::TimeDelta::minutes(1);
    for status in [ApiCallStatus::Success, ApiCallStatus::RateLimited] {
        logs.log(&NewApiCallLog {
            id: Uuid::new_v4(),
            attempt_id: Some(attempt.id),
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            operation: "extract_job".into(),
            status,
            tokens_in: Some(1000),
            tokens_out: Some(200),
            latency_ms: 900,
            request_payload: "{}".into(),
            response_payload: None,
            confidence: None,
            error_class: None,
            error_message: None,
            metadata: json!({}),
            created_at: Utc::now(),
        })
        .await
        .unwrap();
    }

    let listed = logs.list_for_attempt(attempt.id).await.unwrap();
    assert_eq!(listed.len(), 2);

    let usage = logs.usage_since(started).await.unwrap();
    assert_eq!(usage.len(), 1);
    assert_eq!(usage[0].calls, 2);
    assert_eq!(usage[0].failures, 1);
    assert_eq!(usage[0].tokens_in, 2000);
    assert_eq!(usage[0].tokens_out, 400);
}
