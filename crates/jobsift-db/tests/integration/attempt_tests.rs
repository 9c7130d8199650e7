use chrono::{TimeDelta, Utc};
use jobsift_core::attempt::AttemptStatus;
use jobsift_core::error::AppError;
use jobsift_core::models::ExtractionMethod;
use jobsift_db::AttemptRepository;

use crate::integration::common::{new_attempt, setup_test_db, target};

#[tokio::test]
async fn insert_and_get_round_trips_columns() {
    let (pool, _container) = setup_test_db().await;
    let repo = AttemptRepository::new(pool);
    let target = target("https://boards.greenhouse.io/acme/jobs/1");

    let mut attempt = new_attempt(&target);
    attempt.response_metadata = serde_json::json!({"board": "greenhouse"});
    repo.insert(&attempt).await.unwrap();

    let stored = repo.get(attempt.id).await.unwrap().expect("attempt should exist");
    assert_eq!(stored.target_id, target.id);
    assert_eq!(stored.url, target.url);
    assert_eq!(stored.domain, "boards.greenhouse.io");
    assert_eq!(stored.status, AttemptStatus::Pending);
    assert_eq!(stored.retry_count, 0);
    assert_eq!(stored.response_metadata["board"], "greenhouse");
}

#[tokio::test]
async fn update_persists_transition_and_completion_fields() {
    let (pool, _container) = setup_test_db().await;
    let repo = AttemptRepository::new(pool);
    let target = target("https://jobs.lever.co/acme/abc");

    let mut attempt = new_attempt(&target);
    repo.insert(&attempt).await.unwrap();

    let now = Utc::now();
    attempt.advance_to(AttemptStatus::Completed, now).unwrap();
    attempt.extraction_method = Some(ExtractionMethod::Api);
    attempt.confidence_score = Some(0.9);
    attempt.tokens_used = Some(1200);
    attempt.duration_ms = Some(850);
    repo.update(&attempt).await.unwrap();

    let stored = repo.get(attempt.id).await.unwrap().unwrap();
    assert_eq!(stored.status, AttemptStatus::Completed);
    assert_eq!(stored.extraction_method, Some(ExtractionMethod::Api));
    assert_eq!(stored.confidence_score, Some(0.9));
    assert_eq!(stored.tokens_used, Some(1200));
    assert_eq!(stored.duration_ms, Some(850));
    assert!(stored.completed_at.is_some());
}

#[tokio::test]
async fn update_of_unknown_attempt_is_not_found() {
    let (pool, _container) = setup_test_db().await;
    let repo = AttemptRepository::new(pool);
    let attempt = new_attempt(&target("https://example.com/jobs/1"));

    let err = repo.update(&attempt).await.unwrap_err();
    assert!(matches!(err, AppError::AttemptNotFound(id) if id == attempt.id));
}

#[tokio::test]
async fn list_for_target_is_newest_first() {
    let (pool, _container) = setup_test_db().await;
    let repo = AttemptRepository::new(pool);
    let target = target("https://example.com/jobs/2");

    let mut older = new_attempt(&target);
    older.created_at = Utc::now() - TimeDelta::minutes(10);
    let newer = new_attempt(&target);
    repo.insert(&older).await.unwrap();
    repo.insert(&newer).await.unwrap();
    repo.insert(&new_attempt(&crate::integration::common::target("https://other.example/1")))
        .await
        .unwrap();

    let listed = repo.list_for_target(target.id, 10).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, newer.id);
    assert_eq!(listed[1].id, older.id);

    let limited = repo.list_for_target(target.id, 1).await.unwrap();
    assert_eq!(limited.len(), 1);
}

#[tokio::test]
async fn due_retries_only_include_failed_attempts_past_their_time() {
    let (pool, _container) = setup_test_db().await;
    let repo = AttemptRepository::new(pool);
    let now = Utc::now();

    let mut due = new_attempt(&target("https://example.com/jobs/due"));
    due.status = AttemptStatus::Failed;
    due.next_retry_at = Some(now - TimeDelta::minutes(1));

    let mut later = new_attempt(&target("https://example.com/jobs/later"));
    later.status = AttemptStatus::Failed;
    later.next_retry_at = Some(now + TimeDelta::minutes(30));

    let mut dead = new_attempt(&target("https://example.com/jobs/dead"));
    dead.status = AttemptStatus::DeadLetter;
    dead.next_retry_at = Some(now - TimeDelta::minutes(1));

    for attempt in [&due, &later, &dead] {
        repo.insert(attempt).await.unwrap();
    }

    let listed = repo.list_due(now, 10).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, due.id);

    let failed = repo.list_by_status(AttemptStatus::Failed, 10).await.unwrap();
    assert_eq!(failed.len(), 2);

    let counts = repo.count_by_status().await.unwrap();
    assert!(counts.contains(&(AttemptStatus::Failed, 2)));
    assert!(counts.contains(&(AttemptStatus::DeadLetter, 1)));
}
