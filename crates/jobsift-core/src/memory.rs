//! In-memory implementations of the persistence traits.
//!
//! Used by `--dry-run` and by tests. Nothing here survives the process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::api_log::NewApiCallLog;
use crate::attempt::{Attempt, AttemptStatus};
use crate::error::AppError;
use crate::events::{NewEvent, PipelineEvent};
use crate::merge::{AppliedUpdate, JobPosting, merge_extracted};
use crate::models::{ExtractionResult, Target};
use crate::resolver::{Company, JobRole};
use crate::traits::{ApiCallLogger, AttemptStore, CompanyDirectory, EventSink, JobSink};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Attempts
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MemoryAttemptStore {
    attempts: Arc<Mutex<Vec<Attempt>>>,
}

impl MemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.attempts).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all(&self) -> Vec<Attempt> {
        lock(&self.attempts).clone()
    }
}

impl AttemptStore for MemoryAttemptStore {
    async fn insert(&self, attempt: &Attempt) -> Result<(), AppError> {
        lock(&self.attempts).push(attempt.clone());
        Ok(())
    }

    async fn update(&self, attempt: &Attempt) -> Result<(), AppError> {
        let mut attempts = lock(&self.attempts);
        match attempts.iter_mut().find(|a| a.id == attempt.id) {
            Some(slot) => {
                *slot = attempt.clone();
                Ok(())
            }
            None => Err(AppError::AttemptNotFound(attempt.id)),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<Attempt>, AppError> {
        Ok(lock(&self.attempts).iter().find(|a| a.id == id).cloned())
    }

    async fn list_for_target(&self, target_id: Uuid, limit: usize) -> Result<Vec<Attempt>, AppError> {
        let mut found: Vec<Attempt> = lock(&self.attempts)
            .iter()
            .filter(|a| a.target_id == target_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found.truncate(limit);
        Ok(found)
    }

    async fn list_by_status(&self, status: AttemptStatus, limit: usize) -> Result<Vec<Attempt>, AppError> {
        let mut found: Vec<Attempt> = lock(&self.attempts)
            .iter()
            .filter(|a| a.status == status)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        found.truncate(limit);
        Ok(found)
    }

    async fn list_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Attempt>, AppError> {
        let mut found: Vec<Attempt> = lock(&self.attempts)
            .iter()
            .filter(|a| a.status == AttemptStatus::Failed && a.next_retry_at.is_some_and(|at| at <= now))
            .cloned()
            .collect();
        found.sort_by_key(|a| a.next_retry_at);
        found.truncate(limit);
        Ok(found)
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MemoryEventSink {
    events: Arc<Mutex<Vec<PipelineEvent>>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventSink for MemoryEventSink {
    async fn record(&self, event: &NewEvent) -> Result<(), AppError> {
        lock(&self.events).push(PipelineEvent::from_new(event.clone(), Utc::now()));
        Ok(())
    }

    async fn latest_for_step(&self, attempt_id: Uuid, step: &str) -> Result<Option<PipelineEvent>, AppError> {
        Ok(lock(&self.events)
            .iter()
            .rev()
            .find(|e| e.attempt_id == attempt_id && e.step == step)
            .cloned())
    }

    async fn list_for_attempt(&self, attempt_id: Uuid) -> Result<Vec<PipelineEvent>, AppError> {
        Ok(lock(&self.events)
            .iter()
            .filter(|e| e.attempt_id == attempt_id)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// API call logs
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MemoryApiCallLogger {
    entries: Arc<Mutex<Vec<NewApiCallLog>>>,
}

impl MemoryApiCallLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<NewApiCallLog> {
        lock(&self.entries).clone()
    }
}

impl ApiCallLogger for MemoryApiCallLogger {
    async fn log(&self, entry: &NewApiCallLog) -> Result<(), AppError> {
        lock(&self.entries).push(entry.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Job postings (sink)
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MemoryJobSink {
    postings: Arc<Mutex<HashMap<Uuid, JobPosting>>>,
}

impl MemoryJobSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a posting, e.g. one carrying placeholder values.
    pub fn with_posting(self, posting: JobPosting) -> Self {
        lock(&self.postings).insert(posting.id, posting);
        self
    }

    pub fn posting(&self, id: Uuid) -> Option<JobPosting> {
        lock(&self.postings).get(&id).cloned()
    }
}

impl JobSink for MemoryJobSink {
    async fn apply_extracted(
        &self,
        target: &Target,
        result: &ExtractionResult,
        update: &AppliedUpdate,
    ) -> Result<Vec<String>, AppError> {
        let now = Utc::now();
        let mut postings = lock(&self.postings);
        let posting = postings
            .entry(target.id)
            .or_insert_with(|| JobPosting::new(target.id, target.url.clone(), now));
        let changed = merge_extracted(posting, result, update, now);
        Ok(changed.into_iter().map(String::from).collect())
    }
}

// ---------------------------------------------------------------------------
// Companies / job roles
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MemoryDirectory {
    companies: Arc<Mutex<Vec<Company>>>,
    roles: Arc<Mutex<Vec<JobRole>>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn company_count(&self) -> usize {
        lock(&self.companies).len()
    }

    pub fn role_count(&self) -> usize {
        lock(&self.roles).len()
    }
}

impl CompanyDirectory for MemoryDirectory {
    async fn company_candidates(&self, _name: &str, _domain: Option<&str>) -> Result<Vec<Company>, AppError> {
        Ok(lock(&self.companies).clone())
    }

    async fn create_company(&self, name: &str, domain: Option<&str>) -> Result<Company, AppError> {
        let company = Company {
            id: Uuid::new_v4(),
            name: name.to_string(),
            domain: domain.map(str::to_string),
        };
        lock(&self.companies).push(company.clone());
        Ok(company)
    }

    async fn role_candidates(&self, company_id: Uuid, _title: &str) -> Result<Vec<JobRole>, AppError> {
        Ok(lock(&self.roles)
            .iter()
            .filter(|r| r.company_id == company_id)
            .cloned()
            .collect())
    }

    async fn create_role(&self, company_id: Uuid, title: &str) -> Result<JobRole, AppError> {
        let role = JobRole {
            id: Uuid::new_v4(),
            company_id,
            title: title.to_string(),
        };
        lock(&self.roles).push(role.clone());
        Ok(role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attempt::NewAttempt;
    use crate::models::Provenance;
    use chrono::TimeDelta;

    #[tokio::test]
    async fn attempts_are_listed_newest_first_per_target() {
        let store = MemoryAttemptStore::new();
        let target = Target::new(Uuid::new_v4(), "https://example.com/jobs/1");
        let t0 = Utc::now();
        let older = NewAttempt::for_target(&target).into_attempt(t0);
        let newer = NewAttempt::for_target(&target).into_attempt(t0 + TimeDelta::seconds(5));
        store.insert(&older).await.unwrap();
        store.insert(&newer).await.unwrap();

        let listed = store.list_for_target(target.id, 10).await.unwrap();
        assert_eq!(listed[0].id, newer.id);
        assert_eq!(listed[1].id, older.id);

        let pending = store.list_by_status(AttemptStatus::Pending, 1).await.unwrap();
        assert_eq!(pending[0].id, older.id);
    }

    #[tokio::test]
    async fn update_of_unknown_attempt_fails() {
        let store = MemoryAttemptStore::new();
        let target = Target::new(Uuid::new_v4(), "https://example.com/jobs/1");
        let attempt = NewAttempt::for_target(&target).into_attempt(Utc::now());
        assert!(matches!(
            store.update(&attempt).await,
            Err(AppError::AttemptNotFound(_))
        ));
    }

    #[tokio::test]
    async fn job_sink_creates_then_fills_only_placeholders() {
        let target = Target::new(Uuid::new_v4(), "https://example.com/jobs/1");
        let mut seeded = JobPosting::new(target.id, target.url.clone(), Utc::now());
        seeded.title = Some("Untitled".into());
        seeded.location = Some("Lisbon".into());
        let sink = MemoryJobSink::new().with_posting(seeded);

        let mut result = ExtractionResult::empty(Provenance::api("lever"));
        result.title = Some("Platform Engineer".into());
        result.location = Some("Remote".into());
        result.confidence = 0.8;
        let update = AppliedUpdate {
            attempt_id: Uuid::new_v4(),
            method: result.provenance.method,
            provider: Some("lever".into()),
            model: None,
            confidence: 0.8,
            data_hash: "abc".into(),
            company_id: None,
            job_role_id: None,
        };

        let changed = sink.apply_extracted(&target, &result, &update).await.unwrap();
        assert_eq!(changed, vec!["title".to_string()]);
        let stored = sink.posting(target.id).unwrap();
        assert_eq!(stored.title.as_deref(), Some("Platform Engineer"));
        assert_eq!(stored.location.as_deref(), Some("Lisbon"));
    }
}
