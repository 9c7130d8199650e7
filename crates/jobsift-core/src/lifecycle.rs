//! Attempt creation, dedup and state transitions against an [`AttemptStore`].

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::{Value, json};

use crate::attempt::{Attempt, AttemptStatus, NewAttempt};
use crate::cache::Clock;
use crate::error::AppError;
use crate::models::{ExtractionMethod, Target};
use crate::traits::AttemptStore;

/// How many recent attempts are inspected for dedup.
const DEDUP_SCAN_LIMIT: usize = 20;

/// Result of [`AttemptLifecycle::create_or_reuse`].
#[derive(Debug, Clone, PartialEq)]
pub enum Acquired {
    /// A non-terminal attempt created within the dedup window.
    Reused(Attempt),
    Created(Attempt),
    /// A completed attempt within the dedup window already satisfies the target.
    Skip { completed: Attempt },
}

/// Fields written when an attempt completes.
#[derive(Debug, Clone)]
pub struct Completion {
    pub method: ExtractionMethod,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub confidence: f64,
    pub tokens: Option<u32>,
    /// Merged into `response_metadata`.
    pub metadata: Value,
}

#[derive(Clone)]
pub struct AttemptLifecycle<S> {
    store: S,
    clock: Arc<dyn Clock>,
    dedup_window: TimeDelta,
}

impl<S: AttemptStore> AttemptLifecycle<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>, dedup_window: TimeDelta) -> Self {
        Self {
            store,
            clock,
            dedup_window,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Find an attempt to drive for `target`, or create one.
    ///
    /// Without `force`, a non-terminal attempt created inside the dedup
    /// window is returned unchanged, and a completion inside the window
    /// yields [`Acquired::Skip`].
    pub async fn create_or_reuse(&self, target: &Target, force: bool) -> Result<Acquired, AppError> {
        let now = self.now();

        if !force {
            let recent = self
                .store
                .list_for_target(target.id, DEDUP_SCAN_LIMIT)
                .await?;

            if let Some(in_flight) = recent
                .iter()
                .find(|a| !a.status.is_terminal() && a.age(now) <= self.dedup_window)
            {
                tracing::info!(
                    attempt_id = %in_flight.id,
                    status = %in_flight.status,
                    url = %target.url,
                    "Reusing recent attempt"
                );
                return Ok(Acquired::Reused(in_flight.clone()));
            }

            if let Some(done) = recent.iter().find(|a| {
                a.status == AttemptStatus::Completed
                    && now - a.completed_at.unwrap_or(a.created_at) <= self.dedup_window
            }) {
                tracing::info!(attempt_id = %done.id, url = %target.url, "Recently completed, skipping");
                return Ok(Acquired::Skip {
                    completed: done.clone(),
                });
            }
        }

        let attempt = NewAttempt::for_target(target).into_attempt(now);
        self.store.insert(&attempt).await?;
        tracing::debug!(attempt_id = %attempt.id, url = %target.url, force, "Created attempt");
        Ok(Acquired::Created(attempt))
    }

    /// Persist an attempt after in-memory transitions.
    pub async fn save(&self, attempt: &Attempt) -> Result<(), AppError> {
        self.store.update(attempt).await
    }

    /// Advance along the happy path and persist.
    pub async fn advance(&self, attempt: &mut Attempt, status: AttemptStatus) -> Result<(), AppError> {
        attempt.advance_to(status, self.now())?;
        self.store.update(attempt).await
    }

    /// Mark completed, filling in skipped intermediate transitions.
    pub async fn complete(&self, attempt: &mut Attempt, completion: Completion) -> Result<(), AppError> {
        attempt.advance_to(AttemptStatus::Completed, self.now())?;
        attempt.extraction_method = Some(completion.method);
        attempt.provider = completion.provider;
        attempt.model = completion.model;
        attempt.confidence_score = Some(completion.confidence);
        attempt.tokens_used = completion.tokens;
        merge_object(&mut attempt.response_metadata, completion.metadata);
        attempt.failed_step = None;
        attempt.error_message = None;
        self.store.update(attempt).await?;
        tracing::info!(
            attempt_id = %attempt.id,
            method = %completion.method,
            confidence = completion.confidence,
            duration_ms = ?attempt.duration_ms,
            "Attempt completed"
        );
        Ok(())
    }

    /// Record the failing step and move to `failed`. Retryability is decided elsewhere.
    pub async fn fail(&self, attempt: &mut Attempt, failed_step: &str, message: &str) -> Result<(), AppError> {
        attempt.transition(AttemptStatus::Failed, self.now())?;
        attempt.failed_step = Some(failed_step.to_string());
        attempt.error_message = Some(message.to_string());
        self.store.update(attempt).await?;
        tracing::warn!(
            attempt_id = %attempt.id,
            step = failed_step,
            error = message,
            "Attempt failed"
        );
        Ok(())
    }

    /// Stamp when the retry scheduler should pick a failed attempt up again.
    pub async fn schedule_retry(&self, attempt: &mut Attempt, at: DateTime<Utc>) -> Result<(), AppError> {
        if attempt.status != AttemptStatus::Failed {
            return Err(AppError::InvalidTransition {
                from: attempt.status.to_string(),
                to: AttemptStatus::Retrying.to_string(),
            });
        }
        attempt.next_retry_at = Some(at);
        attempt.updated_at = self.now();
        self.store.update(attempt).await
    }

    /// `failed -> retrying`, counting the retry.
    pub async fn mark_retrying(&self, attempt: &mut Attempt) -> Result<(), AppError> {
        attempt.transition(AttemptStatus::Retrying, self.now())?;
        attempt.retry_count += 1;
        attempt.next_retry_at = None;
        attempt.started_at = None;
        attempt.completed_at = None;
        self.store.update(attempt).await
    }

    pub async fn dead_letter(&self, attempt: &mut Attempt, reason: &str) -> Result<(), AppError> {
        attempt.transition(AttemptStatus::DeadLetter, self.now())?;
        attempt.next_retry_at = None;
        merge_object(
            &mut attempt.response_metadata,
            json!({ "dead_letter_reason": reason }),
        );
        self.store.update(attempt).await?;
        tracing::info!(attempt_id = %attempt.id, reason, "Attempt dead-lettered");
        Ok(())
    }

    /// Operator override; allowed from any status.
    pub async fn override_manual(&self, attempt: &mut Attempt, note: &str) -> Result<(), AppError> {
        attempt.transition(AttemptStatus::Manual, self.now())?;
        attempt.next_retry_at = None;
        merge_object(&mut attempt.response_metadata, json!({ "manual_note": note }));
        self.store.update(attempt).await
    }

    pub async fn get(&self, id: uuid::Uuid) -> Result<Attempt, AppError> {
        self.store
            .get(id)
            .await?
            .ok_or(AppError::AttemptNotFound(id))
    }
}

/// Shallow-merge `extra` into `base` when both are objects; otherwise replace.
pub(crate) fn merge_object(base: &mut Value, extra: Value) {
    match (base, extra) {
        (Value::Object(base), Value::Object(extra)) => base.extend(extra),
        (base, Value::Null) => {
            if base.is_null() {
                *base = json!({});
            }
        }
        (base, extra) => *base = extra,
    }
}
