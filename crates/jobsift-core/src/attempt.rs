use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{ExtractionMethod, Target};

/// Status of an extraction attempt.
///
/// ```text
/// pending -> fetching -> extracting -> completed
///    any non-terminal -> failed -> retrying -> fetching
///                        failed -> dead_letter
///                           any -> manual        (operator override)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Pending,
    Fetching,
    Extracting,
    Completed,
    Failed,
    Retrying,
    DeadLetter,
    Manual,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Pending => "pending",
            AttemptStatus::Fetching => "fetching",
            AttemptStatus::Extracting => "extracting",
            AttemptStatus::Completed => "completed",
            AttemptStatus::Failed => "failed",
            AttemptStatus::Retrying => "retrying",
            AttemptStatus::DeadLetter => "dead_letter",
            AttemptStatus::Manual => "manual",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AttemptStatus::Completed
                | AttemptStatus::Failed
                | AttemptStatus::DeadLetter
                | AttemptStatus::Manual
        )
    }

    /// Statuses in which a pipeline run is (or may be) driving the attempt.
    pub fn is_in_progress(&self) -> bool {
        !self.is_terminal()
    }

    /// Position along the happy path, used to advance defensively.
    fn happy_path_rank(&self) -> Option<u8> {
        match self {
            AttemptStatus::Pending | AttemptStatus::Retrying => Some(0),
            AttemptStatus::Fetching => Some(1),
            AttemptStatus::Extracting => Some(2),
            AttemptStatus::Completed => Some(3),
            _ => None,
        }
    }

    /// Whether `self -> next` is an edge of the state machine.
    ///
    /// The operator override to `manual` is always allowed.
    pub fn can_transition_to(&self, next: AttemptStatus) -> bool {
        use AttemptStatus::*;
        match (self, next) {
            (_, Manual) => true,
            (Pending, Fetching) | (Retrying, Fetching) => true,
            (Fetching, Extracting) | (Extracting, Completed) => true,
            (from, Failed) if !from.is_terminal() => true,
            (Failed, Retrying) | (Failed, DeadLetter) | (Retrying, DeadLetter) => true,
            _ => false,
        }
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AttemptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(AttemptStatus::Pending),
            "fetching" => Ok(AttemptStatus::Fetching),
            "extracting" => Ok(AttemptStatus::Extracting),
            "completed" => Ok(AttemptStatus::Completed),
            "failed" => Ok(AttemptStatus::Failed),
            "retrying" => Ok(AttemptStatus::Retrying),
            "dead_letter" => Ok(AttemptStatus::DeadLetter),
            "manual" => Ok(AttemptStatus::Manual),
            _ => Err(format!("Unknown attempt status: {}", s)),
        }
    }
}

/// One persisted extraction run for a [`Target`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: Uuid,
    pub target_id: Uuid,
    pub url: String,
    pub domain: String,
    pub status: AttemptStatus,
    pub failed_step: Option<String>,
    pub error_message: Option<String>,
    pub extraction_method: Option<ExtractionMethod>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub confidence_score: Option<f64>,
    pub tokens_used: Option<u32>,
    pub duration_ms: Option<u64>,
    pub response_metadata: serde_json::Value,
    pub retry_count: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Attempt {
    /// Move along one state-machine edge, stamping timestamps.
    pub fn transition(&mut self, next: AttemptStatus, now: DateTime<Utc>) -> Result<(), AppError> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }

        if next == AttemptStatus::Fetching && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.completed_at = Some(now);
            let started = self.started_at.unwrap_or(self.created_at);
            self.duration_ms = Some((now - started).num_milliseconds().max(0) as u64);
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Walk forward along the happy path until `target` is reached.
    ///
    /// No-op when the attempt is already at or past `target`. Fast paths
    /// (API extraction) skip sub-transitions, this fills them in.
    pub fn advance_to(&mut self, target: AttemptStatus, now: DateTime<Utc>) -> Result<(), AppError> {
        let Some(goal) = target.happy_path_rank() else {
            return self.transition(target, now);
        };
        loop {
            let Some(current) = self.status.happy_path_rank() else {
                return Err(AppError::InvalidTransition {
                    from: self.status.to_string(),
                    to: target.to_string(),
                });
            };
            if current >= goal {
                return Ok(());
            }
            let next = match self.status {
                AttemptStatus::Pending | AttemptStatus::Retrying => AttemptStatus::Fetching,
                AttemptStatus::Fetching => AttemptStatus::Extracting,
                _ => AttemptStatus::Completed,
            };
            self.transition(next, now)?;
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> TimeDelta {
        now - self.created_at
    }

    pub fn can_retry(&self, config: &RetryConfig) -> bool {
        self.retry_count < config.max_retries
    }

    pub fn calculate_next_retry(&self, config: &RetryConfig, now: DateTime<Utc>) -> DateTime<Utc> {
        now + config.delay_for_attempt(self.retry_count + 1)
    }
}

/// DTO for creating a new attempt.
#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub target_id: Uuid,
    pub url: String,
    pub domain: String,
}

impl NewAttempt {
    pub fn for_target(target: &Target) -> Self {
        Self {
            target_id: target.id,
            url: target.url.clone(),
            domain: target.domain(),
        }
    }

    /// Materialize the attempt in `pending`.
    pub fn into_attempt(self, now: DateTime<Utc>) -> Attempt {
        Attempt {
            id: Uuid::new_v4(),
            target_id: self.target_id,
            url: self.url,
            domain: self.domain,
            status: AttemptStatus::Pending,
            failed_step: None,
            error_message: None,
            extraction_method: None,
            provider: None,
            model: None,
            confidence_score: None,
            tokens_used: None,
            duration_ms: None,
            response_metadata: serde_json::json!({}),
            retry_count: 0,
            next_retry_at: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }
}

/// Retry configuration with exponential backoff.
///
/// Delay schedule: 1min, 5min, 30min, 60min (capped).
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub max_delay: TimeDelta,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_delay: TimeDelta::minutes(60),
        }
    }
}

impl RetryConfig {
    /// Calculate delay for a given attempt number (1-indexed).
    ///
    /// - Attempt 1: 1 minute
    /// - Attempt 2: 5 minutes
    /// - Attempt 3: 30 minutes
    /// - Attempt 4+: 60 minutes (capped by max_delay)
    pub fn delay_for_attempt(&self, attempt: u32) -> TimeDelta {
        let delay = match attempt {
            0 | 1 => TimeDelta::minutes(1),
            2 => TimeDelta::minutes(5),
            3 => TimeDelta::minutes(30),
            _ => TimeDelta::minutes(60),
        };
        std::cmp::min(delay, self.max_delay)
    }
}
