//! Per-step observability events.
//!
//! Steps describe what they did through the [`EventRecorder`] held by the
//! pipeline context; the runner turns each step's report into exactly one
//! [`NewEvent`] and hands it to the configured [`EventSink`](crate::traits::EventSink).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Success,
    Skipped,
    Failed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Success => "success",
            EventStatus::Skipped => "skipped",
            EventStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(EventStatus::Success),
            "skipped" => Ok(EventStatus::Skipped),
            "failed" => Ok(EventStatus::Failed),
            _ => Err(format!("Unknown event status: {s}")),
        }
    }
}

/// An event ready to be persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    pub attempt_id: Uuid,
    pub step: String,
    pub status: EventStatus,
    pub input: Value,
    pub output: Value,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// A persisted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub id: Uuid,
    pub attempt_id: Uuid,
    pub step: String,
    pub status: EventStatus,
    pub input: Value,
    pub output: Value,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PipelineEvent {
    pub fn from_new(event: NewEvent, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            attempt_id: event.attempt_id,
            step: event.step,
            status: event.status,
            input: event.input,
            output: event.output,
            duration_ms: event.duration_ms,
            error: event.error,
            created_at,
        }
    }
}

/// What the current step said about itself.
#[derive(Debug, Clone, Default)]
pub struct StepReport {
    pub input: Option<Value>,
    pub output: Option<Value>,
    pub skipped: Option<String>,
    pub error: Option<String>,
}

/// Collects the report of the step currently running.
#[derive(Debug, Default)]
pub struct EventRecorder {
    current: StepReport,
}

impl EventRecorder {
    pub fn input(&mut self, value: Value) {
        self.current.input = Some(value);
    }

    pub fn output(&mut self, value: Value) {
        self.current.output = Some(value);
    }

    /// Mark the step as skipped with a reason.
    pub fn skipped(&mut self, reason: impl Into<String>) {
        self.current.skipped = Some(reason.into());
    }

    /// Note an error the step absorbed.
    pub fn error(&mut self, message: impl Into<String>) {
        self.current.error = Some(message.into());
    }

    pub fn take(&mut self) -> StepReport {
        std::mem::take(&mut self.current)
    }
}
