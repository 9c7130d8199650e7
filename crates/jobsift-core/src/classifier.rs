//! Post-hoc retryability of failed attempts.
//!
//! Logical failures (low confidence, shell pages, removed or forbidden
//! listings) are terminal. Everything else, including a failure to
//! classify, is retryable.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::attempt::{Attempt, RetryConfig};
use crate::error::AppError;
use crate::pipeline::steps::{AI_EXTRACTION, HTML_FETCH, RENDERED_FALLBACK};
use crate::traits::EventSink;

static LOW_CONFIDENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\blow confidence\b").unwrap());
static TERMINAL_HTTP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bHTTP\s*(403|404|410)\b").unwrap());

/// Text below this length in a rendered page marks it as a shell.
pub const SHELL_TEXT_LENGTH: u64 = 300;

/// Message recorded when no extractor cleared the confidence bar.
pub fn low_confidence_message(best: f64) -> String {
    format!("Low confidence: {best:.2}")
}

/// Where a failed attempt goes next.
#[derive(Debug, Clone, PartialEq)]
pub enum Routing {
    Retry { next_at: DateTime<Utc> },
    DeadLetter { reason: String },
}

#[derive(Clone)]
pub struct FailureClassifier<E> {
    events: E,
}

impl<E: EventSink> FailureClassifier<E> {
    pub fn new(events: E) -> Self {
        Self { events }
    }

    /// Whether the failure is worth retrying.
    pub async fn retryable(&self, attempt: &Attempt) -> bool {
        match self.terminal_reason(attempt).await {
            Ok(reason) => reason.is_none(),
            Err(e) => {
                tracing::warn!(attempt_id = %attempt.id, error = %e, "Failure classification failed, assuming retryable");
                true
            }
        }
    }

    /// Why the failure is terminal, `None` when it is retryable.
    pub async fn terminal_reason(&self, attempt: &Attempt) -> Result<Option<String>, AppError> {
        let step = attempt.failed_step.as_deref().unwrap_or_default();
        let message = attempt.error_message.as_deref().unwrap_or_default();

        if step == AI_EXTRACTION && LOW_CONFIDENCE.is_match(message) {
            return Ok(Some("low confidence".into()));
        }

        if step == HTML_FETCH
            && let Some(caps) = TERMINAL_HTTP.captures(message)
        {
            return Ok(Some(format!("HTTP {}", &caps[1])));
        }

        if let Some(event) = self.events.latest_for_step(attempt.id, RENDERED_FALLBACK).await? {
            let output = &event.output;
            if output.get("shell").and_then(|v| v.as_bool()) == Some(true) {
                return Ok(Some("rendered shell page".into()));
            }
            if let Some(len) = output.get("text_length").and_then(|v| v.as_u64())
                && len < SHELL_TEXT_LENGTH
            {
                return Ok(Some(format!("thin content ({len} chars)")));
            }
        }

        Ok(None)
    }

    /// Retry with backoff while retries remain and the failure is transient.
    pub async fn route(&self, attempt: &Attempt, retry: &RetryConfig, now: DateTime<Utc>) -> Routing {
        let reason = match self.terminal_reason(attempt).await {
            Ok(reason) => reason,
            Err(e) => {
                tracing::warn!(attempt_id = %attempt.id, error = %e, "Failure classification failed, assuming retryable");
                None
            }
        };
        match reason {
            Some(reason) => Routing::DeadLetter { reason },
            None if !attempt.can_retry(retry) => Routing::DeadLetter {
                reason: format!("retries exhausted ({})", attempt.retry_count),
            },
            None => Routing::Retry {
                next_at: attempt.calculate_next_retry(retry, now),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attempt::{AttemptStatus, NewAttempt};
    use crate::events::{EventStatus, NewEvent};
    use crate::memory::MemoryEventSink;
    use crate::testutil::FailingEventSink;
    use chrono::TimeDelta;
    use serde_json::json;
    use uuid::Uuid;

    fn failed(step: &str, message: &str) -> Attempt {
        let mut attempt = NewAttempt {
            target_id: Uuid::new_v4(),
            url: "https://example.com/job".into(),
            domain: "example.com".into(),
        }
        .into_attempt(Utc::now());
        attempt.status = AttemptStatus::Failed;
        attempt.failed_step = Some(step.into());
        attempt.error_message = Some(message.into());
        attempt
    }

    async fn record_render(sink: &MemoryEventSink, attempt: &Attempt, output: serde_json::Value) {
        sink.record(&NewEvent {
            attempt_id: attempt.id,
            step: RENDERED_FALLBACK.into(),
            status: EventStatus::Success,
            input: json!({}),
            output,
            duration_ms: 10,
            error: None,
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn http_status_classification() {
        let classifier = FailureClassifier::new(MemoryEventSink::new());
        assert!(!classifier.retryable(&failed(HTML_FETCH, "HTTP 404: https://example.com/job")).await);
        assert!(!classifier.retryable(&failed(HTML_FETCH, "HTTP 410: gone")).await);
        assert!(!classifier.retryable(&failed(HTML_FETCH, "HTTP 403: forbidden")).await);
        assert!(classifier.retryable(&failed(HTML_FETCH, "Connection reset")).await);
        assert!(classifier.retryable(&failed(HTML_FETCH, "HTTP 503: https://example.com")).await);
    }

    #[tokio::test]
    async fn low_confidence_is_terminal_only_for_ai_step() {
        let classifier = FailureClassifier::new(MemoryEventSink::new());
        assert!(!classifier.retryable(&failed(AI_EXTRACTION, "Low confidence: 0.3")).await);
        assert!(!classifier.retryable(&failed(AI_EXTRACTION, &low_confidence_message(0.42))).await);
        assert!(classifier.retryable(&failed(AI_EXTRACTION, "All AI providers failed")).await);
        assert!(classifier.retryable(&failed("orchestration", "Low confidence: 0.1")).await);
    }

    #[tokio::test]
    async fn rendered_shell_is_terminal() {
        let sink = MemoryEventSink::new();
        let classifier = FailureClassifier::new(sink.clone());

        let shell = failed(AI_EXTRACTION, "All AI providers failed");
        record_render(&sink, &shell, json!({"rendered": true, "text_length": 900, "shell": true})).await;
        assert!(!classifier.retryable(&shell).await);

        let thin = failed(AI_EXTRACTION, "All AI providers failed");
        record_render(&sink, &thin, json!({"rendered": true, "text_length": 120, "shell": false})).await;
        assert!(!classifier.retryable(&thin).await);

        let fine = failed(AI_EXTRACTION, "All AI providers failed");
        record_render(&sink, &fine, json!({"rendered": true, "text_length": 4000, "shell": false})).await;
        assert!(classifier.retryable(&fine).await);
    }

    #[tokio::test]
    async fn classification_errors_fail_open() {
        let classifier = FailureClassifier::new(FailingEventSink);
        assert!(classifier.retryable(&failed(AI_EXTRACTION, "timeout")).await);
    }

    #[tokio::test]
    async fn routing_respects_retry_budget() {
        let classifier = FailureClassifier::new(MemoryEventSink::new());
        let retry = RetryConfig::default();
        let now = Utc::now();

        let transient = failed(HTML_FETCH, "Connection reset");
        assert_eq!(
            classifier.route(&transient, &retry, now).await,
            Routing::Retry {
                next_at: now + TimeDelta::minutes(1)
            }
        );

        let mut exhausted = failed(HTML_FETCH, "Connection reset");
        exhausted.retry_count = 3;
        assert!(matches!(
            classifier.route(&exhausted, &retry, now).await,
            Routing::DeadLetter { .. }
        ));

        let gone = failed(HTML_FETCH, "HTTP 404: https://example.com/job");
        assert_eq!(
            classifier.route(&gone, &retry, now).await,
            Routing::DeadLetter {
                reason: "HTTP 404".into()
            }
        );
    }
}
