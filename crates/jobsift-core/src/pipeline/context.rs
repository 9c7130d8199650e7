use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::attempt::{Attempt, AttemptStatus};
use crate::board::BoardMatch;
use crate::cache::Clock;
use crate::error::AppError;
use crate::events::EventRecorder;
use crate::models::{ExtractionResult, FetchMode, ScrapedFields, Target};

/// Mutable state of one pipeline run. Never shared between runs.
pub struct Context {
    pub target: Target,
    pub attempt: Attempt,
    pub board: BoardMatch,
    pub raw_html: Option<String>,
    pub cleaned: Option<String>,
    pub fetch_mode: FetchMode,
    /// Fields gathered by the cheap scrapers, used to pre-fill the result.
    pub scraped: ScrapedFields,
    /// The accepted result, set by the step that returns `StopSuccess`.
    pub result: Option<ExtractionResult>,
    /// Highest confidence seen across extractors, accepted or not.
    pub best_confidence: Option<f64>,
    pub tokens_used: Option<u32>,
    pub api_log_id: Option<uuid::Uuid>,
    pub events: EventRecorder,
    clock: Arc<dyn Clock>,
    attempt_dirty: bool,
}

impl Context {
    pub fn new(target: Target, attempt: Attempt, clock: Arc<dyn Clock>) -> Self {
        Self {
            target,
            attempt,
            board: BoardMatch::unknown(),
            raw_html: None,
            cleaned: None,
            fetch_mode: FetchMode::Static,
            scraped: ScrapedFields::default(),
            result: None,
            best_confidence: None,
            tokens_used: None,
            api_log_id: None,
            events: EventRecorder::default(),
            clock,
            attempt_dirty: false,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Advance the attempt along the happy path; the runner persists it
    /// after the step returns.
    pub fn advance_attempt(&mut self, status: AttemptStatus) -> Result<(), AppError> {
        let before = self.attempt.status;
        self.attempt.advance_to(status, self.clock.now())?;
        if self.attempt.status != before {
            self.attempt_dirty = true;
        }
        Ok(())
    }

    pub(crate) fn take_attempt_dirty(&mut self) -> bool {
        std::mem::take(&mut self.attempt_dirty)
    }

    /// Replace the working HTML.
    pub fn set_html(&mut self, raw: String, cleaned: String, mode: FetchMode) {
        self.raw_html = Some(raw);
        self.cleaned = Some(cleaned);
        self.fetch_mode = mode;
    }

    pub fn raw_html(&self) -> &str {
        self.raw_html.as_deref().unwrap_or_default()
    }

    pub fn cleaned(&self) -> &str {
        self.cleaned.as_deref().unwrap_or_default()
    }

    /// Length of the cleaned text in characters.
    pub fn text_length(&self) -> usize {
        self.cleaned().trim().chars().count()
    }

    pub fn note_confidence(&mut self, confidence: f64) {
        self.best_confidence = Some(match self.best_confidence {
            Some(best) => best.max(confidence),
            None => confidence,
        });
    }

    /// Accept a result, pre-filling blanks from the cheap scrapers.
    pub fn accept(&mut self, mut result: ExtractionResult) -> Vec<&'static str> {
        self.note_confidence(result.confidence);
        let prefilled = result.prefill_from(&self.scraped);
        self.result = Some(result);
        prefilled
    }
}
