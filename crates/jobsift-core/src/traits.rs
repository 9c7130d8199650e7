use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::api_log::NewApiCallLog;
use crate::attempt::{Attempt, AttemptStatus};
use crate::board::{BoardMatch, BoardType};
use crate::error::AppError;
use crate::events::{NewEvent, PipelineEvent};
use crate::merge::AppliedUpdate;
use crate::models::{ExtractionResult, ScrapedFields, Target};
use crate::resolver::{Company, JobRole};

/// Fetches raw HTML content from a URL.
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Converts raw HTML into clean Markdown text.
pub trait Cleaner: Send + Sync + Clone {
    fn clean(&self, html: &str) -> Result<String, AppError>;

    /// Board-aware variant. Implementations may narrow to the board's
    /// content root before converting.
    fn clean_for(&self, html: &str, _board: BoardType) -> Result<String, AppError> {
        self.clean(html)
    }
}

/// robots.txt policy. Implementations fail open.
pub trait RobotsPolicy: Send + Sync + Clone {
    fn allowed(&self, url: &str) -> impl Future<Output = bool> + Send;
}

/// Policy that allows every URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl RobotsPolicy for AllowAll {
    async fn allowed(&self, _url: &str) -> bool {
        true
    }
}

/// Synchronous DOM field scraping.
pub trait DomScraper: Send + Sync + Clone {
    /// Board-independent hints: JSON-LD, OpenGraph, headings.
    fn scrape_generic(&self, html: &str) -> ScrapedFields;

    /// Fields from the board's known CSS selectors. Empty for unknown boards.
    fn scrape_board(&self, html: &str, board: BoardType) -> ScrapedFields;
}

/// Structured posting APIs of job boards.
pub trait BoardApi: Send + Sync + Clone {
    /// `Ok(None)` when the board has no API or the posting is not listed.
    fn fetch_posting(
        &self,
        board: &BoardMatch,
    ) -> impl Future<Output = Result<Option<ExtractionResult>, AppError>> + Send;
}

/// Persistence of extraction attempts.
pub trait AttemptStore: Send + Sync + Clone {
    fn insert(&self, attempt: &Attempt) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Overwrite the mutable columns of an existing attempt.
    fn update(&self, attempt: &Attempt) -> impl Future<Output = Result<(), AppError>> + Send;

    fn get(&self, id: Uuid) -> impl Future<Output = Result<Option<Attempt>, AppError>> + Send;

    /// Attempts for a target, newest first.
    fn list_for_target(
        &self,
        target_id: Uuid,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Attempt>, AppError>> + Send;

    /// Attempts in a status, oldest first.
    fn list_by_status(
        &self,
        status: AttemptStatus,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Attempt>, AppError>> + Send;

    /// Failed attempts with `next_retry_at <= now`, earliest due first.
    fn list_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Attempt>, AppError>> + Send;
}

/// Append-only store for per-step observability events.
pub trait EventSink: Send + Sync + Clone {
    fn record(&self, event: &NewEvent) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Most recent event of `step` for an attempt.
    fn latest_for_step(
        &self,
        attempt_id: Uuid,
        step: &str,
    ) -> impl Future<Output = Result<Option<PipelineEvent>, AppError>> + Send;

    fn list_for_attempt(
        &self,
        attempt_id: Uuid,
    ) -> impl Future<Output = Result<Vec<PipelineEvent>, AppError>> + Send;
}

/// Structured log of every AI provider call.
pub trait ApiCallLogger: Send + Sync + Clone {
    fn log(&self, entry: &NewApiCallLog) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Destination of accepted extraction results.
pub trait JobSink: Send + Sync + Clone {
    /// Merge `result` into the target's record. Returns the changed fields.
    fn apply_extracted(
        &self,
        target: &Target,
        result: &ExtractionResult,
        update: &AppliedUpdate,
    ) -> impl Future<Output = Result<Vec<String>, AppError>> + Send;
}

/// Canonical company / job role records used by the resolver.
pub trait CompanyDirectory: Send + Sync + Clone {
    /// Candidate companies for a name or domain; matching is done by the caller.
    fn company_candidates(
        &self,
        name: &str,
        domain: Option<&str>,
    ) -> impl Future<Output = Result<Vec<Company>, AppError>> + Send;

    fn create_company(
        &self,
        name: &str,
        domain: Option<&str>,
    ) -> impl Future<Output = Result<Company, AppError>> + Send;

    fn role_candidates(
        &self,
        company_id: Uuid,
        title: &str,
    ) -> impl Future<Output = Result<Vec<JobRole>, AppError>> + Send;

    fn create_role(
        &self,
        company_id: Uuid,
        title: &str,
    ) -> impl Future<Output = Result<JobRole, AppError>> + Send;
}
