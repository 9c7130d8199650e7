//! Public posting APIs of Greenhouse, Lever and Ashby.
//!
//! Results carry a field-completeness confidence, so they are gated by the
//! same threshold as AI extraction.

use std::time::Duration;

use jobsift_core::board::{BoardMatch, BoardType};
use jobsift_core::error::AppError;
use jobsift_core::models::{CustomSection, ExtractionResult, Provenance};
use jobsift_core::traits::BoardApi;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::fetcher::{USER_AGENT, check_status, map_send_error};
use crate::scrape::html_to_text;

/// Base URLs of the board APIs; overridable for tests and proxies.
#[derive(Debug, Clone)]
pub struct BoardApiEndpoints {
    pub greenhouse: String,
    pub lever: String,
    pub ashby: String,
}

impl Default for BoardApiEndpoints {
    fn default() -> Self {
        Self {
            greenhouse: "https://boards-api.greenhouse.io".into(),
            lever: "https://api.lever.co".into(),
            ashby: "https://api.ashbyhq.com".into(),
        }
    }
}

#[derive(Clone)]
pub struct BoardApiClient {
    client: Client,
    endpoints: BoardApiEndpoints,
    timeout_secs: u64,
}

impl BoardApiClient {
    pub fn new() -> Result<Self, AppError> {
        Self::with_endpoints(BoardApiEndpoints::default())
    }

    pub fn with_endpoints(endpoints: BoardApiEndpoints) -> Result<Self, AppError> {
        let timeout = Duration::from_secs(20);
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;
        Ok(Self {
            client,
            endpoints,
            timeout_secs: timeout.as_secs(),
        })
    }

    /// GET and decode JSON; a 404 means "not listed".
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>, AppError> {
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| map_send_error(e, self.timeout_secs))?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        let response = check_status(response, url)?;
        let body = response
            .json::<T>()
            .await
            .map_err(|e| AppError::HttpError(format!("Invalid board API response from {url}: {e}")))?;
        Ok(Some(body))
    }

    async fn greenhouse(&self, slug: &str, job_id: &str) -> Result<Option<ExtractionResult>, AppError> {
        let url = format!("{}/v1/boards/{slug}/jobs/{job_id}", self.endpoints.greenhouse);
        let Some(job) = self.get_json::<GreenhouseJob>(&url).await? else {
            return Ok(None);
        };

        let mut result = ExtractionResult::empty(Provenance::api(BoardType::Greenhouse.as_str()));
        result.title = non_empty(job.title);
        result.company = job.company_name.and_then(non_empty);
        result.location = job.location.and_then(|l| non_empty(l.name));
        result.description = job.content.map(|c| decode_html_text(&c)).and_then(non_empty);
        Ok(Some(scored(result)))
    }

    async fn lever(&self, slug: &str, job_id: &str) -> Result<Option<ExtractionResult>, AppError> {
        let url = format!("{}/v0/postings/{slug}/{job_id}", self.endpoints.lever);
        let Some(posting) = self.get_json::<LeverPosting>(&url).await? else {
            return Ok(None);
        };

        let mut result = ExtractionResult::empty(Provenance::api(BoardType::Lever.as_str()));
        result.title = non_empty(posting.text);
        if let Some(categories) = posting.categories {
            result.location = categories.location.and_then(non_empty);
            result.employment_type = categories.commitment.and_then(non_empty);
        }
        result.description = posting
            .description_plain
            .or_else(|| posting.description.map(|d| html_to_text(&d)))
            .and_then(non_empty);
        result.remote = posting
            .workplace_type
            .map(|w| w.eq_ignore_ascii_case("remote"));
        if let Some(salary) = posting.salary_range {
            result.salary_min = salary.min;
            result.salary_max = salary.max;
            result.salary_currency = salary.currency.and_then(non_empty);
            result.salary_period = salary.interval.and_then(non_empty);
        }
        result.custom_sections = posting
            .lists
            .into_iter()
            .filter_map(|list| {
                let content = html_to_text(&list.content);
                (!list.text.trim().is_empty() && !content.is_empty()).then(|| CustomSection {
                    title: list.text.trim().to_string(),
                    content,
                })
            })
            .collect();
        Ok(Some(scored(result)))
    }

    async fn ashby(&self, slug: &str, job_id: &str) -> Result<Option<ExtractionResult>, AppError> {
        let url = format!(
            "{}/posting-api/job-board/{slug}?includeCompensation=true",
            self.endpoints.ashby
        );
        let Some(board) = self.get_json::<AshbyBoard>(&url).await? else {
            return Ok(None);
        };
        let Some(job) = board.jobs.into_iter().find(|j| j.id == job_id) else {
            return Ok(None);
        };

        let mut result = ExtractionResult::empty(Provenance::api(BoardType::Ashby.as_str()));
        result.title = non_empty(job.title);
        result.location = job.location.and_then(non_empty);
        result.employment_type = job.employment_type.and_then(non_empty);
        result.remote = job.is_remote;
        result.description = job
            .description_plain
            .or_else(|| job.description_html.map(|d| html_to_text(&d)))
            .and_then(non_empty);
        Ok(Some(scored(result)))
    }
}

impl BoardApi for BoardApiClient {
    async fn fetch_posting(&self, board: &BoardMatch) -> Result<Option<ExtractionResult>, AppError> {
        let (Some(slug), Some(job_id)) = (board.company_slug.as_deref(), board.job_id.as_deref()) else {
            return Ok(None);
        };
        let found = match board.board {
            BoardType::Greenhouse => self.greenhouse(slug, job_id).await?,
            BoardType::Lever => self.lever(slug, job_id).await?,
            BoardType::Ashby => self.ashby(slug, job_id).await?,
            _ => None,
        };
        if let Some(result) = &found {
            tracing::debug!(board = %board.board, slug, job_id, confidence = result.confidence, "Board API posting found");
        }
        Ok(found)
    }
}

fn scored(mut result: ExtractionResult) -> ExtractionResult {
    result.confidence = result.completeness_score();
    result
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Greenhouse returns entity-escaped HTML; unescape, then strip tags.
fn decode_html_text(escaped: &str) -> String {
    html_to_text(&html_to_text(escaped))
}

// ---- API payloads ----

#[derive(Deserialize)]
struct GreenhouseJob {
    #[serde(default)]
    title: String,
    company_name: Option<String>,
    location: Option<GreenhouseLocation>,
    content: Option<String>,
}

#[derive(Deserialize)]
struct GreenhouseLocation {
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LeverPosting {
    #[serde(default)]
    text: String,
    categories: Option<LeverCategories>,
    description: Option<String>,
    description_plain: Option<String>,
    #[serde(default)]
    lists: Vec<LeverList>,
    workplace_type: Option<String>,
    salary_range: Option<LeverSalary>,
}

#[derive(Deserialize)]
struct LeverCategories {
    location: Option<String>,
    commitment: Option<String>,
}

#[derive(Deserialize)]
struct LeverList {
    #[serde(default)]
    text: String,
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct LeverSalary {
    min: Option<f64>,
    max: Option<f64>,
    currency: Option<String>,
    interval: Option<String>,
}

#[derive(Deserialize)]
struct AshbyBoard {
    #[serde(default)]
    jobs: Vec<AshbyJob>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AshbyJob {
    id: String,
    #[serde(default)]
    title: String,
    location: Option<String>,
    employment_type: Option<String>,
    is_remote: Option<bool>,
    description_plain: Option<String>,
    description_html: Option<String>,
}
