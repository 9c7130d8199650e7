//! Fill-only merge of extraction results into a stored job posting.
//!
//! A field is written only when the stored value is empty or a known
//! placeholder; populated real data is never overwritten.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{CustomSection, ExtractionMethod, ExtractionResult};

/// Values treated as "not really filled in".
pub const PLACEHOLDERS: &[&str] = &[
    "untitled",
    "unknown",
    "n/a",
    "na",
    "tbd",
    "job posting",
    "pending",
    "-",
];

/// Provenance and resolved links supplied with an accepted result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedUpdate {
    pub attempt_id: Uuid,
    pub method: ExtractionMethod,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub confidence: f64,
    pub data_hash: String,
    pub company_id: Option<Uuid>,
    pub job_role_id: Option<Uuid>,
}

/// The sink-side record an extraction is merged into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    pub id: Uuid,
    pub url: String,
    pub title: Option<String>,
    pub company_name: Option<String>,
    pub company_id: Option<Uuid>,
    pub job_role_id: Option<Uuid>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub employment_type: Option<String>,
    pub remote: Option<bool>,
    pub salary_min: Option<f64>,
    pub salary_max: Option<f64>,
    pub salary_currency: Option<String>,
    pub salary_period: Option<String>,
    pub requirements: Vec<String>,
    pub benefits: Vec<String>,
    pub custom_sections: Vec<CustomSection>,
    pub extraction_method: Option<ExtractionMethod>,
    pub extraction_provider: Option<String>,
    pub extraction_model: Option<String>,
    pub extraction_confidence: Option<f64>,
    pub last_attempt_id: Option<Uuid>,
    pub data_hash: Option<String>,
    pub extracted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobPosting {
    pub fn new(id: Uuid, url: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            url: url.into(),
            title: None,
            company_name: None,
            company_id: None,
            job_role_id: None,
            description: None,
            location: None,
            employment_type: None,
            remote: None,
            salary_min: None,
            salary_max: None,
            salary_currency: None,
            salary_period: None,
            requirements: Vec::new(),
            benefits: Vec::new(),
            custom_sections: Vec::new(),
            extraction_method: None,
            extraction_provider: None,
            extraction_model: None,
            extraction_confidence: None,
            last_attempt_id: None,
            data_hash: None,
            extracted_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Whether a stored text value may be replaced.
pub fn is_placeholder(value: Option<&str>, url: &str) -> bool {
    let Some(value) = value else {
        return true;
    };
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == url.trim() {
        return true;
    }
    let lowered = trimmed.to_lowercase();
    PLACEHOLDERS.contains(&lowered.as_str())
}

fn fill_text(
    slot: &mut Option<String>,
    incoming: &Option<String>,
    url: &str,
    name: &'static str,
    changed: &mut Vec<&'static str>,
) {
    let Some(incoming) = incoming.as_deref().map(str::trim).filter(|v| !v.is_empty()) else {
        return;
    };
    if is_placeholder(Some(incoming), url) {
        return;
    }
    if is_placeholder(slot.as_deref(), url) && slot.as_deref() != Some(incoming) {
        *slot = Some(incoming.to_string());
        changed.push(name);
    }
}

fn fill_value<T: Clone>(
    slot: &mut Option<T>,
    incoming: &Option<T>,
    name: &'static str,
    changed: &mut Vec<&'static str>,
) {
    if slot.is_none()
        && let Some(value) = incoming
    {
        *slot = Some(value.clone());
        changed.push(name);
    }
}

fn fill_list<T: Clone>(
    slot: &mut Vec<T>,
    incoming: &[T],
    name: &'static str,
    changed: &mut Vec<&'static str>,
) {
    if slot.is_empty() && !incoming.is_empty() {
        *slot = incoming.to_vec();
        changed.push(name);
    }
}

/// Merge `result` into `posting`, returning the names of changed fields.
///
/// Provenance columns are always refreshed when at least one field changed.
pub fn merge_extracted(
    posting: &mut JobPosting,
    result: &ExtractionResult,
    update: &AppliedUpdate,
    now: DateTime<Utc>,
) -> Vec<&'static str> {
    let url = posting.url.clone();
    let mut changed = Vec::new();

    fill_text(&mut posting.title, &result.title, &url, "title", &mut changed);
    fill_text(&mut posting.company_name, &result.company, &url, "company_name", &mut changed);
    fill_text(&mut posting.description, &result.description, &url, "description", &mut changed);
    fill_text(&mut posting.location, &result.location, &url, "location", &mut changed);
    fill_text(
        &mut posting.employment_type,
        &result.employment_type,
        &url,
        "employment_type",
        &mut changed,
    );
    fill_text(
        &mut posting.salary_currency,
        &result.salary_currency,
        &url,
        "salary_currency",
        &mut changed,
    );
    fill_text(
        &mut posting.salary_period,
        &result.salary_period,
        &url,
        "salary_period",
        &mut changed,
    );
    fill_value(&mut posting.remote, &result.remote, "remote", &mut changed);
    fill_value(&mut posting.salary_min, &result.salary_min, "salary_min", &mut changed);
    fill_value(&mut posting.salary_max, &result.salary_max, "salary_max", &mut changed);
    fill_value(&mut posting.company_id, &update.company_id, "company_id", &mut changed);
    fill_value(&mut posting.job_role_id, &update.job_role_id, "job_role_id", &mut changed);
    fill_list(&mut posting.requirements, &result.requirements, "requirements", &mut changed);
    fill_list(&mut posting.benefits, &result.benefits, "benefits", &mut changed);
    fill_list(
        &mut posting.custom_sections,
        &result.custom_sections,
        "custom_sections",
        &mut changed,
    );

    posting.last_attempt_id = Some(update.attempt_id);
    if !changed.is_empty() {
        posting.extraction_method = Some(update.method);
        posting.extraction_provider = update.provider.clone();
        posting.extraction_model = update.model.clone();
        posting.extraction_confidence = Some(update.confidence);
        posting.data_hash = Some(update.data_hash.clone());
        posting.extracted_at = Some(now);
        posting.updated_at = now;
    }
    changed
}
