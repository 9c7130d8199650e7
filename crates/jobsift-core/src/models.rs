use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// The identifying input of one extraction: a job posting URL plus any
/// already-linked company / job role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Id of the job posting record the result is written back to.
    pub id: Uuid,
    pub url: String,
    pub company_id: Option<Uuid>,
    pub job_role_id: Option<Uuid>,
}

impl Target {
    pub fn new(id: Uuid, url: impl Into<String>) -> Self {
        Self {
            id,
            url: url.into(),
            company_id: None,
            job_role_id: None,
        }
    }

    /// Lowercased host of the target URL, empty if the URL does not parse.
    pub fn domain(&self) -> String {
        domain_of(&self.url).unwrap_or_default()
    }
}

/// Lowercased host of a URL.
pub fn domain_of(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()?
        .host_str()
        .map(|h| h.trim_start_matches("www.").to_lowercase())
}

/// How the HTML currently held by the pipeline was obtained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    #[default]
    Static,
    Rendered,
    Embed,
}

impl FetchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchMode::Static => "static",
            FetchMode::Rendered => "rendered",
            FetchMode::Embed => "embed",
        }
    }
}

impl fmt::Display for FetchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which extractor produced an accepted result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    Api,
    Ai,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::Api => "api",
            ExtractionMethod::Ai => "ai",
        }
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ExtractionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "api" => Ok(ExtractionMethod::Api),
            "ai" => Ok(ExtractionMethod::Ai),
            _ => Err(format!("Unknown extraction method: {s}")),
        }
    }
}

/// Where an extraction result came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub method: ExtractionMethod,
    pub provider: Option<String>,
    pub model: Option<String>,
}

impl Provenance {
    pub fn api(board: &str) -> Self {
        Self {
            method: ExtractionMethod::Api,
            provider: Some(board.to_string()),
            model: None,
        }
    }

    pub fn ai(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            method: ExtractionMethod::Ai,
            provider: Some(provider.into()),
            model: Some(model.into()),
        }
    }
}

/// A titled free-form section of a posting ("About the team", ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomSection {
    pub title: String,
    pub content: String,
}

/// Normalized job fields produced by exactly one accepted extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub title: Option<String>,
    pub company: Option<String>,
    pub job_role: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub employment_type: Option<String>,
    pub remote: Option<bool>,
    pub salary_min: Option<f64>,
    pub salary_max: Option<f64>,
    pub salary_currency: Option<String>,
    pub salary_period: Option<String>,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub benefits: Vec<String>,
    #[serde(default)]
    pub custom_sections: Vec<CustomSection>,
    /// Self-reported quality score in `[0.0, 1.0]`.
    pub confidence: f64,
    pub provenance: Provenance,
}

impl ExtractionResult {
    pub fn empty(provenance: Provenance) -> Self {
        Self {
            title: None,
            company: None,
            job_role: None,
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
            confidence: 0.0,
            provenance,
        }
    }

    /// Fill fields this result lacks from cheaply scraped values.
    ///
    /// Returns the names of the fields that were filled.
    pub fn prefill_from(&mut self, scraped: &ScrapedFields) -> Vec<&'static str> {
        let mut filled = Vec::new();
        if fill_blank(&mut self.title, &scraped.title) {
            filled.push("title");
        }
        if fill_blank(&mut self.company, &scraped.company) {
            filled.push("company");
        }
        if fill_blank(&mut self.location, &scraped.location) {
            filled.push("location");
        }
        if fill_blank(&mut self.description, &scraped.description) {
            filled.push("description");
        }
        if fill_blank(&mut self.employment_type, &scraped.employment_type) {
            filled.push("employment_type");
        }
        filled
    }

    /// Field-completeness score used where no self-reported confidence exists.
    pub fn completeness_score(&self) -> f64 {
        let mut score = 0.0;
        if is_present(&self.title) {
            score += 0.4;
        }
        if self
            .description
            .as_deref()
            .is_some_and(|d| d.trim().chars().count() >= 200)
        {
            score += 0.3;
        }
        if is_present(&self.company) {
            score += 0.1;
        }
        if is_present(&self.location) {
            score += 0.1;
        }
        if self.salary_min.is_some() || self.salary_max.is_some() {
            score += 0.1;
        }
        f64::min(score, 1.0)
    }
}

/// Fields opportunistically pulled out of the DOM by the cheap scrapers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedFields {
    pub title: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub employment_type: Option<String>,
}

impl ScrapedFields {
    pub fn is_empty(&self) -> bool {
        !is_present(&self.title)
            && !is_present(&self.company)
            && !is_present(&self.location)
            && !is_present(&self.description)
            && !is_present(&self.employment_type)
    }

    /// Keep existing values, take the other's where ours are blank.
    pub fn merge_missing(&mut self, other: ScrapedFields) {
        fill_blank(&mut self.title, &other.title);
        fill_blank(&mut self.company, &other.company);
        fill_blank(&mut self.location, &other.location);
        fill_blank(&mut self.description, &other.description);
        fill_blank(&mut self.employment_type, &other.employment_type);
    }

    pub fn field_names(&self) -> Vec<&'static str> {
        [
            ("title", &self.title),
            ("company", &self.company),
            ("location", &self.location),
            ("description", &self.description),
            ("employment_type", &self.employment_type),
        ]
        .into_iter()
        .filter(|(_, v)| is_present(v))
        .map(|(name, _)| name)
        .collect()
    }
}

fn is_present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

fn fill_blank(slot: &mut Option<String>, source: &Option<String>) -> bool {
    if !is_present(slot) && is_present(source) {
        *slot = source.clone();
        true
    } else {
        false
    }
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
