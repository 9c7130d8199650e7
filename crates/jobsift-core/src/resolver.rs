//! Fuzzy find-or-create of canonical companies and job roles.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::traits::CompanyDirectory;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub domain: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRole {
    pub id: Uuid,
    pub company_id: Uuid,
    pub title: String,
}

const LEGAL_SUFFIXES: &[&str] = &[
    "inc", "incorporated", "llc", "ltd", "limited", "gmbh", "corp", "corporation", "co", "company",
    "plc", "sa", "ag", "bv",
];

/// Lowercase, strip punctuation and trailing legal-entity suffixes.
pub fn normalize_name(name: &str) -> String {
    let cleaned: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let mut words: Vec<&str> = cleaned.split_whitespace().collect();
    while words.len() > 1 && words.last().is_some_and(|w| LEGAL_SUFFIXES.contains(w)) {
        words.pop();
    }
    words.join(" ")
}

fn normalize_domain(domain: &str) -> String {
    domain
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_start_matches("www.")
        .trim_end_matches('/')
        .to_lowercase()
}

/// Whether two names refer to the same entity.
///
/// Equal after normalization; or Levenshtein distance at most 2 when both
/// are at least 5 characters; or one contains the other when the shorter
/// is at least 4 characters.
pub fn names_match(a: &str, b: &str) -> bool {
    let a = normalize_name(a);
    let b = normalize_name(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    if a == b {
        return true;
    }
    let (shorter, longer) = if a.chars().count() <= b.chars().count() {
        (&a, &b)
    } else {
        (&b, &a)
    };
    let short_len = shorter.chars().count();
    if short_len >= 5 && strsim::levenshtein(&a, &b) <= 2 {
        return true;
    }
    short_len >= 4 && longer.contains(shorter.as_str())
}

pub fn company_matches(company: &Company, name: &str, domain: Option<&str>) -> bool {
    if let (Some(ours), Some(theirs)) = (domain, company.domain.as_deref())
        && !ours.is_empty()
        && normalize_domain(ours) == normalize_domain(theirs)
    {
        return true;
    }
    names_match(&company.name, name)
}

/// Resolver over a [`CompanyDirectory`].
#[derive(Clone)]
pub struct EntityResolver<D> {
    directory: D,
}

impl<D: CompanyDirectory> EntityResolver<D> {
    pub fn new(directory: D) -> Self {
        Self { directory }
    }

    /// Best matching company, created when none matches.
    pub async fn resolve_company(&self, name: &str, domain: Option<&str>) -> Result<Company, AppError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Generic("Cannot resolve an empty company name".into()));
        }
        let candidates = self.directory.company_candidates(name, domain).await?;

        let exact = candidates
            .iter()
            .find(|c| normalize_name(&c.name) == normalize_name(name));
        if let Some(found) = exact.or_else(|| candidates.iter().find(|c| company_matches(c, name, domain))) {
            tracing::debug!(company = %found.name, query = name, "Resolved existing company");
            return Ok(found.clone());
        }

        let created = self.directory.create_company(name, domain).await?;
        tracing::info!(company = %created.name, id = %created.id, "Created company");
        Ok(created)
    }

    /// Best matching role under `company_id`, created when none matches.
    pub async fn resolve_role(&self, company_id: Uuid, title: &str) -> Result<JobRole, AppError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(AppError::Generic("Cannot resolve an empty job role".into()));
        }
        let candidates = self.directory.role_candidates(company_id, title).await?;
        let exact = candidates
            .iter()
            .find(|r| normalize_name(&r.title) == normalize_name(title));
        if let Some(found) = exact.or_else(|| candidates.iter().find(|r| names_match(&r.title, title))) {
            return Ok(found.clone());
        }
        self.directory.create_role(company_id, title).await
    }
}
