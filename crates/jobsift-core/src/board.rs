//! URL-based job board (ATS) detection.
//!
//! Classification is a pure function of the URL: no network calls. The
//! result is advisory; every later step tolerates a wrong or unknown board.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

/// Known job boards / applicant tracking systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardType {
    Greenhouse,
    Lever,
    Ashby,
    Workable,
    SmartRecruiters,
    Workday,
    BambooHr,
    Recruitee,
    LinkedIn,
    Indeed,
    Unknown,
}

impl BoardType {
    pub const ALL: [BoardType; 11] = [
        BoardType::Greenhouse,
        BoardType::Lever,
        BoardType::Ashby,
        BoardType::Workable,
        BoardType::SmartRecruiters,
        BoardType::Workday,
        BoardType::BambooHr,
        BoardType::Recruitee,
        BoardType::LinkedIn,
        BoardType::Indeed,
        BoardType::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BoardType::Greenhouse => "greenhouse",
            BoardType::Lever => "lever",
            BoardType::Ashby => "ashby",
            BoardType::Workable => "workable",
            BoardType::SmartRecruiters => "smart_recruiters",
            BoardType::Workday => "workday",
            BoardType::BambooHr => "bamboo_hr",
            BoardType::Recruitee => "recruitee",
            BoardType::LinkedIn => "linked_in",
            BoardType::Indeed => "indeed",
            BoardType::Unknown => "unknown",
        }
    }

    /// True only for boards with a public structured postings API.
    pub fn api_supported(&self) -> bool {
        matches!(
            self,
            BoardType::Greenhouse | BoardType::Lever | BoardType::Ashby
        )
    }
}

impl fmt::Display for BoardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BoardType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        BoardType::ALL
            .into_iter()
            .find(|b| b.as_str() == lower)
            .ok_or_else(|| format!("Unknown board type: {s}"))
    }
}

/// Board classification plus the identifiers parsed out of the URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardMatch {
    pub board: BoardType,
    pub company_slug: Option<String>,
    pub job_id: Option<String>,
}

impl BoardMatch {
    pub fn unknown() -> Self {
        Self {
            board: BoardType::Unknown,
            company_slug: None,
            job_id: None,
        }
    }

    pub fn from_url(url: &str) -> Self {
        let board = detect(url);
        Self {
            board,
            company_slug: company_slug(url, board),
            job_id: job_id(url, board),
        }
    }

    /// Whether the structured API step can run for this match.
    pub fn api_ready(&self) -> bool {
        self.board.api_supported() && self.company_slug.is_some()
    }
}

impl Default for BoardMatch {
    fn default() -> Self {
        Self::unknown()
    }
}

static GREENHOUSE_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/([A-Za-z0-9_-]+)/jobs/(\d+)").unwrap());
static TWO_SEGMENT_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/([A-Za-z0-9._-]+)/([A-Za-z0-9-]+)").unwrap());
static WORKABLE_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/([A-Za-z0-9_-]+)/j/([A-Za-z0-9]+)").unwrap());
static WORKABLE_SUBDOMAIN_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/jobs/(\d+)").unwrap());
static SMARTRECRUITERS_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/([A-Za-z0-9_-]+)/(\d+)").unwrap());
static WORKDAY_JOB_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_([A-Z]{0,3}-?\d+)(?:$|[/?])").unwrap());
static BAMBOOHR_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/careers/(\d+)").unwrap());
static RECRUITEE_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/o/([^/?#]+)").unwrap());
static LINKEDIN_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/jobs/view/(?:[^/]*-)?(\d+)").unwrap());

/// True when `host` is `domain` or one of its subdomains.
fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

fn query_param(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, v)| k == key && !v.is_empty())
        .map(|(_, v)| v.into_owned())
}

/// First DNS label, e.g. `acme` for `acme.bamboohr.com`.
fn subdomain(host: &str) -> Option<String> {
    let (label, rest) = host.split_once('.')?;
    if rest.contains('.') && !matches!(label, "www" | "jobs" | "apply" | "careers") {
        Some(label.to_string())
    } else {
        None
    }
}

fn capture(re: &Regex, haystack: &str, group: usize) -> Option<String> {
    re.captures(haystack)
        .and_then(|c| c.get(group))
        .map(|m| m.as_str().to_string())
}

/// Classify a URL into a known board type.
pub fn detect(url: &str) -> BoardType {
    let Ok(parsed) = Url::parse(url) else {
        return BoardType::Unknown;
    };
    let Some(host) = parsed.host_str().map(str::to_lowercase) else {
        return BoardType::Unknown;
    };

    if host_matches(&host, "greenhouse.io") || query_param(&parsed, "gh_jid").is_some() {
        BoardType::Greenhouse
    } else if host_matches(&host, "lever.co") {
        BoardType::Lever
    } else if host_matches(&host, "ashbyhq.com") {
        BoardType::Ashby
    } else if host_matches(&host, "workable.com") {
        BoardType::Workable
    } else if host_matches(&host, "smartrecruiters.com") {
        BoardType::SmartRecruiters
    } else if host_matches(&host, "myworkdayjobs.com") || host_matches(&host, "myworkdaysite.com")
    {
        BoardType::Workday
    } else if host_matches(&host, "bamboohr.com") {
        BoardType::BambooHr
    } else if host_matches(&host, "recruitee.com") {
        BoardType::Recruitee
    } else if host_matches(&host, "linkedin.com") && parsed.path().starts_with("/jobs") {
        BoardType::LinkedIn
    } else if host_matches(&host, "indeed.com") {
        BoardType::Indeed
    } else {
        BoardType::Unknown
    }
}

/// Board-specific company identifier embedded in the URL.
pub fn company_slug(url: &str, board: BoardType) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    let path = parsed.path();

    match board {
        BoardType::Greenhouse => query_param(&parsed, "for")
            .or_else(|| capture(&GREENHOUSE_PATH, path, 1))
            .filter(|_| host_matches(&host, "greenhouse.io") || query_param(&parsed, "for").is_some()),
        BoardType::Lever | BoardType::Ashby => capture(&TWO_SEGMENT_PATH, path, 1)
            .or_else(|| path.trim_matches('/').split('/').next().map(str::to_string))
            .filter(|s| !s.is_empty()),
        BoardType::Workable => {
            capture(&WORKABLE_PATH, path, 1).or_else(|| subdomain(&host))
        }
        BoardType::SmartRecruiters => capture(&SMARTRECRUITERS_PATH, path, 1),
        BoardType::Workday | BoardType::BambooHr | BoardType::Recruitee => subdomain(&host),
        BoardType::LinkedIn | BoardType::Indeed | BoardType::Unknown => None,
    }
}

/// Board-specific job identifier embedded in the URL.
pub fn job_id(url: &str, board: BoardType) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let path = parsed.path();

    match board {
        BoardType::Greenhouse => query_param(&parsed, "gh_jid")
            .or_else(|| query_param(&parsed, "token"))
            .or_else(|| capture(&GREENHOUSE_PATH, path, 2)),
        BoardType::Lever | BoardType::Ashby => capture(&TWO_SEGMENT_PATH, path, 2)
            .filter(|id| !matches!(id.as_str(), "apply" | "application")),
        BoardType::Workable => capture(&WORKABLE_PATH, path, 2)
            .or_else(|| capture(&WORKABLE_SUBDOMAIN_PATH, path, 1)),
        BoardType::SmartRecruiters => capture(&SMARTRECRUITERS_PATH, path, 2),
        BoardType::Workday => capture(&WORKDAY_JOB_ID, path, 1),
        BoardType::BambooHr => capture(&BAMBOOHR_PATH, path, 1),
        BoardType::Recruitee => capture(&RECRUITEE_PATH, path, 1),
        BoardType::LinkedIn => capture(&LINKEDIN_PATH, path, 1),
        BoardType::Indeed => query_param(&parsed, "jk"),
        BoardType::Unknown => None,
    }
}

/// True only for the subset of boards with a public structured API.
pub fn api_supported(board: BoardType) -> bool {
    board.api_supported()
}
