//! Cheap DOM scrapers: structured hints and per-board CSS selectors.

use jobsift_core::board::BoardType;
use jobsift_core::models::ScrapedFields;
use jobsift_core::traits::DomScraper;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

/// Description text shorter than this is not worth keeping.
const MIN_DESCRIPTION_CHARS: usize = 80;

/// Selector lists per field; the first non-empty match wins.
struct BoardSelectors {
    title: &'static [&'static str],
    company: &'static [&'static str],
    location: &'static [&'static str],
    description: &'static [&'static str],
    employment_type: &'static [&'static str],
}

fn board_selectors(board: BoardType) -> Option<BoardSelectors> {
    let selectors = match board {
        BoardType::Greenhouse => BoardSelectors {
            title: &[".app-title", ".job__title h1", "h1.section-header"],
            company: &[".company-name"],
            location: &[".location", ".job__location"],
            description: &["#content", ".job__description"],
            employment_type: &[],
        },
        BoardType::Lever => BoardSelectors {
            title: &[".posting-headline h2"],
            company: &[".main-header-logo img[alt]"],
            location: &[".posting-categories .location"],
            description: &["[data-qa='job-description']", ".section-wrapper .section"],
            employment_type: &[".posting-categories .commitment"],
        },
        BoardType::Ashby => BoardSelectors {
            title: &["h1[class*='_title']", "h1"],
            company: &[],
            location: &["[class*='_location']"],
            description: &["[class*='_descriptionText']"],
            employment_type: &["[class*='_employmentType']"],
        },
        BoardType::Workable => BoardSelectors {
            title: &["h1[data-ui='job-title']"],
            company: &["[data-ui='company-name']"],
            location: &["[data-ui='job-location']"],
            description: &["[data-ui='job-description']"],
            employment_type: &["[data-ui='job-type']"],
        },
        BoardType::SmartRecruiters => BoardSelectors {
            title: &["h1.job-title"],
            company: &[".header-logo img[alt]"],
            location: &[".job-detail-location", "spl-job-location"],
            description: &[".job-sections"],
            employment_type: &["[itemprop='employmentType']"],
        },
        BoardType::Workday => BoardSelectors {
            title: &["[data-automation-id='jobPostingHeader']"],
            company: &[],
            location: &["[data-automation-id='locations'] dd"],
            description: &["[data-automation-id='jobPostingDescription']"],
            employment_type: &["[data-automation-id='time'] dd"],
        },
        BoardType::BambooHr => BoardSelectors {
            title: &[".ResAts__card-title", "h2"],
            company: &[],
            location: &[".ResAts__card-subtitle"],
            description: &[".BambooRich"],
            employment_type: &[],
        },
        BoardType::Recruitee => BoardSelectors {
            title: &[".job-title", "h1"],
            company: &[".company-name"],
            location: &[".job-location"],
            description: &[".job-description"],
            employment_type: &[".job-employment-type"],
        },
        BoardType::LinkedIn => BoardSelectors {
            title: &[".top-card-layout__title"],
            company: &[".topcard__org-name-link"],
            location: &[".topcard__flavor--bullet"],
            description: &[".description__text"],
            employment_type: &[".description__job-criteria-text"],
        },
        BoardType::Indeed => BoardSelectors {
            title: &["h1.jobsearch-JobInfoHeader-title"],
            company: &["[data-company-name='true']"],
            location: &["[data-testid='job-location']"],
            description: &["#jobDescriptionText"],
            employment_type: &[],
        },
        BoardType::Unknown => return None,
    };
    Some(selectors)
}

/// [`DomScraper`] over the `scraper` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectorScraper;

impl SelectorScraper {
    pub fn new() -> Self {
        Self
    }
}

impl DomScraper for SelectorScraper {
    fn scrape_generic(&self, html: &str) -> ScrapedFields {
        let document = Html::parse_document(html);
        let mut fields = json_ld_posting(&document).unwrap_or_default();

        fields.merge_missing(ScrapedFields {
            title: meta_content(&document, "og:title"),
            company: meta_content(&document, "og:site_name"),
            ..Default::default()
        });
        fields.merge_missing(ScrapedFields {
            title: first_text(&document, &["h1"]),
            ..Default::default()
        });
        fields
    }

    fn scrape_board(&self, html: &str, board: BoardType) -> ScrapedFields {
        let Some(selectors) = board_selectors(board) else {
            return ScrapedFields::default();
        };
        let document = Html::parse_document(html);
        ScrapedFields {
            title: first_text(&document, selectors.title),
            company: first_text(&document, selectors.company)
                .or_else(|| first_attr(&document, selectors.company, "alt")),
            location: first_text(&document, selectors.location),
            description: first_text(&document, selectors.description)
                .filter(|d| d.chars().count() >= MIN_DESCRIPTION_CHARS),
            employment_type: first_text(&document, selectors.employment_type),
        }
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_text(document: &Html, selectors: &[&str]) -> Option<String> {
    selectors
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|selector| {
            document
                .select(&selector)
                .map(element_text)
                .find(|t| !t.is_empty())
        })
}

fn first_attr(document: &Html, selectors: &[&str], attr: &str) -> Option<String> {
    selectors
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|selector| {
            document
                .select(&selector)
                .filter_map(|el| el.value().attr(attr))
                .map(str::trim)
                .find(|v| !v.is_empty())
                .map(str::to_string)
        })
}

fn meta_content(document: &Html, property: &str) -> Option<String> {
    let selector = Selector::parse(&format!("meta[property='{property}']")).ok()?;
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("content"))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// JSON-LD
// ---------------------------------------------------------------------------

fn json_ld_posting(document: &Html) -> Option<ScrapedFields> {
    let selector = Selector::parse("script[type='application/ld+json']").ok()?;
    document
        .select(&selector)
        .filter_map(|el| serde_json::from_str::<Value>(&el.text().collect::<String>()).ok())
        .find_map(|value| find_job_posting(&value).map(posting_fields))
}

fn find_job_posting(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(items) => items.iter().find_map(find_job_posting),
        Value::Object(map) => {
            if is_type(map.get("@type"), "JobPosting") {
                return Some(value);
            }
            map.get("@graph").and_then(find_job_posting)
        }
        _ => None,
    }
}

fn is_type(value: Option<&Value>, wanted: &str) -> bool {
    match value {
        Some(Value::String(s)) => s == wanted,
        Some(Value::Array(items)) => items.iter().any(|v| v.as_str() == Some(wanted)),
        _ => false,
    }
}

fn posting_fields(posting: &Value) -> ScrapedFields {
    ScrapedFields {
        title: string_at(posting, &["title"]),
        company: string_at(posting, &["hiringOrganization", "name"])
            .or_else(|| string_at(posting, &["hiringOrganization"])),
        location: json_ld_location(posting.get("jobLocation")),
        description: string_at(posting, &["description"])
            .map(|d| html_to_text(&d))
            .filter(|d| d.chars().count() >= MIN_DESCRIPTION_CHARS),
        employment_type: match posting.get("employmentType") {
            Some(Value::Array(items)) => {
                let joined = items
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(", ");
                (!joined.is_empty()).then_some(joined)
            }
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        },
    }
}

fn string_at(value: &Value, path: &[&str]) -> Option<String> {
    path.iter()
        .try_fold(value, |v, key| v.get(key))?
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn json_ld_location(location: Option<&Value>) -> Option<String> {
    match location? {
        Value::Array(items) => items.iter().find_map(|l| json_ld_location(Some(l))),
        place => {
            let address = place.get("address")?;
            if let Some(s) = address.as_str() {
                return Some(s.trim().to_string()).filter(|s| !s.is_empty());
            }
            let parts: Vec<String> = ["addressLocality", "addressRegion", "addressCountry"]
                .iter()
                .filter_map(|key| {
                    string_at(address, &[*key]).or_else(|| string_at(address, &[*key, "name"]))
                })
                .collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
    }
}

/// Visible text of an HTML fragment, whitespace collapsed.
pub(crate) fn html_to_text(html: &str) -> String {
    Html::parse_fragment(html)
        .root_element()
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
