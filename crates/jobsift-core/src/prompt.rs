//! Versioned job-extraction prompt and response parsing.

use std::sync::LazyLock;

use serde::Deserialize;
use serde_json::{Value, json};

use crate::board::BoardType;
use crate::error::AppError;
use crate::models::{CustomSection, ExtractionResult, Provenance};
use crate::provider::{Parsed, Prompt, ProviderReply};

/// Bumped whenever the template or schema changes; logged with every call.
pub const PROMPT_VERSION: &str = "job-extraction/v3";

const SYSTEM_PROMPT: &str = "You are a data extraction assistant for job postings. \
Extract the requested fields from the provided page content. \
Respond ONLY with a single JSON object matching the schema. \
Use null for fields that are not present; never invent values. \
Set `confidence` between 0.0 and 1.0 to reflect how certain you are that \
the content is a single job posting and that the fields are correct.";

static EXTRACTION_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "type": "object",
        "required": ["title", "confidence"],
        "properties": {
            "title": {"type": ["string", "null"]},
            "company": {"type": ["string", "null"]},
            "job_role": {"type": ["string", "null"]},
            "description": {"type": ["string", "null"]},
            "location": {"type": ["string", "null"]},
            "employment_type": {"type": ["string", "null"]},
            "remote": {"type": ["boolean", "null"]},
            "salary_min": {"type": ["number", "null"]},
            "salary_max": {"type": ["number", "null"]},
            "salary_currency": {"type": ["string", "null"]},
            "salary_period": {"type": ["string", "null"]},
            "requirements": {"type": ["array", "null"], "items": {"type": "string"}},
            "benefits": {"type": ["array", "null"], "items": {"type": "string"}},
            "custom_sections": {
                "type": ["array", "null"],
                "items": {
                    "type": "object",
                    "required": ["title", "content"],
                    "properties": {
                        "title": {"type": "string"},
                        "content": {"type": "string"}
                    }
                }
            },
            "confidence": {"type": "number", "minimum": 0, "maximum": 1}
        }
    })
});

/// JSON schema every provider response is validated against.
pub fn extraction_schema() -> &'static Value {
    &EXTRACTION_SCHEMA
}

/// Render the prompt for a page, truncating content to `max_chars`.
pub fn build_prompt(content: &str, url: &str, board: BoardType, max_chars: usize) -> Prompt {
    let content = truncate_chars(content, max_chars);
    let board_hint = match board {
        BoardType::Unknown => String::new(),
        board => format!("The page is hosted on the {board} job board.\n"),
    };
    let schema = serde_json::to_string_pretty(extraction_schema()).unwrap_or_default();
    let user = format!(
        "Extract the job posting at {url}.\n{board_hint}\
         Respond with JSON matching this schema:\n```json\n{schema}\n```\n\n\
         Page content:\n\n{content}"
    );
    let estimated_tokens = Prompt::estimate_tokens(SYSTEM_PROMPT) + Prompt::estimate_tokens(&user);
    Prompt {
        system: SYSTEM_PROMPT.to_string(),
        user,
        version: PROMPT_VERSION,
        estimated_tokens,
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Pull the JSON object out of a model reply, tolerating code fences and
/// surrounding prose.
pub fn parse_json_reply(raw: &str) -> Result<Value, AppError> {
    let trimmed = raw.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    let start = trimmed.find('{');
    let end = trimmed.rfind('}');
    match (start, end) {
        (Some(start), Some(end)) if end > start => {
            serde_json::from_str(&trimmed[start..=end]).map_err(|e| {
                AppError::SchemaValidationError(format!("Model returned invalid JSON: {e}"))
            })
        }
        _ => Err(AppError::SchemaValidationError(
            "Model reply contains no JSON object".into(),
        )),
    }
}

/// Validate a reply against [`extraction_schema`].
pub fn validate(value: &Value) -> Result<(), AppError> {
    let validator = jsonschema::validator_for(extraction_schema())
        .map_err(|e| AppError::SchemaValidationError(format!("Invalid extraction schema: {e}")))?;
    let problems: Vec<String> = validator.iter_errors(value).map(|e| e.to_string()).collect();
    if problems.is_empty() {
        Ok(())
    } else {
        Err(AppError::SchemaValidationError(problems.join("; ")))
    }
}

#[derive(Deserialize)]
struct ReplyFields {
    title: Option<String>,
    company: Option<String>,
    job_role: Option<String>,
    description: Option<String>,
    location: Option<String>,
    employment_type: Option<String>,
    remote: Option<bool>,
    salary_min: Option<f64>,
    salary_max: Option<f64>,
    salary_currency: Option<String>,
    salary_period: Option<String>,
    requirements: Option<Vec<String>>,
    benefits: Option<Vec<String>>,
    custom_sections: Option<Vec<CustomSection>>,
    confidence: f64,
}

/// Parse, validate and gate one provider reply.
pub fn parse_extraction(
    reply: &ProviderReply,
    provider: &str,
    threshold: f64,
) -> Result<Parsed<ExtractionResult>, AppError> {
    let value = parse_json_reply(&reply.content)?;
    validate(&value)?;
    let fields: ReplyFields = serde_json::from_value(value)?;

    let confidence = fields.confidence.clamp(0.0, 1.0);
    let result = ExtractionResult {
        title: fields.title,
        company: fields.company,
        job_role: fields.job_role,
        description: fields.description,
        location: fields.location,
        employment_type: fields.employment_type,
        remote: fields.remote,
        salary_min: fields.salary_min,
        salary_max: fields.salary_max,
        salary_currency: fields.salary_currency,
        salary_period: fields.salary_period,
        requirements: fields.requirements.unwrap_or_default(),
        benefits: fields.benefits.unwrap_or_default(),
        custom_sections: fields.custom_sections.unwrap_or_default(),
        confidence,
        provenance: Provenance::ai(provider, reply.model.clone()),
    };

    Ok(Parsed {
        metadata: json!({
            "prompt_version": PROMPT_VERSION,
            "has_title": result.title.is_some(),
            "completeness": result.completeness_score(),
        }),
        accept: confidence >= threshold,
        confidence: Some(confidence),
        data: result,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(content: &str) -> ProviderReply {
        ProviderReply {
            content: content.to_string(),
            model: "gpt-4o-mini".into(),
            tokens_in: Some(100),
            tokens_out: Some(50),
        }
    }

    #[test]
    fn prompt_is_versioned_and_truncated() {
        let content = "x".repeat(500);
        let prompt = build_prompt(&content, "https://jobs.lever.co/acme/1", BoardType::Lever, 100);
        assert_eq!(prompt.version, PROMPT_VERSION);
        assert!(prompt.user.contains("lever job board"));
        assert!(prompt.user.contains(&"x".repeat(100)));
        assert!(!prompt.user.contains(&"x".repeat(101)));
        assert!(prompt.estimated_tokens > 25);
    }

    #[test]
    fn parses_fenced_json() {
        let raw = "Here you go:\n```json\n{\"title\": \"Engineer\", \"confidence\": 0.9}\n```";
        let value = parse_json_reply(raw).unwrap();
        assert_eq!(value["title"], "Engineer");
        assert!(parse_json_reply("no json here").is_err());
    }

    #[test]
    fn schema_rejects_missing_confidence() {
        let err = validate(&json!({"title": "Engineer"})).unwrap_err();
        assert!(matches!(err, AppError::SchemaValidationError(_)));
        assert!(validate(&json!({"title": null, "confidence": 0.2})).is_ok());
        assert!(validate(&json!({"title": "x", "confidence": 1.5})).is_err());
    }

    #[test]
    fn parse_extraction_applies_threshold() {
        let parsed = parse_extraction(
            &reply(r#"{"title": "Staff Engineer", "company": "Acme", "salary_min": 150000, "confidence": 0.85}"#),
            "openai",
            0.7,
        )
        .unwrap();
        assert!(parsed.accept);
        assert_eq!(parsed.data.title.as_deref(), Some("Staff Engineer"));
        assert_eq!(parsed.data.salary_min, Some(150_000.0));
        assert_eq!(parsed.data.provenance.provider.as_deref(), Some("openai"));

        let low = parse_extraction(&reply(r#"{"title": "?", "confidence": 0.3}"#), "openai", 0.7)
            .unwrap();
        assert!(!low.accept);
        assert_eq!(low.confidence, Some(0.3));
    }
}
