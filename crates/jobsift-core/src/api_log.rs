use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payloads are truncated to this many characters before logging.
pub const MAX_LOGGED_PAYLOAD: usize = 4_000;

/// Outcome of one provider call, as logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiCallStatus {
    /// Response parsed and accepted.
    Success,
    /// Response parsed but below the acceptance bar.
    Rejected,
    RateLimited,
    Error,
}

impl ApiCallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiCallStatus::Success => "success",
            ApiCallStatus::Rejected => "rejected",
            ApiCallStatus::RateLimited => "rate_limited",
            ApiCallStatus::Error => "error",
        }
    }
}

impl fmt::Display for ApiCallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ApiCallStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(ApiCallStatus::Success),
            "rejected" => Ok(ApiCallStatus::Rejected),
            "rate_limited" => Ok(ApiCallStatus::RateLimited),
            "error" => Ok(ApiCallStatus::Error),
            _ => Err(format!("Unknown api call status: {s}")),
        }
    }
}

/// One structured API-call log row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewApiCallLog {
    pub id: Uuid,
    pub attempt_id: Option<Uuid>,
    pub provider: String,
    pub model: String,
    pub operation: String,
    pub status: ApiCallStatus,
    pub tokens_in: Option<u32>,
    pub tokens_out: Option<u32>,
    pub latency_ms: u64,
    pub request_payload: String,
    pub response_payload: Option<String>,
    pub confidence: Option<f64>,
    /// Short error label, see [`AppError::kind`](crate::error::AppError::kind).
    pub error_class: Option<String>,
    pub error_message: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Cut `s` to at most `max` characters, marking the cut.
pub fn truncate_payload(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push_str("...[truncated]");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_payload("short", 10), "short");
        assert_eq!(truncate_payload("ééééé", 2), "éé...[truncated]");
    }

    #[test]
    fn status_parses() {
        assert_eq!("rate_limited".parse::<ApiCallStatus>().unwrap(), ApiCallStatus::RateLimited);
        assert!("nope".parse::<ApiCallStatus>().is_err());
    }
}
