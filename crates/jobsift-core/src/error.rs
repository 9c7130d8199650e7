use thiserror::Error;

/// Application-wide error types for jobsift.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed (fetching a page).
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// The server answered with a non-success status.
    ///
    /// The display form `HTTP <status>: <url>` is matched by the failure
    /// classifier, keep it stable.
    #[error("HTTP {status}: {url}")]
    HttpStatus { status: u16, url: String },

    /// LLM API call failed.
    #[error("LLM error (HTTP {status_code}): {message}")]
    LlmError {
        message: String,
        status_code: u16,
        retryable: bool,
    },

    /// HTML-to-Markdown conversion failed.
    #[error("Cleaner error: {0}")]
    CleanerError(String),

    /// Extracted JSON does not match the expected schema.
    #[error("Schema validation error: {0}")]
    SchemaValidationError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: Option<u64> },

    /// robots.txt disallows fetching the URL.
    #[error("Blocked by robots.txt: {0}")]
    RobotsDisallowed(String),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// An attempt was asked to move along an edge the state machine forbids.
    #[error("Invalid attempt transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Attempt not found: {0}")]
    AttemptNotFound(uuid::Uuid),

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Invalid or missing configuration.
    #[error("Config error: {0}")]
    ConfigError(String),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Shorthand for a rate-limit error without a server hint.
    pub fn rate_limited() -> Self {
        AppError::RateLimitExceeded { retry_after: None }
    }

    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_)
            | AppError::Timeout(_)
            | AppError::RateLimitExceeded { .. } => true,
            AppError::LlmError { retryable, .. } => *retryable,
            AppError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            AppError::HttpError(msg) => {
                msg.contains("timeout") || msg.contains("connect") || msg.contains("reset")
            }
            _ => false,
        }
    }

    /// Returns true if this error should trip the circuit breaker.
    pub fn should_trip_circuit(&self) -> bool {
        match self {
            AppError::NetworkError(_)
            | AppError::Timeout(_)
            | AppError::RateLimitExceeded { .. } => true,
            AppError::LlmError {
                status_code,
                retryable,
                ..
            } => {
                // Trip on rate limits (429) and server errors (5xx)
                *status_code == 429 || *status_code >= 500 || *retryable
            }
            AppError::HttpError(msg) => {
                msg.contains("timeout") || msg.contains("connect") || msg.contains("connection")
            }
            _ => false,
        }
    }

    /// Whether this error signals provider-side throttling.
    pub fn is_rate_limit(&self) -> bool {
        matches!(
            self,
            AppError::RateLimitExceeded { .. }
                | AppError::LlmError {
                    status_code: 429,
                    ..
                }
        )
    }

    /// Short machine-readable label used in API-call logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::HttpError(_) | AppError::HttpStatus { .. } => "http",
            AppError::LlmError { .. } => "llm",
            AppError::CleanerError(_) => "cleaner",
            AppError::SchemaValidationError(_) => "schema",
            AppError::SerializationError(_) => "parse",
            AppError::Timeout(_) => "timeout",
            AppError::RateLimitExceeded { .. } => "rate_limit",
            AppError::RobotsDisallowed(_) => "robots",
            AppError::NetworkError(_) => "network",
            AppError::InvalidTransition { .. } | AppError::AttemptNotFound(_) => "state",
            AppError::DatabaseError(_) => "database",
            AppError::ConfigError(_) => "config",
            AppError::Generic(_) => "generic",
        }
    }
}
