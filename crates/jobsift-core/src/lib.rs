pub mod api_log;
pub mod attempt;
pub mod board;
pub mod cache;
pub mod circuit_breaker;
pub mod classifier;
pub mod config;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod memory;
pub mod merge;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod provider;
pub mod resolver;
pub mod service;
pub mod throttle;
pub mod token_budget;
pub mod traits;

#[cfg(test)]
pub mod testutil;

pub use attempt::{Attempt, AttemptStatus, RetryConfig};
pub use board::{BoardMatch, BoardType};
pub use cache::{CachedFetcher, Clock, KvCache, MokaKvCache, SystemClock, system_clock};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use config::PipelineConfig;
pub use error::AppError;
pub use models::{ExtractionMethod, ExtractionResult, FetchMode, Provenance, ScrapedFields, Target, compute_hash};
pub use provider::{AiProvider, ProviderRunner};
pub use service::{AttemptAction, ExtractOutcome, ExtractionService};
pub use throttle::{DomainRateLimiter, PoliteFetcher, RateLimitConfig};
pub use traits::{
    AllowAll, ApiCallLogger, AttemptStore, BoardApi, Cleaner, CompanyDirectory, DomScraper, EventSink,
    Fetcher, JobSink, RobotsPolicy,
};
