//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use uuid::Uuid;

use crate::api_log::NewApiCallLog;
use crate::attempt::NewAttempt;
use crate::board::{BoardMatch, BoardType};
use crate::cache::{Clock, KvCache};
use crate::error::AppError;
use crate::events::{NewEvent, PipelineEvent};
use crate::models::{ExtractionResult, ScrapedFields, Target};
use crate::pipeline::Context;
use crate::provider::{AiProvider, Prompt, ProviderReply};
use crate::traits::{ApiCallLogger, BoardApi, Cleaner, DomScraper, EventSink, Fetcher, RobotsPolicy};

// ---------------------------------------------------------------------------
// FakeClock
// ---------------------------------------------------------------------------

/// Manually advanced clock. Clones share the same time.
#[derive(Clone)]
pub struct FakeClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl FakeClock {
    /// Starts at 2025-01-01T00:00:00Z.
    pub fn new() -> Self {
        let start = Utc
            .with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_else(Utc::now);
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

// ---------------------------------------------------------------------------
// MemoryCache
// ---------------------------------------------------------------------------

/// [`KvCache`] over a HashMap. TTLs are ignored; expiry in the code under
/// test is driven by [`FakeClock`].
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, serde_json::Value>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvCache for MemoryCache {
    async fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    async fn set(&self, key: &str, value: serde_json::Value, _ttl: Duration) {
        self.entries.lock().unwrap().insert(key.to_string(), value);
    }
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Mock fetcher that returns a configurable response.
#[derive(Clone)]
pub struct MockFetcher {
    /// Queue of responses. Each call pops the first element.
    /// If empty, returns a default HTML string.
    responses: Arc<Mutex<Vec<Result<String, AppError>>>>,
    urls: Arc<Mutex<Vec<String>>>,
    delay: Option<Duration>,
}

impl MockFetcher {
    pub fn new(html: &str) -> Self {
        Self::with_responses(vec![Ok(html.to_string())])
    }

    pub fn with_error(error: AppError) -> Self {
        Self::with_responses(vec![Err(error)])
    }

    pub fn with_responses(responses: Vec<Result<String, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            urls: Arc::new(Mutex::new(Vec::new())),
            delay: None,
        }
    }

    /// Sleep for `delay` before answering, to keep a fetch in flight.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.urls.lock().unwrap().len()
    }

    pub fn requested_urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        self.urls.lock().unwrap().push(url.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok("<html><body>default</body></html>".to_string())
        } else {
            responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// MockRobots
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
pub struct MockRobots {
    allowed: bool,
}

impl MockRobots {
    pub fn allow_all() -> Self {
        Self { allowed: true }
    }

    pub fn deny_all() -> Self {
        Self { allowed: false }
    }
}

impl RobotsPolicy for MockRobots {
    async fn allowed(&self, _url: &str) -> bool {
        self.allowed
    }
}

// ---------------------------------------------------------------------------
// MockCleaner
// ---------------------------------------------------------------------------

/// Mock cleaner that returns its input unless primed with an error.
#[derive(Clone)]
pub struct MockCleaner {
    error: Arc<Mutex<Option<AppError>>>,
}

impl MockCleaner {
    /// Creates a cleaner that returns the input unchanged.
    pub fn passthrough() -> Self {
        Self {
            error: Arc::new(Mutex::new(None)),
        }
    }

    /// Creates a cleaner that fails once with `error`.
    pub fn with_error(error: AppError) -> Self {
        Self {
            error: Arc::new(Mutex::new(Some(error))),
        }
    }
}

impl Cleaner for MockCleaner {
    fn clean(&self, html: &str) -> Result<String, AppError> {
        if let Some(e) = self.error.lock().unwrap().take() {
            return Err(e);
        }
        Ok(html.to_string())
    }
}

// ---------------------------------------------------------------------------
// MockDomScraper
// ---------------------------------------------------------------------------

/// Returns fixed generic and board-selector fields.
#[derive(Clone, Default)]
pub struct MockDomScraper {
    generic: ScrapedFields,
    board: ScrapedFields,
}

impl MockDomScraper {
    pub fn new(generic: ScrapedFields, board: ScrapedFields) -> Self {
        Self { generic, board }
    }
}

impl DomScraper for MockDomScraper {
    fn scrape_generic(&self, _html: &str) -> ScrapedFields {
        self.generic.clone()
    }

    fn scrape_board(&self, _html: &str, board: BoardType) -> ScrapedFields {
        if board == BoardType::Unknown {
            ScrapedFields::default()
        } else {
            self.board.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// MockBoardApi
// ---------------------------------------------------------------------------

/// Recorded board lookups plus queued responses; `Ok(None)` once drained.
#[derive(Clone)]
pub struct MockBoardApi {
    responses: Arc<Mutex<Vec<Result<Option<ExtractionResult>, AppError>>>>,
    pub calls: Arc<Mutex<Vec<BoardMatch>>>,
}

impl MockBoardApi {
    pub fn returning(result: Option<ExtractionResult>) -> Self {
        Self::with_responses(vec![Ok(result)])
    }

    pub fn with_error(error: AppError) -> Self {
        Self::with_responses(vec![Err(error)])
    }

    pub fn with_responses(responses: Vec<Result<Option<ExtractionResult>, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl BoardApi for MockBoardApi {
    async fn fetch_posting(&self, board: &BoardMatch) -> Result<Option<ExtractionResult>, AppError> {
        self.calls.lock().unwrap().push(board.clone());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(None)
        } else {
            responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// MockProvider
// ---------------------------------------------------------------------------

/// AI provider that always replies with the same content, or fails.
pub struct MockProvider {
    name: String,
    model: String,
    reply: Option<String>,
    error: Mutex<Option<AppError>>,
    usage: (Option<u32>, Option<u32>),
    configured: bool,
    tokens_per_minute: Option<u64>,
    calls: AtomicUsize,
}

impl MockProvider {
    pub fn replying(name: &str, content: &str) -> Self {
        Self {
            name: name.to_string(),
            model: format!("{name}-model"),
            reply: Some(content.to_string()),
            error: Mutex::new(None),
            usage: (None, None),
            configured: true,
            tokens_per_minute: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fails with `error` on the first call and a generic error afterwards.
    pub fn failing(name: &str, error: AppError) -> Self {
        Self {
            reply: None,
            error: Mutex::new(Some(error)),
            ..Self::replying(name, "")
        }
    }

    pub fn with_usage(mut self, tokens_in: u32, tokens_out: u32) -> Self {
        self.usage = (Some(tokens_in), Some(tokens_out));
        self
    }

    pub fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    pub fn metered(mut self, tokens_per_minute: u64) -> Self {
        self.tokens_per_minute = Some(tokens_per_minute);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AiProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    fn tokens_per_minute(&self) -> Option<u64> {
        self.tokens_per_minute
    }

    async fn complete(&self, _prompt: &Prompt) -> Result<ProviderReply, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Some(content) => Ok(ProviderReply {
                content: content.clone(),
                model: self.model.clone(),
                tokens_in: self.usage.0,
                tokens_out: self.usage.1,
            }),
            None => Err(self
                .error
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| AppError::Generic(format!("{} failed", self.name)))),
        }
    }
}

// ---------------------------------------------------------------------------
// MockApiCallLogger
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MockApiCallLogger {
    entries: Arc<Mutex<Vec<NewApiCallLog>>>,
    fail: bool,
}

impl MockApiCallLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logger whose writes always fail.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn entries(&self) -> Vec<NewApiCallLog> {
        self.entries.lock().unwrap().clone()
    }
}

impl ApiCallLogger for MockApiCallLogger {
    async fn log(&self, entry: &NewApiCallLog) -> Result<(), AppError> {
        if self.fail {
            return Err(AppError::DatabaseError("api log unavailable".into()));
        }
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FailingEventSink
// ---------------------------------------------------------------------------

/// Event sink whose every call fails.
#[derive(Clone, Copy)]
pub struct FailingEventSink;

impl EventSink for FailingEventSink {
    async fn record(&self, _event: &NewEvent) -> Result<(), AppError> {
        Err(AppError::DatabaseError("event store unavailable".into()))
    }

    async fn latest_for_step(&self, _attempt_id: Uuid, _step: &str) -> Result<Option<PipelineEvent>, AppError> {
        Err(AppError::DatabaseError("event store unavailable".into()))
    }

    async fn list_for_attempt(&self, _attempt_id: Uuid) -> Result<Vec<PipelineEvent>, AppError> {
        Err(AppError::DatabaseError("event store unavailable".into()))
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// A fresh context with a pending attempt for `url`.
pub fn test_context(url: &str) -> Context {
    let clock = Arc::new(FakeClock::new());
    let target = Target::new(Uuid::new_v4(), url);
    let attempt = NewAttempt::for_target(&target).into_attempt(clock.now());
    Context::new(target, attempt, clock)
}
