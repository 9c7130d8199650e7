//! Ordered multi-provider AI runner.
//!
//! [`ProviderRunner::run`] walks the provider chain in order. Each provider
//! is skipped while its circuit is open or it is not configured; metered
//! providers wait on their [`TokenBudget`] first. Every call is written to
//! the [`ApiCallLogger`]; a failing logger never changes the outcome.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::api_log::{ApiCallStatus, MAX_LOGGED_PAYLOAD, NewApiCallLog, truncate_payload};
use crate::cache::KvCache;
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::error::AppError;
use crate::token_budget::TokenBudget;
use crate::traits::ApiCallLogger;

/// A rendered prompt, ready for any provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    pub version: &'static str,
    pub estimated_tokens: u64,
}

impl Prompt {
    /// Rough token estimate at 4 characters per token.
    pub fn estimate_tokens(text: &str) -> u64 {
        (text.chars().count() as u64).div_ceil(4)
    }
}

/// Raw completion returned by a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderReply {
    pub content: String,
    pub model: String,
    pub tokens_in: Option<u32>,
    pub tokens_out: Option<u32>,
}

impl ProviderReply {
    pub fn total_tokens(&self) -> Option<u32> {
        match (self.tokens_in, self.tokens_out) {
            (None, None) => None,
            (a, b) => Some(a.unwrap_or(0) + b.unwrap_or(0)),
        }
    }
}

/// One AI backend in the provider chain.
#[async_trait]
pub trait AiProvider: Send + Sync {
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    /// False when required credentials are missing.
    fn is_configured(&self) -> bool {
        true
    }

    /// Tokens-per-minute cap for metered providers.
    fn tokens_per_minute(&self) -> Option<u64> {
        None
    }

    async fn complete(&self, prompt: &Prompt) -> Result<ProviderReply, AppError>;
}

/// Called when a provider reports rate limiting, before moving on.
#[async_trait]
pub trait RateLimitHook: Send + Sync {
    async fn on_rate_limit(&self, provider: &str, retry_after: Option<Duration>);
}

/// Sleeps for the server hint, never longer than `cap`.
#[derive(Debug, Clone)]
pub struct CappedSleep {
    pub cap: Duration,
}

#[async_trait]
impl RateLimitHook for CappedSleep {
    async fn on_rate_limit(&self, provider: &str, retry_after: Option<Duration>) {
        let wait = retry_after.unwrap_or(self.cap).min(self.cap);
        if !wait.is_zero() {
            tracing::info!(provider, wait_ms = %wait.as_millis(), "Provider rate limited, backing off");
            tokio::time::sleep(wait).await;
        }
    }
}

/// Result of the caller's parse callback.
#[derive(Debug, Clone)]
pub struct Parsed<T> {
    pub data: T,
    /// Extra fields merged into the API-call log metadata.
    pub metadata: Value,
    pub confidence: Option<f64>,
    pub accept: bool,
}

#[derive(Debug, Clone)]
pub enum RunOutcome<T> {
    Accepted {
        data: T,
        provider: String,
        model: String,
        log_id: Uuid,
        tokens: Option<u32>,
    },
    /// No provider produced an accepted response.
    Exhausted {
        /// Highest confidence among parsed but rejected responses.
        best_confidence: Option<f64>,
        /// One `provider: error` line per failed call.
        errors: Vec<String>,
    },
}

struct ProviderSlot<C> {
    provider: Arc<dyn AiProvider>,
    breaker: CircuitBreaker,
    budget: Option<TokenBudget<C>>,
}

pub struct ProviderRunner<L, C> {
    slots: Vec<ProviderSlot<C>>,
    logger: L,
    hook: Arc<dyn RateLimitHook>,
    breaker_config: CircuitBreakerConfig,
    budget_sleep_cap: Duration,
}

impl<L: ApiCallLogger, C: KvCache> ProviderRunner<L, C> {
    pub fn new(logger: L, hook: Arc<dyn RateLimitHook>) -> Self {
        Self {
            slots: Vec::new(),
            logger,
            hook,
            breaker_config: CircuitBreakerConfig::default(),
            budget_sleep_cap: Duration::from_secs(5),
        }
    }

    pub fn with_breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker_config = config;
        self
    }

    pub fn with_budget_sleep_cap(mut self, cap: Duration) -> Self {
        self.budget_sleep_cap = cap;
        self
    }

    /// Append a provider to the chain.
    pub fn with_provider(
        mut self,
        provider: Arc<dyn AiProvider>,
        budget: Option<TokenBudget<C>>,
    ) -> Self {
        let breaker = CircuitBreaker::new(provider.name(), self.breaker_config.clone());
        self.slots.push(ProviderSlot {
            provider,
            breaker,
            budget,
        });
        self
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.slots.iter().map(|s| s.provider.name().to_string()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Run the chain until `parse` accepts a response.
    pub async fn run<T, P>(
        &self,
        prompt: &Prompt,
        attempt_id: Option<Uuid>,
        operation: &str,
        parse: P,
    ) -> RunOutcome<T>
    where
        T: Send,
        P: Fn(&ProviderReply) -> Result<Parsed<T>, AppError> + Send + Sync,
    {
        let mut best_confidence: Option<f64> = None;
        let mut errors = Vec::new();

        for slot in &self.slots {
            let name = slot.provider.name();
            let model = slot.provider.model();

            if !slot.provider.is_configured() {
                tracing::debug!(provider = name, "Provider not configured, skipping");
                continue;
            }
            if !slot.breaker.is_available() {
                tracing::info!(provider = name, "Circuit open, skipping provider");
                errors.push(format!("{name}: circuit open"));
                continue;
            }

            if let Some(budget) = &slot.budget
                && !budget.can_send(prompt.estimated_tokens).await
            {
                let wait = budget.wait_time(prompt.estimated_tokens).await;
                if wait > self.budget_sleep_cap {
                    tracing::info!(
                        provider = name,
                        wait_ms = %wait.as_millis(),
                        "Token budget exhausted, skipping provider"
                    );
                    let entry = self.entry(
                        attempt_id,
                        name,
                        model,
                        operation,
                        prompt,
                        ApiCallStatus::RateLimited,
                        0,
                    );
                    self.log(NewApiCallLog {
                        error_class: Some("token_budget".into()),
                        error_message: Some(format!("Token budget exhausted for {}s", wait.as_secs())),
                        ..entry
                    })
                    .await;
                    errors.push(format!("{name}: token budget exhausted"));
                    continue;
                }
                tracing::debug!(provider = name, wait_ms = %wait.as_millis(), "Waiting for token budget");
                tokio::time::sleep(wait).await;
            }

            let started = Instant::now();
            let result = slot.provider.complete(prompt).await;
            let latency_ms = started.elapsed().as_millis() as u64;

            let reply = match result {
                Ok(reply) => reply,
                Err(e) => {
                    slot.breaker.record_failure(&e);
                    let status = if e.is_rate_limit() {
                        ApiCallStatus::RateLimited
                    } else {
                        ApiCallStatus::Error
                    };
                    tracing::warn!(provider = name, error = %e, latency_ms, "Provider call failed");
                    let entry =
                        self.entry(attempt_id, name, model, operation, prompt, status, latency_ms);
                    self.log(NewApiCallLog {
                        error_class: Some(e.kind().to_string()),
                        error_message: Some(e.to_string()),
                        ..entry
                    })
                    .await;
                    errors.push(format!("{name}: {e}"));

                    if let AppError::RateLimitExceeded { retry_after } = &e {
                        self.hook
                            .on_rate_limit(name, retry_after.map(Duration::from_secs))
                            .await;
                    } else if e.is_rate_limit() {
                        self.hook.on_rate_limit(name, None).await;
                    }
                    continue;
                }
            };

            slot.breaker.record_success();
            if let Some(budget) = &slot.budget {
                let used = reply
                    .total_tokens()
                    .map(u64::from)
                    .unwrap_or(prompt.estimated_tokens);
                budget.record_used(used).await;
            }

            let model = if reply.model.is_empty() {
                model.to_string()
            } else {
                reply.model.clone()
            };
            let mut entry = self.entry(
                attempt_id,
                name,
                &model,
                operation,
                prompt,
                ApiCallStatus::Error,
                latency_ms,
            );
            entry.tokens_in = reply.tokens_in;
            entry.tokens_out = reply.tokens_out;
            entry.response_payload = Some(truncate_payload(&reply.content, MAX_LOGGED_PAYLOAD));

            match parse(&reply) {
                Err(e) => {
                    tracing::warn!(provider = name, error = %e, "Provider response did not parse");
                    errors.push(format!("{name}: {e}"));
                    self.log(NewApiCallLog {
                        error_class: Some(e.kind().to_string()),
                        error_message: Some(e.to_string()),
                        ..entry
                    })
                    .await;
                }
                Ok(parsed) => {
                    if let Some(c) = parsed.confidence {
                        best_confidence = Some(best_confidence.map_or(c, |b: f64| b.max(c)));
                    }
                    let log_id = entry.id;
                    let tokens = reply.total_tokens();
                    entry.status = if parsed.accept {
                        ApiCallStatus::Success
                    } else {
                        ApiCallStatus::Rejected
                    };
                    entry.confidence = parsed.confidence;
                    merge_metadata(&mut entry.metadata, parsed.metadata);
                    self.log(entry).await;

                    if parsed.accept {
                        tracing::info!(
                            provider = name,
                            model = %model,
                            confidence = ?parsed.confidence,
                            latency_ms,
                            "Provider response accepted"
                        );
                        return RunOutcome::Accepted {
                            data: parsed.data,
                            provider: name.to_string(),
                            model,
                            log_id,
                            tokens,
                        };
                    }
                    tracing::info!(
                        provider = name,
                        confidence = ?parsed.confidence,
                        "Provider response rejected"
                    );
                }
            }
        }

        RunOutcome::Exhausted {
            best_confidence,
            errors,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn entry(
        &self,
        attempt_id: Option<Uuid>,
        provider: &str,
        model: &str,
        operation: &str,
        prompt: &Prompt,
        status: ApiCallStatus,
        latency_ms: u64,
    ) -> NewApiCallLog {
        NewApiCallLog {
            id: Uuid::new_v4(),
            attempt_id,
            provider: provider.to_string(),
            model: model.to_string(),
            operation: operation.to_string(),
            status,
            tokens_in: None,
            tokens_out: None,
            latency_ms,
            request_payload: truncate_payload(&prompt.user, MAX_LOGGED_PAYLOAD),
            response_payload: None,
            confidence: None,
            error_class: None,
            error_message: None,
            metadata: json!({
                "prompt_version": prompt.version,
                "estimated_tokens": prompt.estimated_tokens,
            }),
            created_at: Utc::now(),
        }
    }

    async fn log(&self, entry: NewApiCallLog) {
        if let Err(e) = self.logger.log(&entry).await {
            tracing::warn!(provider = %entry.provider, error = %e, "Failed to persist API call log");
        }
    }
}

fn merge_metadata(base: &mut Value, extra: Value) {
    if let (Value::Object(base), Value::Object(extra)) = (base, extra) {
        base.extend(extra);
    }
}
