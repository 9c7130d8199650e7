//! Per-domain request spacing and robots-aware polite fetching.
//!
//! [`DomainRateLimiter`] keeps the last-request timestamp for each domain in
//! a shared [`KvCache`]. It is not a queue: `allowed` only answers whether
//! the configured spacing has elapsed, callers decide how to back off.
//! [`PoliteFetcher`] is the caller used by the pipeline: it checks
//! robots.txt, sleeps once for the remaining spacing, stamps the request and
//! delegates to the wrapped [`Fetcher`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{Clock, KvCache};
use crate::error::AppError;
use crate::models::domain_of;
use crate::traits::{Fetcher, RobotsPolicy};

/// Minimum spacing between requests, per domain.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub default_spacing: Duration,
    /// Overrides keyed by domain; a key also covers its subdomains.
    pub per_domain: HashMap<String, Duration>,
}

impl RateLimitConfig {
    pub fn new(default_spacing: Duration) -> Self {
        Self {
            default_spacing,
            per_domain: HashMap::new(),
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>, spacing: Duration) -> Self {
        self.per_domain.insert(domain.into().to_lowercase(), spacing);
        self
    }

    /// Parse a `domain=secs,domain=secs` table.
    pub fn parse_table(mut self, table: &str) -> Result<Self, AppError> {
        for pair in table.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (domain, secs) = pair.split_once('=').ok_or_else(|| {
                AppError::ConfigError(format!("Invalid rate limit entry '{pair}': expected domain=secs"))
            })?;
            let secs: f64 = secs.trim().parse().map_err(|_| {
                AppError::ConfigError(format!("Invalid rate limit seconds in '{pair}'"))
            })?;
            let spacing = spacing_from_secs(&format!("rate limit for '{}'", domain.trim()), secs)?;
            self = self.with_domain(domain.trim(), spacing);
        }
        Ok(self)
    }

    /// Spacing for a domain: exact match, then the longest matching parent, then the default.
    pub fn spacing_for(&self, domain: &str) -> Duration {
        let domain = domain.to_lowercase();
        if let Some(spacing) = self.per_domain.get(&domain) {
            return *spacing;
        }
        self.per_domain
            .iter()
            .filter(|(key, _)| domain.ends_with(&format!(".{key}")))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, spacing)| *spacing)
            .unwrap_or(self.default_spacing)
    }
}

impl Default for RateLimitConfig {
    /// 5 second spacing for every domain.
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

/// Seconds to a spacing; negative, non-finite and overflowing values are
/// config errors.
pub(crate) fn spacing_from_secs(what: &str, secs: f64) -> Result<Duration, AppError> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| AppError::ConfigError(format!("{what} must be a non-negative number of seconds, got {secs}")))
}

/// Shared-cache backed per-domain rate limiter.
#[derive(Clone)]
pub struct DomainRateLimiter<C> {
    cache: C,
    clock: Arc<dyn Clock>,
    config: RateLimitConfig,
}

impl<C: KvCache> DomainRateLimiter<C> {
    pub fn new(cache: C, clock: Arc<dyn Clock>, config: RateLimitConfig) -> Self {
        Self {
            cache,
            clock,
            config,
        }
    }

    fn key(domain: &str) -> String {
        format!("rate_limit:{}", domain.to_lowercase())
    }

    async fn last_request_ms(&self, domain: &str) -> Option<i64> {
        self.cache
            .get(&Self::key(domain))
            .await
            .and_then(|v| v.as_i64())
    }

    /// Time still to wait before the next request to `domain` is allowed.
    pub async fn wait_time(&self, domain: &str) -> Duration {
        let Some(last_ms) = self.last_request_ms(domain).await else {
            return Duration::ZERO;
        };
        let spacing = self.config.spacing_for(domain);
        let elapsed_ms = (self.clock.now().timestamp_millis() - last_ms).max(0) as u64;
        spacing.saturating_sub(Duration::from_millis(elapsed_ms))
    }

    /// True iff the configured spacing has elapsed since the last request.
    pub async fn allowed(&self, domain: &str) -> bool {
        self.wait_time(domain).await.is_zero()
    }

    /// Stamp "now" as the last request to `domain`.
    pub async fn record_request(&self, domain: &str) {
        let spacing = self.config.spacing_for(domain);
        let ttl = std::cmp::max(spacing * 2, Duration::from_secs(60));
        self.cache
            .set(
                &Self::key(domain),
                serde_json::json!(self.clock.now().timestamp_millis()),
                ttl,
            )
            .await;
    }
}

/// A [`Fetcher`] wrapper enforcing robots.txt and per-domain spacing.
#[derive(Clone)]
pub struct PoliteFetcher<F, R, C> {
    inner: F,
    robots: R,
    limiter: DomainRateLimiter<C>,
}

impl<F: Fetcher, R: RobotsPolicy, C: KvCache> PoliteFetcher<F, R, C> {
    pub fn new(inner: F, robots: R, limiter: DomainRateLimiter<C>) -> Self {
        Self {
            inner,
            robots,
            limiter,
        }
    }
}

impl<F: Fetcher, R: RobotsPolicy, C: KvCache> Fetcher for PoliteFetcher<F, R, C> {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        if !self.robots.allowed(url).await {
            tracing::info!(%url, "robots.txt disallows fetch");
            return Err(AppError::RobotsDisallowed(url.to_string()));
        }

        if let Some(domain) = domain_of(url) {
            let wait = self.limiter.wait_time(&domain).await;
            if !wait.is_zero() {
                tracing::debug!(
                    domain = %domain,
                    sleep_ms = %wait.as_millis(),
                    "Throttling request"
                );
                tokio::time::sleep(wait).await;
            }
            self.limiter.record_request(&domain).await;
        }

        self.inner.fetch(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FakeClock, MemoryCache, MockFetcher, MockRobots};

    fn limiter(clock: &FakeClock, config: RateLimitConfig) -> DomainRateLimiter<MemoryCache> {
        DomainRateLimiter::new(MemoryCache::new(), Arc::new(clock.clone()), config)
    }

    #[test]
    fn spacing_lookup_prefers_most_specific() {
        let config = RateLimitConfig::new(Duration::from_secs(5))
            .with_domain("linkedin.com", Duration::from_secs(10))
            .with_domain("greenhouse.io", Duration::from_secs(1))
            .with_domain("boards.greenhouse.io", Duration::from_secs(2));

        assert_eq!(config.spacing_for("linkedin.com"), Duration::from_secs(10));
        assert_eq!(config.spacing_for("api.greenhouse.io"), Duration::from_secs(1));
        assert_eq!(config.spacing_for("boards.greenhouse.io"), Duration::from_secs(2));
        assert_eq!(config.spacing_for("example.com"), Duration::from_secs(5));
    }

    #[test]
    fn parse_table_accepts_pairs_and_rejects_garbage() {
        let config = RateLimitConfig::default()
            .parse_table("linkedin.com=10, indeed.com=2.5")
            .unwrap();
        assert_eq!(config.spacing_for("indeed.com"), Duration::from_millis(2500));

        assert!(RateLimitConfig::default().parse_table("linkedin.com").is_err());
        assert!(RateLimitConfig::default().parse_table("a.com=x").is_err());
    }

    #[test]
    fn parse_table_rejects_unrepresentable_seconds() {
        for table in ["a.com=inf", "a.com=NaN", "a.com=1e30", "a.com=-1"] {
            let err = RateLimitConfig::default().parse_table(table).unwrap_err();
            assert!(matches!(err, AppError::ConfigError(_)), "{table}: {err:?}");
        }
    }

    #[tokio::test]
    async fn first_request_is_allowed_then_spacing_applies() {
        let clock = FakeClock::new();
        let limiter = limiter(&clock, RateLimitConfig::new(Duration::from_secs(5)));

        assert!(limiter.allowed("example.com").await);
        limiter.record_request("example.com").await;
        assert!(!limiter.allowed("example.com").await);
        assert_eq!(limiter.wait_time("example.com").await, Duration::from_secs(5));

        clock.advance(chrono::TimeDelta::seconds(3));
        assert_eq!(limiter.wait_time("example.com").await, Duration::from_secs(2));

        clock.advance(chrono::TimeDelta::seconds(2));
        assert!(limiter.allowed("example.com").await);
    }

    #[tokio::test]
    async fn domains_are_independent() {
        let clock = FakeClock::new();
        let limiter = limiter(&clock, RateLimitConfig::default());

        limiter.record_request("a.com").await;
        assert!(!limiter.allowed("a.com").await);
        assert!(limiter.allowed("b.com").await);
    }

    #[tokio::test]
    async fn polite_fetcher_blocks_disallowed_urls() {
        let clock = FakeClock::new();
        let inner = MockFetcher::new("<html>ok</html>");
        let fetcher = PoliteFetcher::new(
            inner.clone(),
            MockRobots::deny_all(),
            limiter(&clock, RateLimitConfig::new(Duration::ZERO)),
        );

        let err = fetcher.fetch("https://example.com/jobs/1").await.unwrap_err();
        assert!(matches!(err, AppError::RobotsDisallowed(_)));
        assert_eq!(inner.call_count(), 0);
    }

    #[tokio::test]
    async fn polite_fetcher_records_request_and_passes_through() {
        let clock = FakeClock::new();
        let limiter = limiter(&clock, RateLimitConfig::new(Duration::from_secs(5)));
        let fetcher = PoliteFetcher::new(
            MockFetcher::new("<html>hello</html>"),
            MockRobots::allow_all(),
            limiter.clone(),
        );

        let html = fetcher.fetch("https://www.example.com/jobs/1").await.unwrap();
        assert_eq!(html, "<html>hello</html>");
        assert!(!limiter.allowed("example.com").await);
    }

    #[tokio::test(start_paused = true)]
    async fn polite_fetcher_sleeps_for_remaining_spacing() {
        let clock = FakeClock::new();
        let limiter = limiter(&clock, RateLimitConfig::new(Duration::from_secs(2)));
        limiter.record_request("example.com").await;

        let fetcher = PoliteFetcher::new(
            MockFetcher::new("<html>ok</html>"),
            MockRobots::allow_all(),
            limiter,
        );

        let start = tokio::time::Instant::now();
        fetcher.fetch("https://example.com/jobs/2").await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn polite_fetcher_passes_through_errors() {
        let clock = FakeClock::new();
        let fetcher = PoliteFetcher::new(
            MockFetcher::with_error(AppError::HttpError("fail".into())),
            MockRobots::allow_all(),
            limiter(&clock, RateLimitConfig::new(Duration::ZERO)),
        );

        let err = fetcher.fetch("http://example.com").await.unwrap_err();
        assert!(matches!(err, AppError::HttpError(_)));
    }
}
