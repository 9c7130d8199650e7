use std::sync::Arc;
use std::time::Duration;

use jobsift_core::traits::RobotsPolicy;
use moka::future::Cache;
use reqwest::Client;
use robotstxt::DefaultMatcher;
use url::Url;

use crate::fetcher::USER_AGENT;

/// How long a fetched robots.txt is trusted.
pub const ROBOTS_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// robots.txt checker with a per-origin cache.
///
/// Fails open: an unreachable or erroring robots.txt allows the fetch.
/// A missing robots.txt (4xx) is cached as "allow everything".
#[derive(Clone)]
pub struct RobotsChecker {
    client: Client,
    agent: String,
    cache: Cache<String, Arc<String>>,
}

impl RobotsChecker {
    pub fn new() -> Self {
        Self::with_ttl(ROBOTS_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            agent: "jobsift".to_string(),
            cache: Cache::builder().max_capacity(10_000).time_to_live(ttl).build(),
        }
    }

    /// Product token matched against `User-agent` groups.
    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = agent.into();
        self
    }

    /// robots.txt body for an origin; `None` when it could not be fetched.
    async fn body_for(&self, origin: &str) -> Option<Arc<String>> {
        if let Some(body) = self.cache.get(origin).await {
            return Some(body);
        }

        let robots_url = format!("{origin}/robots.txt");
        let response = match self.client.get(&robots_url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(url = %robots_url, error = %e, "robots.txt unreachable, allowing");
                return None;
            }
        };

        let status = response.status();
        let body = if status.is_success() {
            match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    tracing::debug!(url = %robots_url, error = %e, "robots.txt unreadable, allowing");
                    return None;
                }
            }
        } else if status.is_client_error() {
            String::new()
        } else {
            tracing::debug!(url = %robots_url, status = status.as_u16(), "robots.txt errored, allowing");
            return None;
        };

        let body = Arc::new(body);
        self.cache.insert(origin.to_string(), body.clone()).await;
        Some(body)
    }
}

impl Default for RobotsChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl RobotsPolicy for RobotsChecker {
    async fn allowed(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return true;
        };
        let origin = parsed.origin().ascii_serialization();
        match self.body_for(&origin).await {
            Some(body) if !body.is_empty() => {
                let allowed = DefaultMatcher::default().one_agent_allowed_by_robots(&body, &self.agent, url);
                if !allowed {
                    tracing::info!(url, agent = %self.agent, "Disallowed by robots.txt");
                }
                allowed
            }
            _ => true,
        }
    }
}
