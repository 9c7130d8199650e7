//! Rolling per-minute token budget for metered AI providers.
//!
//! Usage is kept as a list of `(timestamp, tokens)` entries under one cache
//! key per provider. Entries older than the window are pruned on every read.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::{Clock, KvCache};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct UsageEntry {
    at_ms: i64,
    tokens: u64,
}

#[derive(Clone)]
pub struct TokenBudget<C> {
    cache: C,
    clock: Arc<dyn Clock>,
    provider: String,
    limit: u64,
    window: Duration,
}

impl<C: KvCache> TokenBudget<C> {
    /// Budget of `tokens_per_minute` over a 60 second rolling window.
    pub fn per_minute(
        cache: C,
        clock: Arc<dyn Clock>,
        provider: impl Into<String>,
        tokens_per_minute: u64,
    ) -> Self {
        Self {
            cache,
            clock,
            provider: provider.into(),
            limit: tokens_per_minute,
            window: Duration::from_secs(60),
        }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    fn key(&self) -> String {
        format!("token_budget:{}", self.provider)
    }

    fn window_ms(&self) -> i64 {
        self.window.as_millis() as i64
    }

    async fn live_entries(&self) -> Vec<UsageEntry> {
        let now_ms = self.clock.now().timestamp_millis();
        let window_ms = self.window_ms();
        let mut entries: Vec<UsageEntry> = self
            .cache
            .get(&self.key())
            .await
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        entries.retain(|e| now_ms - e.at_ms < window_ms);
        entries.sort_by_key(|e| e.at_ms);
        entries
    }

    /// Tokens spent inside the current window.
    pub async fn used(&self) -> u64 {
        self.live_entries().await.iter().map(|e| e.tokens).sum()
    }

    /// Whether `estimated` more tokens fit in the window.
    pub async fn can_send(&self, estimated: u64) -> bool {
        self.used().await + estimated <= self.limit
    }

    /// Time until enough old usage expires for `estimated` tokens to fit.
    ///
    /// A request larger than the whole budget never fits; the full window is
    /// returned so callers treat it as over any sleep cap.
    pub async fn wait_time(&self, estimated: u64) -> Duration {
        if estimated > self.limit {
            return self.window;
        }
        let entries = self.live_entries().await;
        let mut in_window: u64 = entries.iter().map(|e| e.tokens).sum();
        if in_window + estimated <= self.limit {
            return Duration::ZERO;
        }

        let now_ms = self.clock.now().timestamp_millis();
        for entry in &entries {
            in_window -= entry.tokens;
            if in_window + estimated <= self.limit {
                let expires_in = entry.at_ms + self.window_ms() - now_ms;
                return Duration::from_millis(expires_in.max(0) as u64);
            }
        }
        self.window
    }

    /// Append a usage entry and drop expired ones.
    pub async fn record_used(&self, tokens: u64) {
        let mut entries = self.live_entries().await;
        entries.push(UsageEntry {
            at_ms: self.clock.now().timestamp_millis(),
            tokens,
        });
        match serde_json::to_value(&entries) {
            Ok(value) => self.cache.set(&self.key(), value, self.window * 2).await,
            Err(e) => tracing::warn!(provider = %self.provider, error = %e, "Failed to store token usage"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FakeClock, MemoryCache};
    use chrono::TimeDelta;

    fn budget(clock: &FakeClock, limit: u64) -> TokenBudget<MemoryCache> {
        TokenBudget::per_minute(MemoryCache::new(), Arc::new(clock.clone()), "groq", limit)
    }

    #[tokio::test]
    async fn window_expiry_frees_budget() {
        let clock = FakeClock::new();
        let budget = budget(&clock, 30_000);

        budget.record_used(29_000).await;
        assert!(!budget.can_send(2_000).await);
        assert!(budget.can_send(1_000).await);

        clock.advance(TimeDelta::seconds(61));
        assert!(budget.can_send(2_000).await);
        assert_eq!(budget.used().await, 0);
    }

    #[tokio::test]
    async fn wait_time_is_until_enough_entries_expire() {
        let clock = FakeClock::new();
        let budget = budget(&clock, 10_000);

        budget.record_used(4_000).await;
        clock.advance(TimeDelta::seconds(20));
        budget.record_used(5_000).await;
        clock.advance(TimeDelta::seconds(10));

        assert_eq!(budget.wait_time(500).await, Duration::ZERO);
        // First entry expires 60s after it was recorded, 30s from now.
        assert_eq!(budget.wait_time(3_000).await, Duration::from_secs(30));
        // Needs both entries gone.
        assert_eq!(budget.wait_time(7_000).await, Duration::from_secs(50));
        assert_eq!(budget.wait_time(20_000).await, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn providers_do_not_share_usage() {
        let clock = FakeClock::new();
        let cache = MemoryCache::new();
        let a = TokenBudget::per_minute(cache.clone(), Arc::new(clock.clone()), "a", 100);
        let b = TokenBudget::per_minute(cache, Arc::new(clock.clone()), "b", 100);

        a.record_used(100).await;
        assert!(!a.can_send(1).await);
        assert!(b.can_send(100).await);
    }
}
