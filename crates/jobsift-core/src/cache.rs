//! Shared key/value cache and clock seams.
//!
//! Rate-limit and token-budget state lives behind [`KvCache`] so several
//! pipeline instances can share it (and tests can swap in a fake). All
//! time-dependent logic reads [`Clock`] rather than the system time.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use moka::Expiry;
use moka::future::Cache;

use crate::error::AppError;
use crate::models::compute_hash;
use crate::traits::Fetcher;

/// Async get / set-with-TTL store of JSON values.
///
/// Read-modify-write sequences are not atomic; callers treat the stored
/// counters as approximate.
pub trait KvCache: Send + Sync + Clone {
    fn get(&self, key: &str) -> impl Future<Output = Option<serde_json::Value>> + Send;

    fn set(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Duration,
    ) -> impl Future<Output = ()> + Send;
}

/// Source of "now" for time-windowed logic.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Convenience constructor for the shared clock handle most components take.
pub fn system_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}

#[derive(Clone)]
struct Entry {
    value: serde_json::Value,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process [`KvCache`] backed by moka with per-entry expiry.
#[derive(Clone)]
pub struct MokaKvCache {
    inner: Cache<String, Entry>,
}

impl MokaKvCache {
    pub fn new(max_capacity: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();
        Self { inner }
    }
}

impl Default for MokaKvCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl KvCache for MokaKvCache {
    async fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.inner.get(key).await.map(|e| e.value)
    }

    async fn set(&self, key: &str, value: serde_json::Value, ttl: Duration) {
        self.inner.insert(key.to_string(), Entry { value, ttl }).await;
    }
}

/// A [`Fetcher`] wrapper caching successful responses by URL.
///
/// Keys are `html:<sha256(url)>`; errors are never cached.
#[derive(Clone)]
pub struct CachedFetcher<F, C> {
    inner: F,
    cache: C,
    ttl: Duration,
}

impl<F: Fetcher, C: KvCache> CachedFetcher<F, C> {
    pub fn new(inner: F, cache: C, ttl: Duration) -> Self {
        Self { inner, cache, ttl }
    }

    fn key(url: &str) -> String {
        format!("html:{}", compute_hash(url))
    }
}

impl<F: Fetcher, C: KvCache> Fetcher for CachedFetcher<F, C> {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        let key = Self::key(url);
        if let Some(serde_json::Value::String(html)) = self.cache.get(&key).await {
            tracing::debug!(%url, "HTML cache hit");
            return Ok(html);
        }
        let html = self.inner.fetch(url).await?;
        if !self.ttl.is_zero() {
            self.cache
                .set(&key, serde_json::Value::String(html.clone()), self.ttl)
                .await;
        }
        Ok(html)
    }
}
