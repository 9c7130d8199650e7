use std::sync::Arc;

use anyhow::{Context, Result};

use jobsift_client::{
    BoardApiClient, BoardCleaner, OpenAiProvider, ReqwestFetcher, RobotsChecker, SelectorScraper,
    provider_chain_from_env,
};
use jobsift_core::memory::{
    MemoryApiCallLogger, MemoryAttemptStore, MemoryDirectory, MemoryEventSink, MemoryJobSink,
};
use jobsift_core::pipeline::Step;
use jobsift_core::pipeline::steps::{NoRenderer, standard_steps};
use jobsift_core::provider::{AiProvider, CappedSleep, ProviderRunner, RateLimitHook};
use jobsift_core::token_budget::TokenBudget;
use jobsift_core::traits::{ApiCallLogger, AttemptStore, CompanyDirectory, EventSink, JobSink};
use jobsift_core::{
    CachedFetcher, DomainRateLimiter, ExtractionService, MokaKvCache, PipelineConfig, PoliteFetcher,
    compute_hash, system_clock,
};
use jobsift_core::models::Target;
use jobsift_db::{
    ApiCallLogRepository, AttemptRepository, CompanyRepository, Database, EventRepository,
    JobPostingRepository,
};
use uuid::Uuid;

const CACHE_CAPACITY: u64 = 10_000;

/// Persistence collaborators of one run.
pub struct Stores<S, E, J, D, L> {
    pub attempts: S,
    pub events: E,
    pub sink: J,
    pub directory: D,
    pub api_log: L,
}

pub type MemoryStores =
    Stores<MemoryAttemptStore, MemoryEventSink, MemoryJobSink, MemoryDirectory, MemoryApiCallLogger>;

pub type PgStores = Stores<
    AttemptRepository,
    EventRepository,
    JobPostingRepository,
    CompanyRepository,
    ApiCallLogRepository,
>;

/// Throwaway stores for `--dry-run`.
pub fn memory_stores() -> MemoryStores {
    Stores {
        attempts: MemoryAttemptStore::new(),
        events: MemoryEventSink::new(),
        sink: MemoryJobSink::new(),
        directory: MemoryDirectory::new(),
        api_log: MemoryApiCallLogger::new(),
    }
}

pub fn pg_stores(db: &Database) -> PgStores {
    Stores {
        attempts: db.attempts(),
        events: db.events(),
        sink: db.postings(),
        directory: db.companies(),
        api_log: db.api_logs(),
    }
}

/// Wire the real collaborators into an [`ExtractionService`].
///
/// Static fetches go through the HTML cache first, then robots.txt and
/// per-domain spacing. Renders share the same robots cache and spacing.
pub async fn build_service<S, E, J, D, L>(
    stores: Stores<S, E, J, D, L>,
    config: &PipelineConfig,
) -> Result<ExtractionService<S, E, J, D>>
where
    S: AttemptStore,
    E: EventSink,
    J: JobSink,
    D: CompanyDirectory,
    L: ApiCallLogger + 'static,
{
    let clock = system_clock();
    let cache = MokaKvCache::new(CACHE_CAPACITY);

    let limiter = DomainRateLimiter::new(cache.clone(), clock.clone(), config.rate_limits.clone());
    let robots = RobotsChecker::new();
    let http = ReqwestFetcher::new().context("Failed to create HTTP client")?;
    let fetcher = CachedFetcher::new(
        PoliteFetcher::new(http, robots.clone(), limiter.clone()),
        cache.clone(),
        config.html_cache_ttl,
    );
    let cleaner = BoardCleaner::new().with_token_cap(config.max_prompt_tokens);
    let scraper = SelectorScraper::new();
    let board_api = BoardApiClient::new().context("Failed to create board API client")?;
    let providers = Arc::new(provider_runner(stores.api_log, cache, config)?);

    let steps: Vec<Box<dyn Step>> = match renderer(config).await? {
        #[cfg(feature = "browser")]
        Some(browser) => {
            let renderer = PoliteFetcher::new(browser, robots, limiter);
            standard_steps(fetcher, renderer, cleaner, scraper, board_api, providers, config)
        }
        #[cfg(not(feature = "browser"))]
        Some(never) => match never {},
        None => standard_steps(fetcher, NoRenderer, cleaner, scraper, board_api, providers, config),
    };

    Ok(ExtractionService::new(
        steps,
        stores.attempts,
        stores.events,
        stores.sink,
        stores.directory,
        clock,
        config,
    ))
}

#[cfg(feature = "browser")]
async fn renderer(config: &PipelineConfig) -> Result<Option<jobsift_client::BrowserFetcher>> {
    if !config.js_rendering_enabled {
        return Ok(None);
    }
    let browser = jobsift_client::BrowserFetcher::with_timeout(config.render_timeout)
        .await
        .context("Failed to launch headless browser")?;
    Ok(Some(browser))
}

#[cfg(not(feature = "browser"))]
async fn renderer(config: &PipelineConfig) -> Result<Option<std::convert::Infallible>> {
    if config.js_rendering_enabled {
        tracing::warn!("JS rendering requested but jobsift was built without the `browser` feature");
    }
    Ok(None)
}

/// Provider chain from `JOBSIFT_PROVIDER_CHAIN`, each metered provider
/// with its own token budget.
fn provider_runner<L: ApiCallLogger>(
    logger: L,
    cache: MokaKvCache,
    config: &PipelineConfig,
) -> Result<ProviderRunner<L, MokaKvCache>> {
    let clock = system_clock();
    let hook: Arc<dyn RateLimitHook> = Arc::new(CappedSleep {
        cap: config.rate_limit_sleep_cap,
    });
    let mut runner = ProviderRunner::new(logger, hook).with_budget_sleep_cap(config.rate_limit_sleep_cap);

    for settings in provider_chain_from_env()? {
        let budget = settings
            .tokens_per_minute
            .map(|tpm| TokenBudget::per_minute(cache.clone(), clock.clone(), settings.name.clone(), tpm));
        let provider = OpenAiProvider::new(settings)?;
        if !provider.is_configured() {
            tracing::warn!(provider = provider.name(), "Provider has no API key and will be skipped");
        }
        runner = runner.with_provider(Arc::new(provider), budget);
    }

    tracing::debug!(providers = ?runner.provider_names(), "Provider chain ready");
    Ok(runner)
}

/// A target for `url`. Without an explicit id the id is derived from the
/// URL, so repeated runs for the same URL share dedup state.
pub fn target_for(url: &str, id: Option<Uuid>) -> Result<Target> {
    let url = url.trim();
    let id = id.unwrap_or_else(|| stable_id(url));
    let target = Target::new(id, url);
    if target.domain().is_empty() {
        anyhow::bail!("Invalid target URL: {url}");
    }
    Ok(target)
}

fn stable_id(url: &str) -> Uuid {
    let hash = compute_hash(url);
    u128::from_str_radix(&hash[..32], 16)
        .map(Uuid::from_u128)
        .unwrap_or_else(|_| Uuid::new_v4())
}
