pub mod board_api;
#[cfg(feature = "browser")]
pub mod browser_fetcher;
pub mod cleaner;
pub mod fetcher;
pub mod llm;
pub mod robots;
pub mod scrape;

pub use board_api::{BoardApiClient, BoardApiEndpoints};
#[cfg(feature = "browser")]
pub use browser_fetcher::BrowserFetcher;
pub use cleaner::BoardCleaner;
pub use fetcher::ReqwestFetcher;
pub use llm::{OpenAiProvider, ProviderSettings, provider_chain_from_env, provider_chain_from_lookup};
pub use robots::RobotsChecker;
pub use scrape::SelectorScraper;
