//! The default step implementations, in pipeline order.

use std::sync::Arc;

use crate::cache::KvCache;
use crate::config::PipelineConfig;
use crate::pipeline::Step;
use crate::provider::ProviderRunner;
use crate::traits::{ApiCallLogger, BoardApi, Cleaner, DomScraper, Fetcher};

mod ai_extract;
mod api_extract;
mod detect_job_board;
mod dom_scrape;
mod fetch_html;
mod rendered_fallback;
mod resolve_embed;
mod selectors_extract;

pub use ai_extract::AiExtract;
pub use api_extract::ApiExtract;
pub use detect_job_board::DetectJobBoard;
pub use dom_scrape::DomScrape;
pub use fetch_html::FetchHtml;
pub use rendered_fallback::{NoRenderer, RenderedFallback, is_js_heavy};
pub use resolve_embed::{ResolveEmbeddedJobBoard, find_embed};
pub use selectors_extract::SelectorsExtract;

pub const DETECT_JOB_BOARD: &str = "detect_job_board";
pub const HTML_FETCH: &str = "html_fetch";
pub const RESOLVE_EMBEDDED_JOB_BOARD: &str = "resolve_embedded_job_board";
pub const RENDERED_FALLBACK: &str = "rendered_fallback";
pub const DOM_SCRAPE: &str = "dom_scrape";
pub const SELECTORS_EXTRACT: &str = "selectors_extract";
pub const API_EXTRACT: &str = "api_extract";
pub const AI_EXTRACTION: &str = "ai_extraction";
/// Failed-step name used when a step raises an error instead of a signal.
pub const ORCHESTRATION: &str = "orchestration";

/// The full acquisition and extraction cascade.
///
/// `fetcher` serves both the static page and embedded boards; `renderer`
/// is only called for JS-heavy pages when rendering is enabled.
#[allow(clippy::too_many_arguments)]
pub fn standard_steps<F, R, C, D, B, L, K>(
    fetcher: F,
    renderer: R,
    cleaner: C,
    scraper: D,
    board_api: B,
    providers: Arc<ProviderRunner<L, K>>,
    config: &PipelineConfig,
) -> Vec<Box<dyn Step>>
where
    F: Fetcher + 'static,
    R: Fetcher + 'static,
    C: Cleaner + 'static,
    D: DomScraper + 'static,
    B: BoardApi + 'static,
    L: ApiCallLogger + 'static,
    K: KvCache + 'static,
{
    vec![
        Box::new(DetectJobBoard),
        Box::new(FetchHtml::new(fetcher.clone(), cleaner.clone())),
        Box::new(ResolveEmbeddedJobBoard::new(fetcher, cleaner.clone(), config.embed_min_text)),
        Box::new(RenderedFallback::new(renderer, cleaner, config)),
        Box::new(DomScrape::new(scraper.clone())),
        Box::new(SelectorsExtract::new(scraper)),
        Box::new(ApiExtract::new(board_api, config.confidence_threshold)),
        Box::new(AiExtract::new(
            providers,
            config.confidence_threshold,
            config.max_prompt_chars(),
        )),
    ]
}
