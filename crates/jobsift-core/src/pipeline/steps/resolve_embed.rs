use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;

use crate::board::{BoardMatch, BoardType};
use crate::error::AppError;
use crate::models::FetchMode;
use crate::pipeline::steps::RESOLVE_EMBEDDED_JOB_BOARD;
use crate::pipeline::{Context, Signal, Step};
use crate::traits::{Cleaner, Fetcher};

static EMBED_SLUG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?:boards|job-boards)(?:\.eu)?\.greenhouse\.io/embed/job_(?:board|app)(?:/js)?\?(?:[^'"\s]*&(?:amp;)?)?for=([A-Za-z0-9_-]+)"#,
    )
    .unwrap()
});
static FOR_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]for=([A-Za-z0-9_-]+)").unwrap());
static GH_JID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"gh_jid=(\d+)").unwrap());
static EMBED_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"greenhouse\.io/embed/job_app\?[^'"\s]*token=(\d+)"#).unwrap()
});

/// A job board embedded in a marketing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedBoard {
    pub company_slug: String,
    pub job_id: String,
    pub url: String,
}

fn first_capture(re: &Regex, haystacks: &[&str]) -> Option<String> {
    haystacks
        .iter()
        .find_map(|h| re.captures(h).map(|c| c[1].to_string()))
}

/// Find Greenhouse embed markers (`for=` slug and `gh_jid`) in the page or its URL.
pub fn find_embed(page_url: &str, html: &str) -> Option<EmbeddedBoard> {
    let company_slug = first_capture(&EMBED_SLUG, &[html])
        .or_else(|| first_capture(&FOR_PARAM, &[page_url]))?;
    let job_id = first_capture(&GH_JID, &[page_url, html])
        .or_else(|| first_capture(&EMBED_TOKEN, &[html]))?;
    let url = format!(
        "https://boards.greenhouse.io/embed/job_app?for={company_slug}&token={job_id}"
    );
    Some(EmbeddedBoard {
        company_slug,
        job_id,
        url,
    })
}

/// Replaces a marketing shell with the embedded board's content.
///
/// The embed only replaces the working HTML when its cleaned text reaches
/// `min_text_length`; fetch errors are non-fatal.
pub struct ResolveEmbeddedJobBoard<F, C> {
    fetcher: F,
    cleaner: C,
    min_text_length: usize,
}

impl<F: Fetcher, C: Cleaner> ResolveEmbeddedJobBoard<F, C> {
    pub fn new(fetcher: F, cleaner: C, min_text_length: usize) -> Self {
        Self {
            fetcher,
            cleaner,
            min_text_length,
        }
    }
}

#[async_trait]
impl<F: Fetcher + 'static, C: Cleaner + 'static> Step for ResolveEmbeddedJobBoard<F, C> {
    fn name(&self) -> &'static str {
        RESOLVE_EMBEDDED_JOB_BOARD
    }

    async fn call(&self, ctx: &mut Context) -> Result<Signal, AppError> {
        if ctx.board.board == BoardType::Greenhouse && ctx.board.company_slug.is_some() {
            ctx.events.skipped("already on the job board");
            return Ok(Signal::Continue);
        }
        let Some(embed) = find_embed(&ctx.target.url, ctx.raw_html()) else {
            ctx.events.skipped("no embed markers");
            return Ok(Signal::Continue);
        };
        ctx.events.input(json!({
            "embed_url": embed.url,
            "company_slug": embed.company_slug,
            "job_id": embed.job_id,
        }));

        let raw = match self.fetcher.fetch(&embed.url).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::info!(embed_url = %embed.url, error = %e, "Embed fetch failed, keeping page HTML");
                ctx.events.error(e.to_string());
                ctx.events.output(json!({ "replaced": false }));
                return Ok(Signal::Continue);
            }
        };
        let cleaned = match self.cleaner.clean_for(&raw, BoardType::Greenhouse) {
            Ok(cleaned) => cleaned,
            Err(e) => {
                ctx.events.error(e.to_string());
                ctx.events.output(json!({ "replaced": false }));
                return Ok(Signal::Continue);
            }
        };

        let text_length = cleaned.trim().chars().count();
        let replaced = text_length >= self.min_text_length;
        if replaced {
            ctx.set_html(raw, cleaned, FetchMode::Embed);
            ctx.board = BoardMatch {
                board: BoardType::Greenhouse,
                company_slug: Some(embed.company_slug),
                job_id: Some(embed.job_id),
            };
            tracing::info!(url = %ctx.target.url, text_length, "Replaced page with embedded board content");
        }
        ctx.events.output(json!({
            "replaced": replaced,
            "text_length": text_length,
            "board": ctx.board.board.as_str(),
        }));
        Ok(Signal::Continue)
    }
}
