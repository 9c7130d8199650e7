use async_trait::async_trait;
use serde_json::json;

use crate::board::BoardType;
use crate::error::AppError;
use crate::pipeline::steps::SELECTORS_EXTRACT;
use crate::pipeline::{Context, Signal, Step};
use crate::traits::DomScraper;

/// Per-board CSS selector scrape.
///
/// Selector hits are more precise than the generic hints, so they take
/// precedence in `ctx.scraped`. Still pre-fill only: this step never
/// stops the pipeline.
pub struct SelectorsExtract<D> {
    scraper: D,
}

impl<D: DomScraper> SelectorsExtract<D> {
    pub fn new(scraper: D) -> Self {
        Self { scraper }
    }
}

#[async_trait]
impl<D: DomScraper + 'static> Step for SelectorsExtract<D> {
    fn name(&self) -> &'static str {
        SELECTORS_EXTRACT
    }

    async fn call(&self, ctx: &mut Context) -> Result<Signal, AppError> {
        let board = ctx.board.board;
        if board == BoardType::Unknown {
            ctx.events.skipped("no selectors for unknown board");
            return Ok(Signal::Continue);
        }
        if ctx.raw_html().is_empty() {
            ctx.events.skipped("no html");
            return Ok(Signal::Continue);
        }
        ctx.events.input(json!({ "board": board.as_str() }));

        let mut found = self.scraper.scrape_board(ctx.raw_html(), board);
        let fields = found.field_names();
        found.merge_missing(std::mem::take(&mut ctx.scraped));
        ctx.scraped = found;

        tracing::debug!(url = %ctx.target.url, board = %board, ?fields, "Selector scrape");
        ctx.events.output(json!({ "fields": fields }));
        Ok(Signal::Continue)
    }
}
