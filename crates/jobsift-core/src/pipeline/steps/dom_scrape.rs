use async_trait::async_trait;
use serde_json::json;

use crate::error::AppError;
use crate::pipeline::steps::DOM_SCRAPE;
use crate::pipeline::{Context, Signal, Step};
use crate::traits::DomScraper;

/// Board-independent DOM hints (JSON-LD, OpenGraph, headings).
///
/// Only feeds `ctx.scraped`; never accepts a result on its own.
pub struct DomScrape<D> {
    scraper: D,
}

impl<D: DomScraper> DomScrape<D> {
    pub fn new(scraper: D) -> Self {
        Self { scraper }
    }
}

#[async_trait]
impl<D: DomScraper + 'static> Step for DomScrape<D> {
    fn name(&self) -> &'static str {
        DOM_SCRAPE
    }

    async fn call(&self, ctx: &mut Context) -> Result<Signal, AppError> {
        if ctx.raw_html().is_empty() {
            ctx.events.skipped("no html");
            return Ok(Signal::Continue);
        }
        let found = self.scraper.scrape_generic(ctx.raw_html());
        let fields = found.field_names();
        ctx.scraped.merge_missing(found);
        ctx.events.output(json!({ "fields": fields }));
        Ok(Signal::Continue)
    }
}
