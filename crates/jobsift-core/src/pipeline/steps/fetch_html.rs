use async_trait::async_trait;
use serde_json::json;

use crate::attempt::AttemptStatus;
use crate::error::AppError;
use crate::models::FetchMode;
use crate::pipeline::steps::HTML_FETCH;
use crate::pipeline::{Context, Signal, Step};
use crate::traits::{Cleaner, Fetcher};

/// Static fetch of the target page. Any failure stops the pipeline.
pub struct FetchHtml<F, C> {
    fetcher: F,
    cleaner: C,
}

impl<F: Fetcher, C: Cleaner> FetchHtml<F, C> {
    pub fn new(fetcher: F, cleaner: C) -> Self {
        Self { fetcher, cleaner }
    }
}

#[async_trait]
impl<F: Fetcher + 'static, C: Cleaner + 'static> Step for FetchHtml<F, C> {
    fn name(&self) -> &'static str {
        HTML_FETCH
    }

    async fn call(&self, ctx: &mut Context) -> Result<Signal, AppError> {
        ctx.advance_attempt(AttemptStatus::Fetching)?;
        ctx.events.input(json!({ "url": ctx.target.url }));

        let raw = match self.fetcher.fetch(&ctx.target.url).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(url = %ctx.target.url, error = %e, "Static fetch failed");
                return Ok(Signal::failure(HTML_FETCH, e.to_string()));
            }
        };

        let cleaned = match self.cleaner.clean_for(&raw, ctx.board.board) {
            Ok(cleaned) => cleaned,
            Err(e) => return Ok(Signal::failure(HTML_FETCH, e.to_string())),
        };

        let bytes = raw.len();
        ctx.set_html(raw, cleaned, FetchMode::Static);
        ctx.events.output(json!({
            "bytes": bytes,
            "cleaned_length": ctx.text_length(),
            "fetch_mode": FetchMode::Static.as_str(),
        }));
        Ok(Signal::Continue)
    }
}
