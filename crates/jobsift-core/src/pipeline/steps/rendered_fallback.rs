use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::config::PipelineConfig;
use crate::error::AppError;
use crate::models::FetchMode;
use crate::pipeline::steps::RENDERED_FALLBACK;
use crate::pipeline::{Context, Signal, Step};
use crate::traits::{Cleaner, Fetcher};

/// Markers of client-side rendered applications.
const SPA_MARKERS: &[&str] = &[
    "id=\"root\"",
    "id=\"app\"",
    "id=\"__next\"",
    "__NEXT_DATA__",
    "ng-app",
    "data-reactroot",
    "__INITIAL_STATE__",
    "enable javascript",
];

/// Whether a page looks like a JavaScript shell worth rendering.
///
/// True when the text is below `threshold` and either an SPA marker is
/// present or the text is shorter than `min_text`.
pub fn is_js_heavy(raw_html: &str, text_length: usize, threshold: usize, min_text: usize) -> bool {
    if text_length >= threshold {
        return false;
    }
    if text_length < min_text {
        return true;
    }
    let lowered = raw_html.to_lowercase();
    SPA_MARKERS
        .iter()
        .any(|marker| lowered.contains(&marker.to_lowercase()))
}

/// Renderer used when no headless browser is compiled in.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRenderer;

impl Fetcher for NoRenderer {
    async fn fetch(&self, _url: &str) -> Result<String, AppError> {
        Err(AppError::Generic("No renderer available".into()))
    }
}

/// Re-fetches JS-heavy pages through a headless browser.
///
/// Bounded by a hard wall-clock timeout around the whole render; any
/// render failure leaves the static HTML in place.
pub struct RenderedFallback<R, C> {
    renderer: R,
    cleaner: C,
    enabled: bool,
    hard_timeout: Duration,
    text_threshold: usize,
    min_text: usize,
    shell_threshold: usize,
}

impl<R: Fetcher, C: Cleaner> RenderedFallback<R, C> {
    pub fn new(renderer: R, cleaner: C, config: &PipelineConfig) -> Self {
        Self {
            renderer,
            cleaner,
            enabled: config.js_rendering_enabled,
            hard_timeout: config.render_hard_timeout,
            text_threshold: config.js_heavy_text_threshold,
            min_text: config.js_heavy_min_text,
            shell_threshold: config.shell_text_threshold,
        }
    }

    fn keep_static(ctx: &mut Context, original: usize, error: String) -> Signal {
        ctx.events.error(error);
        ctx.events.output(json!({
            "rendered": false,
            "original_text_length": original,
        }));
        Signal::Continue
    }
}

#[async_trait]
impl<R: Fetcher + 'static, C: Cleaner + 'static> Step for RenderedFallback<R, C> {
    fn name(&self) -> &'static str {
        RENDERED_FALLBACK
    }

    async fn call(&self, ctx: &mut Context) -> Result<Signal, AppError> {
        let original = ctx.text_length();
        if !self.enabled {
            ctx.events.skipped("js rendering disabled");
            ctx.events.output(json!({ "rendered": false, "original_text_length": original }));
            return Ok(Signal::Continue);
        }
        if !is_js_heavy(ctx.raw_html(), original, self.text_threshold, self.min_text) {
            ctx.events.skipped("page is not js-heavy");
            ctx.events.output(json!({ "rendered": false, "original_text_length": original }));
            return Ok(Signal::Continue);
        }

        ctx.events.input(json!({
            "url": ctx.target.url,
            "original_text_length": original,
            "hard_timeout_secs": self.hard_timeout.as_secs(),
        }));
        tracing::info!(url = %ctx.target.url, text_length = original, "Page looks JS-heavy, rendering");

        let raw = match tokio::time::timeout(self.hard_timeout, self.renderer.fetch(&ctx.target.url)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                tracing::warn!(url = %ctx.target.url, error = %e, "Render failed, keeping static HTML");
                return Ok(Self::keep_static(ctx, original, e.to_string()));
            }
            Err(_) => {
                let e = AppError::Timeout(self.hard_timeout.as_secs());
                tracing::warn!(url = %ctx.target.url, error = %e, "Render hit hard timeout, keeping static HTML");
                return Ok(Self::keep_static(ctx, original, e.to_string()));
            }
        };

        let cleaned = match self.cleaner.clean_for(&raw, ctx.board.board) {
            Ok(cleaned) => cleaned,
            Err(e) => return Ok(Self::keep_static(ctx, original, e.to_string())),
        };

        ctx.set_html(raw, cleaned, FetchMode::Rendered);
        let text_length = ctx.text_length();
        let shell = text_length < self.shell_threshold;
        if shell {
            tracing::info!(url = %ctx.target.url, text_length, "Rendered page is still a shell");
        }
        ctx.events.output(json!({
            "rendered": true,
            "text_length": text_length,
            "original_text_length": original,
            "shell": shell,
        }));
        Ok(Signal::Continue)
    }
}
