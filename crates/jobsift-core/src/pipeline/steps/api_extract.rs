use async_trait::async_trait;
use serde_json::json;

use crate::attempt::AttemptStatus;
use crate::error::AppError;
use crate::pipeline::steps::API_EXTRACT;
use crate::pipeline::{Context, Signal, Step};
use crate::traits::BoardApi;

/// Structured board API lookup, accepted at or above `threshold`.
///
/// API failures are non-fatal; the pipeline falls through to AI extraction.
pub struct ApiExtract<B> {
    api: B,
    threshold: f64,
}

impl<B: BoardApi> ApiExtract<B> {
    pub fn new(api: B, threshold: f64) -> Self {
        Self { api, threshold }
    }
}

#[async_trait]
impl<B: BoardApi + 'static> Step for ApiExtract<B> {
    fn name(&self) -> &'static str {
        API_EXTRACT
    }

    async fn call(&self, ctx: &mut Context) -> Result<Signal, AppError> {
        if !ctx.board.api_ready() {
            ctx.events.skipped(format!("no api for board {}", ctx.board.board));
            return Ok(Signal::Continue);
        }
        ctx.advance_attempt(AttemptStatus::Extracting)?;
        ctx.events.input(json!({
            "board": ctx.board.board.as_str(),
            "company_slug": ctx.board.company_slug,
            "job_id": ctx.board.job_id,
        }));

        let result = match self.api.fetch_posting(&ctx.board).await {
            Ok(Some(result)) => result,
            Ok(None) => {
                ctx.events.output(json!({ "found": false }));
                return Ok(Signal::Continue);
            }
            Err(e) => {
                tracing::warn!(url = %ctx.target.url, board = %ctx.board.board, error = %e, "Board API failed");
                ctx.events.error(e.to_string());
                ctx.events.output(json!({ "found": false }));
                return Ok(Signal::Continue);
            }
        };

        let confidence = result.confidence;
        ctx.note_confidence(confidence);
        if confidence < self.threshold {
            tracing::info!(url = %ctx.target.url, confidence, "Board API result below threshold");
            ctx.events.output(json!({
                "found": true,
                "accepted": false,
                "confidence": confidence,
            }));
            return Ok(Signal::Continue);
        }

        let prefilled = ctx.accept(result);
        ctx.events.output(json!({
            "found": true,
            "accepted": true,
            "confidence": confidence,
            "prefilled": prefilled,
        }));
        Ok(Signal::StopSuccess)
    }
}
