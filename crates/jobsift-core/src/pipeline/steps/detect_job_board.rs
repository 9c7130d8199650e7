use async_trait::async_trait;
use serde_json::json;

use crate::board::BoardMatch;
use crate::error::AppError;
use crate::pipeline::steps::DETECT_JOB_BOARD;
use crate::pipeline::{Context, Signal, Step};

/// Classifies the target URL. Pure, never stops the pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetectJobBoard;

#[async_trait]
impl Step for DetectJobBoard {
    fn name(&self) -> &'static str {
        DETECT_JOB_BOARD
    }

    async fn call(&self, ctx: &mut Context) -> Result<Signal, AppError> {
        ctx.events.input(json!({ "url": ctx.target.url }));
        ctx.board = BoardMatch::from_url(&ctx.target.url);
        ctx.events.output(json!({
            "board": ctx.board.board.as_str(),
            "company_slug": ctx.board.company_slug,
            "job_id": ctx.board.job_id,
            "api_supported": ctx.board.api_ready(),
        }));
        Ok(Signal::Continue)
    }
}
