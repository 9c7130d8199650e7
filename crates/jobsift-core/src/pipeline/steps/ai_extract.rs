use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::attempt::AttemptStatus;
use crate::cache::KvCache;
use crate::error::AppError;
use crate::models::Provenance;
use crate::pipeline::steps::AI_EXTRACTION;
use crate::pipeline::{Context, Signal, Step};
use crate::prompt::{build_prompt, parse_extraction};
use crate::provider::{ProviderRunner, RunOutcome};
use crate::traits::ApiCallLogger;

const OPERATION: &str = "job_extraction";

/// Last-resort extraction through the AI provider chain.
///
/// Accepts the first reply whose confidence reaches `threshold`. When
/// replies parsed but none cleared the bar the step continues, leaving the
/// runner to fail the attempt with the best confidence seen. When no
/// provider produced a usable reply at all the attempt fails here.
pub struct AiExtract<L, C> {
    runner: Arc<ProviderRunner<L, C>>,
    threshold: f64,
    max_prompt_chars: usize,
}

impl<L: ApiCallLogger, C: KvCache> AiExtract<L, C> {
    pub fn new(runner: Arc<ProviderRunner<L, C>>, threshold: f64, max_prompt_chars: usize) -> Self {
        Self {
            runner,
            threshold,
            max_prompt_chars,
        }
    }
}

#[async_trait]
impl<L: ApiCallLogger + 'static, C: KvCache + 'static> Step for AiExtract<L, C> {
    fn name(&self) -> &'static str {
        AI_EXTRACTION
    }

    async fn call(&self, ctx: &mut Context) -> Result<Signal, AppError> {
        ctx.advance_attempt(AttemptStatus::Extracting)?;
        if self.runner.is_empty() {
            return Ok(Signal::failure(AI_EXTRACTION, "No AI providers configured"));
        }
        if ctx.text_length() == 0 {
            ctx.events.skipped("no page content");
            return Ok(Signal::Continue);
        }

        let prompt = build_prompt(ctx.cleaned(), &ctx.target.url, ctx.board.board, self.max_prompt_chars);
        ctx.events.input(json!({
            "prompt_version": prompt.version,
            "estimated_tokens": prompt.estimated_tokens,
            "providers": self.runner.provider_names(),
            "fetch_mode": ctx.fetch_mode.as_str(),
        }));

        let threshold = self.threshold;
        let outcome = self
            .runner
            .run(&prompt, Some(ctx.attempt.id), OPERATION, |reply| {
                parse_extraction(reply, "", threshold)
            })
            .await;

        match outcome {
            RunOutcome::Accepted {
                mut data,
                provider,
                model,
                log_id,
                tokens,
            } => {
                data.provenance = Provenance::ai(provider.clone(), model.clone());
                let confidence = data.confidence;
                ctx.tokens_used = tokens;
                ctx.api_log_id = Some(log_id);
                let prefilled = ctx.accept(data);
                ctx.events.output(json!({
                    "accepted": true,
                    "provider": provider,
                    "model": model,
                    "confidence": confidence,
                    "api_log_id": log_id,
                    "prefilled": prefilled,
                }));
                Ok(Signal::StopSuccess)
            }
            RunOutcome::Exhausted {
                best_confidence: Some(best),
                errors,
            } => {
                ctx.note_confidence(best);
                ctx.events.output(json!({
                    "accepted": false,
                    "best_confidence": best,
                    "errors": errors,
                }));
                Ok(Signal::Continue)
            }
            RunOutcome::Exhausted {
                best_confidence: None,
                errors,
            } => {
                ctx.events.output(json!({ "accepted": false, "errors": errors }));
                Ok(Signal::failure(
                    AI_EXTRACTION,
                    format!("All AI providers failed: {}", errors.join("; ")),
                ))
            }
        }
    }
}
