use std::time::Instant;

use serde_json::{Value, json};

use crate::classifier::low_confidence_message;
use crate::error::AppError;
use crate::events::{EventStatus, NewEvent, StepReport};
use crate::lifecycle::AttemptLifecycle;
use crate::pipeline::steps::{AI_EXTRACTION, ORCHESTRATION};
use crate::pipeline::{Context, Signal, Step};
use crate::traits::{AttemptStore, EventSink};

/// How a run ended. Bugs surface as `Err` from [`Runner::run`].
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// A step accepted a result; `ctx.result` is set and the attempt is
    /// still open for the caller to complete.
    Accepted,
    /// The attempt was marked failed at `step`.
    Failed { step: String, message: String },
}

pub struct Runner<S, E> {
    steps: Vec<Box<dyn Step>>,
    lifecycle: AttemptLifecycle<S>,
    events: E,
}

impl<S: AttemptStore, E: EventSink> Runner<S, E> {
    pub fn new(steps: Vec<Box<dyn Step>>, lifecycle: AttemptLifecycle<S>, events: E) -> Self {
        Self {
            steps,
            lifecycle,
            events,
        }
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Execute the steps in order, stopping at the first stop signal.
    pub async fn run(&self, ctx: &mut Context) -> Result<PipelineOutcome, AppError> {
        for step in &self.steps {
            let name = step.name();
            tracing::debug!(attempt_id = %ctx.attempt.id, step = name, "Running step");
            let started = Instant::now();
            let result = step.call(ctx).await;
            let duration_ms = started.elapsed().as_millis() as u64;
            let report = ctx.events.take();

            let signal = match result {
                Ok(signal) => signal,
                Err(e) => return Err(self.orchestration_failure(ctx, name, e, report, duration_ms).await),
            };

            self.record(event_for(ctx, name, &signal, report, duration_ms)).await;

            if ctx.take_attempt_dirty()
                && let Err(e) = self.lifecycle.save(&ctx.attempt).await
            {
                return Err(self
                    .orchestration_failure(ctx, name, e, StepReport::default(), 0)
                    .await);
            }

            match signal {
                Signal::Continue => {}
                Signal::StopSuccess => {
                    if ctx.result.is_none() {
                        let e = AppError::Generic(format!("Step {name} stopped with success but set no result"));
                        return Err(self
                            .orchestration_failure(ctx, name, e, StepReport::default(), 0)
                            .await);
                    }
                    tracing::info!(attempt_id = %ctx.attempt.id, step = name, "Pipeline accepted a result");
                    return Ok(PipelineOutcome::Accepted);
                }
                Signal::StopFailure { step, message } => {
                    self.lifecycle.fail(&mut ctx.attempt, &step, &message).await?;
                    return Ok(PipelineOutcome::Failed { step, message });
                }
            }
        }

        let message = low_confidence_message(ctx.best_confidence.unwrap_or(0.0));
        self.lifecycle
            .fail(&mut ctx.attempt, AI_EXTRACTION, &message)
            .await?;
        Ok(PipelineOutcome::Failed {
            step: AI_EXTRACTION.to_string(),
            message,
        })
    }

    async fn orchestration_failure(
        &self,
        ctx: &mut Context,
        step: &str,
        error: AppError,
        report: StepReport,
        duration_ms: u64,
    ) -> AppError {
        tracing::error!(attempt_id = %ctx.attempt.id, step, error = %error, "Pipeline step raised an error");
        self.record(NewEvent {
            attempt_id: ctx.attempt.id,
            step: ORCHESTRATION.to_string(),
            status: EventStatus::Failed,
            input: report.input.unwrap_or_else(|| json!({ "step": step })),
            output: json!({ "step": step }),
            duration_ms,
            error: Some(error.to_string()),
        })
        .await;

        if !ctx.attempt.status.is_terminal()
            && let Err(e) = self
                .lifecycle
                .fail(&mut ctx.attempt, ORCHESTRATION, &error.to_string())
                .await
        {
            tracing::error!(attempt_id = %ctx.attempt.id, error = %e, "Could not mark attempt failed");
        }
        error
    }

    async fn record(&self, event: NewEvent) {
        if let Err(e) = self.events.record(&event).await {
            tracing::warn!(attempt_id = %event.attempt_id, step = %event.step, error = %e, "Failed to record event");
        }
    }
}

fn event_for(
    ctx: &Context,
    step: &str,
    signal: &Signal,
    report: StepReport,
    duration_ms: u64,
) -> NewEvent {
    let mut output = report.output.unwrap_or_else(|| json!({}));
    let (status, error) = match signal {
        Signal::StopFailure { message, .. } => (EventStatus::Failed, Some(message.clone())),
        _ if report.skipped.is_some() => {
            if let (Value::Object(map), Some(reason)) = (&mut output, &report.skipped) {
                map.insert("skip_reason".into(), json!(reason));
            }
            (EventStatus::Skipped, report.error)
        }
        _ => (EventStatus::Success, report.error),
    };
    NewEvent {
        attempt_id: ctx.attempt.id,
        step: step.to_string(),
        status,
        input: report.input.unwrap_or_else(|| json!({})),
        output,
        duration_ms,
        error,
    }
}
