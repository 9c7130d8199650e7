use async_trait::async_trait;

use crate::error::AppError;
use crate::pipeline::Context;

/// Control signal returned by every step.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Continue,
    /// `ctx.result` holds the accepted extraction.
    StopSuccess,
    StopFailure { step: String, message: String },
}

impl Signal {
    pub fn failure(step: &str, message: impl Into<String>) -> Self {
        Signal::StopFailure {
            step: step.to_string(),
            message: message.into(),
        }
    }
}

/// One stage of the pipeline.
///
/// Expected outcomes are signals. An `Err` is an orchestration bug: the
/// runner records it, fails the attempt and returns the error.
#[async_trait]
pub trait Step: Send + Sync {
    /// Stable name used for events and `failed_step`.
    fn name(&self) -> &'static str;

    async fn call(&self, ctx: &mut Context) -> Result<Signal, AppError>;
}
