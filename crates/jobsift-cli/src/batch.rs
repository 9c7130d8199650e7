use std::io;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use jobsift_core::classifier::Routing;
use jobsift_core::models::Target;
use jobsift_core::traits::{AttemptStore, CompanyDirectory, EventSink, JobSink};
use jobsift_core::{AppError, ExtractOutcome, ExtractionService};

use crate::app::target_for;

/// One row of the batch input CSV. `target_id` is optional.
#[derive(Debug, Deserialize)]
struct TargetRecord {
    url: String,
    #[serde(default)]
    target_id: Option<Uuid>,
}

/// Summary of one target, printed by `extract` and written by `batch`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeRow {
    pub url: String,
    pub target_id: Uuid,
    pub attempt_id: Option<Uuid>,
    pub outcome: &'static str,
    pub method: Option<String>,
    pub confidence: Option<f64>,
    pub failed_step: Option<String>,
    pub message: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl OutcomeRow {
    fn base(target: &Target, outcome: &'static str) -> Self {
        Self {
            url: target.url.clone(),
            target_id: target.id,
            attempt_id: None,
            outcome,
            method: None,
            confidence: None,
            failed_step: None,
            message: None,
            next_retry_at: None,
        }
    }

    pub fn from_outcome(target: &Target, outcome: &ExtractOutcome) -> Self {
        let mut row = match outcome {
            ExtractOutcome::Completed {
                method,
                confidence,
                changed_fields,
                ..
            } => {
                let mut row = Self::base(target, "completed");
                row.method = Some(method.to_string());
                row.confidence = Some(*confidence);
                if !changed_fields.is_empty() {
                    row.message = Some(format!("changed: {}", changed_fields.join(" ")));
                }
                row
            }
            ExtractOutcome::Skipped { .. } => Self::base(target, "skipped"),
            ExtractOutcome::InFlight { .. } => Self::base(target, "in_flight"),
            ExtractOutcome::Failed {
                step,
                message,
                routing,
                ..
            } => {
                let mut row = Self::base(target, "failed");
                row.failed_step = Some(step.clone());
                row.message = Some(message.clone());
                match routing {
                    Routing::Retry { next_at } => row.next_retry_at = Some(*next_at),
                    Routing::DeadLetter { .. } => row.outcome = "dead_letter",
                }
                row
            }
        };
        row.attempt_id = Some(outcome.attempt_id());
        row
    }

    pub fn error(target: &Target, error: &AppError) -> Self {
        let mut row = Self::base(target, "error");
        row.message = Some(error.to_string());
        row
    }

    pub fn cancelled(target: &Target) -> Self {
        Self::base(target, "cancelled")
    }
}

/// Targets from a CSV with a `url` column and an optional `target_id` column.
pub fn read_targets<R: io::Read>(reader: R) -> Result<Vec<Target>> {
    let mut csv = csv::Reader::from_reader(reader);
    let mut targets = Vec::new();
    for (line, record) in csv.deserialize::<TargetRecord>().enumerate() {
        let record = record.with_context(|| format!("Invalid target row {}", line + 1))?;
        if record.url.trim().is_empty() {
            continue;
        }
        targets.push(target_for(&record.url, record.target_id)?);
    }
    Ok(targets)
}

/// Extract every target with at most `concurrency` runs in flight.
///
/// Once `cancel` fires, targets not yet started are reported as cancelled;
/// runs already in flight finish so no attempt is abandoned mid-step.
pub async fn run_batch<S, E, J, D>(
    service: &ExtractionService<S, E, J, D>,
    targets: Vec<Target>,
    concurrency: usize,
    force: bool,
    cancel: CancellationToken,
) -> Vec<OutcomeRow>
where
    S: AttemptStore,
    E: EventSink,
    J: JobSink,
    D: CompanyDirectory,
{
    let total = targets.len();
    let rows: Vec<OutcomeRow> = futures::stream::iter(targets)
        .map(|target| {
            let cancel = cancel.clone();
            async move {
                if cancel.is_cancelled() {
                    return OutcomeRow::cancelled(&target);
                }
                match service.extract_with_outcome(&target, force).await {
                    Ok(outcome) => OutcomeRow::from_outcome(&target, &outcome),
                    Err(e) => {
                        tracing::error!(url = %target.url, error = %e, "Extraction errored");
                        OutcomeRow::error(&target, &e)
                    }
                }
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let succeeded = rows
        .iter()
        .filter(|r| matches!(r.outcome, "completed" | "skipped"))
        .count();
    tracing::info!(total, succeeded, "Batch finished");
    rows
}

pub fn write_summary<W: io::Write>(rows: &[OutcomeRow], writer: W) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    for row in rows {
        csv.serialize(row)?;
    }
    csv.flush()?;
    Ok(())
}
