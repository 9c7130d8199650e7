use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use jobsift_core::traits::{ApiCallLogger, AttemptStore, CompanyDirectory, EventSink, JobSink};
use jobsift_core::{AttemptAction, AttemptStatus, BoardMatch, ExtractionService, PipelineConfig};
use jobsift_db::{Database, DatabaseConfig};

mod app;
mod batch;

use app::{Stores, build_service, memory_stores, pg_stores, target_for};
use batch::{OutcomeRow, read_targets, run_batch, write_summary};

#[derive(Parser)]
#[command(name = "jobsift", version, about = "Job posting extraction pipeline")]
struct Cli {
    /// Use in-memory stores instead of PostgreSQL
    #[arg(long, global = true, default_value_t = false)]
    dry_run: bool,

    /// Enable the headless-browser fallback for JS-heavy pages
    #[arg(long, global = true, default_value_t = false)]
    js: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract one job posting
    Extract {
        #[arg(short, long)]
        url: String,

        /// Target id (derived from the URL when omitted)
        #[arg(long)]
        target_id: Option<Uuid>,

        /// Start a fresh attempt even inside the dedup window
        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// Extract every target of a CSV file (`url[,target_id]`)
    Batch {
        #[arg(short, long)]
        input: PathBuf,

        /// Summary CSV path (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(short, long, default_value_t = 4, env = "JOBSIFT_CONCURRENCY")]
        concurrency: usize,

        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// Classify a URL's job board without fetching it
    Detect {
        #[arg(short, long)]
        url: String,
    },

    /// List attempts for a target or in a status
    Attempts {
        #[arg(short, long, conflicts_with = "status")]
        url: Option<String>,

        #[arg(long, conflicts_with = "status")]
        target_id: Option<Uuid>,

        #[arg(short, long, value_parser = parse_status)]
        status: Option<AttemptStatus>,

        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        /// Print each attempt's pipeline events
        #[arg(long, default_value_t = false)]
        events: bool,
    },

    /// Apply an operator action to an attempt
    Action {
        attempt_id: Uuid,

        #[command(subcommand)]
        action: ActionCommand,
    },

    /// Re-run failed attempts whose retry time has come
    RetryDue {
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum ActionCommand {
    /// Re-drive a failed attempt
    Retry,
    /// Hand the attempt to a human
    Manual {
        #[arg(short, long)]
        note: String,
    },
    /// Stop retrying the attempt
    DeadLetter {
        #[arg(short, long)]
        reason: String,
    },
    /// Start a fresh attempt for the same target
    Reextract,
}

impl From<ActionCommand> for AttemptAction {
    fn from(command: ActionCommand) -> Self {
        match command {
            ActionCommand::Retry => AttemptAction::Retry,
            ActionCommand::Manual { note } => AttemptAction::MarkManual { note },
            ActionCommand::DeadLetter { reason } => AttemptAction::DeadLetter { reason },
            ActionCommand::Reextract => AttemptAction::ForceReextract,
        }
    }
}

fn parse_status(raw: &str) -> Result<AttemptStatus, String> {
    raw.parse()
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("jobsift=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Detect { url } = &cli.command {
        let board = BoardMatch::from_url(url);
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "board": board.board.as_str(),
                "company_slug": board.company_slug,
                "job_id": board.job_id,
                "api_ready": board.api_ready(),
            }))?
        );
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = PipelineConfig::from_env()?;
    if cli.js {
        config = config.with_js_rendering(true);
    }

    if cli.dry_run {
        tracing::info!("Dry run: attempts and results are kept in memory only");
        run(cli.command, memory_stores(), &config).await
    } else {
        let db = Database::connect(&DatabaseConfig::from_env()?)
            .await
            .context("Failed to connect to database")?;
        db.migrate().await?;
        run(cli.command, pg_stores(&db), &config).await
    }
}

async fn run<S, E, J, D, L>(
    command: Commands,
    stores: Stores<S, E, J, D, L>,
    config: &PipelineConfig,
) -> Result<ExitCode>
where
    S: AttemptStore,
    E: EventSink,
    J: JobSink,
    D: CompanyDirectory,
    L: ApiCallLogger + 'static,
{
    let service = build_service(stores, config).await?;

    match command {
        Commands::Extract {
            url,
            target_id,
            force,
        } => {
            let target = target_for(&url, target_id)?;
            tracing::info!(url = %target.url, target_id = %target.id, "Extracting");
            let outcome = service.extract_with_outcome(&target, force).await?;
            let row = OutcomeRow::from_outcome(&target, &outcome);
            println!("{}", serde_json::to_string_pretty(&row)?);
            Ok(exit_code(outcome.succeeded()))
        }
        Commands::Batch {
            input,
            output,
            concurrency,
            force,
        } => {
            let file = std::fs::File::open(&input)
                .with_context(|| format!("Failed to open {}", input.display()))?;
            let targets = read_targets(file)?;
            tracing::info!(targets = targets.len(), concurrency, "Starting batch");

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted, finishing in-flight targets");
                    on_interrupt.cancel();
                }
            });

            let rows = run_batch(&service, targets, concurrency, force, cancel).await;
            match output {
                Some(path) => {
                    let file = std::fs::File::create(&path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    write_summary(&rows, file)?;
                }
                None => write_summary(&rows, std::io::stdout().lock())?,
            }
            let all_ok = rows
                .iter()
                .all(|r| matches!(r.outcome, "completed" | "skipped"));
            Ok(exit_code(all_ok))
        }
        Commands::Attempts {
            url,
            target_id,
            status,
            limit,
            events,
        } => {
            cmd_attempts(&service, url, target_id, status, limit, events).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Action { attempt_id, action } => {
            let attempt = service.apply_action(attempt_id, action.into()).await?;
            println!("{}", serde_json::to_string_pretty(&attempt)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::RetryDue { limit } => {
            let outcomes = service.run_due_retries(limit).await?;
            let succeeded = outcomes.iter().filter(|o| o.succeeded()).count();
            println!("Retried {} attempts, {} succeeded", outcomes.len(), succeeded);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Detect { .. } => Ok(ExitCode::SUCCESS),
    }
}

async fn cmd_attempts<S, E, J, D>(
    service: &ExtractionService<S, E, J, D>,
    url: Option<String>,
    target_id: Option<Uuid>,
    status: Option<AttemptStatus>,
    limit: usize,
    show_events: bool,
) -> Result<()>
where
    S: AttemptStore,
    E: EventSink,
    J: JobSink,
    D: CompanyDirectory,
{
    let store = service.lifecycle().store();
    let attempts = match (status, target_id, url) {
        (Some(status), _, _) => store.list_by_status(status, limit).await?,
        (None, Some(id), _) => store.list_for_target(id, limit).await?,
        (None, None, Some(url)) => {
            let target = target_for(&url, None)?;
            store.list_for_target(target.id, limit).await?
        }
        (None, None, None) => anyhow::bail!("Pass --url, --target-id or --status"),
    };

    if attempts.is_empty() {
        println!("No attempts found");
        return Ok(());
    }

    for attempt in &attempts {
        let detail = match attempt.status {
            AttemptStatus::Completed => format!(
                "{} conf={:.2}",
                attempt
                    .extraction_method
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "-".into()),
                attempt.confidence_score.unwrap_or_default()
            ),
            _ => match (&attempt.failed_step, &attempt.error_message) {
                (Some(step), Some(message)) => format!("{step}: {message}"),
                _ => String::new(),
            },
        };
        println!(
            "  [{}] {} {} retries={} {}",
            attempt.status,
            attempt.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            attempt.id,
            attempt.retry_count,
            detail,
        );

        if show_events {
            for event in service.events().list_for_attempt(attempt.id).await? {
                println!(
                    "      {:<28} {:<8} {:>6}ms {}",
                    event.step,
                    event.status.as_str(),
                    event.duration_ms,
                    event.error.unwrap_or_default()
                );
            }
        }
    }

    println!("\nTotal: {} attempts", attempts.len());
    Ok(())
}

fn exit_code(ok: bool) -> ExitCode {
    if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}
