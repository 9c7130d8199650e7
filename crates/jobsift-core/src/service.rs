//! The extraction entry point.
//!
//! [`ExtractionService`] acquires an attempt (dedup), runs the step
//! pipeline, writes accepted results to the sink and routes failures to
//! retry or dead-letter.

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use crate::attempt::{Attempt, AttemptStatus, RetryConfig};
use crate::board::BoardType;
use crate::cache::Clock;
use crate::classifier::{FailureClassifier, Routing};
use crate::config::PipelineConfig;
use crate::error::AppError;
use crate::lifecycle::{Acquired, AttemptLifecycle, Completion};
use crate::merge::AppliedUpdate;
use crate::models::{ExtractionMethod, ExtractionResult, Target, compute_hash};
use crate::pipeline::{Context, PipelineOutcome, Runner, Step};
use crate::resolver::EntityResolver;
use crate::traits::{AttemptStore, CompanyDirectory, EventSink, JobSink};

/// Failed-step name used when the sink rejects an accepted result.
pub const PERSIST_STEP: &str = "persist";

/// What one trigger did.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractOutcome {
    Completed {
        attempt_id: Uuid,
        method: ExtractionMethod,
        confidence: f64,
        changed_fields: Vec<String>,
    },
    /// A completion inside the dedup window already satisfies the target.
    Skipped { attempt_id: Uuid },
    /// Another run is driving a recent attempt for the target.
    InFlight { attempt_id: Uuid },
    Failed {
        attempt_id: Uuid,
        step: String,
        message: String,
        routing: Routing,
    },
}

impl ExtractOutcome {
    pub fn attempt_id(&self) -> Uuid {
        match self {
            ExtractOutcome::Completed { attempt_id, .. }
            | ExtractOutcome::Skipped { attempt_id }
            | ExtractOutcome::InFlight { attempt_id }
            | ExtractOutcome::Failed { attempt_id, .. } => *attempt_id,
        }
    }

    /// True for completed and already-satisfied targets.
    pub fn succeeded(&self) -> bool {
        matches!(
            self,
            ExtractOutcome::Completed { .. } | ExtractOutcome::Skipped { .. }
        )
    }
}

/// Operator actions on an attempt, dispatched by variant.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptAction {
    /// `failed -> retrying -> fetching` on the same attempt.
    Retry,
    MarkManual { note: String },
    DeadLetter { reason: String },
    /// Fresh attempt for the same target, bypassing dedup.
    ForceReextract,
}

pub struct ExtractionService<S, E, J, D> {
    runner: Runner<S, E>,
    lifecycle: AttemptLifecycle<S>,
    classifier: FailureClassifier<E>,
    events: E,
    sink: J,
    resolver: EntityResolver<D>,
    retry: RetryConfig,
    clock: Arc<dyn Clock>,
}

impl<S, E, J, D> ExtractionService<S, E, J, D>
where
    S: AttemptStore,
    E: EventSink,
    J: JobSink,
    D: CompanyDirectory,
{
    pub fn new(
        steps: Vec<Box<dyn Step>>,
        store: S,
        events: E,
        sink: J,
        directory: D,
        clock: Arc<dyn Clock>,
        config: &PipelineConfig,
    ) -> Self {
        let lifecycle = AttemptLifecycle::new(store, clock.clone(), config.dedup_window_delta());
        Self {
            runner: Runner::new(steps, lifecycle.clone(), events.clone()),
            lifecycle,
            classifier: FailureClassifier::new(events.clone()),
            events,
            sink,
            resolver: EntityResolver::new(directory),
            retry: config.retry.clone(),
            clock,
        }
    }

    pub fn lifecycle(&self) -> &AttemptLifecycle<S> {
        &self.lifecycle
    }

    pub fn events(&self) -> &E {
        &self.events
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.runner.step_names()
    }

    /// Extract `target`. True when the target ends up satisfied.
    pub async fn extract(&self, target: &Target) -> Result<bool, AppError> {
        Ok(self.extract_with_outcome(target, false).await?.succeeded())
    }

    /// Extract `target`, reporting what happened. `force` bypasses dedup.
    pub async fn extract_with_outcome(&self, target: &Target, force: bool) -> Result<ExtractOutcome, AppError> {
        let attempt = match self.lifecycle.create_or_reuse(target, force).await? {
            Acquired::Skip { completed } => {
                return Ok(ExtractOutcome::Skipped {
                    attempt_id: completed.id,
                });
            }
            Acquired::Reused(attempt) => {
                return Ok(ExtractOutcome::InFlight {
                    attempt_id: attempt.id,
                });
            }
            Acquired::Created(attempt) => attempt,
        };
        self.drive(target.clone(), attempt).await
    }

    /// Re-run a failed attempt in place.
    pub async fn retry(&self, attempt_id: Uuid) -> Result<ExtractOutcome, AppError> {
        let mut attempt = self.lifecycle.get(attempt_id).await?;
        self.lifecycle.mark_retrying(&mut attempt).await?;
        tracing::info!(attempt_id = %attempt.id, retry_count = attempt.retry_count, "Retrying attempt");
        let target = Target::new(attempt.target_id, attempt.url.clone());
        self.drive(target, attempt).await
    }

    /// Failed attempts whose scheduled retry time has passed, earliest due first.
    pub async fn due_retries(&self, limit: usize) -> Result<Vec<Attempt>, AppError> {
        self.lifecycle
            .store()
            .list_due(self.clock.now(), limit)
            .await
    }

    /// Retry every due attempt. Per-attempt errors are logged and skipped.
    pub async fn run_due_retries(&self, limit: usize) -> Result<Vec<ExtractOutcome>, AppError> {
        let mut outcomes = Vec::new();
        for attempt in self.due_retries(limit).await? {
            match self.retry(attempt.id).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    tracing::error!(attempt_id = %attempt.id, error = %e, "Retry failed");
                }
            }
        }
        Ok(outcomes)
    }

    /// Apply an operator action and return the affected attempt.
    pub async fn apply_action(&self, attempt_id: Uuid, action: AttemptAction) -> Result<Attempt, AppError> {
        match action {
            AttemptAction::Retry => {
                let outcome = self.retry(attempt_id).await?;
                self.lifecycle.get(outcome.attempt_id()).await
            }
            AttemptAction::MarkManual { note } => {
                let mut attempt = self.lifecycle.get(attempt_id).await?;
                self.lifecycle.override_manual(&mut attempt, &note).await?;
                Ok(attempt)
            }
            AttemptAction::DeadLetter { reason } => {
                let mut attempt = self.lifecycle.get(attempt_id).await?;
                self.lifecycle.dead_letter(&mut attempt, &reason).await?;
                Ok(attempt)
            }
            AttemptAction::ForceReextract => {
                let previous = self.lifecycle.get(attempt_id).await?;
                let target = Target::new(previous.target_id, previous.url.clone());
                let outcome = self.extract_with_outcome(&target, true).await?;
                self.lifecycle.get(outcome.attempt_id()).await
            }
        }
    }

    /// Run the pipeline for an attempt this trigger owns.
    ///
    /// `fetching` is persisted before any step runs, so a concurrent
    /// trigger sees the attempt as in flight for the whole run.
    async fn drive(&self, target: Target, mut attempt: Attempt) -> Result<ExtractOutcome, AppError> {
        self.lifecycle
            .advance(&mut attempt, AttemptStatus::Fetching)
            .await?;
        let mut ctx = Context::new(target, attempt, self.clock.clone());
        match self.runner.run(&mut ctx).await {
            Ok(PipelineOutcome::Accepted) => self.finish(&mut ctx).await,
            Ok(PipelineOutcome::Failed { step, message }) => {
                self.route_failure(ctx.attempt, step, message).await
            }
            Err(e) => {
                if ctx.attempt.status == AttemptStatus::Failed
                    && let Err(route_err) = self.route(&mut ctx.attempt).await
                {
                    tracing::error!(attempt_id = %ctx.attempt.id, error = %route_err, "Could not route failed attempt");
                }
                Err(e)
            }
        }
    }

    async fn finish(&self, ctx: &mut Context) -> Result<ExtractOutcome, AppError> {
        let Some(result) = ctx.result.take() else {
            return Err(AppError::Generic("Pipeline accepted without a result".into()));
        };

        let (company_id, job_role_id) = self.resolve_entities(ctx, &result).await;
        let data_hash = compute_hash(&serde_json::to_string(&result)?);
        let update = AppliedUpdate {
            attempt_id: ctx.attempt.id,
            method: result.provenance.method,
            provider: result.provenance.provider.clone(),
            model: result.provenance.model.clone(),
            confidence: result.confidence,
            data_hash: data_hash.clone(),
            company_id,
            job_role_id,
        };

        let changed_fields = match self.sink.apply_extracted(&ctx.target, &result, &update).await {
            Ok(changed) => changed,
            Err(e) => {
                tracing::error!(attempt_id = %ctx.attempt.id, error = %e, "Failed to persist extraction");
                let message = e.to_string();
                self.lifecycle
                    .fail(&mut ctx.attempt, PERSIST_STEP, &message)
                    .await?;
                let attempt = ctx.attempt.clone();
                return self
                    .route_failure(attempt, PERSIST_STEP.to_string(), message)
                    .await;
            }
        };

        self.lifecycle
            .complete(
                &mut ctx.attempt,
                Completion {
                    method: result.provenance.method,
                    provider: result.provenance.provider.clone(),
                    model: result.provenance.model.clone(),
                    confidence: result.confidence,
                    tokens: ctx.tokens_used,
                    metadata: json!({
                        "data_hash": data_hash,
                        "fetch_mode": ctx.fetch_mode.as_str(),
                        "board": ctx.board.board.as_str(),
                        "company_slug": ctx.board.company_slug,
                        "api_log_id": ctx.api_log_id,
                        "changed_fields": changed_fields,
                        "company_id": company_id,
                        "job_role_id": job_role_id,
                    }),
                },
            )
            .await?;

        Ok(ExtractOutcome::Completed {
            attempt_id: ctx.attempt.id,
            method: result.provenance.method,
            confidence: result.confidence,
            changed_fields,
        })
    }

    /// Find or create the company and role; failures only cost the links.
    async fn resolve_entities(&self, ctx: &Context, result: &ExtractionResult) -> (Option<Uuid>, Option<Uuid>) {
        let company_id = match (ctx.target.company_id, result.company.as_deref()) {
            (Some(id), _) => Some(id),
            (None, Some(name)) if !name.trim().is_empty() => {
                let domain = (ctx.board.board == BoardType::Unknown).then(|| ctx.target.domain());
                match self.resolver.resolve_company(name, domain.as_deref()).await {
                    Ok(company) => Some(company.id),
                    Err(e) => {
                        tracing::warn!(attempt_id = %ctx.attempt.id, company = name, error = %e, "Company resolution failed");
                        None
                    }
                }
            }
            _ => None,
        };

        let job_role_id = match (ctx.target.job_role_id, company_id) {
            (Some(id), _) => Some(id),
            (None, Some(company_id)) => {
                let title = result.job_role.as_deref().or(result.title.as_deref());
                match title.filter(|t| !t.trim().is_empty()) {
                    Some(title) => match self.resolver.resolve_role(company_id, title).await {
                        Ok(role) => Some(role.id),
                        Err(e) => {
                            tracing::warn!(attempt_id = %ctx.attempt.id, role = title, error = %e, "Job role resolution failed");
                            None
                        }
                    },
                    None => None,
                }
            }
            (None, None) => None,
        };

        (company_id, job_role_id)
    }

    async fn route_failure(&self, mut attempt: Attempt, step: String, message: String) -> Result<ExtractOutcome, AppError> {
        let routing = self.route(&mut attempt).await?;
        Ok(ExtractOutcome::Failed {
            attempt_id: attempt.id,
            step,
            message,
            routing,
        })
    }

    async fn route(&self, attempt: &mut Attempt) -> Result<Routing, AppError> {
        let routing = self.classifier.route(attempt, &self.retry, self.clock.now()).await;
        match &routing {
            Routing::Retry { next_at } => {
                self.lifecycle.schedule_retry(attempt, *next_at).await?;
                tracing::info!(attempt_id = %attempt.id, next_retry_at = %next_at, "Retry scheduled");
            }
            Routing::DeadLetter { reason } => {
                self.lifecycle.dead_letter(attempt, reason).await?;
            }
        }
        Ok(routing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::TimeDelta;

    use crate::attempt::NewAttempt;
    use crate::memory::{MemoryAttemptStore, MemoryDirectory, MemoryEventSink, MemoryJobSink};
    use crate::models::Provenance;
    use crate::pipeline::steps::{HTML_FETCH, NoRenderer, standard_steps};
    use crate::provider::{CappedSleep, ProviderRunner, RateLimitHook};
    use crate::testutil::{
        FakeClock, MemoryCache, MockApiCallLogger, MockBoardApi, MockCleaner, MockDomScraper,
        MockFetcher, MockProvider,
    };
    use crate::traits::AttemptStore;

    type Service = ExtractionService<MemoryAttemptStore, MemoryEventSink, MemoryJobSink, MemoryDirectory>;

    struct Harness {
        service: Service,
        clock: FakeClock,
        store: MemoryAttemptStore,
        sink: MemoryJobSink,
        directory: MemoryDirectory,
    }

    const GREENHOUSE_URL: &str = "https://boards.greenhouse.io/acme/jobs/55";
    const PAGE: &str = "<html><body><h1>Rust Engineer</h1><p>Build data pipelines.</p></body></html>";

    fn api_posting() -> ExtractionResult {
        let mut result = ExtractionResult::empty(Provenance::api("greenhouse"));
        result.title = Some("Rust Engineer".into());
        result.company = Some("Acme".into());
        result.location = Some("Remote".into());
        result.confidence = 0.9;
        result
    }

    fn harness(fetcher: MockFetcher, api: MockBoardApi, providers: Vec<MockProvider>) -> Harness {
        let clock = FakeClock::new();
        let config = PipelineConfig::default();
        let hook: Arc<dyn RateLimitHook> = Arc::new(CappedSleep { cap: Duration::ZERO });
        let runner = providers.into_iter().fold(
            ProviderRunner::<_, MemoryCache>::new(MockApiCallLogger::new(), hook),
            |r, p| r.with_provider(Arc::new(p), None),
        );
        let steps = standard_steps(
            fetcher,
            NoRenderer,
            MockCleaner::passthrough(),
            MockDomScraper::default(),
            api,
            Arc::new(runner),
            &config,
        );
        let store = MemoryAttemptStore::new();
        let sink = MemoryJobSink::new();
        let directory = MemoryDirectory::new();
        let service = ExtractionService::new(
            steps,
            store.clone(),
            MemoryEventSink::new(),
            sink.clone(),
            directory.clone(),
            Arc::new(clock.clone()),
            &config,
        );
        Harness {
            service,
            clock,
            store,
            sink,
            directory,
        }
    }

    fn target(url: &str) -> Target {
        Target::new(Uuid::new_v4(), url)
    }

    #[tokio::test]
    async fn api_result_completes_attempt_and_fills_sink() {
        let h = harness(
            MockFetcher::new(PAGE),
            MockBoardApi::returning(Some(api_posting())),
            vec![],
        );
        let target = target(GREENHOUSE_URL);

        let outcome = h.service.extract_with_outcome(&target, false).await.unwrap();
        let ExtractOutcome::Completed {
            attempt_id,
            method,
            changed_fields,
            ..
        } = outcome
        else {
            panic!("expected completion, got {outcome:?}");
        };
        assert_eq!(method, ExtractionMethod::Api);
        assert!(changed_fields.contains(&"title".to_string()));

        let attempt = h.store.get(attempt_id).await.unwrap().unwrap();
        assert_eq!(attempt.status, AttemptStatus::Completed);
        assert_eq!(attempt.provider.as_deref(), Some("greenhouse"));
        assert_eq!(attempt.response_metadata["data_hash"].as_str().unwrap().len(), 64);
        assert_eq!(attempt.response_metadata["board"], "greenhouse");

        let posting = h.sink.posting(target.id).unwrap();
        assert_eq!(posting.title.as_deref(), Some("Rust Engineer"));
        assert!(posting.company_id.is_some());
        assert_eq!(h.directory.company_count(), 1);
        assert_eq!(h.directory.role_count(), 1);
    }

    #[tokio::test]
    async fn repeat_trigger_within_window_is_skipped() {
        let h = harness(
            MockFetcher::new(PAGE),
            MockBoardApi::returning(Some(api_posting())),
            vec![],
        );
        let target = target(GREENHOUSE_URL);

        assert!(h.service.extract(&target).await.unwrap());
        h.clock.advance(TimeDelta::seconds(30));
        let again = h.service.extract_with_outcome(&target, false).await.unwrap();
        assert!(matches!(again, ExtractOutcome::Skipped { .. }));
        assert!(again.succeeded());
        assert_eq!(h.store.len(), 1);
    }

    #[tokio::test]
    async fn recent_in_flight_attempt_is_not_rerun() {
        let fetcher = MockFetcher::new(PAGE);
        let h = harness(fetcher.clone(), MockBoardApi::returning(None), vec![]);
        let target = target(GREENHOUSE_URL);

        let mut running = NewAttempt::for_target(&target).into_attempt(h.clock.now());
        running.advance_to(AttemptStatus::Fetching, h.clock.now()).unwrap();
        h.store.insert(&running).await.unwrap();

        let outcome = h.service.extract_with_outcome(&target, false).await.unwrap();
        assert_eq!(outcome, ExtractOutcome::InFlight { attempt_id: running.id });
        assert!(!h.service.extract(&target).await.unwrap());
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn overlapping_triggers_run_the_pipeline_once() {
        let fetcher = MockFetcher::new(PAGE).with_delay(Duration::from_millis(50));
        let api = MockBoardApi::returning(Some(api_posting()));
        let h = harness(fetcher.clone(), api.clone(), vec![]);
        let target = target(GREENHOUSE_URL);

        let (first, second) = tokio::join!(
            h.service.extract_with_outcome(&target, false),
            h.service.extract_with_outcome(&target, false),
        );
        let (first, second) = (first.unwrap(), second.unwrap());

        assert!(matches!(first, ExtractOutcome::Completed { .. }));
        assert_eq!(second, ExtractOutcome::InFlight { attempt_id: first.attempt_id() });
        assert_eq!(fetcher.call_count(), 1);
        assert_eq!(api.call_count(), 1);
        assert_eq!(h.store.len(), 1);

        let stored = h.store.get(first.attempt_id()).await.unwrap().unwrap();
        assert_eq!(stored.status, AttemptStatus::Completed);
    }

    #[tokio::test]
    async fn reused_pending_attempt_is_left_to_its_owner() {
        let fetcher = MockFetcher::new(PAGE);
        let h = harness(fetcher.clone(), MockBoardApi::returning(None), vec![]);
        let target = target(GREENHOUSE_URL);

        let pending = NewAttempt::for_target(&target).into_attempt(h.clock.now());
        h.store.insert(&pending).await.unwrap();

        let outcome = h.service.extract_with_outcome(&target, false).await.unwrap();
        assert_eq!(outcome, ExtractOutcome::InFlight { attempt_id: pending.id });
        assert_eq!(fetcher.call_count(), 0);
        let stored = h.store.get(pending.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AttemptStatus::Pending);
    }

    #[tokio::test]
    async fn due_retry_is_found_behind_unscheduled_failures() {
        let h = harness(MockFetcher::new(PAGE), MockBoardApi::returning(None), vec![]);

        for n in 0..3 {
            let mut stuck = NewAttempt::for_target(&target(&format!("https://acme.com/jobs/{n}")))
                .into_attempt(h.clock.now());
            stuck.transition(AttemptStatus::Failed, h.clock.now()).unwrap();
            h.store.insert(&stuck).await.unwrap();
        }

        h.clock.advance(TimeDelta::minutes(10));
        let mut due = NewAttempt::for_target(&target(GREENHOUSE_URL)).into_attempt(h.clock.now());
        due.transition(AttemptStatus::Failed, h.clock.now()).unwrap();
        due.next_retry_at = Some(h.clock.now() - TimeDelta::minutes(1));
        h.store.insert(&due).await.unwrap();

        let found = h.service.due_retries(3).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, due.id);
    }

    #[tokio::test]
    async fn low_confidence_is_dead_lettered() {
        let h = harness(
            MockFetcher::new(PAGE),
            MockBoardApi::returning(None),
            vec![MockProvider::replying(
                "openai",
                r#"{"title": "Careers", "confidence": 0.3}"#,
            )],
        );
        let target = target("https://acme.com/careers/rust");

        let outcome = h.service.extract_with_outcome(&target, false).await.unwrap();
        match &outcome {
            ExtractOutcome::Failed {
                step,
                message,
                routing,
                ..
            } => {
                assert_eq!(step, "ai_extraction");
                assert_eq!(message, "Low confidence: 0.30");
                assert!(matches!(routing, Routing::DeadLetter { .. }));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        let attempt = h.store.get(outcome.attempt_id()).await.unwrap().unwrap();
        assert_eq!(attempt.status, AttemptStatus::DeadLetter);
        assert!(h.sink.posting(target.id).is_none());
    }

    #[tokio::test]
    async fn transient_fetch_failure_is_retried_in_place() {
        let h = harness(
            MockFetcher::with_responses(vec![
                Err(AppError::HttpStatus {
                    status: 503,
                    url: GREENHOUSE_URL.into(),
                }),
                Ok(PAGE.into()),
            ]),
            MockBoardApi::returning(Some(api_posting())),
            vec![],
        );
        let target = target(GREENHOUSE_URL);

        let first = h.service.extract_with_outcome(&target, false).await.unwrap();
        let ExtractOutcome::Failed { attempt_id, step, routing, .. } = first else {
            panic!("expected failure, got {first:?}");
        };
        assert_eq!(step, HTML_FETCH);
        assert!(matches!(routing, Routing::Retry { .. }));

        let failed = h.store.get(attempt_id).await.unwrap().unwrap();
        assert_eq!(failed.status, AttemptStatus::Failed);
        assert!(failed.next_retry_at.is_some());
        assert!(h.service.due_retries(10).await.unwrap().is_empty());

        h.clock.advance(TimeDelta::minutes(2));
        let due = h.service.due_retries(10).await.unwrap();
        assert_eq!(due.len(), 1);

        let outcomes = h.service.run_due_retries(10).await.unwrap();
        assert!(matches!(outcomes[0], ExtractOutcome::Completed { .. }));
        let retried = h.store.get(attempt_id).await.unwrap().unwrap();
        assert_eq!(retried.status, AttemptStatus::Completed);
        assert_eq!(retried.retry_count, 1);
        assert_eq!(h.store.len(), 1);
    }

    #[tokio::test]
    async fn removed_listing_is_terminal() {
        let h = harness(
            MockFetcher::with_error(AppError::HttpStatus {
                status: 404,
                url: GREENHOUSE_URL.into(),
            }),
            MockBoardApi::returning(None),
            vec![],
        );
        let outcome = h.service.extract_with_outcome(&target(GREENHOUSE_URL), false).await.unwrap();
        assert!(matches!(
            outcome,
            ExtractOutcome::Failed {
                routing: Routing::DeadLetter { .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn operator_actions_dispatch_by_variant() {
        let h = harness(
            MockFetcher::with_error(AppError::NetworkError("reset".into())),
            MockBoardApi::returning(None),
            vec![],
        );
        let target = target(GREENHOUSE_URL);
        let failed = h.service.extract_with_outcome(&target, false).await.unwrap();

        let manual = h
            .service
            .apply_action(failed.attempt_id(), AttemptAction::MarkManual { note: "checked by hand".into() })
            .await
            .unwrap();
        assert_eq!(manual.status, AttemptStatus::Manual);
        assert_eq!(manual.response_metadata["manual_note"], "checked by hand");

        let err = h
            .service
            .apply_action(Uuid::new_v4(), AttemptAction::Retry)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AttemptNotFound(_)));
    }

    #[tokio::test]
    async fn force_reextract_creates_a_new_attempt() {
        let h = harness(
            MockFetcher::with_responses(vec![Ok(PAGE.into()), Ok(PAGE.into())]),
            MockBoardApi::with_responses(vec![Ok(Some(api_posting())), Ok(Some(api_posting()))]),
            vec![],
        );
        let target = target(GREENHOUSE_URL);
        let first = h.service.extract_with_outcome(&target, false).await.unwrap();

        let forced = h
            .service
            .apply_action(first.attempt_id(), AttemptAction::ForceReextract)
            .await
            .unwrap();
        assert_ne!(forced.id, first.attempt_id());
        assert_eq!(forced.status, AttemptStatus::Completed);
        assert_eq!(h.store.len(), 2);
    }
}
