use chrono::{DateTime, Utc};
use jobsift_core::error::AppError;
use jobsift_core::events::{EventStatus, NewEvent, PipelineEvent};
use jobsift_core::traits::EventSink;
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

/// Append-only pipeline events.
#[derive(Clone)]
pub struct EventRepository {
    pool: Pool<Postgres>,
}

impl EventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn record(&self, event: &NewEvent) -> Result<Uuid, AppError> {
        let row: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO pipeline_events (id, attempt_id, step, status, input, output, duration_ms, error)
            VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(event.attempt_id)
        .bind(&event.step)
        .bind(event.status.as_str())
        .bind(&event.input)
        .bind(&event.output)
        .bind(event.duration_ms as i64)
        .bind(&event.error)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.0)
    }

    pub async fn latest_for_step(&self, attempt_id: Uuid, step: &str) -> Result<Option<PipelineEvent>, AppError> {
        let row = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, attempt_id, step, status, input, output, duration_ms, error, created_at
            FROM pipeline_events
            WHERE attempt_id = $1 AND step = $2
            ORDER BY seq DESC
            LIMIT 1
            "#,
        )
        .bind(attempt_id)
        .bind(step)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    /// Events for an attempt in recording order.
    pub async fn list_for_attempt(&self, attempt_id: Uuid) -> Result<Vec<PipelineEvent>, AppError> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, attempt_id, step, status, input, output, duration_ms, error, created_at
            FROM pipeline_events
            WHERE attempt_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(attempt_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    attempt_id: Uuid,
    step: String,
    status: String,
    input: serde_json::Value,
    output: serde_json::Value,
    duration_ms: i64,
    error: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<EventRow> for PipelineEvent {
    fn from(row: EventRow) -> Self {
        PipelineEvent {
            id: row.id,
            attempt_id: row.attempt_id,
            step: row.step,
            status: row.status.parse().unwrap_or(EventStatus::Failed),
            input: row.input,
            output: row.output,
            duration_ms: row.duration_ms.max(0) as u64,
            error: row.error,
            created_at: row.created_at,
        }
    }
}

impl EventSink for EventRepository {
    async fn record(&self, event: &NewEvent) -> Result<(), AppError> {
        EventRepository::record(self, event).await.map(|_| ())
    }

    async fn latest_for_step(&self, attempt_id: Uuid, step: &str) -> Result<Option<PipelineEvent>, AppError> {
        EventRepository::latest_for_step(self, attempt_id, step).await
    }

    async fn list_for_attempt(&self, attempt_id: Uuid) -> Result<Vec<PipelineEvent>, AppError> {
        EventRepository::list_for_attempt(self, attempt_id).await
    }
}
