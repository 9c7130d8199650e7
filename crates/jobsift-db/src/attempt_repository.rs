use chrono::{DateTime, Utc};
use jobsift_core::attempt::{Attempt, AttemptStatus};
use jobsift_core::error::AppError;
use jobsift_core::traits::AttemptStore;
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

const ATTEMPT_COLUMNS: &str = "id, target_id, url, domain, status, failed_step, error_message, \
     extraction_method, provider, model, confidence_score, tokens_used, duration_ms, \
     response_metadata, retry_count, next_retry_at, created_at, updated_at, started_at, completed_at";

/// Extraction attempts in PostgreSQL.
#[derive(Clone)]
pub struct AttemptRepository {
    pool: Pool<Postgres>,
}

impl AttemptRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, attempt: &Attempt) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO extraction_attempts (
                id, target_id, url, domain, status, failed_step, error_message,
                extraction_method, provider, model, confidence_score, tokens_used, duration_ms,
                response_metadata, retry_count, next_retry_at, created_at, updated_at,
                started_at, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            "#,
        )
        .bind(attempt.id)
        .bind(attempt.target_id)
        .bind(&attempt.url)
        .bind(&attempt.domain)
        .bind(attempt.status.as_str())
        .bind(&attempt.failed_step)
        .bind(&attempt.error_message)
        .bind(attempt.extraction_method.map(|m| m.as_str()))
        .bind(&attempt.provider)
        .bind(&attempt.model)
        .bind(attempt.confidence_score)
        .bind(attempt.tokens_used.map(|t| t as i32))
        .bind(attempt.duration_ms.map(|d| d as i64))
        .bind(&attempt.response_metadata)
        .bind(attempt.retry_count as i32)
        .bind(attempt.next_retry_at)
        .bind(attempt.created_at)
        .bind(attempt.updated_at)
        .bind(attempt.started_at)
        .bind(attempt.completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    /// Overwrite the mutable columns of an existing attempt.
    pub async fn update(&self, attempt: &Attempt) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE extraction_attempts
            SET status = $2,
                failed_step = $3,
                error_message = $4,
                extraction_method = $5,
                provider = $6,
                model = $7,
                confidence_score = $8,
                tokens_used = $9,
                duration_ms = $10,
                response_metadata = $11,
                retry_count = $12,
                next_retry_at = $13,
                updated_at = $14,
                started_at = $15,
                completed_at = $16
            WHERE id = $1
            "#,
        )
        .bind(attempt.id)
        .bind(attempt.status.as_str())
        .bind(&attempt.failed_step)
        .bind(&attempt.error_message)
        .bind(attempt.extraction_method.map(|m| m.as_str()))
        .bind(&attempt.provider)
        .bind(&attempt.model)
        .bind(attempt.confidence_score)
        .bind(attempt.tokens_used.map(|t| t as i32))
        .bind(attempt.duration_ms.map(|d| d as i64))
        .bind(&attempt.response_metadata)
        .bind(attempt.retry_count as i32)
        .bind(attempt.next_retry_at)
        .bind(attempt.updated_at)
        .bind(attempt.started_at)
        .bind(attempt.completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AppError::AttemptNotFound(attempt.id));
        }
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Attempt>, AppError> {
        let row = sqlx::query_as::<_, AttemptRow>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM extraction_attempts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    /// Attempts for a target, newest first.
    pub async fn list_for_target(&self, target_id: Uuid, limit: usize) -> Result<Vec<Attempt>, AppError> {
        let rows = sqlx::query_as::<_, AttemptRow>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM extraction_attempts \
             WHERE target_id = $1 ORDER BY created_at DESC LIMIT $2"
        ))
        .bind(target_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Attempts in `status`, oldest first.
    pub async fn list_by_status(&self, status: AttemptStatus, limit: usize) -> Result<Vec<Attempt>, AppError> {
        let rows = sqlx::query_as::<_, AttemptRow>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM extraction_attempts \
             WHERE status = $1 ORDER BY created_at ASC LIMIT $2"
        ))
        .bind(status.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Failed attempts whose retry time has passed, soonest first.
    pub async fn list_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Attempt>, AppError> {
        let rows = sqlx::query_as::<_, AttemptRow>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM extraction_attempts \
             WHERE status = 'failed' AND next_retry_at IS NOT NULL AND next_retry_at <= $1 \
             ORDER BY next_retry_at ASC LIMIT $2"
        ))
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Attempt counts per status.
    pub async fn count_by_status(&self) -> Result<Vec<(AttemptStatus, i64)>, AppError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM extraction_attempts GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows
            .into_iter()
            .filter_map(|(status, count)| status.parse().ok().map(|s| (s, count)))
            .collect())
    }
}

#[derive(sqlx::FromRow)]
struct AttemptRow {
    id: Uuid,
    target_id: Uuid,
    url: String,
    domain: String,
    status: String,
    failed_step: Option<String>,
    error_message: Option<String>,
    extraction_method: Option<String>,
    provider: Option<String>,
    model: Option<String>,
    confidence_score: Option<f64>,
    tokens_used: Option<i32>,
    duration_ms: Option<i64>,
    response_metadata: serde_json::Value,
    retry_count: i32,
    next_retry_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl From<AttemptRow> for Attempt {
    fn from(row: AttemptRow) -> Self {
        Attempt {
            id: row.id,
            target_id: row.target_id,
            url: row.url,
            domain: row.domain,
            status: row.status.parse().unwrap_or(AttemptStatus::Failed),
            failed_step: row.failed_step,
            error_message: row.error_message,
            extraction_method: row.extraction_method.and_then(|m| m.parse().ok()),
            provider: row.provider,
            model: row.model,
            confidence_score: row.confidence_score,
            tokens_used: row.tokens_used.map(|t| t.max(0) as u32),
            duration_ms: row.duration_ms.map(|d| d.max(0) as u64),
            response_metadata: row.response_metadata,
            retry_count: row.retry_count.max(0) as u32,
            next_retry_at: row.next_retry_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        }
    }
}

impl AttemptStore for AttemptRepository {
    async fn insert(&self, attempt: &Attempt) -> Result<(), AppError> {
        AttemptRepository::insert(self, attempt).await
    }

    async fn update(&self, attempt: &Attempt) -> Result<(), AppError> {
        AttemptRepository::update(self, attempt).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Attempt>, AppError> {
        AttemptRepository::get(self, id).await
    }

    async fn list_for_target(&self, target_id: Uuid, limit: usize) -> Result<Vec<Attempt>, AppError> {
        AttemptRepository::list_for_target(self, target_id, limit).await
    }

    async fn list_by_status(&self, status: AttemptStatus, limit: usize) -> Result<Vec<Attempt>, AppError> {
        AttemptRepository::list_by_status(self, status, limit).await
    }

    async fn list_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Attempt>, AppError> {
        AttemptRepository::list_due(self, now, limit).await
    }
}
