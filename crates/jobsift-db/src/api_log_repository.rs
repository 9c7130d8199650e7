use chrono::{DateTime, Utc};
use jobsift_core::api_log::{ApiCallStatus, NewApiCallLog};
use jobsift_core::error::AppError;
use jobsift_core::traits::ApiCallLogger;
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

/// AI provider call log.
#[derive(Clone)]
pub struct ApiCallLogRepository {
    pool: Pool<Postgres>,
}

/// Aggregated usage for one provider/model pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderUsage {
    pub provider: String,
    pub model: String,
    pub calls: i64,
    pub failures: i64,
    pub tokens_in: i64,
    pub tokens_out: i64,
}

impl ApiCallLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn log(&self, entry: &NewApiCallLog) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO api_call_logs (
                id, attempt_id, provider, model, operation, status, tokens_in, tokens_out,
                latency_ms, request_payload, response_payload, confidence, error_class,
                error_message, metadata, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(entry.id)
        .bind(entry.attempt_id)
        .bind(&entry.provider)
        .bind(&entry.model)
        .bind(&entry.operation)
        .bind(entry.status.as_str())
        .bind(entry.tokens_in.map(|t| t as i32))
        .bind(entry.tokens_out.map(|t| t as i32))
        .bind(entry.latency_ms as i64)
        .bind(&entry.request_payload)
        .bind(&entry.response_payload)
        .bind(entry.confidence)
        .bind(&entry.error_class)
        .bind(&entry.error_message)
        .bind(&entry.metadata)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    pub async fn list_for_attempt(&self, attempt_id: Uuid) -> Result<Vec<NewApiCallLog>, AppError> {
        let rows = sqlx::query_as::<_, ApiCallLogRow>(
            r#"
            SELECT id, attempt_id, provider, model, operation, status, tokens_in, tokens_out,
                   latency_ms, request_payload, response_payload, confidence, error_class,
                   error_message, metadata, created_at
            FROM api_call_logs
            WHERE attempt_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(attempt_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Call and token totals per provider/model since `since`.
    pub async fn usage_since(&self, since: DateTime<Utc>) -> Result<Vec<ProviderUsage>, AppError> {
        let rows: Vec<(String, String, i64, i64, i64, i64)> = sqlx::query_as(
            r#"
            SELECT provider,
                   model,
                   COUNT(*),
                   COUNT(*) FILTER (WHERE status IN ('error', 'rate_limited')),
                   COALESCE(SUM(tokens_in), 0)::BIGINT,
                   COALESCE(SUM(tokens_out), 0)::BIGINT
            FROM api_call_logs
            WHERE created_at >= $1
            GROUP BY provider, model
            ORDER BY provider, model
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|(provider, model, calls, failures, tokens_in, tokens_out)| ProviderUsage {
                provider,
                model,
                calls,
                failures,
                tokens_in,
                tokens_out,
            })
            .collect())
    }
}

#[derive(sqlx::FromRow)]
struct ApiCallLogRow {
    id: Uuid,
    attempt_id: Option<Uuid>,
    provider: String,
    model: String,
    operation: String,
    status: String,
    tokens_in: Option<i32>,
    tokens_out: Option<i32>,
    latency_ms: i64,
    request_payload: String,
    response_payload: Option<String>,
    confidence: Option<f64>,
    error_class: Option<String>,
    error_message: Option<String>,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl From<ApiCallLogRow> for NewApiCallLog {
    fn from(row: ApiCallLogRow) -> Self {
        NewApiCallLog {
            id: row.id,
            attempt_id: row.attempt_id,
            provider: row.provider,
            model: row.model,
            operation: row.operation,
            status: row.status.parse().unwrap_or(ApiCallStatus::Error),
            tokens_in: row.tokens_in.map(|t| t.max(0) as u32),
            tokens_out: row.tokens_out.map(|t| t.max(0) as u32),
            latency_ms: row.latency_ms.max(0) as u64,
            request_payload: row.request_payload,
            response_payload: row.response_payload,
            confidence: row.confidence,
            error_class: row.error_class,
            error_message: row.error_message,
            metadata: row.metadata,
            created_at: row.created_at,
        }
    }
}

impl ApiCallLogger for ApiCallLogRepository {
    async fn log(&self, entry: &NewApiCallLog) -> Result<(), AppError> {
        ApiCallLogRepository::log(self, entry).await
    }
}
