use chrono::{DateTime, Utc};
use jobsift_core::error::AppError;
use jobsift_core::merge::{AppliedUpdate, JobPosting, merge_extracted};
use jobsift_core::models::{CustomSection, ExtractionResult, Target};
use jobsift_core::traits::JobSink;
use sqlx::types::Json;
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

const POSTING_COLUMNS: &str = "id, url, title, company_name, company_id, job_role_id, description, \
     location, employment_type, remote, salary_min, salary_max, salary_currency, salary_period, \
     requirements, benefits, custom_sections, extraction_method, extraction_provider, \
     extraction_model, extraction_confidence, last_attempt_id, data_hash, extracted_at, \
     created_at, updated_at";

/// Job postings, the sink extraction results are merged into.
///
/// A posting's id is its target id. Merging happens under a row lock so
/// two attempts finishing together cannot overwrite each other's fills.
#[derive(Clone)]
pub struct JobPostingRepository {
    pool: Pool<Postgres>,
}

impl JobPostingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<JobPosting>, AppError> {
        let row = sqlx::query_as::<_, PostingRow>(&format!(
            "SELECT {POSTING_COLUMNS} FROM job_postings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    /// Insert or fully overwrite a posting.
    pub async fn save(&self, posting: &JobPosting) -> Result<(), AppError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        upsert(&mut *conn, posting).await
    }

    /// Fill-only merge of `result` into the target's posting, creating it
    /// when missing. Returns the names of the fields that changed.
    pub async fn apply_extracted(
        &self,
        target: &Target,
        result: &ExtractionResult,
        update: &AppliedUpdate,
    ) -> Result<Vec<String>, AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        let existing = sqlx::query_as::<_, PostingRow>(&format!(
            "SELECT {POSTING_COLUMNS} FROM job_postings WHERE id = $1 FOR UPDATE"
        ))
        .bind(target.id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        let now = Utc::now();
        let mut posting = existing
            .map(JobPosting::from)
            .unwrap_or_else(|| JobPosting::new(target.id, target.url.clone(), now));
        let changed = merge_extracted(&mut posting, result, update, now);

        upsert(&mut *tx, &posting).await?;
        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        tracing::debug!(posting_id = %posting.id, ?changed, "Merged extraction into posting");
        Ok(changed.into_iter().map(String::from).collect())
    }
}

async fn upsert(conn: &mut sqlx::PgConnection, posting: &JobPosting) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO job_postings (
            id, url, title, company_name, company_id, job_role_id, description, location,
            employment_type, remote, salary_min, salary_max, salary_currency, salary_period,
            requirements, benefits, custom_sections, extraction_method, extraction_provider,
            extraction_model, extraction_confidence, last_attempt_id, data_hash, extracted_at,
            created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                $18, $19, $20, $21, $22, $23, $24, $25, $26)
        ON CONFLICT (id) DO UPDATE SET
            url = EXCLUDED.url,
            title = EXCLUDED.title,
            company_name = EXCLUDED.company_name,
            company_id = EXCLUDED.company_id,
            job_role_id = EXCLUDED.job_role_id,
            description = EXCLUDED.description,
            location = EXCLUDED.location,
            employment_type = EXCLUDED.employment_type,
            remote = EXCLUDED.remote,
            salary_min = EXCLUDED.salary_min,
            salary_max = EXCLUDED.salary_max,
            salary_currency = EXCLUDED.salary_currency,
            salary_period = EXCLUDED.salary_period,
            requirements = EXCLUDED.requirements,
            benefits = EXCLUDED.benefits,
            custom_sections = EXCLUDED.custom_sections,
            extraction_method = EXCLUDED.extraction_method,
            extraction_provider = EXCLUDED.extraction_provider,
            extraction_model = EXCLUDED.extraction_model,
            extraction_confidence = EXCLUDED.extraction_confidence,
            last_attempt_id = EXCLUDED.last_attempt_id,
            data_hash = EXCLUDED.data_hash,
            extracted_at = EXCLUDED.extracted_at,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(posting.id)
    .bind(&posting.url)
    .bind(&posting.title)
    .bind(&posting.company_name)
    .bind(posting.company_id)
    .bind(posting.job_role_id)
    .bind(&posting.description)
    .bind(&posting.location)
    .bind(&posting.employment_type)
    .bind(posting.remote)
    .bind(posting.salary_min)
    .bind(posting.salary_max)
    .bind(&posting.salary_currency)
    .bind(&posting.salary_period)
    .bind(Json(&posting.requirements))
    .bind(Json(&posting.benefits))
    .bind(Json(&posting.custom_sections))
    .bind(posting.extraction_method.map(|m| m.as_str()))
    .bind(&posting.extraction_provider)
    .bind(&posting.extraction_model)
    .bind(posting.extraction_confidence)
    .bind(posting.last_attempt_id)
    .bind(&posting.data_hash)
    .bind(posting.extracted_at)
    .bind(posting.created_at)
    .bind(posting.updated_at)
    .execute(conn)
    .await
    .map_err(|e| AppError::DatabaseError(e.to_string()))?;

    Ok(())
}

#[derive(sqlx::FromRow)]
struct PostingRow {
    id: Uuid,
    url: String,
    title: Option<String>,
    company_name: Option<String>,
    company_id: Option<Uuid>,
    job_role_id: Option<Uuid>,
    description: Option<String>,
    location: Option<String>,
    employment_type: Option<String>,
    remote: Option<bool>,
    salary_min: Option<f64>,
    salary_max: Option<f64>,
    salary_currency: Option<String>,
    salary_period: Option<String>,
    requirements: Json<Vec<String>>,
    benefits: Json<Vec<String>>,
    custom_sections: Json<Vec<CustomSection>>,
    extraction_method: Option<String>,
    extraction_provider: Option<String>,
    extraction_model: Option<String>,
    extraction_confidence: Option<f64>,
    last_attempt_id: Option<Uuid>,
    data_hash: Option<String>,
    extracted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PostingRow> for JobPosting {
    fn from(row: PostingRow) -> Self {
        JobPosting {
            id: row.id,
            url: row.url,
            title: row.title,
            company_name: row.company_name,
            company_id: row.company_id,
            job_role_id: row.job_role_id,
            description: row.description,
            location: row.location,
            employment_type: row.employment_type,
            remote: row.remote,
            salary_min: row.salary_min,
            salary_max: row.salary_max,
            salary_currency: row.salary_currency,
            salary_period: row.salary_period,
            requirements: row.requirements.0,
            benefits: row.benefits.0,
            custom_sections: row.custom_sections.0,
            extraction_method: row.extraction_method.and_then(|m| m.parse().ok()),
            extraction_provider: row.extraction_provider,
            extraction_model: row.extraction_model,
            extraction_confidence: row.extraction_confidence,
            last_attempt_id: row.last_attempt_id,
            data_hash: row.data_hash,
            extracted_at: row.extracted_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl JobSink for JobPostingRepository {
    async fn apply_extracted(
        &self,
        target: &Target,
        result: &ExtractionResult,
        update: &AppliedUpdate,
    ) -> Result<Vec<String>, AppError> {
        JobPostingRepository::apply_extracted(self, target, result, update).await
    }
}
