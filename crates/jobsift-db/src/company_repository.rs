use jobsift_core::error::AppError;
use jobsift_core::resolver::{Company, JobRole, normalize_name};
use jobsift_core::traits::CompanyDirectory;
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

const CANDIDATE_LIMIT: i64 = 50;

/// Companies and their job roles.
///
/// Candidate queries are loose (substring or shared prefix);
/// the resolver applies the fuzzy match.
#[derive(Clone)]
pub struct CompanyRepository {
    pool: Pool<Postgres>,
}

impl CompanyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn company_candidates(&self, name: &str, domain: Option<&str>) -> Result<Vec<Company>, AppError> {
        let (contains, prefix) = search_keys(name);
        let rows = sqlx::query_as::<_, CompanyRow>(
            r#"
            SELECT id, name, domain
            FROM companies
            WHERE lower(name) LIKE $1
               OR left(lower(name), 3) = $2
               OR ($3::TEXT IS NOT NULL AND lower(domain) = lower($3))
            ORDER BY created_at ASC
            LIMIT $4
            "#,
        )
        .bind(contains)
        .bind(prefix)
        .bind(domain)
        .bind(CANDIDATE_LIMIT)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn create_company(&self, name: &str, domain: Option<&str>) -> Result<Company, AppError> {
        let row = sqlx::query_as::<_, CompanyRow>(
            r#"
            INSERT INTO companies (name, domain)
            VALUES ($1, $2)
            RETURNING id, name, domain
            "#,
        )
        .bind(name)
        .bind(domain)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.into())
    }

    pub async fn role_candidates(&self, company_id: Uuid, title: &str) -> Result<Vec<JobRole>, AppError> {
        let (contains, prefix) = search_keys(title);
        let rows = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT id, company_id, title
            FROM job_roles
            WHERE company_id = $1
              AND (lower(title) LIKE $2 OR left(lower(title), 3) = $3)
            ORDER BY created_at ASC
            LIMIT $4
            "#,
        )
        .bind(company_id)
        .bind(contains)
        .bind(prefix)
        .bind(CANDIDATE_LIMIT)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn create_role(&self, company_id: Uuid, title: &str) -> Result<JobRole, AppError> {
        let row = sqlx::query_as::<_, RoleRow>(
            r#"
            INSERT INTO job_roles (company_id, title)
            VALUES ($1, $2)
            RETURNING id, company_id, title
            "#,
        )
        .bind(company_id)
        .bind(title)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.into())
    }
}

/// `LIKE` pattern on the first normalized word, plus a 3-char prefix.
/// Normalized names are alphanumeric, so no wildcard escaping is needed.
fn search_keys(name: &str) -> (String, String) {
    let normalized = normalize_name(name);
    let first = normalized.split_whitespace().next().unwrap_or_default();
    let prefix: String = normalized.chars().take(3).collect();
    (format!("%{first}%"), prefix)
}

#[derive(sqlx::FromRow)]
struct CompanyRow {
    id: Uuid,
    name: String,
    domain: Option<String>,
}

impl From<CompanyRow> for Company {
    fn from(row: CompanyRow) -> Self {
        Company {
            id: row.id,
            name: row.name,
            domain: row.domain,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RoleRow {
    id: Uuid,
    company_id: Uuid,
    title: String,
}

impl From<RoleRow> for JobRole {
    fn from(row: RoleRow) -> Self {
        JobRole {
            id: row.id,
            company_id: row.company_id,
            title: row.title,
        }
    }
}

impl CompanyDirectory for CompanyRepository {
    async fn company_candidates(&self, name: &str, domain: Option<&str>) -> Result<Vec<Company>, AppError> {
        CompanyRepository::company_candidates(self, name, domain).await
    }

    async fn create_company(&self, name: &str, domain: Option<&str>) -> Result<Company, AppError> {
        CompanyRepository::create_company(self, name, domain).await
    }

    async fn role_candidates(&self, company_id: Uuid, title: &str) -> Result<Vec<JobRole>, AppError> {
        CompanyRepository::role_candidates(self, company_id, title).await
    }

    async fn create_role(&self, company_id: Uuid, title: &str) -> Result<JobRole, AppError> {
        CompanyRepository::create_role(self, company_id, title).await
    }
}
