use chrono::Utc;
use jobsift_core::merge::{AppliedUpdate, JobPosting};
use jobsift_core::models::{CustomSection, ExtractionMethod, ExtractionResult, Provenance};
use jobsift_db::{CompanyRepository, JobPostingRepository};
use uuid::Uuid;

use crate::integration::common::{setup_test_db, target};

fn update(company_id: Option<Uuid>) -> AppliedUpdate {
    AppliedUpdate {
        attempt_id: Uuid::new_v4(),
        method: ExtractionMethod::Ai,
        provider: Some("openai".into()),
        model: Some("gpt-4o-mini".into()),
        confidence: 0.8,
        data_hash: "a".repeat(64),
        company_id,
        job_role_id: None,
    }
}

fn result() -> ExtractionResult {
    let mut r = ExtractionResult::empty(Provenance::ai("openai", "gpt-4o-mini"));
    r.title = Some("Platform Engineer".into());
    r.company = Some("Acme".into());
    r.location = Some("Remote (EU)".into());
    r.salary_min = Some(90_000.0);
    r.salary_currency = Some("EUR".into());
    r.requirements = vec!["Rust".into(), "PostgreSQL".into()];
    r.custom_sections = vec![CustomSection {
        title: "About the team".into(),
        content: "Small and friendly.".into(),
    }];
    r.confidence = 0.8;
    r
}

#[tokio::test]
async fn apply_creates_missing_posting() {
    let (pool, _container) = setup_test_db().await;
    let repo = JobPostingRepository::new(pool);
    let target = target("https://boards.greenhouse.io/acme/jobs/7");

    let changed = repo.apply_extracted(&target, &result(), &update(None)).await.unwrap();
    assert!(changed.contains(&"title".to_string()));
    assert!(changed.contains(&"requirements".to_string()));

    let stored = repo.get(target.id).await.unwrap().expect("posting created");
    assert_eq!(stored.url, target.url);
    assert_eq!(stored.title.as_deref(), Some("Platform Engineer"));
    assert_eq!(stored.requirements, vec!["Rust", "PostgreSQL"]);
    assert_eq!(stored.custom_sections.len(), 1);
    assert_eq!(stored.extraction_method, Some(ExtractionMethod::Ai));
    assert_eq!(stored.extraction_confidence, Some(0.8));
}

#[tokio::test]
async fn apply_never_overwrites_real_values() {
    let (pool, _container) = setup_test_db().await;
    let repo = JobPostingRepository::new(pool.clone());
    let companies = CompanyRepository::new(pool);
    let target = target("https://jobs.lever.co/acme/abc");

    let mut seeded = JobPosting::new(target.id, target.url.clone(), Utc::now());
    seeded.title = Some("Untitled".into());
    seeded.location = Some("Lisbon".into());
    repo.save(&seeded).await.unwrap();

    let company = companies.create_company("Acme", None).await.unwrap();
    let changed = repo
        .apply_extracted(&target, &result(), &update(Some(company.id)))
        .await
        .unwrap();

    assert!(changed.contains(&"title".to_string()));
    assert!(changed.contains(&"company_id".to_string()));
    assert!(!changed.contains(&"location".to_string()));

    let stored = repo.get(target.id).await.unwrap().unwrap();
    assert_eq!(stored.title.as_deref(), Some("Platform Engineer"));
    assert_eq!(stored.location.as_deref(), Some("Lisbon"));
    assert_eq!(stored.company_id, Some(company.id));
}

#[tokio::test]
async fn reapplying_same_result_changes_nothing() {
    let (pool, _container) = setup_test_db().await;
    let repo = JobPostingRepository::new(pool);
    let target = target("https://jobs.ashbyhq.com/acme/123");

    repo.apply_extracted(&target, &result(), &update(None)).await.unwrap();
    let changed = repo.apply_extracted(&target, &result(), &update(None)).await.unwrap();
    assert!(changed.is_empty());
}
