use jobsift_core::resolver::EntityResolver;
use jobsift_db::CompanyRepository;

use crate::integration::common::setup_test_db;

#[tokio::test]
async fn candidates_match_by_name_fragment_and_domain() {
    let (pool, _container) = setup_test_db().await;
    let repo = CompanyRepository::new(pool);

    let acme = repo.create_company("Acme Robotics Inc.", Some("acme.io")).await.unwrap();
    repo.create_company("Globex", None).await.unwrap();

    let by_name = repo.company_candidates("ACME", None).await.unwrap();
    assert_eq!(by_name.len(), 1);
    assert_eq!(by_name[0].id, acme.id);

    let by_domain = repo.company_candidates("Totally Different", Some("ACME.io")).await.unwrap();
    assert_eq!(by_domain.len(), 1);
    assert_eq!(by_domain[0].id, acme.id);
}

#[tokio::test]
async fn resolver_reuses_existing_company_and_role() {
    let (pool, _container) = setup_test_db().await;
    let resolver = EntityResolver::new(CompanyRepository::new(pool));

    let first = resolver.resolve_company("Acme Corp", None).await.unwrap();
    let again = resolver.resolve_company("acme", None).await.unwrap();
    assert_eq!(first.id, again.id);

    let role = resolver.resolve_role(first.id, "Senior Rust Engineer").await.unwrap();
    let same = resolver.resolve_role(first.id, "Senior Rust Engineer").await.unwrap();
    assert_eq!(role.id, same.id);

    let other = resolver.resolve_role(first.id, "Designer").await.unwrap();
    assert_ne!(other.id, role.id);
}
